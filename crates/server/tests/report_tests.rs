//! End-to-end runs of the email diagnostics against an in-memory database.

use mail_diagnostics::probe::ProbeOutcome;
use mail_diagnostics::render::render_html;
use mail_diagnostics::report::{MailLibrary, ReportOptions, Reporter, report_for_url};
use mail_diagnostics::schema::{TableStatus, ensure_email_log_table};
use mail_diagnostics::settings::{SettingKey, StaticSettingsStore};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

/// Create a test database with the tables owned by the main application.
async fn create_test_db() -> Arc<DatabaseConnection> {
    let db = create_bare_db().await;

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE settings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            setting_key TEXT NOT NULL,
            setting_value TEXT NULL
        );"#,
    ))
    .await
    .expect("create settings table");

    db
}

/// Database with only the `users` table; no settings.
async fn create_bare_db() -> Arc<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await.expect("connect");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL
        );"#,
    ))
    .await
    .expect("create users table");

    Arc::new(db)
}

async fn put_setting(db: &DatabaseConnection, key: &str, value: &str) {
    db.execute(Statement::from_sql_and_values(
        DbBackend::Sqlite,
        "INSERT INTO settings (setting_key, setting_value) VALUES (?, ?)",
        [key.into(), value.into()],
    ))
    .await
    .expect("insert setting");
}

fn test_options() -> ReportOptions {
    ReportOptions {
        probe_timeout: Duration::from_secs(2),
        ..ReportOptions::default()
    }
}

async fn run(db: &Arc<DatabaseConnection>) -> mail_diagnostics::report::DiagnosticReport {
    Reporter::with_db_settings(db.clone(), test_options())
        .run()
        .await
}

#[tokio::test]
async fn test_creates_log_table_on_first_run_only() {
    let db = create_test_db().await;

    let first = run(&db).await;
    assert!(first.fatal.is_none(), "unexpected failure: {:?}", first.fatal);
    assert!(first.database_connected);
    assert_eq!(first.email_log_table, Some(TableStatus::Created));

    let second = run(&db).await;
    assert!(second.fatal.is_none());
    assert_eq!(second.email_log_table, Some(TableStatus::Existing));

    let text = second.to_string();
    assert!(text.contains("email_logs table exists"));
    assert!(!text.contains("creating it"));
}

#[tokio::test]
async fn test_empty_password_skips_probe() {
    let db = create_test_db().await;
    put_setting(&db, "smtp_host", "127.0.0.1").await;
    put_setting(&db, "smtp_username", "reception@hotel.example").await;
    put_setting(&db, "smtp_password", "").await;

    let report = run(&db).await;
    assert!(report.fatal.is_none());
    assert_eq!(
        report.missing_required,
        Some(vec![SettingKey::SmtpPassword])
    );
    assert!(report.probe.is_none());
    assert!(!report.is_healthy());

    let text = report.to_string();
    assert!(text.contains("Missing required settings: smtp_password"));
    assert!(!text.contains("Testing SMTP Connection"));
    assert!(text.contains("SMTP Password: Not set"));
}

#[tokio::test]
async fn test_unset_settings_render_as_not_set() {
    let db = create_test_db().await;

    let report = run(&db).await;
    let settings = report.settings.clone().expect("settings section");
    assert_eq!(settings.host, None);
    assert!(!settings.password_set);
    assert_eq!(
        report.missing_required,
        Some(vec![
            SettingKey::SmtpHost,
            SettingKey::SmtpUsername,
            SettingKey::SmtpPassword
        ])
    );
    assert!(report.to_string().contains("Hotel Name: Not set"));
}

#[tokio::test]
async fn test_probe_succeeds_and_releases_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut buf = [0u8; 16];
        // Returns 0 once the prober has closed its side.
        socket.read(&mut buf).await.expect("read")
    });

    let db = create_test_db().await;
    put_setting(&db, "smtp_host", "127.0.0.1").await;
    put_setting(&db, "smtp_port", &port.to_string()).await;
    put_setting(&db, "smtp_username", "reception@hotel.example").await;
    put_setting(&db, "smtp_password", "correct horse").await;
    put_setting(&db, "hotel_name", "Hotel Lisboa").await;

    let report = run(&db).await;
    let probe = report.probe.clone().expect("probe ran");
    assert_eq!(probe.outcome, ProbeOutcome::Reachable);
    assert_eq!(probe.port, port.to_string());
    assert!(report.is_healthy());
    assert!(
        report
            .to_string()
            .contains(&format!("SMTP server connection successful (127.0.0.1:{port})"))
    );

    let read = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("prober closed the connection")
        .expect("server task");
    assert_eq!(read, 0);
}

#[tokio::test]
async fn test_probe_reports_socket_error_for_unreachable_host() {
    // Grab a free port, then close it again so nothing is listening.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        listener.local_addr().unwrap().port()
    };

    let db = create_test_db().await;
    put_setting(&db, "smtp_host", "127.0.0.1").await;
    put_setting(&db, "smtp_port", &port.to_string()).await;
    put_setting(&db, "smtp_username", "reception@hotel.example").await;
    put_setting(&db, "smtp_password", "correct horse").await;

    let report = run(&db).await;
    let probe = report.probe.clone().expect("probe ran");
    let ProbeOutcome::Unreachable { error } = &probe.outcome else {
        panic!("expected unreachable, got {:?}", probe.outcome);
    };
    assert!(!error.is_empty());
    assert!(report.fatal.is_none());
    assert!(report.to_string().contains(&format!(
        "Cannot connect to SMTP server (127.0.0.1:{port}) - Error: {error}"
    )));
}

#[tokio::test]
async fn test_probe_defaults_to_port_587() {
    let store = StaticSettingsStore::new([
        (SettingKey::SmtpHost, "127.0.0.1"),
        (SettingKey::SmtpUsername, "reception@hotel.example"),
        (SettingKey::SmtpPassword, "correct horse"),
    ]);
    let db = create_bare_db().await;

    let report = Reporter::new(db, Arc::new(store), test_options())
        .run()
        .await;
    let probe = report.probe.expect("probe ran");
    assert_eq!(probe.host, "127.0.0.1");
    assert_eq!(probe.port, "587");
}

#[tokio::test]
async fn test_invalid_port_is_reported_without_connecting() {
    let store = StaticSettingsStore::new([
        (SettingKey::SmtpHost, "127.0.0.1"),
        (SettingKey::SmtpPort, "submission"),
        (SettingKey::SmtpUsername, "reception@hotel.example"),
        (SettingKey::SmtpPassword, "correct horse"),
    ]);
    let db = create_bare_db().await;

    let report = Reporter::new(db, Arc::new(store), test_options())
        .run()
        .await;
    let probe = report.probe.expect("probe ran");
    assert_eq!(
        probe.outcome,
        ProbeOutcome::Unreachable {
            error: "Invalid SMTP port 'submission'".into()
        }
    );
}

#[tokio::test]
async fn test_password_never_rendered() {
    let secret = "s3cr3t-P@ssw0rd";
    let store = StaticSettingsStore::new([
        (SettingKey::SmtpHost, "127.0.0.1"),
        (SettingKey::SmtpPort, "1"),
        (SettingKey::SmtpUsername, "reception@hotel.example"),
        (SettingKey::SmtpPassword, secret),
    ]);
    let db = create_bare_db().await;

    let report = Reporter::new(db, Arc::new(store), test_options())
        .run()
        .await;

    let html = render_html(&report).expect("render");
    assert!(html.contains("***SET***"));
    assert!(!html.contains(secret));
    assert!(!report.to_string().contains(secret));
    assert!(!serde_json::to_string(&report).unwrap().contains(secret));
    assert!(!format!("{report:?}").contains(secret));
}

#[tokio::test]
async fn test_settings_query_failure_is_reported_as_fatal() {
    // No settings table at all.
    let db = create_bare_db().await;

    let report = run(&db).await;
    assert!(report.database_connected);
    assert_eq!(report.email_log_table, Some(TableStatus::Created));
    assert!(report.settings.is_none());
    assert!(report.platform_mail.is_none());

    let fatal = report.fatal.clone().expect("fatal error recorded");
    assert!(fatal.message.contains("no such table"), "{}", fatal.message);

    let text = report.to_string();
    assert!(text.contains("Database connection successful"));
    assert!(text.contains("Stack trace:"));
    assert!(!text.contains("Go to Settings"));
}

#[tokio::test]
async fn test_mail_library_capability_is_reported() {
    let db = create_bare_db().await;
    let options = ReportOptions {
        mail_library: MailLibrary::Unavailable,
        ..test_options()
    };

    let report = Reporter::new(db, Arc::new(StaticSettingsStore::default()), options)
        .run()
        .await;
    assert_eq!(report.mail_library, Some(MailLibrary::Unavailable));
    assert!(report.to_string().contains("cargo build --features smtp"));
}

#[tokio::test]
async fn test_links_use_settings_url() {
    let db = create_bare_db().await;
    let options = ReportOptions {
        settings_url: "/owner/settings.php".into(),
        ..test_options()
    };

    let report = Reporter::new(db, Arc::new(StaticSettingsStore::default()), options)
        .run()
        .await;
    let text = report.to_string();
    assert!(text.contains("Go to Settings: /owner/settings.php"));
    assert!(text.contains("Test Email Configuration: /owner/settings.php#test-email"));
}

#[tokio::test]
async fn test_unusable_database_url_yields_fatal_report() {
    let report = report_for_url("nosuchdb://localhost/hotel", test_options()).await;
    assert!(!report.database_connected);
    assert!(report.email_log_table.is_none());
    assert!(report.fatal.is_some());
    assert!(report.to_string().contains("Error: Database error"));
}

#[tokio::test]
async fn test_created_log_table_rejects_unknown_type_and_status() {
    let db = create_bare_db().await;
    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        "INSERT INTO users (id, username) VALUES (1, 'owner');",
    ))
    .await
    .expect("insert user");

    let status = ensure_email_log_table(db.as_ref()).await.expect("ensure table");
    assert_eq!(status, TableStatus::Created);

    let insert = |email_type: &str, status: &str| {
        Statement::from_sql_and_values(
            DbBackend::Sqlite,
            "INSERT INTO email_logs (recipient_email, subject, email_type, status, admin_id) \
             VALUES ('a@b.c', 's', ?, ?, 1)",
            [email_type.into(), status.into()],
        )
    };

    assert!(db.execute(insert("BOGUS", "WHATEVER")).await.is_err());
    assert!(db.execute(insert("BOGUS", "SENT")).await.is_err());
    assert!(db.execute(insert("REPORT", "WHATEVER")).await.is_err());
    db.execute(insert("NOTIFICATION", "PENDING"))
        .await
        .expect("in-domain values are accepted");
}
