//! HTTP handler tests for API endpoints.
//!
//! Tests the actual HTTP responses from the API handlers.

use axum::extract::connect_info::MockConnectInfo;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use mail_diagnostics::{
    AppResources,
    api,
    config::{AppConfig, PlatformMailConfig, ProbeConfig},
    report::connect_lazy,
};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Create a test database connection
async fn create_test_db() -> DatabaseConnection {
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

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        "INSERT INTO users (id, username) VALUES (1, 'owner');",
    ))
    .await
    .expect("insert user");

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

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"INSERT INTO settings (setting_key, setting_value) VALUES
            ('smtp_host', '127.0.0.1'),
            ('smtp_port', '1'),
            ('smtp_username', 'reception@hotel.example'),
            ('smtp_password', 'do-not-print-me'),
            ('hotel_name', 'Hotel <Central>');"#,
    ))
    .await
    .expect("insert settings");

    db
}

fn create_test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        listen_addr: "127.0.0.1:0".to_string(),
        settings_url: "owner/settings".to_string(),
        probe: ProbeConfig {
            timeout_secs: 2,
            default_port: 587,
        },
        platform_mail: PlatformMailConfig {
            sendmail_path: Some("/usr/sbin/sendmail -t -i".to_string()),
            smtp_host: None,
            smtp_port: None,
        },
        debug_allowed_nets: vec!["127.0.0.1/32".parse().unwrap()],
    }
}

async fn create_test_server(client: [u8; 4]) -> TestServer {
    let resources = AppResources {
        db: Arc::new(create_test_db().await),
        config: Arc::new(create_test_config()),
    };
    let app = api::router(resources).layer(MockConnectInfo(SocketAddr::from((client, 40000))));
    TestServer::new(app).expect("create test server")
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = create_test_server([127, 0, 0, 1]).await;

    let response = server.get("/healthz").await;
    response.assert_status_ok();
    response.assert_text("ok");
}

#[tokio::test]
async fn test_email_report_from_allowed_network() {
    let server = create_test_server([127, 0, 0, 1]).await;

    let response = server.get("/api/debug/email").await;
    response.assert_status_ok();

    let body = response.text();
    assert!(body.contains("Email Configuration Debug"));
    assert!(body.contains("Database connection successful"));
    assert!(body.contains("email_logs table created"));
    assert!(body.contains("All required email settings are configured"));
    assert!(body.contains("Cannot connect to SMTP server"));
    assert!(body.contains("/usr&#x2f;sbin") || body.contains("/usr/sbin"));
    assert!(body.contains("Hotel &lt;Central&gt;"));
    assert!(!body.contains("do-not-print-me"));
}

#[tokio::test]
async fn test_email_report_second_call_finds_table() {
    let server = create_test_server([127, 0, 0, 1]).await;

    server.get("/api/debug/email").await.assert_status_ok();
    let body = server.get("/api/debug/email").await.text();
    assert!(body.contains("email_logs table exists"));
}

#[tokio::test]
async fn test_email_report_when_database_unreachable() {
    let db = connect_lazy("mysql://x:y@127.0.0.1:1/hotel", Duration::from_secs(1))
        .await
        .expect("lazy pool");
    let resources = AppResources {
        db: Arc::new(db),
        config: Arc::new(create_test_config()),
    };
    let app = api::router(resources)
        .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
    let server = TestServer::new(app).expect("create test server");

    let response = server.get("/api/debug/email").await;
    response.assert_status_ok();

    let body = response.text();
    assert!(body.contains("Error: Database error"), "{body}");
    assert!(body.contains("Stack trace:"));
    assert!(!body.contains("Database connection successful"));
}

#[tokio::test]
async fn test_email_report_denied_outside_allowed_networks() {
    let server = create_test_server([203, 0, 113, 7]).await;

    let response = server.get("/api/debug/email").await;
    response.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_email_report_honours_forwarded_for() {
    let server = create_test_server([127, 0, 0, 1]).await;

    let response = server
        .get("/api/debug/email")
        .add_header(
            HeaderName::from_static("x-forwarded-for"),
            HeaderValue::from_static("198.51.100.4, 127.0.0.1"),
        )
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
}

#[cfg(feature = "smtp")]
#[tokio::test]
async fn test_send_test_email_records_failure() {
    let server = create_test_server([127, 0, 0, 1]).await;

    let response = server
        .post("/api/debug/email/test")
        .json(&serde_json::json!({
            "recipient": "manager@hotel.example",
            "admin_id": 1
        }))
        .await;
    response.assert_status_ok();

    let entry: serde_json::Value = response.json();
    assert_eq!(entry["status"], "FAILED");
    assert_eq!(entry["email_type"], "NOTIFICATION");
    assert_eq!(entry["recipient_email"], "manager@hotel.example");
    assert!(entry["response_data"].as_str().is_some_and(|s| !s.is_empty()));
}

#[cfg(feature = "smtp")]
#[tokio::test]
async fn test_send_test_email_rejects_bad_recipient() {
    let server = create_test_server([127, 0, 0, 1]).await;

    let response = server
        .post("/api/debug/email/test")
        .json(&serde_json::json!({
            "recipient": "not an address",
            "admin_id": 1
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}
