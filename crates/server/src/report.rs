//! The diagnostic run: a fixed sequence of checks over the email setup.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use serde::Serialize;

use crate::config::{AppConfig, PlatformMailConfig};
use crate::error::DiagnosticError;
use crate::probe::{ProbeOutcome, ProbeReport, probe_smtp};
use crate::schema::{TableStatus, ensure_email_log_table};
use crate::settings::{DbSettingsStore, EmailSettings, SettingKey, SettingsStore, SettingsSummary};

/// Whether an SMTP transport library is compiled into this build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MailLibrary {
    Lettre,
    Unavailable,
}

impl MailLibrary {
    pub fn detect() -> Self {
        if cfg!(feature = "smtp") {
            MailLibrary::Lettre
        } else {
            MailLibrary::Unavailable
        }
    }
}

/// Everything the reporter needs besides the database and the settings.
#[derive(Clone, Debug)]
pub struct ReportOptions {
    pub probe_timeout: Duration,
    pub default_port: u16,
    pub mail_library: MailLibrary,
    pub platform_mail: PlatformMailConfig,
    pub settings_url: String,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(10),
            default_port: 587,
            mail_library: MailLibrary::detect(),
            platform_mail: PlatformMailConfig::default(),
            settings_url: "owner/settings".to_string(),
        }
    }
}

impl From<&AppConfig> for ReportOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            probe_timeout: config.probe.timeout(),
            default_port: config.probe.default_port,
            mail_library: MailLibrary::detect(),
            platform_mail: config.platform_mail.clone().with_detected_sendmail(),
            settings_url: config.settings_url.clone(),
        }
    }
}

/// An error that aborted the run, with its chain of causes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FatalError {
    pub message: String,
    pub trace: Vec<String>,
}

impl FatalError {
    pub fn from_error(err: &(dyn StdError + 'static)) -> Self {
        let mut trace: Vec<String> = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            let text = cause.to_string();
            // sqlx and sea-orm wrap errors without adding context.
            if trace.last() != Some(&text) {
                trace.push(text);
            }
            source = cause.source();
        }
        Self {
            message: err.to_string(),
            trace,
        }
    }
}

/// Result of a diagnostic run. Fields stay `None` for steps that were not
/// reached.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticReport {
    pub database_connected: bool,
    pub email_log_table: Option<TableStatus>,
    pub settings: Option<SettingsSummary>,
    pub mail_library: Option<MailLibrary>,
    pub missing_required: Option<Vec<SettingKey>>,
    pub probe: Option<ProbeReport>,
    pub platform_mail: Option<PlatformMailConfig>,
    pub settings_url: String,
    pub fatal: Option<FatalError>,
}

impl DiagnosticReport {
    pub fn failed(err: &DiagnosticError, settings_url: &str) -> Self {
        Self {
            settings_url: settings_url.to_string(),
            fatal: Some(FatalError::from_error(err)),
            ..Default::default()
        }
    }

    /// True when the run finished and every check passed.
    pub fn is_healthy(&self) -> bool {
        self.fatal.is_none()
            && self
                .missing_required
                .as_ref()
                .is_some_and(|missing| missing.is_empty())
            && self.probe.as_ref().is_some_and(ProbeReport::is_reachable)
    }
}

/// Runs the email diagnostics against an injected connection and settings store.
pub struct Reporter {
    db: Arc<DatabaseConnection>,
    settings: Arc<dyn SettingsStore>,
    options: ReportOptions,
}

impl Reporter {
    pub fn new(
        db: Arc<DatabaseConnection>,
        settings: Arc<dyn SettingsStore>,
        options: ReportOptions,
    ) -> Self {
        Self {
            db,
            settings,
            options,
        }
    }

    /// Reporter reading settings from the same database it checks.
    pub fn with_db_settings(db: Arc<DatabaseConnection>, options: ReportOptions) -> Self {
        let store = Arc::new(DbSettingsStore::new(db.clone()));
        Self::new(db, store, options)
    }

    /// Runs every step. Never fails: an error ends the run and is recorded in
    /// [`DiagnosticReport::fatal`] next to what was gathered up to that point.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self) -> DiagnosticReport {
        let mut report = DiagnosticReport {
            settings_url: self.options.settings_url.clone(),
            ..Default::default()
        };
        if let Err(err) = self.collect(&mut report).await {
            tracing::error!(
                name = "diagnostics.run.failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %err,
                message = "Email diagnostics aborted"
            );
            report.fatal = Some(FatalError::from_error(&err));
        }
        report
    }

    async fn collect(&self, report: &mut DiagnosticReport) -> Result<(), DiagnosticError> {
        self.db.ping().await?;
        report.database_connected = true;

        report.email_log_table = Some(ensure_email_log_table(self.db.as_ref()).await?);

        let values = self.settings.load(&SettingKey::ALL).await?;
        let settings = EmailSettings::from_values(values);
        report.settings = Some(settings.summary());

        report.mail_library = Some(self.options.mail_library);

        let missing = settings.missing_required();
        let ready = missing.is_empty();
        report.missing_required = Some(missing);
        if ready {
            report.probe = Some(self.probe(&settings).await);
        }

        report.platform_mail = Some(self.options.platform_mail.clone());
        Ok(())
    }

    async fn probe(&self, settings: &EmailSettings) -> ProbeReport {
        let host = settings.host.clone().unwrap_or_default();
        match settings.port_or(self.options.default_port) {
            Ok(port) => ProbeReport {
                outcome: probe_smtp(&host, port, self.options.probe_timeout).await,
                host,
                port: port.to_string(),
            },
            Err(err) => ProbeReport {
                host,
                port: settings.port.clone().unwrap_or_default(),
                outcome: ProbeOutcome::Unreachable {
                    error: err.to_string(),
                },
            },
        }
    }
}

/// Connects to `database_url` and runs the diagnostics. A failed connection
/// produces a report holding only the fatal error.
/// Builds the pool without opening a connection, so an unreachable server
/// surfaces on the first query instead of here. Only an unusable URL fails.
pub async fn connect_lazy(
    database_url: &str,
    acquire_timeout: Duration,
) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(database_url);
    options
        .connect_lazy(true)
        .acquire_timeout(acquire_timeout);
    Database::connect(options).await
}

pub async fn report_for_url(database_url: &str, options: ReportOptions) -> DiagnosticReport {
    match connect_lazy(database_url, options.probe_timeout).await {
        Ok(db) => Reporter::with_db_settings(Arc::new(db), options).run().await,
        Err(err) => {
            let err = DiagnosticError::from(err);
            tracing::error!(
                name = "diagnostics.connect.failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %err,
                message = "Database connection failed"
            );
            DiagnosticReport::failed(&err, &options.settings_url)
        }
    }
}
