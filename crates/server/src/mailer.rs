//! Test email delivery using the stored SMTP settings.
//!
//! Every attempt is recorded in `email_logs`: the row is written as PENDING
//! before the SMTP conversation starts and updated with the outcome after.

use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::{Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use sea_orm::{ActiveModelTrait, ActiveValue, DatabaseConnection};
use serde::Deserialize;
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::entity::email_log::{self, EmailStatus, EmailType};
use crate::error::DiagnosticError;
use crate::schema::ensure_email_log_table;
use crate::settings::EmailSettings;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

const TEST_BODY: &str = "This is a test email sent from the email configuration diagnostics.\n\
                         If you can read this, outgoing mail is working.";

#[derive(Debug, Deserialize, ToSchema)]
pub struct TestEmailRequest {
    /// Address the test email is sent to.
    pub recipient: String,
    /// Administrator requesting the test, recorded in the email log.
    pub admin_id: i32,
}

/// Transport security derived from the `smtp_encryption` setting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encryption {
    /// TLS from the first byte (`ssl`, `smtps`).
    Implicit,
    /// Plain connection upgraded with STARTTLS (`tls`, `starttls`).
    StartTls,
    None,
}

impl Encryption {
    pub fn from_setting(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("ssl" | "smtps") => Encryption::Implicit,
            Some("tls" | "starttls") => Encryption::StartTls,
            _ => Encryption::None,
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Encryption::Implicit => 465,
            Encryption::StartTls => 587,
            Encryption::None => 25,
        }
    }
}

fn build_transport(
    settings: &EmailSettings,
) -> Result<AsyncSmtpTransport<Tokio1Executor>, DiagnosticError> {
    let host = settings.host.as_deref().unwrap_or_default();
    let encryption = Encryption::from_setting(settings.encryption.as_deref());
    let port = settings.port_or(encryption.default_port())?;

    let builder = match encryption {
        Encryption::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(host)?,
        Encryption::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?,
        Encryption::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
    };

    let credentials = Credentials::new(
        settings.username.clone().unwrap_or_default(),
        settings
            .password
            .as_ref()
            .map(|p| p.expose().to_string())
            .unwrap_or_default(),
    );

    Ok(builder
        .port(port)
        .credentials(credentials)
        .timeout(Some(SMTP_TIMEOUT))
        .build())
}

fn build_message(
    settings: &EmailSettings,
    recipient: &str,
    subject: &str,
) -> Result<Message, DiagnosticError> {
    let sender: Address = settings.username.as_deref().unwrap_or_default().parse()?;
    let to: Mailbox = recipient.parse()?;
    Ok(Message::builder()
        .from(Mailbox::new(settings.hotel_name.clone(), sender))
        .to(to)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(TEST_BODY.to_string())?)
}

/// Sends a test email with `settings` and returns the resulting log entry.
///
/// Fails without touching the database when required settings are missing or
/// an address does not parse. SMTP failures are not errors: they end up in
/// the returned row with status FAILED.
#[tracing::instrument(skip(db, settings))]
pub async fn send_test_email(
    db: &DatabaseConnection,
    settings: &EmailSettings,
    request: &TestEmailRequest,
) -> Result<email_log::Model, DiagnosticError> {
    let missing = settings.missing_required();
    if !missing.is_empty() {
        return Err(DiagnosticError::MissingSettings(missing));
    }

    let subject = match &settings.hotel_name {
        Some(name) => format!("Test email from {name}"),
        None => "Test email".to_string(),
    };
    let message = build_message(settings, &request.recipient, &subject)?;
    let transport = build_transport(settings)?;

    ensure_email_log_table(db).await?;
    let pending = email_log::ActiveModel {
        id: ActiveValue::NotSet,
        recipient_email: ActiveValue::Set(request.recipient.clone()),
        subject: ActiveValue::Set(subject),
        email_type: ActiveValue::Set(EmailType::Notification),
        status: ActiveValue::Set(EmailStatus::Pending),
        response_data: ActiveValue::Set(None),
        admin_id: ActiveValue::Set(request.admin_id),
        sent_at: ActiveValue::Set(OffsetDateTime::now_utc()),
    }
    .insert(db)
    .await?;

    let (status, response_data) = match transport.send(message).await {
        Ok(response) => {
            tracing::info!(
                name = "mailer.test_email.sent",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                log_id = pending.id,
                code = %response.code(),
                message = "Test email accepted by SMTP server"
            );
            let text = response.message().collect::<Vec<_>>().join(" ");
            (EmailStatus::Sent, format!("{} {}", response.code(), text))
        }
        Err(e) => {
            tracing::error!(
                name = "mailer.test_email.failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                log_id = pending.id,
                error = %e,
                message = "Failed to send test email"
            );
            (EmailStatus::Failed, e.to_string())
        }
    };

    let mut entry: email_log::ActiveModel = pending.into();
    entry.status = ActiveValue::Set(status);
    entry.response_data = ActiveValue::Set(Some(response_data));
    Ok(entry.update(db).await?)
}
