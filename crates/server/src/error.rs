use sea_orm::DbErr;
use thiserror::Error;

use crate::settings::SettingKey;

#[derive(Debug, Error)]
pub enum DiagnosticError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    #[error("email_logs table is still unavailable after creating it: {0}")]
    LogTableUnavailable(#[source] DbErr),
    #[error("Missing required settings: {}", join_keys(.0))]
    MissingSettings(Vec<SettingKey>),
    #[error("Invalid SMTP port '{0}'")]
    InvalidPort(String),
    #[error("Template rendering failed: {0}")]
    Render(#[from] askama::Error),
    #[cfg(feature = "smtp")]
    #[error("Invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[cfg(feature = "smtp")]
    #[error("Failed to build email message: {0}")]
    Message(#[from] lettre::error::Error),
    #[cfg(feature = "smtp")]
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

fn join_keys(keys: &[SettingKey]) -> String {
    keys.iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl DiagnosticError {
    /// Errors caused by the caller's input or the stored settings rather than
    /// by the infrastructure.
    pub fn is_client_error(&self) -> bool {
        match self {
            DiagnosticError::MissingSettings(_) | DiagnosticError::InvalidPort(_) => true,
            #[cfg(feature = "smtp")]
            DiagnosticError::Address(_) => true,
            _ => false,
        }
    }
}
