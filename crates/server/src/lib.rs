//! Diagnostics for the email subsystem of the hotel management application.
//!
//! Checks the database connection, makes sure the `email_logs` table exists,
//! reports the SMTP settings stored in the settings table and probes the
//! configured SMTP server for TCP reachability.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;

pub mod api;
pub mod config;
pub mod entity;
pub mod error;
#[cfg(feature = "smtp")]
pub mod mailer;
pub mod probe;
pub mod render;
pub mod report;
pub mod schema;
pub mod settings;

#[derive(Clone, Debug)]
pub struct AppResources {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
}
