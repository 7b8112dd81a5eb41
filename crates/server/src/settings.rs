//! Email settings read from the application's key-value settings store.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect};
use serde::Serialize;

use crate::entity::setting;
use crate::error::DiagnosticError;

/// The setting keys the diagnostics care about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKey {
    SmtpHost,
    SmtpPort,
    SmtpUsername,
    SmtpPassword,
    SmtpEncryption,
    HotelName,
}

impl SettingKey {
    pub const ALL: [SettingKey; 6] = [
        SettingKey::SmtpHost,
        SettingKey::SmtpPort,
        SettingKey::SmtpUsername,
        SettingKey::SmtpPassword,
        SettingKey::SmtpEncryption,
        SettingKey::HotelName,
    ];

    /// Keys without which no mail can be sent.
    pub const REQUIRED: [SettingKey; 3] = [
        SettingKey::SmtpHost,
        SettingKey::SmtpUsername,
        SettingKey::SmtpPassword,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::SmtpHost => "smtp_host",
            SettingKey::SmtpPort => "smtp_port",
            SettingKey::SmtpUsername => "smtp_username",
            SettingKey::SmtpPassword => "smtp_password",
            SettingKey::SmtpEncryption => "smtp_encryption",
            SettingKey::HotelName => "hotel_name",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("Unknown setting key: {s}"))
    }
}

/// A value that must never be echoed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Typed view over the raw settings rows. Blank values count as absent.
#[derive(Clone, Debug, Default)]
pub struct EmailSettings {
    pub host: Option<String>,
    pub port: Option<String>,
    pub username: Option<String>,
    pub password: Option<Secret>,
    pub encryption: Option<String>,
    pub hotel_name: Option<String>,
}

impl EmailSettings {
    pub fn from_values(mut values: HashMap<SettingKey, String>) -> Self {
        let mut take = |key: SettingKey| {
            values
                .remove(&key)
                .filter(|v| !v.trim().is_empty())
        };
        Self {
            host: take(SettingKey::SmtpHost),
            port: take(SettingKey::SmtpPort),
            username: take(SettingKey::SmtpUsername),
            password: take(SettingKey::SmtpPassword).map(Secret::new),
            encryption: take(SettingKey::SmtpEncryption),
            hotel_name: take(SettingKey::HotelName),
        }
    }

    fn is_set(&self, key: SettingKey) -> bool {
        match key {
            SettingKey::SmtpHost => self.host.is_some(),
            SettingKey::SmtpPort => self.port.is_some(),
            SettingKey::SmtpUsername => self.username.is_some(),
            SettingKey::SmtpPassword => self.password.is_some(),
            SettingKey::SmtpEncryption => self.encryption.is_some(),
            SettingKey::HotelName => self.hotel_name.is_some(),
        }
    }

    /// Required keys that are missing, in declaration order.
    ///
    /// Blank or whitespace-only values count as missing. `"0"` is a value
    /// like any other and does not make a key missing.
    pub fn missing_required(&self) -> Vec<SettingKey> {
        SettingKey::REQUIRED
            .into_iter()
            .filter(|k| !self.is_set(*k))
            .collect()
    }

    /// The configured port, or `default` when none is set.
    pub fn port_or(&self, default: u16) -> Result<u16, DiagnosticError> {
        match self.port.as_deref().map(str::trim) {
            None => Ok(default),
            Some(raw) => match raw.parse::<u16>() {
                Ok(port) if port > 0 => Ok(port),
                _ => Err(DiagnosticError::InvalidPort(raw.to_string())),
            },
        }
    }

    /// A copy safe to render: the password is reduced to a presence flag.
    pub fn summary(&self) -> SettingsSummary {
        SettingsSummary {
            host: self.host.clone(),
            port: self.port.clone(),
            username: self.username.clone(),
            password_set: self.password.is_some(),
            encryption: self.encryption.clone(),
            hotel_name: self.hotel_name.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SettingsSummary {
    pub host: Option<String>,
    pub port: Option<String>,
    pub username: Option<String>,
    pub password_set: bool,
    pub encryption: Option<String>,
    pub hotel_name: Option<String>,
}

/// Read access to the application's key-value settings.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Returns the values stored for `keys`. Keys without a row are absent
    /// from the map.
    async fn load(&self, keys: &[SettingKey])
    -> Result<HashMap<SettingKey, String>, DiagnosticError>;
}

/// [`SettingsStore`] backed by the `settings` table.
#[derive(Clone, Debug)]
pub struct DbSettingsStore {
    db: Arc<DatabaseConnection>,
}

impl DbSettingsStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SettingsStore for DbSettingsStore {
    #[tracing::instrument(skip(self))]
    async fn load(
        &self,
        keys: &[SettingKey],
    ) -> Result<HashMap<SettingKey, String>, DiagnosticError> {
        let rows: Vec<(String, Option<String>)> = setting::Entity::find()
            .select_only()
            .column(setting::Column::SettingKey)
            .column(setting::Column::SettingValue)
            .filter(setting::Column::SettingKey.is_in(keys.iter().map(|k| k.as_str())))
            .into_tuple()
            .all(self.db.as_ref())
            .await?;

        // Later rows win when a key is stored more than once.
        let values = rows
            .into_iter()
            .filter_map(|(key, value)| Some((key.parse().ok()?, value.unwrap_or_default())))
            .collect();
        Ok(values)
    }
}

/// In-memory [`SettingsStore`], mostly useful for tests and dry runs.
#[derive(Clone, Debug, Default)]
pub struct StaticSettingsStore {
    values: HashMap<SettingKey, String>,
}

impl StaticSettingsStore {
    pub fn new<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (SettingKey, V)>,
        V: Into<String>,
    {
        Self {
            values: values.into_iter().map(|(k, v)| (k, v.into())).collect(),
        }
    }
}

#[async_trait]
impl SettingsStore for StaticSettingsStore {
    async fn load(
        &self,
        keys: &[SettingKey],
    ) -> Result<HashMap<SettingKey, String>, DiagnosticError> {
        Ok(keys
            .iter()
            .filter_map(|k| self.values.get(k).map(|v| (*k, v.clone())))
            .collect())
    }
}
