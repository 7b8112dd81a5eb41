use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Settings for the raw TCP reachability probe.
#[derive(Clone, Debug, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_timeout_secs")]
    pub timeout_secs: u64,
    /// Port used when `smtp_port` is not set in the settings store.
    #[serde(default = "default_smtp_port")]
    pub default_port: u16,
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_probe_timeout_secs(),
            default_port: default_smtp_port(),
        }
    }
}

/// Mail configuration of the host platform, reported verbatim.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PlatformMailConfig {
    pub sendmail_path: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<String>,
}

const SENDMAIL_LOCATIONS: [&str; 3] = [
    "/usr/sbin/sendmail",
    "/usr/lib/sendmail",
    "/usr/bin/sendmail",
];

impl PlatformMailConfig {
    /// Fills `sendmail_path` from the well-known sendmail locations when it
    /// was not configured explicitly.
    pub fn with_detected_sendmail(mut self) -> Self {
        if self.sendmail_path.is_none() {
            self.sendmail_path = SENDMAIL_LOCATIONS
                .iter()
                .find(|p| Path::new(p).exists())
                .map(|p| p.to_string());
        }
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Location of the application's settings page, linked from the report.
    #[serde(default = "default_settings_url")]
    pub settings_url: String,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub platform_mail: PlatformMailConfig,
    /// CIDR networks allowed to access debug endpoints. Examples: "127.0.0.1/32", "10.0.0.0/8".
    /// If not provided, defaults to common private & loopback ranges.
    #[serde(default = "default_debug_allowed_nets")]
    pub debug_allowed_nets: Vec<IpNet>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(try_from = "String")]
pub struct IpNet {
    pub addr: IpAddr,
    pub prefix: u8,
}

impl TryFrom<String> for IpNet {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl IpNet {
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(a), IpAddr::V4(b)) => {
                let mask = if self.prefix == 0 {
                    0
                } else {
                    u32::MAX << (32 - self.prefix as u32)
                };
                (u32::from(a) & mask) == (u32::from(*b) & mask)
            }
            (IpAddr::V6(a), IpAddr::V6(b)) => {
                let a_bytes = a.octets();
                let b_bytes = b.octets();
                let full_bytes = (self.prefix / 8) as usize;
                let rem_bits = self.prefix % 8;
                if full_bytes > 16 {
                    return false;
                }
                if a_bytes[..full_bytes] != b_bytes[..full_bytes] {
                    return false;
                }
                if rem_bits == 0 {
                    return true;
                }
                let mask = (!0u8) << (8 - rem_bits);
                (a_bytes[full_bytes] & mask) == (b_bytes[full_bytes] & mask)
            }
            _ => false,
        }
    }
}

impl FromStr for IpNet {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip_part, prefix_part) = s
            .split_once('/')
            .ok_or_else(|| "CIDR must contain '/'".to_string())?;
        let addr = IpAddr::from_str(ip_part).map_err(|e| format!("Invalid IP: {e}"))?;
        let prefix: u8 = prefix_part
            .parse()
            .map_err(|e| format!("Invalid prefix: {e}"))?;
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix as u32 > max {
            return Err("Prefix out of range".into());
        }
        Ok(IpNet { addr, prefix })
    }
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_smtp_port() -> u16 {
    587
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_settings_url() -> String {
    "owner/settings".to_string()
}

fn default_debug_allowed_nets() -> Vec<IpNet> {
    [
        "127.0.0.1/32",
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "169.254.0.0/16",
        "::1/128",
        "fc00::/7",
    ]
    .iter()
    .filter_map(|s| s.parse().ok())
    .collect()
}

/// Load application configuration from the given YAML file + environment overrides.
///
/// Any environment variable matching the key path separated by double
/// underscores (e.g. `PROBE__TIMEOUT_SECS`) overrides the file value.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name(path))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    validate(&app)?;
    Ok(app)
}

fn validate(app: &AppConfig) -> Result<(), ConfigError> {
    if app.database_url.trim().is_empty() {
        return Err(ConfigError::Validation("database_url must be set".into()));
    }
    if app.probe.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "probe.timeout_secs must be > 0".into(),
        ));
    }
    if app.probe.default_port == 0 {
        return Err(ConfigError::Validation(
            "probe.default_port must be > 0".into(),
        ));
    }
    Ok(())
}
