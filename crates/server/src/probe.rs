//! Raw TCP reachability check for the configured SMTP server.
//!
//! Only checks that something accepts connections on `host:port`. No SMTP
//! greeting is read, no TLS handshake is attempted and the credentials are
//! never tried, so a successful probe does not mean mail can be sent.

use serde::Serialize;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Reachable,
    Unreachable { error: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub host: String,
    /// Port as configured, before validation.
    pub port: String,
    pub outcome: ProbeOutcome,
}

impl ProbeReport {
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self.outcome, ProbeOutcome::Reachable)
    }
}

/// Opens a TCP connection to `host:port` and closes it straight away.
#[tracing::instrument]
pub async fn probe_smtp(host: &str, port: u16, timeout: Duration) -> ProbeOutcome {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(mut stream)) => {
            // Close our side; the peer may already have hung up.
            let _ = stream.shutdown().await;
            tracing::debug!(
                name = "diagnostics.probe.connected",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                host = %host,
                port = port,
                message = "SMTP server accepted TCP connection"
            );
            ProbeOutcome::Reachable
        }
        Ok(Err(e)) => {
            tracing::warn!(
                name = "diagnostics.probe.failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                host = %host,
                port = port,
                error = %e,
                message = "SMTP server connection failed"
            );
            ProbeOutcome::Unreachable {
                error: e.to_string(),
            }
        }
        Err(_) => {
            tracing::warn!(
                name = "diagnostics.probe.timeout",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                host = %host,
                port = port,
                timeout_secs = timeout.as_secs(),
                message = "SMTP server connection timed out"
            );
            ProbeOutcome::Unreachable {
                error: format!("Connection timed out after {timeout:?}"),
            }
        }
    }
}
