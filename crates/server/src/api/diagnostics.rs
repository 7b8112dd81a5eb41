//! Email diagnostics endpoints.
//!
//! These endpoints are only accessible from allowed networks (localhost/internal).

use crate::AppResources;
use crate::config::AppConfig;
use crate::render::render_html;
use crate::report::{ReportOptions, Reporter};
use axum::{
    Extension,
    extract::ConnectInfo,
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use utoipa_axum::{router::OpenApiRouter, routes};

#[cfg(feature = "smtp")]
pub use test_email::*;

pub const DIAGNOSTICS_TAG: &str = "Diagnostics";

/// Creates the diagnostics router.
pub fn router() -> OpenApiRouter {
    let router = OpenApiRouter::new().routes(routes!(email_report));
    #[cfg(feature = "smtp")]
    let router = router.routes(routes!(send_test_email));
    router
}

/// Check if the client IP is allowed to access debug endpoints.
fn is_allowed(config: &AppConfig, addr: &SocketAddr, headers: &HeaderMap) -> bool {
    // Get client IP from X-Forwarded-For or socket address
    let client_ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
        .unwrap_or(addr.ip());

    config
        .debug_allowed_nets
        .iter()
        .any(|net| net.contains(&client_ip))
}

/// Run the email configuration diagnostics.
#[utoipa::path(
    get,
    path = "/email",
    tag = DIAGNOSTICS_TAG,
    operation_id = "Email Configuration Report",
    summary = "Diagnose the email configuration",
    description = "Checks the database connection, creates the `email_logs` table if it is missing, \
                   lists the stored SMTP settings (password masked), validates the required ones and \
                   tests TCP reachability of the SMTP server.\n\n\
                   Failures inside the diagnostics are part of the report and still return 200.\n\n\
                   **Access control:** Only accessible from allowed networks (localhost, internal IPs). \
                   Configure allowed networks via `debug_allowed_nets` in the server configuration.",
    responses(
        (status = 200, description = "Rendered HTML report", content_type = "text/html"),
        (status = 403, description = "Access denied - client IP not in allowed networks"),
        (status = 500, description = "Report rendering failed"),
    )
)]
pub async fn email_report(
    Extension(resources): Extension<AppResources>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    if !is_allowed(&resources.config, &addr, &headers) {
        return (StatusCode::FORBIDDEN, "Access denied").into_response();
    }

    let options = ReportOptions::from(resources.config.as_ref());
    let report = Reporter::with_db_settings(resources.db.clone(), options)
        .run()
        .await;

    match render_html(&report) {
        Ok(html) => Html(html).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render report: {}", e),
        )
            .into_response(),
    }
}

#[cfg(feature = "smtp")]
pub mod test_email {
    use super::*;
    use crate::entity::email_log;
    use crate::error::DiagnosticError;
    use crate::mailer::{self, TestEmailRequest};
    use crate::settings::{DbSettingsStore, EmailSettings, SettingKey, SettingsStore};
    use axum::Json;
    use serde_json::json;

    fn error_response(err: DiagnosticError) -> Response {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(json!({ "error": err.to_string() }))).into_response()
    }

    /// Send a test email with the stored SMTP settings.
    #[utoipa::path(
        post,
        path = "/email/test",
        tag = DIAGNOSTICS_TAG,
        operation_id = "Send Test Email",
        summary = "Send a test email",
        description = "Sends a short test email using the SMTP settings from the settings store and \
                       records the attempt in `email_logs`. An SMTP failure still returns 200 with \
                       the log entry in status `FAILED`.\n\n\
                       **Access control:** Only accessible from allowed networks.",
        request_body = TestEmailRequest,
        responses(
            (status = 200, description = "Email log entry of the attempt", body = email_log::Model),
            (status = 400, description = "Required settings missing or invalid address"),
            (status = 403, description = "Access denied - client IP not in allowed networks"),
            (status = 500, description = "Database error"),
        )
    )]
    pub async fn send_test_email(
        Extension(resources): Extension<AppResources>,
        ConnectInfo(addr): ConnectInfo<SocketAddr>,
        headers: HeaderMap,
        Json(request): Json<TestEmailRequest>,
    ) -> Response {
        if !is_allowed(&resources.config, &addr, &headers) {
            return (StatusCode::FORBIDDEN, "Access denied").into_response();
        }

        let store = DbSettingsStore::new(resources.db.clone());
        let settings = match store.load(&SettingKey::ALL).await {
            Ok(values) => EmailSettings::from_values(values),
            Err(e) => return error_response(e),
        };

        match mailer::send_test_email(resources.db.as_ref(), &settings, &request).await {
            Ok(entry) => Json(entry).into_response(),
            Err(e) => error_response(e),
        }
    }
}
