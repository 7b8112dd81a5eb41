//! HTTP endpoints of the diagnostics service.
//!
//! - `diagnostics` - Email report and test email (/api/debug/email*)
//! - `health` - Health check endpoint (/healthz)
//! - `openapi` - OpenAPI/Utoipa configuration

pub mod diagnostics;
pub mod health;
pub mod openapi;

pub use diagnostics::DIAGNOSTICS_TAG;
pub use health::MISC_TAG;

use crate::AppResources;
use axum::Router;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Builds the router with all routes and layers, without binding a socket.
pub fn router(app_resources: AppResources) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .nest("/api/debug", diagnostics::router())
        .routes(routes!(health::health))
        .layer(axum::Extension(app_resources))
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Starts the web server on the configured listen address.
#[tracing::instrument(skip(app_resources))]
pub async fn start_webserver(app_resources: AppResources) -> color_eyre::Result<()> {
    let addr = app_resources.config.listen_addr.clone();
    let router = router(app_resources);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        name = "api.server.started",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        addr = %addr,
        message = "Server running"
    );
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
