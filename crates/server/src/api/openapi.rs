//! OpenAPI/Utoipa configuration.

use crate::api::{diagnostics::DIAGNOSTICS_TAG, health::MISC_TAG};
use utoipa::OpenApi;

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Mail Diagnostics API",
        version = "1.0.0",
        description = "Diagnostics for the email subsystem of the hotel management application."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = DIAGNOSTICS_TAG, description = "Email configuration diagnostics")
    )
)]
pub struct ApiDoc;
