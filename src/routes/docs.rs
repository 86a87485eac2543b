use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

/// Swagger UI mount point.
pub const DOCS_PATH: &str = "/docs";
/// Raw OpenAPI document consumed by the UI and by client generators.
pub const OPENAPI_PATH: &str = "/docs/openapi.json";

/// Serve the Swagger UI and the OpenAPI document of the dues API.
pub fn router() -> Router<SharedState> {
    SwaggerUi::new(DOCS_PATH)
        .url(OPENAPI_PATH, ApiDoc::openapi())
        .into()
}
