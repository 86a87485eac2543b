use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};

use crate::{
    dto::invalidation::{InvalidationBumpResponse, InvalidationSnapshotResponse},
    error::AppError,
    services::invalidation_service,
    state::SharedState,
};

/// Polling surface of the invalidation counters.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/invalidation", get(snapshot))
        .route("/invalidation/{category}", post(bump))
}

/// Current version of every category.
#[utoipa::path(
    get,
    path = "/invalidation",
    tag = "invalidation",
    responses((status = 200, description = "Category versions", body = InvalidationSnapshotResponse))
)]
pub async fn snapshot(State(state): State<SharedState>) -> Json<InvalidationSnapshotResponse> {
    Json(InvalidationSnapshotResponse {
        versions: state.invalidation().snapshot(),
    })
}

/// Bump a category after its data changed outside this service.
#[utoipa::path(
    post,
    path = "/invalidation/{category}",
    tag = "invalidation",
    params(("category" = String, Path, description = "Category name, e.g. `teams`")),
    responses(
        (status = 200, description = "Category bumped", body = InvalidationBumpResponse),
        (status = 400, description = "Empty or unknown category name")
    )
)]
pub async fn bump(
    State(state): State<SharedState>,
    Path(category): Path<String>,
) -> Result<Json<InvalidationBumpResponse>, AppError> {
    let (category, version) = invalidation_service::bump_external(&state, &category)?;
    Ok(Json(InvalidationBumpResponse {
        category: category.to_string(),
        version: version.get(),
    }))
}
