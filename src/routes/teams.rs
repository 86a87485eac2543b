use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::monthly::{MonthlyStatusQuery, TeamMonthlyStatusResponse},
    error::AppError,
    services::monthly_feed,
    state::SharedState,
};

/// Team level payment views.
pub fn router() -> Router<SharedState> {
    Router::new().route("/teams/{id}/monthly-status", get(monthly_status))
}

/// Classify every month of a year as `all_paid` or `not_all_paid` for a team.
#[utoipa::path(
    get,
    path = "/teams/{id}/monthly-status",
    tag = "payments",
    params(("id" = Uuid, Path, description = "Team identifier"), MonthlyStatusQuery),
    responses(
        (status = 200, description = "Monthly roll-up", body = TeamMonthlyStatusResponse),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn monthly_status(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<MonthlyStatusQuery>,
) -> Result<Json<TeamMonthlyStatusResponse>, AppError> {
    let year = query.year.unwrap_or_else(|| state.now().year());
    let snapshot = monthly_feed::team_snapshot(&state, id, year).await?;
    Ok(Json(snapshot))
}
