use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, Query, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{
    dto::monthly::MonthlyStatusQuery,
    error::AppError,
    services::{monthly_feed, sse_service},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sse/public",
    tag = "sse",
    responses((status = 200, description = "Public SSE stream", content_type = "text/event-stream", body = String))
)]
/// Stream every payment status change and degraded mode transition.
pub async fn public_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = sse_service::subscribe_public(&state);
    info!("New public SSE connection");
    let handshake = sse_service::handshake(&state, "public").await;
    sse_service::to_sse_stream(receiver, handshake)
}

#[utoipa::path(
    get,
    path = "/sse/teams/{id}/monthly-status",
    tag = "sse",
    params(("id" = Uuid, Path, description = "Team identifier"), MonthlyStatusQuery),
    responses(
        (status = 200, description = "Monthly roll-up frames", content_type = "text/event-stream", body = String),
        (status = 503, description = "Storage unavailable")
    )
)]
/// Stream a team's monthly roll-up, re-sent after payment changes settle.
pub async fn team_monthly_stream(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<MonthlyStatusQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let year = query.year.unwrap_or_else(|| state.now().year());
    let feed = monthly_feed::team_feed(state, id, year).await?;
    info!(team_id = %id, year, "New monthly status SSE connection");
    Ok(sse_service::into_sse(feed))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sse/public", get(public_stream))
        .route("/sse/teams/{id}/monthly-status", get(team_monthly_stream))
}
