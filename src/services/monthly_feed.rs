//! Live team roll-up: one frame on connect, then a fresh frame each time the
//! debounced subscriber on `payments` fires.

use std::convert::Infallible;

use anyhow::anyhow;
use async_stream::stream;
use axum::response::sse::Event;
use futures::Stream;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dto::{monthly::TeamMonthlyStatusResponse, sse::ServerEvent},
    error::ServiceError,
    services::{monthly_status, sse_events::EVENT_MONTHLY_STATUS, sse_service},
    state::{SharedState, invalidation::RefreshCategory, refresh::DebouncedRefreshSubscriber},
};

/// Roll-up of `team_id` for `year`, shaped for the API.
pub async fn team_snapshot(
    state: &SharedState,
    team_id: Uuid,
    year: i32,
) -> Result<TeamMonthlyStatusResponse, ServiceError> {
    let months = monthly_status::team_monthly_status(state, team_id, year).await?;
    Ok(TeamMonthlyStatusResponse {
        team_id,
        year,
        months,
    })
}

/// Open a live feed. The initial roll-up failing fails the request; later
/// refresh failures are logged and leave the previous frame in place.
pub async fn team_feed(
    state: SharedState,
    team_id: Uuid,
    year: i32,
) -> Result<impl Stream<Item = Result<Event, Infallible>>, ServiceError> {
    let tracker = state.invalidation().clone();
    // Read before loading so a change landing during the load is not missed.
    let last_seen = tracker.version(&RefreshCategory::Payments);
    let initial = team_snapshot(&state, team_id, year).await?;

    let (tx, mut rx) = mpsc::channel::<TeamMonthlyStatusResponse>(4);
    let timing = state.config().refresh();
    let subscriber = DebouncedRefreshSubscriber::spawn(
        tracker,
        RefreshCategory::Payments,
        timing,
        last_seen,
        move || {
            let state = state.clone();
            let tx = tx.clone();
            async move {
                let snapshot = team_snapshot(&state, team_id, year).await?;
                tx.send(snapshot)
                    .await
                    .map_err(|_| anyhow!("monthly feed receiver closed"))
            }
        },
    );

    Ok(stream! {
        // Dropping the stream on disconnect drops the subscriber with it.
        let _subscriber = subscriber;
        if let Some(event) = frame(&initial) {
            yield Ok::<_, Infallible>(event);
        }
        while let Some(snapshot) = rx.recv().await {
            if let Some(event) = frame(&snapshot) {
                yield Ok::<_, Infallible>(event);
            }
        }
        debug!(%team_id, year, "monthly feed closed");
    })
}

fn frame(snapshot: &TeamMonthlyStatusResponse) -> Option<Event> {
    match ServerEvent::json(Some(EVENT_MONTHLY_STATUS.to_string()), snapshot) {
        Ok(event) => Some(sse_service::to_event(event)),
        Err(err) => {
            warn!(
                team_id = %snapshot.team_id,
                error = %err,
                "failed to serialize monthly frame"
            );
            None
        }
    }
}
