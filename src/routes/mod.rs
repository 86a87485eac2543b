use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod health;
pub mod invalidation;
pub mod players;
pub mod sse;
pub mod teams;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sse::router())
        .merge(players::router())
        .merge(teams::router())
        .merge(invalidation::router())
        .merge(docs::router());

    api_router.with_state(state)
}
