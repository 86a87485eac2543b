use serde::Serialize;
use tracing::{info, warn};

use crate::{
    dto::{
        format_timestamp,
        sse::{PaymentStatusChangedEvent, ServerEvent, SystemStatus},
    },
    state::{
        SharedState, SseHub,
        notifications::{ChangeEvent, PAYMENT_STATUS_CHANGED, Subscription},
    },
};

const EVENT_SYSTEM_STATUS: &str = "system_status";
/// Event name of the team roll-up frames.
pub const EVENT_MONTHLY_STATUS: &str = "monthly_status";
/// Event name of the handshake sent first on every stream.
pub const EVENT_HANDSHAKE: &str = "handshake";

/// Mirror every payment change onto the public SSE stream.
pub fn forward_payment_changes(state: &SharedState) -> Subscription {
    let hub = state.public_sse().clone();
    state
        .notifications()
        .subscribe(PAYMENT_STATUS_CHANGED, move |event| {
            let ChangeEvent::PaymentStatusChanged(change) = event;
            let payload = PaymentStatusChangedEvent {
                player_id: change.player_id,
                status: change.status,
                last_payment_date: change.last_payment_date.map(format_timestamp),
            };
            hub.broadcast(ServerEvent::json(
                Some(PAYMENT_STATUS_CHANGED.to_string()),
                &payload,
            )?);
            Ok(())
        })
}

/// Broadcast degraded mode transitions until the state is dropped.
pub async fn relay_degraded_changes(state: SharedState) {
    let mut watcher = state.degraded_watcher();
    while watcher.changed().await.is_ok() {
        let degraded = *watcher.borrow_and_update();
        info!(degraded, "storage availability changed");
        send_event(state.public_sse(), EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
    }
}

/// Serialize `payload` and push it to every subscriber of `hub`.
pub fn send_event(hub: &SseHub, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => hub.broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize SSE payload"),
    }
}
