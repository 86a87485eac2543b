use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    dao::models::{PlayerAggregate, PlayerEntity},
    error::ServiceError,
    state::{
        SharedState,
        status::{LifecycleStatus, StorageStatus, UiStatus},
    },
};

/// Admin view of a player's lifecycle after the read-time trial expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleView {
    /// Player the view belongs to.
    pub player_id: Uuid,
    /// Effective lifecycle status.
    pub status: LifecycleStatus,
    /// Binary collapse of `status`.
    pub payment_status: UiStatus,
    /// Last recorded payment.
    pub last_payment_date: Option<OffsetDateTime>,
}

/// Read the lifecycle status of `player_id`.
pub async fn lifecycle_status(
    state: &SharedState,
    player_id: Uuid,
) -> Result<LifecycleView, ServiceError> {
    let store = state.require_store().await?;
    let player = store
        .find_player(player_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("player {player_id} not found")))?;

    Ok(lifecycle_view(&player, state.now(), state.config().trial_period()))
}

fn lifecycle_view(
    player: &PlayerEntity,
    now: OffsetDateTime,
    trial_period: time::Duration,
) -> LifecycleView {
    let status =
        stored_lifecycle(&player.aggregate).effective(player.created_at, now, trial_period);
    LifecycleView {
        player_id: player.id,
        status,
        payment_status: status.to_ui(),
        last_payment_date: player.aggregate.last_payment_date,
    }
}

/// Players written only by the binary writer have no lifecycle field yet.
fn stored_lifecycle(aggregate: &PlayerAggregate) -> LifecycleStatus {
    match (aggregate.player_status, aggregate.payment_status) {
        (Some(status), _) => status,
        (None, Some(StorageStatus::Paid)) => LifecycleStatus::Paid,
        (None, Some(StorageStatus::NotPaid)) => LifecycleStatus::Unpaid,
        (None, None) => LifecycleStatus::NoData,
    }
}
