//! Read path producing the best-known payment status of a player.
//!
//! Sources are consulted from most to least authoritative: the current-month
//! record, the previous-month record, a store-side aggregate, and finally the
//! legacy fields on the player entity. Only the last source triggers a
//! self-heal, writing a current-month record so later reads hit the first
//! source directly.

use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{PaymentRecordEntity, PlayerAggregate},
        payment_store::PaymentStore,
    },
    error::ServiceError,
    state::{
        SharedState,
        status::{LifecycleStatus, MonthKey, ResolvedStatus, to_storage, to_ui},
    },
};

/// Actor recorded on records written by the resolver itself.
pub const SYSTEM_ACTOR: Uuid = Uuid::nil();

/// Resolve `player_id` against the installed store. `Ok(None)` means unknown.
pub async fn resolve(
    state: &SharedState,
    player_id: Uuid,
) -> Result<Option<ResolvedStatus>, ServiceError> {
    let store = state.require_store().await?;
    resolve_with(store.as_ref(), player_id, state.now()).await
}

/// Run the fallback chain against `store` as of `now`.
pub async fn resolve_with(
    store: &dyn PaymentStore,
    player_id: Uuid,
    now: OffsetDateTime,
) -> Result<Option<ResolvedStatus>, ServiceError> {
    let current = MonthKey::containing(now);

    for key in [current, current.previous()] {
        match store.find_payment_record(player_id, key).await {
            Ok(Some(record)) => return Ok(Some(from_record(&record))),
            Ok(None) => {}
            Err(err) => warn!(
                %player_id,
                year = key.year(),
                month = key.month(),
                error = %err,
                "payment record lookup failed; falling through"
            ),
        }
    }

    match store.remote_payment_status(player_id).await {
        Ok(Some(resolved)) => return Ok(Some(resolved)),
        Ok(None) => {}
        Err(err) => warn!(%player_id, error = %err, "remote status lookup failed; falling through"),
    }

    let Some(player) = store.find_player(player_id).await? else {
        return Ok(None);
    };
    let Some(resolved) = from_aggregate(&player.aggregate, now) else {
        return Ok(None);
    };

    let healed = PaymentRecordEntity {
        player_id,
        key: current,
        status: to_storage(resolved.status),
        updated_at: now,
        updated_by: SYSTEM_ACTOR,
    };
    match store.upsert_payment_record(healed).await {
        Ok(()) => debug!(
            %player_id,
            year = current.year(),
            month = current.month(),
            status = %resolved.status,
            "self-healed current month record from player aggregate"
        ),
        Err(err) => warn!(%player_id, error = %err, "self-heal write failed"),
    }

    Ok(Some(resolved))
}

fn from_record(record: &PaymentRecordEntity) -> ResolvedStatus {
    ResolvedStatus {
        status: to_ui(record.status),
        status_since: record.updated_at,
    }
}

/// Status implied by the legacy fields, or `None` when they carry nothing.
fn from_aggregate(aggregate: &PlayerAggregate, now: OffsetDateTime) -> Option<ResolvedStatus> {
    let has_data = aggregate.payment_status.is_some()
        || aggregate
            .player_status
            .is_some_and(|status| status != LifecycleStatus::NoData);
    if !has_data {
        return None;
    }

    let status = aggregate.derived_status();
    let status_since = match aggregate.last_payment_date {
        Some(date) if status.is_paid() => date,
        _ => now,
    };
    Some(ResolvedStatus {
        status,
        status_since,
    })
}
