//! Write path for payment status changes.
//!
//! The monthly record is written first and is the only step allowed to abort
//! the binary writer. The legacy player fields follow on a best-effort basis,
//! then the change event is published so every handler can rely on the record
//! already holding the new state.

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{PaymentRecordEntity, PlayerLifecycleUpdate, PlayerPaymentUpdate},
    error::ServiceError,
    state::{
        SharedState,
        notifications::{ChangeEvent, PaymentStatusChanged},
        status::{LifecycleStatus, MonthKey, UiStatus, to_storage},
    },
};

/// Binary status change requested by an administrator or coach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentStatusChange {
    /// Player being updated.
    pub player_id: Uuid,
    /// Target status.
    pub status: UiStatus,
    /// Actor recorded on the payment record.
    pub actor_id: Uuid,
    /// Month to write; the current month when absent.
    pub month: Option<MonthKey>,
}

/// Admin lifecycle change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleStatusChange {
    /// Player being updated.
    pub player_id: Uuid,
    /// Target lifecycle status.
    pub status: LifecycleStatus,
    /// Actor recorded on the payment record.
    pub actor_id: Uuid,
}

/// Persist a binary status change and notify subscribers. Returns the record written.
pub async fn set_payment_status(
    state: &SharedState,
    change: PaymentStatusChange,
) -> Result<PaymentRecordEntity, ServiceError> {
    let store = state.require_store().await?;
    let now = state.now();
    let key = change.month.unwrap_or_else(|| MonthKey::containing(now));

    let record = PaymentRecordEntity {
        player_id: change.player_id,
        key,
        status: to_storage(change.status),
        updated_at: now,
        updated_by: change.actor_id,
    };
    store.upsert_payment_record(record.clone()).await?;

    let last_payment_date = change.status.is_paid().then_some(now);
    let update = PlayerPaymentUpdate {
        payment_status: record.status,
        last_payment_date,
    };
    match store.update_player_payment(change.player_id, update).await {
        Ok(true) => {}
        Ok(false) => warn!(
            player_id = %change.player_id,
            "player not found; legacy payment fields not updated"
        ),
        Err(err) => warn!(
            player_id = %change.player_id,
            error = %err,
            "legacy payment field update failed"
        ),
    }

    info!(
        player_id = %change.player_id,
        year = key.year(),
        month = key.month(),
        status = %change.status,
        actor_id = %change.actor_id,
        "payment status updated"
    );
    publish_change(state, change.player_id, change.status, last_payment_date);

    Ok(record)
}

/// Persist an admin lifecycle change. Both the player fields and the
/// current-month record must be written before the event goes out.
pub async fn set_lifecycle_status(
    state: &SharedState,
    change: LifecycleStatusChange,
) -> Result<PaymentRecordEntity, ServiceError> {
    let store = state.require_store().await?;
    let now = state.now();
    let status = change.status.to_ui();
    let last_payment_date = status.is_paid().then_some(now);

    let update = PlayerLifecycleUpdate {
        player_status: change.status,
        payment_status: to_storage(status),
        last_payment_date,
    };
    if !store.update_player_lifecycle(change.player_id, update).await? {
        return Err(ServiceError::NotFound(format!(
            "player {} not found",
            change.player_id
        )));
    }

    let record = PaymentRecordEntity {
        player_id: change.player_id,
        key: MonthKey::containing(now),
        status: to_storage(status),
        updated_at: now,
        updated_by: change.actor_id,
    };
    store.upsert_payment_record(record.clone()).await?;

    info!(
        player_id = %change.player_id,
        lifecycle = change.status.as_str(),
        status = %status,
        actor_id = %change.actor_id,
        "lifecycle status updated"
    );
    publish_change(state, change.player_id, status, last_payment_date);

    Ok(record)
}

fn publish_change(
    state: &SharedState,
    player_id: Uuid,
    status: UiStatus,
    last_payment_date: Option<time::OffsetDateTime>,
) {
    state
        .notifications()
        .publish(&ChangeEvent::PaymentStatusChanged(PaymentStatusChanged {
            player_id,
            status,
            last_payment_date,
        }));
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use time::{Duration, OffsetDateTime, macros::datetime};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::{PlayerAggregate, PlayerEntity},
            payment_store::{
                PaymentStore,
                testing::{FlakyStore, Op},
            },
        },
        state::{
            AppState,
            clock::ManualClock,
            invalidation::{RefreshCategory, Version},
            notifications::PAYMENT_STATUS_CHANGED,
            status::StorageStatus,
        },
    };

    const NOW: OffsetDateTime = datetime!(2025-05-20 14:00 UTC);

    struct Fixture {
        state: SharedState,
        store: FlakyStore,
        clock: Arc<ManualClock>,
        events: Arc<Mutex<Vec<PaymentStatusChanged>>>,
        player: PlayerEntity,
    }

    async fn fixture() -> Fixture {
        let store = FlakyStore::default();
        let clock = Arc::new(ManualClock::new(NOW));
        let state = AppState::with_clock(AppConfig::default(), clock.clone());
        state.install_store(Arc::new(store.clone())).await;

        let player = PlayerEntity {
            id: Uuid::new_v4(),
            team_id: Some(Uuid::new_v4()),
            name: "Ana".into(),
            created_at: datetime!(2025-01-01 0:00 UTC),
            aggregate: PlayerAggregate::default(),
        };
        store.inner.insert_player(player.clone());

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let _subscription = state
            .notifications()
            .subscribe(PAYMENT_STATUS_CHANGED, move |event| {
                let ChangeEvent::PaymentStatusChanged(payload) = event;
                sink.lock().unwrap().push(payload.clone());
                Ok(())
            });

        Fixture {
            state,
            store,
            clock,
            events,
            player,
        }
    }

    fn change(player_id: Uuid, status: UiStatus, actor_id: Uuid) -> PaymentStatusChange {
        PaymentStatusChange {
            player_id,
            status,
            actor_id,
            month: None,
        }
    }

    #[tokio::test]
    async fn paying_twice_keeps_a_single_record_with_the_latest_writer() {
        let f = fixture().await;
        let (first_actor, second_actor) = (Uuid::new_v4(), Uuid::new_v4());

        set_payment_status(&f.state, change(f.player.id, UiStatus::Paid, first_actor))
            .await
            .unwrap();
        f.clock.advance(Duration::minutes(5));
        set_payment_status(&f.state, change(f.player.id, UiStatus::Paid, second_actor))
            .await
            .unwrap();

        assert_eq!(f.store.inner.record_count(), 1);
        let stored = f
            .store
            .inner
            .find_payment_record(f.player.id, MonthKey::containing(NOW))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, StorageStatus::Paid);
        assert_eq!(stored.updated_by, second_actor);
        assert_eq!(stored.updated_at, NOW + Duration::minutes(5));
        // Redundant writes still notify.
        assert_eq!(f.events.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn paid_write_updates_aggregate_and_publishes_the_date() {
        let f = fixture().await;
        set_payment_status(&f.state, change(f.player.id, UiStatus::Paid, Uuid::new_v4()))
            .await
            .unwrap();

        let player = f.store.inner.find_player(f.player.id).await.unwrap().unwrap();
        assert_eq!(player.aggregate.payment_status, Some(StorageStatus::Paid));
        assert_eq!(player.aggregate.last_payment_date, Some(NOW));

        let events = f.events.lock().unwrap();
        assert_eq!(
            *events,
            [PaymentStatusChanged {
                player_id: f.player.id,
                status: UiStatus::Paid,
                last_payment_date: Some(NOW),
            }]
        );
    }

    #[tokio::test]
    async fn unpaid_write_keeps_the_last_payment_date_and_publishes_null() {
        let f = fixture().await;
        set_payment_status(&f.state, change(f.player.id, UiStatus::Paid, Uuid::new_v4()))
            .await
            .unwrap();
        f.clock.advance(Duration::days(1));
        set_payment_status(&f.state, change(f.player.id, UiStatus::Unpaid, Uuid::new_v4()))
            .await
            .unwrap();

        let player = f.store.inner.find_player(f.player.id).await.unwrap().unwrap();
        assert_eq!(player.aggregate.payment_status, Some(StorageStatus::NotPaid));
        assert_eq!(player.aggregate.last_payment_date, Some(NOW));
        assert_eq!(f.events.lock().unwrap()[1].last_payment_date, None);
    }

    #[tokio::test]
    async fn explicit_month_is_honoured() {
        let f = fixture().await;
        let february = MonthKey::new(2025, 2).unwrap();
        let record = set_payment_status(
            &f.state,
            PaymentStatusChange {
                month: Some(february),
                ..change(f.player.id, UiStatus::Paid, Uuid::new_v4())
            },
        )
        .await
        .unwrap();

        assert_eq!(record.key, february);
        assert!(
            f.store
                .inner
                .find_payment_record(f.player.id, MonthKey::containing(NOW))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn failed_record_write_aborts_without_publishing() {
        let f = fixture().await;
        f.store.fail(Op::Upsert);
        let payments = f.state.invalidation().version(&RefreshCategory::Payments);

        let err = set_payment_status(&f.state, change(f.player.id, UiStatus::Paid, Uuid::new_v4()))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Unavailable(_)));
        assert!(f.events.lock().unwrap().is_empty());
        assert_eq!(f.state.invalidation().version(&RefreshCategory::Payments), payments);
        let player = f.store.inner.find_player(f.player.id).await.unwrap().unwrap();
        assert_eq!(player.aggregate.payment_status, None);
    }

    #[tokio::test]
    async fn failed_aggregate_write_is_tolerated() {
        let f = fixture().await;
        f.store.fail(Op::UpdatePayment);

        set_payment_status(&f.state, change(f.player.id, UiStatus::Paid, Uuid::new_v4()))
            .await
            .unwrap();

        assert_eq!(f.store.inner.record_count(), 1);
        assert_eq!(f.events.lock().unwrap().len(), 1);
        assert!(f.state.invalidation().version(&RefreshCategory::Players) > Version::INITIAL);
    }

    #[tokio::test]
    async fn lifecycle_write_sets_both_fields_and_collapses_the_record() {
        let f = fixture().await;
        set_lifecycle_status(
            &f.state,
            LifecycleStatusChange {
                player_id: f.player.id,
                status: LifecycleStatus::OnTrial,
                actor_id: Uuid::new_v4(),
            },
        )
        .await
        .unwrap();

        let player = f.store.inner.find_player(f.player.id).await.unwrap().unwrap();
        assert_eq!(player.aggregate.player_status, Some(LifecycleStatus::OnTrial));
        assert_eq!(player.aggregate.payment_status, Some(StorageStatus::NotPaid));

        let record = f
            .store
            .inner
            .find_payment_record(f.player.id, MonthKey::containing(NOW))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, StorageStatus::NotPaid);
        assert_eq!(f.events.lock().unwrap()[0].status, UiStatus::Unpaid);
    }

    #[tokio::test]
    async fn lifecycle_write_for_unknown_player_is_not_found() {
        let f = fixture().await;
        let err = set_lifecycle_status(
            &f.state,
            LifecycleStatusChange {
                player_id: Uuid::new_v4(),
                status: LifecycleStatus::Paid,
                actor_id: Uuid::new_v4(),
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ServiceError::NotFound(_)));
        assert_eq!(f.store.inner.record_count(), 0);
        assert!(f.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn lifecycle_record_failure_propagates() {
        let f = fixture().await;
        f.store.fail(Op::Upsert);
        let err = set_lifecycle_status(
            &f.state,
            LifecycleStatusChange {
                player_id: f.player.id,
                status: LifecycleStatus::Paid,
                actor_id: Uuid::new_v4(),
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ServiceError::Unavailable(_)));
        assert!(f.events.lock().unwrap().is_empty());
    }
}
