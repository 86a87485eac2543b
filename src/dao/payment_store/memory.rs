//! Process-local store used for development runs and tests.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::{
    dao::{
        models::{PaymentRecordEntity, PlayerEntity, PlayerLifecycleUpdate, PlayerPaymentUpdate},
        payment_store::PaymentStore,
        storage::StorageResult,
    },
    state::status::MonthKey,
};

/// [`PaymentStore`] keeping everything in concurrent hash maps.
#[derive(Clone, Default)]
pub struct MemoryPaymentStore {
    records: Arc<DashMap<(Uuid, MonthKey), PaymentRecordEntity>>,
    players: Arc<DashMap<Uuid, PlayerEntity>>,
}

impl MemoryPaymentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace a player. Rosters are managed outside this service.
    pub fn insert_player(&self, player: PlayerEntity) {
        self.players.insert(player.id, player);
    }

    /// Number of payment records held, across all players.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

impl PaymentStore for MemoryPaymentStore {
    fn find_payment_record(
        &self,
        player_id: Uuid,
        key: MonthKey,
    ) -> BoxFuture<'static, StorageResult<Option<PaymentRecordEntity>>> {
        let record = self
            .records
            .get(&(player_id, key))
            .map(|entry| entry.value().clone());
        Box::pin(async move { Ok(record) })
    }

    fn upsert_payment_record(
        &self,
        record: PaymentRecordEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.records.insert((record.player_id, record.key), record);
        Box::pin(async { Ok(()) })
    }

    fn list_payment_records(
        &self,
        player_ids: Vec<Uuid>,
        year: i32,
    ) -> BoxFuture<'static, StorageResult<Vec<PaymentRecordEntity>>> {
        let mut records: Vec<PaymentRecordEntity> = self
            .records
            .iter()
            .filter(|entry| entry.key().1.year() == year && player_ids.contains(&entry.key().0))
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|record| (record.player_id, record.key));
        Box::pin(async move { Ok(records) })
    }

    fn find_player(
        &self,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let player = self.players.get(&player_id).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(player) })
    }

    fn list_team_players(
        &self,
        team_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let mut players: Vec<PlayerEntity> = self
            .players
            .iter()
            .filter(|entry| entry.team_id == Some(team_id))
            .map(|entry| entry.value().clone())
            .collect();
        players.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Box::pin(async move { Ok(players) })
    }

    fn update_player_payment(
        &self,
        player_id: Uuid,
        update: PlayerPaymentUpdate,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let matched = match self.players.get_mut(&player_id) {
            Some(mut player) => {
                player.aggregate.apply_payment(&update);
                true
            }
            None => false,
        };
        Box::pin(async move { Ok(matched) })
    }

    fn update_player_lifecycle(
        &self,
        player_id: Uuid,
        update: PlayerLifecycleUpdate,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let matched = match self.players.get_mut(&player_id) {
            Some(mut player) => {
                player.aggregate.apply_lifecycle(&update);
                true
            }
            None => false,
        };
        Box::pin(async move { Ok(matched) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::{dao::models::PlayerAggregate, state::status::StorageStatus};

    fn record(player_id: Uuid, year: i32, month: u8, status: StorageStatus) -> PaymentRecordEntity {
        PaymentRecordEntity {
            player_id,
            key: MonthKey::new(year, month).unwrap(),
            status,
            updated_at: datetime!(2025-05-01 10:00 UTC),
            updated_by: Uuid::nil(),
        }
    }

    #[tokio::test]
    async fn upsert_replaces_the_record_for_the_same_month() {
        let store = MemoryPaymentStore::new();
        let player = Uuid::new_v4();

        store
            .upsert_payment_record(record(player, 2025, 5, StorageStatus::NotPaid))
            .await
            .unwrap();
        store
            .upsert_payment_record(record(player, 2025, 5, StorageStatus::Paid))
            .await
            .unwrap();

        assert_eq!(store.record_count(), 1);
        let stored = store
            .find_payment_record(player, MonthKey::new(2025, 5).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, StorageStatus::Paid);
    }

    #[tokio::test]
    async fn list_filters_by_year_and_player() {
        let store = MemoryPaymentStore::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        for (player, year) in [(a, 2025), (b, 2025), (c, 2025), (a, 2024)] {
            store
                .upsert_payment_record(record(player, year, 1, StorageStatus::Paid))
                .await
                .unwrap();
        }

        let listed = store.list_payment_records(vec![a, b], 2025).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|r| r.key.year() == 2025 && r.player_id != c));
    }

    #[tokio::test]
    async fn updating_an_unknown_player_reports_no_match() {
        let store = MemoryPaymentStore::new();
        let update = PlayerPaymentUpdate {
            payment_status: StorageStatus::Paid,
            last_payment_date: None,
        };
        assert!(!store.update_player_payment(Uuid::new_v4(), update).await.unwrap());

        let player = PlayerEntity {
            id: Uuid::new_v4(),
            team_id: None,
            name: "Ana".into(),
            created_at: datetime!(2025-01-01 0:00 UTC),
            aggregate: PlayerAggregate::default(),
        };
        store.insert_player(player.clone());
        assert!(store.update_player_payment(player.id, update).await.unwrap());
        let stored = store.find_player(player.id).await.unwrap().unwrap();
        assert_eq!(stored.aggregate.payment_status, Some(StorageStatus::Paid));
    }
}
