#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::{
    dao::{
        models::{PaymentRecordEntity, PlayerEntity, PlayerLifecycleUpdate, PlayerPaymentUpdate},
        storage::StorageResult,
    },
    state::status::{MonthKey, ResolvedStatus},
};

/// Abstraction over the remote data store holding payment records and players.
pub trait PaymentStore: Send + Sync {
    /// Record for one player and month, if any.
    fn find_payment_record(
        &self,
        player_id: Uuid,
        key: MonthKey,
    ) -> BoxFuture<'static, StorageResult<Option<PaymentRecordEntity>>>;
    /// Insert or replace the record addressed by `(player_id, year, month)`.
    fn upsert_payment_record(
        &self,
        record: PaymentRecordEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Every record of `year` belonging to one of `player_ids`.
    fn list_payment_records(
        &self,
        player_ids: Vec<Uuid>,
        year: i32,
    ) -> BoxFuture<'static, StorageResult<Vec<PaymentRecordEntity>>>;
    /// Player entity including its denormalized payment fields.
    fn find_player(
        &self,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>>;
    /// Players rostered on `team_id`.
    fn list_team_players(
        &self,
        team_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>>;
    /// Update the legacy payment fields. Returns `false` when the player does not exist.
    fn update_player_payment(
        &self,
        player_id: Uuid,
        update: PlayerPaymentUpdate,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Update the admin lifecycle fields. Returns `false` when the player does not exist.
    fn update_player_lifecycle(
        &self,
        player_id: Uuid,
        update: PlayerLifecycleUpdate,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Server-side status aggregate. Stores without one answer `None`.
    fn remote_payment_status(
        &self,
        _player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ResolvedStatus>>> {
        Box::pin(async { Ok(None) })
    }
    /// Cheap liveness check.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the underlying connection.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
