use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Document, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoPaymentDocument, MongoPlayerDocument, doc_id, record_key, to_bson_datetime,
        to_bson_uuid,
    },
};
use crate::{
    dao::{
        models::{PaymentRecordEntity, PlayerEntity, PlayerLifecycleUpdate, PlayerPaymentUpdate},
        payment_store::PaymentStore,
        storage::StorageResult,
    },
    state::status::MonthKey,
};

const PAYMENT_COLLECTION_NAME: &str = "payment_records";
const PLAYER_COLLECTION_NAME: &str = "players";

/// [`PaymentStore`] backed by MongoDB.
#[derive(Clone)]
pub struct MongoPaymentStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.state.read().await.database.clone();

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = establish_connection(&self.config).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoPaymentStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) = establish_connection(&config).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let index = IndexModel::builder()
            .keys(doc! {"player_id": 1, "year": 1, "month": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("payment_record_key_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();

        self.payments()
            .await
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PAYMENT_COLLECTION_NAME,
                index: "player_id,year,month",
                source,
            })?;

        let team_index = IndexModel::builder()
            .keys(doc! {"team_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("player_team_idx".to_owned()))
                    .build(),
            )
            .build();

        self.players()
            .await
            .create_index(team_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PLAYER_COLLECTION_NAME,
                index: "team_id",
                source,
            })?;

        Ok(())
    }

    async fn payments(&self) -> Collection<MongoPaymentDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoPaymentDocument>(PAYMENT_COLLECTION_NAME)
    }

    async fn players(&self) -> Collection<MongoPlayerDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoPlayerDocument>(PLAYER_COLLECTION_NAME)
    }

    async fn find_record(
        &self,
        player_id: Uuid,
        key: MonthKey,
    ) -> MongoResult<Option<PaymentRecordEntity>> {
        let document = self
            .payments()
            .await
            .find_one(record_key(player_id, key))
            .await
            .map_err(|source| MongoDaoError::LoadRecord { player_id, source })?;

        Ok(document.and_then(MongoPaymentDocument::into_entity))
    }

    async fn upsert_record(&self, record: PaymentRecordEntity) -> MongoResult<()> {
        let player_id = record.player_id;
        let filter = record_key(player_id, record.key);
        let document = MongoPaymentDocument::from(record);

        self.payments()
            .await
            .replace_one(filter, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveRecord { player_id, source })?;

        Ok(())
    }

    async fn list_records(
        &self,
        player_ids: Vec<Uuid>,
        year: i32,
    ) -> MongoResult<Vec<PaymentRecordEntity>> {
        if player_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<_> = player_ids.into_iter().map(to_bson_uuid).collect();

        let documents: Vec<MongoPaymentDocument> = self
            .payments()
            .await
            .find(doc! { "player_id": { "$in": ids }, "year": year })
            .await
            .map_err(|source| MongoDaoError::ListRecords { year, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListRecords { year, source })?;

        Ok(documents
            .into_iter()
            .filter_map(MongoPaymentDocument::into_entity)
            .collect())
    }

    async fn find_player(&self, id: Uuid) -> MongoResult<Option<PlayerEntity>> {
        let document = self
            .players()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadPlayer { id, source })?;

        Ok(document.map(Into::into))
    }

    async fn team_players(&self, team_id: Uuid) -> MongoResult<Vec<PlayerEntity>> {
        let documents: Vec<MongoPlayerDocument> = self
            .players()
            .await
            .find(doc! { "team_id": to_bson_uuid(team_id) })
            .sort(doc! { "name": 1 })
            .await
            .map_err(|source| MongoDaoError::ListPlayers { team_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListPlayers { team_id, source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn set_player_fields(&self, id: Uuid, fields: Document) -> MongoResult<bool> {
        let result = self
            .players()
            .await
            .update_one(doc_id(id), doc! { "$set": fields })
            .await
            .map_err(|source| MongoDaoError::UpdatePlayer { id, source })?;

        Ok(result.matched_count > 0)
    }
}

fn payment_fields(update: &PlayerPaymentUpdate) -> Document {
    let mut fields = doc! { "payment_status": update.payment_status.as_str() };
    if let Some(date) = update.last_payment_date {
        fields.insert("last_payment_date", to_bson_datetime(date));
    }
    fields
}

fn lifecycle_fields(update: &PlayerLifecycleUpdate) -> Document {
    let mut fields = doc! {
        "player_status": update.player_status.as_str(),
        "payment_status": update.payment_status.as_str(),
    };
    if let Some(date) = update.last_payment_date {
        fields.insert("last_payment_date", to_bson_datetime(date));
    }
    fields
}

impl PaymentStore for MongoPaymentStore {
    fn find_payment_record(
        &self,
        player_id: Uuid,
        key: MonthKey,
    ) -> BoxFuture<'static, StorageResult<Option<PaymentRecordEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_record(player_id, key).await.map_err(Into::into) })
    }

    fn upsert_payment_record(
        &self,
        record: PaymentRecordEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_record(record).await.map_err(Into::into) })
    }

    fn list_payment_records(
        &self,
        player_ids: Vec<Uuid>,
        year: i32,
    ) -> BoxFuture<'static, StorageResult<Vec<PaymentRecordEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_records(player_ids, year).await.map_err(Into::into) })
    }

    fn find_player(
        &self,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_player(player_id).await.map_err(Into::into) })
    }

    fn list_team_players(
        &self,
        team_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.team_players(team_id).await.map_err(Into::into) })
    }

    fn update_player_payment(
        &self,
        player_id: Uuid,
        update: PlayerPaymentUpdate,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .set_player_fields(player_id, payment_fields(&update))
                .await
                .map_err(Into::into)
        })
    }

    fn update_player_lifecycle(
        &self,
        player_id: Uuid,
        update: PlayerLifecycleUpdate,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .set_player_fields(player_id, lifecycle_fields(&update))
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::state::status::{LifecycleStatus, StorageStatus};

    #[test]
    fn unpaid_updates_do_not_touch_the_payment_date() {
        let fields = payment_fields(&PlayerPaymentUpdate {
            payment_status: StorageStatus::NotPaid,
            last_payment_date: None,
        });
        assert_eq!(fields.get_str("payment_status").unwrap(), "not_paid");
        assert!(!fields.contains_key("last_payment_date"));
    }

    #[test]
    fn lifecycle_updates_set_both_status_fields() {
        let fields = lifecycle_fields(&PlayerLifecycleUpdate {
            player_status: LifecycleStatus::Paid,
            payment_status: StorageStatus::Paid,
            last_payment_date: Some(datetime!(2025-06-01 12:00 UTC)),
        });
        assert_eq!(fields.get_str("player_status").unwrap(), "paid");
        assert_eq!(fields.get_str("payment_status").unwrap(), "paid");
        assert!(fields.get_datetime("last_payment_date").is_ok());
    }
}
