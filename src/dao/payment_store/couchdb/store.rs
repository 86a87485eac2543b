use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;
use uuid::Uuid;

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, CouchPaymentDocument, CouchPlayerDocument, END_SUFFIX, PLAYER_PREFIX,
        decode_rows, payment_doc_id, payment_year_prefix, player_doc_id, team_entities,
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

/// Attempts made when a concurrent writer bumps the revision under us.
const MAX_WRITE_ATTEMPTS: usize = 3;

/// [`PaymentStore`] talking to a CouchDB database over HTTP.
#[derive(Clone)]
pub struct CouchPaymentStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchPaymentStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url);
        let database = Arc::<str>::from(config.database);
        let auth = config.credentials.map(|credentials| {
            (
                Arc::<str>::from(credentials.username),
                Arc::<str>::from(credentials.password),
            )
        });

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn with_auth(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.auth {
            Some((ref user, ref pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.with_auth(self.client.request(method, url))
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url();

        let response = self
            .with_auth(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .with_auth(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                // 412 means another instance created it first.
                if create.status().is_success() || create.status() == StatusCode::PRECONDITION_FAILED
                {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(CouchDaoError::Conflict {
                path: doc_id.to_string(),
            }),
            status => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status,
            }),
        }
    }

    async fn list_documents<T>(&self, prefix: &str) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        const ALL_DOCS: &str = "_all_docs";
        let query = [
            ("include_docs", "true".to_string()),
            ("startkey", format!("\"{}\"", prefix)),
            ("endkey", format!("\"{}{}\"", prefix, END_SUFFIX)),
        ];

        let response = self
            .request(Method::GET, ALL_DOCS)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: ALL_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: ALL_DOCS.to_string(),
                status: response.status(),
            });
        }

        let payload = response.json::<AllDocsResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_string(),
                source,
            }
        })?;

        Ok(decode_rows(payload.rows))
    }

    async fn upsert_payment(&self, record: PaymentRecordEntity) -> CouchResult<()> {
        let doc_id = payment_doc_id(record.player_id, record.key);
        let mut attempt = 1;
        loop {
            let rev = self
                .get_document::<CouchPaymentDocument>(&doc_id)
                .await?
                .and_then(|existing| existing.rev);
            let doc = CouchPaymentDocument::from_entity(record.clone(), rev);

            match self.put_document(&doc_id, &doc).await {
                Err(CouchDaoError::Conflict { .. }) if attempt < MAX_WRITE_ATTEMPTS => {
                    debug!(%doc_id, attempt, "payment document changed concurrently, retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Read-modify-write of a player document. Returns `false` if it does not exist.
    async fn modify_player<F>(&self, player_id: Uuid, apply: F) -> CouchResult<bool>
    where
        F: Fn(&mut CouchPlayerDocument),
    {
        let doc_id = player_doc_id(player_id);
        let mut attempt = 1;
        loop {
            let Some(mut doc) = self.get_document::<CouchPlayerDocument>(&doc_id).await? else {
                return Ok(false);
            };
            apply(&mut doc);

            match self.put_document(&doc_id, &doc).await {
                Ok(()) => return Ok(true),
                Err(CouchDaoError::Conflict { .. }) if attempt < MAX_WRITE_ATTEMPTS => {
                    debug!(%doc_id, attempt, "player document changed concurrently, retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn list_records(
        &self,
        player_ids: Vec<Uuid>,
        year: i32,
    ) -> CouchResult<Vec<PaymentRecordEntity>> {
        let mut records = Vec::new();
        for player_id in player_ids {
            let docs = self
                .list_documents::<CouchPaymentDocument>(&payment_year_prefix(player_id, year))
                .await?;
            records.extend(docs.into_iter().filter_map(CouchPaymentDocument::into_entity));
        }
        Ok(records)
    }

    async fn team_players(&self, team_id: Uuid) -> CouchResult<Vec<PlayerEntity>> {
        let docs = self
            .list_documents::<CouchPlayerDocument>(PLAYER_PREFIX)
            .await?;
        Ok(team_entities(docs, team_id))
    }
}

impl PaymentStore for CouchPaymentStore {
    fn find_payment_record(
        &self,
        player_id: Uuid,
        key: MonthKey,
    ) -> BoxFuture<'static, StorageResult<Option<PaymentRecordEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = payment_doc_id(player_id, key);
            let maybe_doc = store.get_document::<CouchPaymentDocument>(&doc_id).await?;
            Ok(maybe_doc.and_then(CouchPaymentDocument::into_entity))
        })
    }

    fn upsert_payment_record(
        &self,
        record: PaymentRecordEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_payment(record).await.map_err(Into::into) })
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
        Box::pin(async move {
            let doc_id = player_doc_id(player_id);
            match store.get_document::<CouchPlayerDocument>(&doc_id).await? {
                Some(doc) => Ok(Some(doc.try_into_entity()?)),
                None => Ok(None),
            }
        })
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
                .modify_player(player_id, |doc| {
                    doc.set_payment_status(update.payment_status);
                    doc.set_last_payment_date(update.last_payment_date);
                })
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
                .modify_player(player_id, |doc| {
                    doc.set_player_status(update.player_status);
                    doc.set_payment_status(update.payment_status);
                    doc.set_last_payment_date(update.last_payment_date);
                })
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.database_url();
            let response = store
                .with_auth(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
