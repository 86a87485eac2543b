use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use super::error::CouchDaoError;
use crate::{
    dao::models::{PaymentRecordEntity, PlayerAggregate, PlayerEntity},
    state::status::{LifecycleStatus, MonthKey, StorageStatus},
};

pub const PAYMENT_PREFIX: &str = "payment::";
pub const PLAYER_PREFIX: &str = "player::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Decode the documents of an `_all_docs` listing, skipping rows that do not
/// match `T` so one bad document cannot hide the others.
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<AllDocsRow>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| {
            let doc = row.doc?;
            match serde_json::from_value(doc) {
                Ok(decoded) => Some(decoded),
                Err(err) => {
                    warn!(doc_id = ?row.id, error = %err, "skipping undecodable document");
                    None
                }
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchPaymentDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub player_id: Uuid,
    pub year: i32,
    pub month: u8,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub updated_by: Uuid,
}

impl CouchPaymentDocument {
    pub fn from_entity(record: PaymentRecordEntity, rev: Option<String>) -> Self {
        Self {
            id: payment_doc_id(record.player_id, record.key),
            rev,
            player_id: record.player_id,
            year: record.key.year(),
            month: record.key.month(),
            status: record.status.as_str().to_owned(),
            updated_at: record.updated_at,
            updated_by: record.updated_by,
        }
    }

    /// Documents with an out-of-range month or a foreign status are skipped.
    pub fn into_entity(self) -> Option<PaymentRecordEntity> {
        let key = MonthKey::new(self.year, self.month);
        let status = StorageStatus::from_wire(&self.status);
        match (key, status) {
            (Some(key), Some(status)) => Some(PaymentRecordEntity {
                player_id: self.player_id,
                key,
                status,
                updated_at: self.updated_at,
                updated_by: self.updated_by,
            }),
            _ => {
                warn!(doc_id = %self.id, status = %self.status, "ignoring malformed payment document");
                None
            }
        }
    }
}

/// Players of `team_id`, skipping documents whose id is not a player id.
pub fn team_entities(docs: Vec<CouchPlayerDocument>, team_id: Uuid) -> Vec<PlayerEntity> {
    docs.into_iter()
        .filter(|doc| doc.team_id == Some(team_id))
        .filter_map(|doc| {
            let doc_id = doc.id.clone();
            doc.try_into_entity()
                .inspect_err(|err| warn!(%doc_id, error = %err, "skipping malformed player"))
                .ok()
        })
        .collect()
}

/// Player document owned by the roster service. Fields this service does not
/// know about are carried through untouched on write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchPlayerDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub team_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub player_status: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_payment_date: Option<OffsetDateTime>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CouchPlayerDocument {
    pub fn try_into_entity(self) -> Result<PlayerEntity, CouchDaoError> {
        let id = parse_player_doc_id(&self.id)?;
        Ok(PlayerEntity {
            id,
            team_id: self.team_id,
            name: self.name,
            created_at: self.created_at,
            aggregate: PlayerAggregate {
                payment_status: self.payment_status.as_deref().and_then(StorageStatus::from_wire),
                player_status: self
                    .player_status
                    .as_deref()
                    .and_then(LifecycleStatus::from_wire),
                last_payment_date: self.last_payment_date,
            },
        })
    }

    pub fn set_payment_status(&mut self, status: StorageStatus) {
        self.payment_status = Some(status.as_str().to_owned());
    }

    pub fn set_player_status(&mut self, status: LifecycleStatus) {
        self.player_status = Some(status.as_str().to_owned());
    }

    pub fn set_last_payment_date(&mut self, date: Option<OffsetDateTime>) {
        if let Some(date) = date {
            self.last_payment_date = Some(date);
        }
    }
}

pub fn payment_doc_id(player_id: Uuid, key: MonthKey) -> String {
    format!("{PAYMENT_PREFIX}{player_id}::{}::{:02}", key.year(), key.month())
}

/// Prefix covering every record of one player within `year`.
pub fn payment_year_prefix(player_id: Uuid, year: i32) -> String {
    format!("{PAYMENT_PREFIX}{player_id}::{year}::")
}

pub fn player_doc_id(id: Uuid) -> String {
    format!("{PLAYER_PREFIX}{id}")
}

fn parse_player_doc_id(doc_id: &str) -> Result<Uuid, CouchDaoError> {
    let raw = doc_id
        .strip_prefix(PLAYER_PREFIX)
        .ok_or_else(|| CouchDaoError::InvalidDocId {
            doc_id: doc_id.to_owned(),
            kind: "missing player prefix",
        })?;
    Uuid::parse_str(raw).map_err(|_| CouchDaoError::InvalidDocId {
        doc_id: doc_id.to_owned(),
        kind: "player id is not a UUID",
    })
}
