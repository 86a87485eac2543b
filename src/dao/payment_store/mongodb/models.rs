use std::time::SystemTime;

use mongodb::bson::{self, DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::models::{PaymentRecordEntity, PlayerAggregate, PlayerEntity},
    state::status::{LifecycleStatus, MonthKey, StorageStatus},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPaymentDocument {
    player_id: bson::Uuid,
    year: i32,
    month: i32,
    status: String,
    updated_at: DateTime,
    updated_by: bson::Uuid,
}

impl From<PaymentRecordEntity> for MongoPaymentDocument {
    fn from(value: PaymentRecordEntity) -> Self {
        Self {
            player_id: to_bson_uuid(value.player_id),
            year: value.key.year(),
            month: i32::from(value.key.month()),
            status: value.status.as_str().to_owned(),
            updated_at: to_bson_datetime(value.updated_at),
            updated_by: to_bson_uuid(value.updated_by),
        }
    }
}

impl MongoPaymentDocument {
    /// Documents with an out-of-range month or a foreign status are skipped.
    pub fn into_entity(self) -> Option<PaymentRecordEntity> {
        let key = u8::try_from(self.month)
            .ok()
            .and_then(|month| MonthKey::new(self.year, month));
        let status = StorageStatus::from_wire(&self.status);
        let player_id = from_bson_uuid(self.player_id);

        match (key, status) {
            (Some(key), Some(status)) => Some(PaymentRecordEntity {
                player_id,
                key,
                status,
                updated_at: from_bson_datetime(self.updated_at),
                updated_by: from_bson_uuid(self.updated_by),
            }),
            _ => {
                warn!(
                    %player_id,
                    year = self.year,
                    month = self.month,
                    status = %self.status,
                    "ignoring malformed payment document"
                );
                None
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayerDocument {
    #[serde(rename = "_id")]
    id: bson::Uuid,
    #[serde(default)]
    name: String,
    #[serde(default)]
    team_id: Option<bson::Uuid>,
    created_at: DateTime,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    player_status: Option<String>,
    #[serde(default)]
    last_payment_date: Option<DateTime>,
}

impl From<MongoPlayerDocument> for PlayerEntity {
    fn from(value: MongoPlayerDocument) -> Self {
        Self {
            id: from_bson_uuid(value.id),
            team_id: value.team_id.map(from_bson_uuid),
            name: value.name,
            created_at: from_bson_datetime(value.created_at),
            aggregate: PlayerAggregate {
                payment_status: value.payment_status.as_deref().and_then(StorageStatus::from_wire),
                player_status: value
                    .player_status
                    .as_deref()
                    .and_then(LifecycleStatus::from_wire),
                last_payment_date: value.last_payment_date.map(from_bson_datetime),
            },
        }
    }
}

pub fn to_bson_uuid(id: Uuid) -> bson::Uuid {
    bson::Uuid::from_bytes(id.into_bytes())
}

fn from_bson_uuid(id: bson::Uuid) -> Uuid {
    Uuid::from_bytes(id.bytes())
}

pub fn to_bson_datetime(value: OffsetDateTime) -> DateTime {
    DateTime::from_system_time(SystemTime::from(value))
}

fn from_bson_datetime(value: DateTime) -> OffsetDateTime {
    OffsetDateTime::from(value.to_system_time())
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": to_bson_uuid(id)}
}

/// Filter addressing the single record of a player and month.
pub fn record_key(player_id: Uuid, key: MonthKey) -> Document {
    doc! {
        "player_id": to_bson_uuid(player_id),
        "year": key.year(),
        "month": i32::from(key.month()),
    }
}
