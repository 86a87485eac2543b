use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    dao::models::PaymentRecordEntity,
    dto::format_timestamp,
    services::player_service::LifecycleView,
    state::status::{LifecycleStatus, ResolvedStatus, StorageStatus, UiStatus},
};

#[derive(Debug, Serialize, ToSchema)]
/// Best-known payment status of a player.
pub struct PaymentStatusResponse {
    pub player_id: Uuid,
    /// `null` when nothing is known about the player.
    pub status: Option<UiStatus>,
    /// RFC 3339 timestamp of when the status was established.
    pub status_since: Option<String>,
}

impl PaymentStatusResponse {
    pub fn new(player_id: Uuid, resolved: Option<ResolvedStatus>) -> Self {
        Self {
            player_id,
            status: resolved.map(|r| r.status),
            status_since: resolved.map(|r| format_timestamp(r.status_since)),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
#[validate(schema(function = "validate_month_pair"))]
/// Payload used to set the binary payment status of a player.
pub struct SetPaymentStatusRequest {
    pub status: UiStatus,
    /// Administrator or coach performing the change.
    pub actor_id: Uuid,
    /// Year of the month to write; requires `month`.
    #[validate(range(min = 1970, max = 9999))]
    pub year: Option<i32>,
    /// Month (1-12) to write; requires `year`.
    #[validate(range(min = 1, max = 12))]
    pub month: Option<u8>,
}

fn validate_month_pair(request: &SetPaymentStatusRequest) -> Result<(), ValidationError> {
    match (request.year, request.month) {
        (Some(_), Some(_)) | (None, None) => Ok(()),
        _ => Err(ValidationError::new("year_and_month_together")
            .with_message("year and month must be provided together".into())),
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Payment record as stored after a write.
pub struct PaymentRecordResponse {
    pub player_id: Uuid,
    pub year: i32,
    pub month: u8,
    pub status: StorageStatus,
    pub updated_at: String,
    pub updated_by: Uuid,
}

impl From<PaymentRecordEntity> for PaymentRecordResponse {
    fn from(record: PaymentRecordEntity) -> Self {
        Self {
            player_id: record.player_id,
            year: record.key.year(),
            month: record.key.month(),
            status: record.status,
            updated_at: format_timestamp(record.updated_at),
            updated_by: record.updated_by,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
/// Payload used to set the admin lifecycle status of a player.
pub struct SetLifecycleStatusRequest {
    pub status: LifecycleStatus,
    pub actor_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
/// Effective lifecycle status of a player.
pub struct LifecycleStatusResponse {
    pub player_id: Uuid,
    pub status: LifecycleStatus,
    /// Binary status the lifecycle collapses to. Only `paid` reads as paid.
    pub payment_status: UiStatus,
    pub last_payment_date: Option<String>,
}

impl From<LifecycleView> for LifecycleStatusResponse {
    fn from(view: LifecycleView) -> Self {
        Self {
            player_id: view.player_id,
            status: view.status,
            payment_status: view.payment_status,
            last_payment_date: view.last_payment_date.map(format_timestamp),
        }
    }
}
