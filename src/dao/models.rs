use time::OffsetDateTime;
use uuid::Uuid;

use crate::state::status::{LifecycleStatus, MonthKey, StorageStatus, UiStatus};

/// Authoritative payment fact for one player and one calendar month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecordEntity {
    /// Player the record belongs to.
    pub player_id: Uuid,
    /// Calendar month covered by the record.
    pub key: MonthKey,
    /// Stored status.
    pub status: StorageStatus,
    /// Time of the last write.
    pub updated_at: OffsetDateTime,
    /// Actor responsible for the last write.
    pub updated_by: Uuid,
}

/// Denormalized payment fields living on the player entity. Read by legacy
/// surfaces; never authoritative.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerAggregate {
    /// Legacy binary payment status.
    pub payment_status: Option<StorageStatus>,
    /// Admin lifecycle status.
    pub player_status: Option<LifecycleStatus>,
    /// Last time a payment was recorded.
    pub last_payment_date: Option<OffsetDateTime>,
}

impl PlayerAggregate {
    /// Binary status implied by the legacy fields: paid if either field says so.
    pub fn derived_status(&self) -> UiStatus {
        let paid = self.payment_status == Some(StorageStatus::Paid)
            || self.player_status == Some(LifecycleStatus::Paid);
        if paid { UiStatus::Paid } else { UiStatus::Unpaid }
    }

    /// Apply a binary payment update.
    pub fn apply_payment(&mut self, update: &PlayerPaymentUpdate) {
        self.payment_status = Some(update.payment_status);
        if let Some(date) = update.last_payment_date {
            self.last_payment_date = Some(date);
        }
    }

    /// Apply an admin lifecycle update.
    pub fn apply_lifecycle(&mut self, update: &PlayerLifecycleUpdate) {
        self.player_status = Some(update.player_status);
        self.payment_status = Some(update.payment_status);
        if let Some(date) = update.last_payment_date {
            self.last_payment_date = Some(date);
        }
    }
}

/// Player as seen by the payment services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Stable identifier.
    pub id: Uuid,
    /// Team the player is rostered on.
    pub team_id: Option<Uuid>,
    /// Display name.
    pub name: String,
    /// Account creation time, drives trial expiry.
    pub created_at: OffsetDateTime,
    /// Denormalized payment fields.
    pub aggregate: PlayerAggregate,
}

/// Best-effort update of the legacy aggregate after a binary status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerPaymentUpdate {
    /// New legacy status.
    pub payment_status: StorageStatus,
    /// New payment date; `None` leaves the stored date untouched.
    pub last_payment_date: Option<OffsetDateTime>,
}

/// Direct write of the admin lifecycle fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerLifecycleUpdate {
    /// New lifecycle status.
    pub player_status: LifecycleStatus,
    /// Binary status kept in step with the lifecycle.
    pub payment_status: StorageStatus,
    /// New payment date; `None` leaves the stored date untouched.
    pub last_payment_date: Option<OffsetDateTime>,
}
