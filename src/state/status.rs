//! Payment status vocabulary shared by the storage, resolver and admin layers.
//!
//! Every comparison against a raw status string goes through the `from_wire`
//! parsers and the [`to_ui`] / [`to_storage`] conversions below.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::{Duration, Month, OffsetDateTime};
use utoipa::ToSchema;

/// Status as persisted on payment records and legacy player fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StorageStatus {
    /// The monthly fee was received.
    Paid,
    /// The monthly fee is outstanding.
    NotPaid,
}

impl StorageStatus {
    /// Wire value used by the storage layer.
    pub fn as_str(self) -> &'static str {
        match self {
            StorageStatus::Paid => "paid",
            StorageStatus::NotPaid => "not_paid",
        }
    }

    /// Parse a stored value, returning `None` for anything outside the vocabulary.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "paid" => Some(StorageStatus::Paid),
            "not_paid" => Some(StorageStatus::NotPaid),
            _ => None,
        }
    }
}

/// Binary status exposed to display surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UiStatus {
    /// Paid for the month.
    Paid,
    /// Not paid for the month.
    Unpaid,
}

impl UiStatus {
    /// Wire value used by the resolver and UI layer.
    pub fn as_str(self) -> &'static str {
        match self {
            UiStatus::Paid => "paid",
            UiStatus::Unpaid => "unpaid",
        }
    }

    /// Whether this status counts as paid.
    pub fn is_paid(self) -> bool {
        matches!(self, UiStatus::Paid)
    }
}

impl fmt::Display for UiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convert a stored status into its UI counterpart.
pub fn to_ui(status: StorageStatus) -> UiStatus {
    match status {
        StorageStatus::Paid => UiStatus::Paid,
        StorageStatus::NotPaid => UiStatus::Unpaid,
    }
}

/// Convert a UI status into the value persisted by the storage layer.
pub fn to_storage(status: UiStatus) -> StorageStatus {
    match status {
        UiStatus::Paid => StorageStatus::Paid,
        UiStatus::Unpaid => StorageStatus::NotPaid,
    }
}

/// Admin-facing lifecycle of a player's subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    /// Nothing was ever recorded for the player.
    NoData,
    /// Free trial still running.
    OnTrial,
    /// Fee paid.
    Paid,
    /// Fee outstanding.
    Unpaid,
    /// Trial period elapsed without a payment.
    TrialEnded,
}

impl LifecycleStatus {
    /// Wire value used by the admin layer.
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleStatus::NoData => "no_data",
            LifecycleStatus::OnTrial => "on_trial",
            LifecycleStatus::Paid => "paid",
            LifecycleStatus::Unpaid => "unpaid",
            LifecycleStatus::TrialEnded => "trial_ended",
        }
    }

    /// Parse a stored lifecycle value, returning `None` for unknown strings.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "no_data" => Some(LifecycleStatus::NoData),
            "on_trial" => Some(LifecycleStatus::OnTrial),
            "paid" => Some(LifecycleStatus::Paid),
            "unpaid" => Some(LifecycleStatus::Unpaid),
            "trial_ended" => Some(LifecycleStatus::TrialEnded),
            _ => None,
        }
    }

    /// Collapse onto the binary status. Only `paid` is paid-equivalent; a
    /// running trial gates exactly like an unpaid month.
    pub fn to_ui(self) -> UiStatus {
        match self {
            LifecycleStatus::Paid => UiStatus::Paid,
            LifecycleStatus::NoData
            | LifecycleStatus::OnTrial
            | LifecycleStatus::Unpaid
            | LifecycleStatus::TrialEnded => UiStatus::Unpaid,
        }
    }

    /// Apply the read-time trial expiry: `on_trial` becomes `trial_ended` once
    /// `trial_period` has elapsed since the player was created.
    pub fn effective(
        self,
        created_at: OffsetDateTime,
        now: OffsetDateTime,
        trial_period: Duration,
    ) -> Self {
        match self {
            LifecycleStatus::OnTrial if now - created_at >= trial_period => {
                LifecycleStatus::TrialEnded
            }
            other => other,
        }
    }
}

/// Calendar month key (UTC) used to address payment records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    year: i32,
    month: Month,
}

impl MonthKey {
    /// Build a key from a year and a 1-based month number.
    pub fn new(year: i32, month: u8) -> Option<Self> {
        Month::try_from(month).ok().map(|month| Self { year, month })
    }

    /// Month containing `instant`, evaluated in UTC.
    pub fn containing(instant: OffsetDateTime) -> Self {
        let utc = instant.to_offset(time::UtcOffset::UTC);
        Self {
            year: utc.year(),
            month: utc.month(),
        }
    }

    /// Calendar month immediately before this one.
    pub fn previous(self) -> Self {
        match self.month {
            Month::January => Self {
                year: self.year - 1,
                month: Month::December,
            },
            month => Self {
                year: self.year,
                month: month.previous(),
            },
        }
    }

    /// Year component.
    pub fn year(self) -> i32 {
        self.year
    }

    /// 1-based month number.
    pub fn month(self) -> u8 {
        self.month as u8
    }

    /// Label used by the monthly roll-up (`"2025-5"`, no zero padding).
    pub fn label(self) -> String {
        format!("{}-{}", self.year, self.month())
    }
}

/// Best-known status for a player as produced by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedStatus {
    /// Binary status.
    pub status: UiStatus,
    /// When the status was last established.
    pub status_since: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn storage_and_ui_conversions_are_inverse() {
        for status in [UiStatus::Paid, UiStatus::Unpaid] {
            assert_eq!(to_ui(to_storage(status)), status);
        }
        assert_eq!(to_storage(UiStatus::Unpaid), StorageStatus::NotPaid);
        assert_eq!(to_ui(StorageStatus::Paid), UiStatus::Paid);
    }

    #[test]
    fn wire_parsing_rejects_foreign_values() {
        assert_eq!(StorageStatus::from_wire("not_paid"), Some(StorageStatus::NotPaid));
        assert_eq!(StorageStatus::from_wire("unpaid"), None);
        assert_eq!(StorageStatus::from_wire("PAID"), None);
        assert_eq!(
            LifecycleStatus::from_wire("trial_ended"),
            Some(LifecycleStatus::TrialEnded)
        );
        assert_eq!(LifecycleStatus::from_wire("not_paid"), None);
    }

    #[test]
    fn only_paid_lifecycle_collapses_to_paid() {
        assert_eq!(LifecycleStatus::Paid.to_ui(), UiStatus::Paid);
        for status in [
            LifecycleStatus::NoData,
            LifecycleStatus::OnTrial,
            LifecycleStatus::Unpaid,
            LifecycleStatus::TrialEnded,
        ] {
            assert_eq!(status.to_ui(), UiStatus::Unpaid, "{status:?}");
        }
    }

    #[test]
    fn trial_expires_after_the_trial_period() {
        let created = datetime!(2025-03-01 10:00 UTC);
        let period = Duration::days(30);

        let before = datetime!(2025-03-31 09:59 UTC);
        assert_eq!(
            LifecycleStatus::OnTrial.effective(created, before, period),
            LifecycleStatus::OnTrial
        );

        let at = datetime!(2025-03-31 10:00 UTC);
        assert_eq!(
            LifecycleStatus::OnTrial.effective(created, at, period),
            LifecycleStatus::TrialEnded
        );

        assert_eq!(
            LifecycleStatus::Paid.effective(created, at, period),
            LifecycleStatus::Paid
        );
    }

    #[test]
    fn month_key_walks_back_across_years() {
        let january = MonthKey::new(2025, 1).unwrap();
        assert_eq!(january.previous(), MonthKey::new(2024, 12).unwrap());

        let april = MonthKey::containing(datetime!(2025-04-15 12:00 UTC));
        assert_eq!(april.previous(), MonthKey::new(2025, 3).unwrap());
        assert_eq!(april.label(), "2025-4");
    }

    #[test]
    fn month_key_uses_utc_boundaries() {
        let late_local = datetime!(2025-05-01 01:00 +03:00);
        assert_eq!(MonthKey::containing(late_local), MonthKey::new(2025, 4).unwrap());
    }

    #[test]
    fn month_key_rejects_out_of_range_months() {
        assert!(MonthKey::new(2025, 0).is_none());
        assert!(MonthKey::new(2025, 13).is_none());
    }
}
