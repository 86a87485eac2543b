//! Team roll-up of monthly payment records.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::PaymentRecordEntity,
    error::ServiceError,
    state::{
        SharedState,
        status::{MonthKey, StorageStatus},
    },
};

/// Whether every player of the team paid for a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MonthlyClassification {
    /// Every rostered player has a paid record.
    AllPaid,
    /// At least one player has not paid.
    NotAllPaid,
}

/// Counts and classification for one month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct MonthlyTeamStatus {
    /// Players with a paid record for the month.
    pub paid_count: u32,
    /// Players considered.
    pub total_count: u32,
    /// Derived classification.
    pub classification: MonthlyClassification,
}

/// Roll `records` up into one entry per month of `year`, keyed `"{year}-{month}"`.
///
/// A player counts at most once per month, and records of players outside
/// `player_ids` or of another year are ignored. An empty roster yields no entries.
pub fn aggregate(
    player_ids: &[Uuid],
    year: i32,
    records: &[PaymentRecordEntity],
) -> IndexMap<String, MonthlyTeamStatus> {
    let roster: HashSet<Uuid> = player_ids.iter().copied().collect();
    let total = roster.len() as u32;
    if total == 0 {
        return IndexMap::new();
    }

    let paid: HashSet<(Uuid, u8)> = records
        .iter()
        .filter(|record| {
            record.status == StorageStatus::Paid
                && record.key.year() == year
                && roster.contains(&record.player_id)
        })
        .map(|record| (record.player_id, record.key.month()))
        .collect();

    (1..=12u8)
        .filter_map(|month| MonthKey::new(year, month))
        .map(|key| {
            let paid_count = paid.iter().filter(|(_, m)| *m == key.month()).count() as u32;
            let classification = if paid_count == total {
                MonthlyClassification::AllPaid
            } else {
                MonthlyClassification::NotAllPaid
            };
            (
                key.label(),
                MonthlyTeamStatus {
                    paid_count,
                    total_count: total,
                    classification,
                },
            )
        })
        .collect()
}

/// Load the roster and records of `team_id` and roll them up for `year`.
pub async fn team_monthly_status(
    state: &SharedState,
    team_id: Uuid,
    year: i32,
) -> Result<IndexMap<String, MonthlyTeamStatus>, ServiceError> {
    let store = state.require_store().await?;
    let player_ids: Vec<Uuid> = store
        .list_team_players(team_id)
        .await?
        .into_iter()
        .map(|player| player.id)
        .collect();
    if player_ids.is_empty() {
        return Ok(IndexMap::new());
    }

    let records = store.list_payment_records(player_ids.clone(), year).await?;
    Ok(aggregate(&player_ids, year, &records))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use time::OffsetDateTime;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::{PlayerAggregate, PlayerEntity},
            payment_store::testing::{FlakyStore, Op},
        },
        state::AppState,
    };

    fn paid(player_id: Uuid, year: i32, month: u8) -> PaymentRecordEntity {
        PaymentRecordEntity {
            player_id,
            key: MonthKey::new(year, month).unwrap(),
            status: StorageStatus::Paid,
            updated_at: OffsetDateTime::UNIX_EPOCH,
            updated_by: Uuid::nil(),
        }
    }

    #[test]
    fn one_missing_payment_marks_the_month_not_all_paid() {
        let players = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let records = [paid(players[0], 2025, 5), paid(players[1], 2025, 5)];

        let months = aggregate(&players, 2025, &records);

        assert_eq!(months.len(), 12);
        assert_eq!(
            months["2025-5"],
            MonthlyTeamStatus {
                paid_count: 2,
                total_count: 3,
                classification: MonthlyClassification::NotAllPaid,
            }
        );
        assert_eq!(months["2025-1"].paid_count, 0);
    }

    #[test]
    fn every_player_paid_is_all_paid() {
        let players = [Uuid::new_v4(), Uuid::new_v4()];
        let records = [paid(players[0], 2025, 9), paid(players[1], 2025, 9)];

        let months = aggregate(&players, 2025, &records);
        assert_eq!(months["2025-9"].classification, MonthlyClassification::AllPaid);
        assert_eq!(months["2025-10"].classification, MonthlyClassification::NotAllPaid);
    }

    #[test]
    fn foreign_and_unpaid_records_are_ignored() {
        let player = Uuid::new_v4();
        let mut not_paid = paid(player, 2025, 3);
        not_paid.status = StorageStatus::NotPaid;
        let records = [
            not_paid,
            paid(player, 2024, 3),
            paid(Uuid::new_v4(), 2025, 3),
            paid(player, 2025, 4),
            paid(player, 2025, 4),
        ];

        let months = aggregate(&[player], 2025, &records);
        assert_eq!(months["2025-3"].paid_count, 0);
        assert_eq!(months["2025-4"].paid_count, 1);
        assert_eq!(months["2025-4"].classification, MonthlyClassification::AllPaid);
    }

    #[test]
    fn empty_roster_has_no_classification() {
        assert!(aggregate(&[], 2025, &[paid(Uuid::new_v4(), 2025, 1)]).is_empty());
    }

    #[test]
    fn labels_are_ordered_and_unpadded() {
        let months = aggregate(&[Uuid::new_v4()], 2026, &[]);
        let keys: Vec<&str> = months.keys().map(String::as_str).collect();
        assert_eq!(keys.first(), Some(&"2026-1"));
        assert_eq!(keys.last(), Some(&"2026-12"));
    }

    #[tokio::test]
    async fn listing_failures_propagate() {
        let store = FlakyStore::default();
        let team_id = Uuid::new_v4();
        store.inner.insert_player(PlayerEntity {
            id: Uuid::new_v4(),
            team_id: Some(team_id),
            name: "Ana".into(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            aggregate: PlayerAggregate::default(),
        });
        store.fail(Op::ListRecords);
        let state = AppState::new(AppConfig::default());
        state.install_store(Arc::new(store)).await;

        let err = team_monthly_status(&state, team_id, 2025).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
    }
}
