use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::services::monthly_status::MonthlyTeamStatus;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
/// Query string of the monthly roll-up endpoints.
pub struct MonthlyStatusQuery {
    /// Year to roll up; the current year when omitted.
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Per-month paid ratio of a team.
pub struct TeamMonthlyStatusResponse {
    pub team_id: Uuid,
    pub year: i32,
    /// Keyed `"{year}-{month}"`, January first. Empty for an empty roster.
    #[schema(value_type = std::collections::HashMap<String, MonthlyTeamStatus>)]
    pub months: IndexMap<String, MonthlyTeamStatus>,
}
