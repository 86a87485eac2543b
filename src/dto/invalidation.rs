use indexmap::IndexMap;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
/// Current version of every tracked category.
pub struct InvalidationSnapshotResponse {
    /// `players`, `payments` and `teams` are always present.
    #[schema(value_type = std::collections::HashMap<String, u64>)]
    pub versions: IndexMap<String, u64>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Version of a category right after it was bumped.
pub struct InvalidationBumpResponse {
    pub category: String,
    pub version: u64,
}
