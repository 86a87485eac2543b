use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

/// Result alias for MongoDB backend operations.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures raised by the MongoDB backend.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB database `{database}` did not answer after {attempts} ping(s)")]
    InitialPing {
        database: String,
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to load payment record of player `{player_id}`")]
    LoadRecord {
        player_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to save payment record of player `{player_id}`")]
    SaveRecord {
        player_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to list payment records for {year}")]
    ListRecords {
        year: i32,
        #[source]
        source: MongoError,
    },
    #[error("failed to load player `{id}`")]
    LoadPlayer {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to list players of team `{team_id}`")]
    ListPlayers {
        team_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to update player `{id}`")]
    UpdatePlayer {
        id: Uuid,
        #[source]
        source: MongoError,
    },
}
