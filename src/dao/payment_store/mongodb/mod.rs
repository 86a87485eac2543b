mod config;
mod connection;
mod error;
mod models;
mod store;

pub use config::{ConnectRetry, DEFAULT_URI, MongoConfig};
pub use error::{MongoDaoError, MongoResult};
pub use store::MongoPaymentStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}
