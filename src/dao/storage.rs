use std::error::Error;
use thiserror::Error;

/// Result alias for payment store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by payment store backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or failed while serving the request.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Human readable context.
        message: String,
        /// Backend-specific failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A concurrent writer replaced the document between our read and write.
    #[error("write conflict on `{key}`")]
    Conflict {
        /// Storage key of the contended document.
        key: String,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(
        message: impl Into<String>,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        StorageError::Unavailable {
            message: message.into(),
            source: Box::new(source),
        }
    }
}
