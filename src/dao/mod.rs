/// Persisted entity definitions.
pub mod models;
/// Payment store abstraction and its backends.
pub mod payment_store;
/// Storage error types shared by every backend.
pub mod storage;
