// Storage abstraction over durable key/document state.
// Values are JSON documents; callers own the (de)serialization so the trait
// stays object-safe behind Arc<dyn StorageBackend>.

use crate::error::CoreError;
use async_trait::async_trait;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, CoreError>;

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Persist a JSON document under a key. Must be atomic with respect to
    /// concurrent or restarted readers: a reader sees the old document or
    /// the new one, never a torn write.
    async fn save(&self, key: &str, json: &str) -> StorageResult<()>;

    /// Load the document stored under a key.
    async fn load(&self, key: &str) -> StorageResult<Option<String>>;

    /// Remove the document stored under a key.
    async fn remove(&self, key: &str) -> StorageResult<()>;

    /// Check whether a key exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;
}

/// Standard storage keys used across the engine.
pub mod keys {
    pub const PROCESSED_SIGNATURES: &str = "processed_signatures";
    pub const BUYER_PROFILES: &str = "buyer_profiles";
    pub const PENDING_TRANSFERS: &str = "pending_transfers";
    pub const STATS: &str = "stats";
}
