//! Key-value store and the records kept in it
//!
//! - [`MemoryStore`]: process-local map with lazy expiry and a sweep task
//! - [`SqliteStore`]: durable store on an r2d2 SQLite pool
//! - [`FallbackStore`]: durable first, memory when the durable side errors
//! - [`RegistrationLedger`]: typed records (registrations, feedback auths)

mod fallback;
mod memory;
mod registrations;
mod sqlite;

pub use fallback::FallbackStore;
pub use memory::MemoryStore;
pub use registrations::RegistrationLedger;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use std::time::Duration;

/// Async string key-value store with optional per-entry TTL.
///
/// Expired entries read as absent.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, String>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), String>;

    async fn has(&self, key: &str) -> Result<bool, String> {
        Ok(self.get(key).await?.is_some())
    }

    async fn delete(&self, key: &str) -> Result<(), String>;

    /// Name for logging
    fn backend_name(&self) -> &'static str;
}
