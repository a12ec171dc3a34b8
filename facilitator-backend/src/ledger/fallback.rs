//! Durable store with in-memory fallback
//!
//! Every operation tries the durable backend first. When it errors, the
//! error is logged and the memory store serves the request instead, so
//! callers never see a storage failure.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{KvStore, MemoryStore};

pub struct FallbackStore {
    durable: Option<Arc<dyn KvStore>>,
    memory: Arc<MemoryStore>,
}

impl FallbackStore {
    pub fn new(durable: Option<Arc<dyn KvStore>>, memory: Arc<MemoryStore>) -> Self {
        if durable.is_none() {
            log::warn!("[Ledger] No durable store, records will not survive restarts");
        }
        Self { durable, memory }
    }

    #[cfg(test)]
    pub fn memory_only() -> Self {
        Self::new(None, Arc::new(MemoryStore::new()))
    }
}

#[async_trait]
impl KvStore for FallbackStore {
    async fn get(&self, key: &str) -> Result<Option<String>, String> {
        if let Some(durable) = &self.durable {
            match durable.get(key).await {
                Ok(Some(value)) => return Ok(Some(value)),
                // May have been written to memory while the durable side was down
                Ok(None) => {}
                Err(e) => log::warn!(
                    "[Ledger] {} get '{}' failed, using memory: {}",
                    durable.backend_name(),
                    key,
                    e
                ),
            }
        }
        self.memory.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), String> {
        if let Some(durable) = &self.durable {
            match durable.set(key, value, ttl).await {
                Ok(()) => {
                    // Drop any stale copy written during an outage
                    self.memory.delete(key).await?;
                    return Ok(());
                }
                Err(e) => log::warn!(
                    "[Ledger] {} set '{}' failed, using memory: {}",
                    durable.backend_name(),
                    key,
                    e
                ),
            }
        }
        self.memory.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), String> {
        if let Some(durable) = &self.durable {
            if let Err(e) = durable.delete(key).await {
                log::warn!(
                    "[Ledger] {} delete '{}' failed: {}",
                    durable.backend_name(),
                    key,
                    e
                );
            }
        }
        self.memory.delete(key).await
    }

    fn backend_name(&self) -> &'static str {
        "fallback"
    }
}
