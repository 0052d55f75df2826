use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::interval;
use tracing::{debug, info};

use super::clock::Clock;
use super::window_ms;
use crate::metrics::BLOCK_TABLE_SIZE;

#[derive(Debug, Error)]
#[error("suppression store unavailable: {0}")]
pub struct StoreError(pub String);

/// Backing table for the guard: identity key -> last accepted order time
/// (epoch ms). Implementations must be safe to share between requests.
#[async_trait]
pub trait SuppressionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError>;

    // `ttl` lets stores with native expiry drop the key on their own
    async fn set(&self, key: &str, recorded_at_ms: i64, ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

// In-process table. Only correct for a single long-lived instance.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, i64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry recorded before `cutoff_ms`. Returns how many went.
    pub fn compact(&self, cutoff_ms: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, recorded_at| *recorded_at >= cutoff_ms);
        let removed = before.saturating_sub(self.entries.len());
        BLOCK_TABLE_SIZE.set(self.entries.len() as f64);
        removed
    }
}

#[async_trait]
impl SuppressionStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.entries.get(key).map(|entry| *entry))
    }

    async fn set(&self, key: &str, recorded_at_ms: i64, _ttl: Duration) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), recorded_at_ms);
        BLOCK_TABLE_SIZE.set(self.entries.len() as f64);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        BLOCK_TABLE_SIZE.set(self.entries.len() as f64);
        Ok(())
    }
}

// Periodic compaction of the in-memory table. Lazy expiry on read only
// removes keys that are looked up again.
pub async fn sweeper(
    store: Arc<MemoryStore>,
    clock: Arc<dyn Clock>,
    window: Duration,
    sweep_interval: Duration,
) {
    let mut interval = interval(sweep_interval);
    let window_ms = window_ms(window);

    info!(interval = ?sweep_interval, "Block table sweeper started");

    loop {
        interval.tick().await;

        // entries at exactly `window` old are still live
        let cutoff = clock.now_ms().saturating_sub(window_ms);
        let removed = store.compact(cutoff);
        if removed > 0 {
            debug!(removed, remaining = store.len(), "Swept expired block entries");
        }
    }
}
