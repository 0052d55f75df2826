use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use std::time::Duration;
use tracing::info;

use super::store::{StoreError, SuppressionStore};

pub const DEFAULT_PREFIX: &str = "relay:block:";

// Whole seconds for `SET .. EX`, rounded up plus one so the server never
// drops a key before the guard would.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs()
        .saturating_add(u64::from(ttl.subsec_nanos() > 0))
        .saturating_add(1)
}

/// Shared block table for multi-instance deployments. Keys expire on the
/// server via `SET .. EX`, so no sweeper is needed.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisStore {
    pub async fn connect(redis_url: &str, prefix: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url).map_err(|e| StoreError(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError(e.to_string()))?;

        info!(prefix, "Connected block table to redis");

        Ok(Self {
            conn,
            prefix: prefix.to_string(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl SuppressionStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<i64>>(self.key(key))
            .await
            .map_err(|e| StoreError(e.to_string()))
    }

    async fn set(&self, key: &str, recorded_at_ms: i64, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(self.key(key), recorded_at_ms, ttl_secs(ttl))
            .await
            .map_err(|e| StoreError(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.key(key))
            .await
            .map_err(|e| StoreError(e.to_string()))
    }
}
