//! Redis cache backend
//!
//! Snapshots are stored as JSON strings with a millisecond expiry. Memory cap
//! and eviction are Redis' own `maxmemory` settings, applied once on connect.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::cache::{decode, encode, OrderCache};
use crate::error::CacheError;
use crate::models::Order;

/// Eviction policy requested from Redis.
const EVICTION_POLICY: &str = "allkeys-lru";

/// [`OrderCache`] backed by a Redis server.
#[derive(Clone)]
pub struct RedisOrderCache {
    conn: ConnectionManager,
}

impl RedisOrderCache {
    /// Connects to `url` and applies the operator memory cap.
    ///
    /// Failing to set the memory policy is logged, not fatal: managed Redis
    /// offerings commonly forbid `CONFIG SET`.
    pub async fn connect(url: &str, max_memory_mb: u64) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        let cache = Self { conn };
        cache.apply_memory_policy(max_memory_mb).await;
        Ok(cache)
    }

    async fn apply_memory_policy(&self, max_memory_mb: u64) {
        let mut conn = self.conn.clone();
        let settings = [
            ("maxmemory", format!("{}mb", max_memory_mb)),
            ("maxmemory-policy", EVICTION_POLICY.to_string()),
        ];

        for (name, value) in settings {
            let result: redis::RedisResult<()> = redis::cmd("CONFIG")
                .arg("SET")
                .arg(name)
                .arg(&value)
                .query_async(&mut conn)
                .await;
            match result {
                Ok(()) => info!("Redis {} set to {}", name, value),
                Err(err) => warn!("Could not set Redis {}: {}", name, err),
            }
        }
    }
}

#[async_trait]
impl OrderCache for RedisOrderCache {
    async fn get(&self, key: &str) -> Result<Option<Order>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<Vec<u8>> = conn.get(key).await?;
        match raw {
            Some(raw) => {
                debug!("got order_uid={} from cache", key);
                decode(key, &raw).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, order: &Order, ttl: Duration) -> Result<(), CacheError> {
        let raw = encode(key, order)?;
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(raw)
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;

        debug!("set order_uid={} in cache", key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(CacheError::Backend(format!("unexpected PING reply {:?}", reply)))
        }
    }
}
