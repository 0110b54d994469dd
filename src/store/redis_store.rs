//! Pooled Redis implementation of the `Store` trait.
//!
//! Typed per-command methods, a connection acquired per call from a
//! `deadpool-redis` pool, exposing only the capability surface the
//! matching core is allowed to use.

use super::{Store, Write};
use crate::error::StoreError;
use async_trait::async_trait;
use deadpool_redis::{redis::AsyncCommands, Config, Pool, Runtime};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    pub url: String,
    pub pool_size: usize,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            pool_size: 16,
        }
    }
}

pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    pub fn new(config: RedisStoreConfig) -> Result<Self, StoreError> {
        let cfg = Config::from_url(config.url);
        let pool = cfg
            .builder()
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .max_size(config.pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool.get().await.map_err(StoreError::from)
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn txn(&self, writes: Vec<Write>) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for write in writes {
            match write {
                Write::HashSet { key, fields } => {
                    let pairs: Vec<(String, String)> = fields.into_iter().collect();
                    pipe.hset_multiple(key, &pairs).ignore();
                }
                Write::ZsetAdd { key, score, member } => {
                    pipe.zadd(key, member, score).ignore();
                }
                Write::ZsetRem { key, member } => {
                    pipe.zrem(key, member).ignore();
                }
                Write::ListPushLeft { key, value } => {
                    pipe.lpush(key, value).ignore();
                }
                Write::ListTrim { key, start, stop } => {
                    pipe.ltrim(key, start, stop).ignore();
                }
                Write::SetAdd { key, member } => {
                    pipe.sadd(key, member).ignore();
                }
            }
        }
        pipe.query_async(&mut conn).await.map_err(StoreError::from)
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.hget(key, field).await.map_err(StoreError::from)
    }

    async fn hash_set(&self, key: &str, fields: HashMap<String, String>) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let pairs: Vec<(String, String)> = fields.into_iter().collect();
        conn.hset_multiple(key, &pairs).await.map_err(StoreError::from)
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.hgetall(key).await.map_err(StoreError::from)
    }

    async fn zset_add(&self, key: &str, score: f64, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.zadd(key, member, score).await.map_err(StoreError::from)
    }

    async fn zset_rem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.zrem(key, member).await.map_err(StoreError::from)
    }

    async fn zset_range_by_score(&self, key: &str, lo: f64, hi: f64) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.zrangebyscore(key, lo, hi).await.map_err(StoreError::from)
    }

    async fn zset_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.zrange(key, start, stop).await.map_err(StoreError::from)
    }

    async fn zset_rev_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.zrevrange(key, start, stop).await.map_err(StoreError::from)
    }

    async fn zset_card(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn().await?;
        conn.zcard(key).await.map_err(StoreError::from)
    }

    async fn list_push_left(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.lpush(key, value).await.map_err(StoreError::from)
    }

    async fn list_trim(&self, key: &str, start: isize, stop: isize) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.ltrim(key, start, stop).await.map_err(StoreError::from)
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.lrange(key, start, stop).await.map_err(StoreError::from)
    }

    async fn list_llen(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn().await?;
        conn.llen(key).await.map_err(StoreError::from)
    }

    async fn list_bpop_right(&self, key: &str, timeout_secs: f64) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        let result: Option<(String, String)> = conn
            .brpop(key, timeout_secs)
            .await
            .map_err(StoreError::from)?;
        Ok(result.map(|(_key, value)| value))
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.sadd(key, member).await.map_err(StoreError::from)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.smembers(key).await.map_err(StoreError::from)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.keys(pattern).await.map_err(StoreError::from)
    }

    async fn ping(&self) -> bool {
        let Ok(mut conn) = self.conn().await else {
            return false;
        };
        let result: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
        matches!(result, Ok(ref s) if s == "PONG")
    }
}
