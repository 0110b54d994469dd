//! The shared store capability contract.
//!
//! Everything the matching core needs from the external key-value store,
//! and nothing else. `RedisStore` is the production implementation,
//! pooled via `deadpool-redis`; `MemoryStore` is an in-process double with
//! identical ordering/atomicity semantics used by the test suite so the
//! whole pipeline can be exercised without a live Redis.

mod memory_store;
mod redis_store;

pub use memory_store::MemoryStore;
pub use redis_store::{RedisStore, RedisStoreConfig};

use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;

/// A single write submitted as part of a `txn` batch.
#[derive(Debug, Clone)]
pub enum Write {
    HashSet {
        key: String,
        fields: HashMap<String, String>,
    },
    ZsetAdd {
        key: String,
        score: f64,
        member: String,
    },
    ZsetRem {
        key: String,
        member: String,
    },
    ListPushLeft {
        key: String,
        value: String,
    },
    ListTrim {
        key: String,
        start: isize,
        stop: isize,
    },
    SetAdd {
        key: String,
        member: String,
    },
}

/// The capability surface the matching core, processor, and monitor are
/// allowed to use. Anything resembling a raw connection handle stays
/// inside the implementation.
#[async_trait]
pub trait Store: Send + Sync {
    /// Execute a batch of writes atomically, all-or-nothing.
    async fn txn(&self, writes: Vec<Write>) -> Result<(), StoreError>;

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;
    async fn hash_set(&self, key: &str, fields: HashMap<String, String>) -> Result<(), StoreError>;
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    async fn zset_add(&self, key: &str, score: f64, member: &str) -> Result<(), StoreError>;
    async fn zset_rem(&self, key: &str, member: &str) -> Result<(), StoreError>;
    /// Inclusive range by score, ascending.
    async fn zset_range_by_score(
        &self,
        key: &str,
        lo: f64,
        hi: f64,
    ) -> Result<Vec<String>, StoreError>;
    /// Range by rank, ascending (lowest score first).
    async fn zset_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError>;
    /// Range by rank, descending (highest score first).
    async fn zset_rev_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError>;
    async fn zset_card(&self, key: &str) -> Result<u64, StoreError>;

    async fn list_push_left(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn list_trim(&self, key: &str, start: isize, stop: isize) -> Result<(), StoreError>;
    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError>;
    async fn list_llen(&self, key: &str) -> Result<u64, StoreError>;
    /// Blocking right-pop with a timeout; `Ok(None)` on timeout.
    async fn list_bpop_right(
        &self,
        key: &str,
        timeout_secs: f64,
    ) -> Result<Option<String>, StoreError>;

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError>;
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Lightweight reachability probe for `GET /health`.
    async fn ping(&self) -> bool;
}
