//! Performance monitor.
//!
//! Records per-(symbol, operation) latency samples into the store
//! (`metrics:{symbol}:{op}`, a sorted set scored by duration in
//! milliseconds) and maintains a running count (`count:{symbol}:{op}`),
//! evicting anything older than an hour on each record. Also mirrors
//! every sample into the `metrics` crate's `histogram!`/`counter!` macros
//! so an external Prometheus scraper sees the same data.
//!
//! The store's sorted-set member is opaque text, not a value slot, so
//! each sample encodes `{duration_ms}:{timestamp}:{rand}` as its member.
//! The score (duration) still drives ordering for nearest-rank
//! percentiles, and the embedded timestamp drives the one-hour eviction
//! the capability contract has no dedicated primitive for.

use crate::error::EngineError;
use crate::store::Store;
use metrics::{counter, histogram};
use std::collections::HashMap;
use std::sync::Arc;

const EVICT_WINDOW_SECS: i64 = 3600;

fn metrics_key(symbol: &str, op: &str) -> String {
    format!("metrics:{symbol}:{op}")
}

fn count_key(symbol: &str, op: &str) -> String {
    format!("count:{symbol}:{op}")
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct OperationStats {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Composite snapshot for one symbol: latency stats broken out per
/// recorded operation, pending-queue depth, and resting order counts on
/// each side of the book.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SymbolMetrics {
    pub operations: HashMap<String, OperationStats>,
    pub queue_length: u64,
    pub resting_buy_count: u64,
    pub resting_sell_count: u64,
}

fn nearest_rank(sorted: &[f64], p: f64) -> f64 {
    let rank = (((p / 100.0) * sorted.len() as f64).ceil() as usize)
        .saturating_sub(1)
        .min(sorted.len() - 1);
    sorted[rank]
}

fn summarize(mut durations: Vec<f64>) -> Option<OperationStats> {
    if durations.is_empty() {
        return None;
    }
    durations.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let count = durations.len() as u64;
    let sum: f64 = durations.iter().sum();
    let avg = sum / count as f64;
    let min = durations[0];
    let max = durations[durations.len() - 1];
    let p95 = nearest_rank(&durations, 95.0);
    let p99 = nearest_rank(&durations, 99.0);
    Some(OperationStats { count, min, max, avg, p95, p99 })
}

pub struct Monitor {
    store: Option<Arc<dyn Store>>,
}

impl Monitor {
    /// A monitor with no store is usable for tests that exercise the
    /// processor loop's latency instrumentation without caring where the
    /// samples land.
    pub fn new() -> Self {
        Self { store: None }
    }

    pub fn with_store(store: Arc<dyn Store>) -> Self {
        Self { store: Some(store) }
    }

    pub async fn record(&self, symbol: &str, op: &str, duration_ms: f64) {
        histogram!(
            "order_match_duration_seconds",
            "symbol" => symbol.to_string(),
            "operation" => op.to_string()
        )
        .record(duration_ms / 1000.0);
        counter!(
            "orders_submitted_total",
            "symbol" => symbol.to_string(),
            "operation" => op.to_string()
        )
        .increment(1);

        let Some(store) = &self.store else { return };
        let key = metrics_key(symbol, op);
        let now = now_unix();
        let member = format!("{:.6}:{now}:{}", duration_ms, random_suffix());
        let _ = store.zset_add(&key, duration_ms, &member).await;

        if let Ok(all) = store.zset_range(&key, 0, -1).await {
            for m in all {
                if let Some(ts) = parse_timestamp(&m) {
                    if now - ts > EVICT_WINDOW_SECS {
                        let _ = store.zset_rem(&key, &m).await;
                    }
                }
            }
        }

        self.increment_count(symbol, op).await;
    }

    async fn increment_count(&self, symbol: &str, op: &str) {
        let Some(store) = &self.store else { return };
        let key = count_key(symbol, op);
        let current = store
            .hash_get(&key, "value")
            .await
            .ok()
            .flatten()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let mut fields = HashMap::new();
        fields.insert("value".to_string(), (current + 1).to_string());
        let _ = store.hash_set(&key, fields).await;
    }

    /// Nearest-rank percentile (p50/p95/p99) over the last hour's samples
    /// of a single operation.
    pub async fn percentile(&self, symbol: &str, op: &str, p: f64) -> Result<Option<f64>, EngineError> {
        let mut durations = self.durations(symbol, op).await?;
        if durations.is_empty() {
            return Ok(None);
        }
        durations.sort_by(|a, b| a.partial_cmp(b).unwrap());
        Ok(Some(nearest_rank(&durations, p)))
    }

    pub async fn stats(&self, symbol: &str, op: &str) -> Result<Option<OperationStats>, EngineError> {
        let durations = self.durations(symbol, op).await?;
        Ok(summarize(durations))
    }

    async fn durations(&self, symbol: &str, op: &str) -> Result<Vec<f64>, EngineError> {
        let Some(store) = &self.store else { return Ok(Vec::new()) };
        let members = store.zset_range(&metrics_key(symbol, op), 0, -1).await?;
        Ok(members.iter().filter_map(|m| parse_duration(m)).collect())
    }

    pub async fn queue_length(&self, store: &Arc<dyn Store>, symbol: &str) -> Result<u64, EngineError> {
        Ok(store.list_llen(&format!("pending:{symbol}")).await?)
    }

    /// Composite metrics for a symbol: `{count,min,max,avg,p95,p99}` for
    /// every operation recorded so far, plus pending-queue depth and
    /// resting order counts on each side, read fresh from the store.
    pub async fn metrics(&self, symbol: &str) -> Result<SymbolMetrics, EngineError> {
        let Some(store) = &self.store else {
            return Ok(SymbolMetrics {
                operations: HashMap::new(),
                queue_length: 0,
                resting_buy_count: 0,
                resting_sell_count: 0,
            });
        };

        let prefix = format!("metrics:{symbol}:");
        let keys = store.keys(&format!("{prefix}*")).await?;
        let mut operations = HashMap::new();
        for key in keys {
            let op = key.trim_start_matches(&prefix).to_string();
            let members = store.zset_range(&key, 0, -1).await?;
            let durations: Vec<f64> = members.iter().filter_map(|m| parse_duration(m)).collect();
            if let Some(stats) = summarize(durations) {
                operations.insert(op, stats);
            }
        }

        let queue_length = store.list_llen(&format!("pending:{symbol}")).await?;
        let resting_buy_count = store.zset_card(&crate::orderbook::buy_key(symbol)).await?;
        let resting_sell_count = store.zset_card(&crate::orderbook::sell_key(symbol)).await?;

        Ok(SymbolMetrics {
            operations,
            queue_length,
            resting_buy_count,
            resting_sell_count,
        })
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_duration(member: &str) -> Option<f64> {
    member.split(':').next()?.parse().ok()
}

fn parse_timestamp(member: &str) -> Option<i64> {
    member.split(':').nth(1)?.parse().ok()
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn random_suffix() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..8).map(|_| format!("{:x}", rng.gen_range(0..16))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn records_increment_count_and_compute_stats() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let monitor = Monitor::with_store(store.clone());
        monitor.record("BTCUSDT", "process_order", 1.0).await;
        monitor.record("BTCUSDT", "process_order", 2.0).await;
        monitor.record("BTCUSDT", "process_order", 3.0).await;

        let stats = monitor.stats("BTCUSDT", "process_order").await.unwrap().unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 3.0);
        assert!((stats.avg - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn percentile_nearest_rank() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let monitor = Monitor::with_store(store.clone());
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            monitor.record("BTCUSDT", "op", v).await;
        }
        let p50 = monitor.percentile("BTCUSDT", "op", 50.0).await.unwrap().unwrap();
        assert_eq!(p50, 3.0);
    }

    #[tokio::test]
    async fn no_store_monitor_is_inert() {
        let monitor = Monitor::new();
        monitor.record("BTCUSDT", "op", 1.0).await;
        assert!(monitor.stats("BTCUSDT", "op").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn metrics_breaks_out_every_operation_and_reads_book_state() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let monitor = Monitor::with_store(store.clone());
        monitor.record("BTCUSDT", "process_order", 1.0).await;
        monitor.record("BTCUSDT", "process_order", 2.0).await;
        monitor.record("BTCUSDT", "cancel_order", 3.0).await;
        store.list_push_left("pending:BTCUSDT", "payload").await.unwrap();
        store.zset_add("BTCUSDT:buy_orders", 1.0, "order:1").await.unwrap();
        store.zset_add("BTCUSDT:sell_orders", 1.0, "order:2").await.unwrap();
        store.zset_add("BTCUSDT:sell_orders", 2.0, "order:3").await.unwrap();

        let metrics = monitor.metrics("BTCUSDT").await.unwrap();
        assert_eq!(metrics.operations.len(), 2);
        let process = &metrics.operations["process_order"];
        assert_eq!(process.count, 2);
        assert_eq!(process.min, 1.0);
        assert_eq!(process.max, 2.0);
        let cancel = &metrics.operations["cancel_order"];
        assert_eq!(cancel.count, 1);
        assert_eq!(cancel.min, 3.0);
        assert_eq!(metrics.queue_length, 1);
        assert_eq!(metrics.resting_buy_count, 1);
        assert_eq!(metrics.resting_sell_count, 2);
    }
}
