//! Failed-order journal helpers.
//!
//! The trade journal itself lives next to the matching logic in
//! `orderbook.rs` (every trade is appended in the same transaction as the
//! fill that produced it). This module covers the `failed_orders:{symbol}`
//! list, which is written by the processor on any validation/store/misroute
//! failure and read back by the `GET /api/v1/failed_orders` handler,
//! merged across every registered symbol, reading a bounded, newest-first
//! window out of a list-backed key.

use crate::error::EngineError;
use crate::model::FailedOrderRecord;
use crate::store::Store;
use std::sync::Arc;

fn failed_key(symbol: &str) -> String {
    format!("failed_orders:{symbol}")
}

pub async fn record_failure(
    store: &Arc<dyn Store>,
    symbol: &str,
    order: serde_json::Value,
    error: &EngineError,
) -> Result<(), EngineError> {
    let record = FailedOrderRecord {
        order,
        error: error.to_string(),
        error_kind: error.kind().to_string(),
        timestamp: now_unix(),
    };
    let payload = serde_json::to_string(&record)
        .map_err(|e| EngineError::Internal(format!("failed-order serialization: {e}")))?;
    store.list_push_left(&failed_key(symbol), &payload).await?;
    Ok(())
}

/// Newest-first, merged across all given symbols, capped at `limit`.
pub async fn recent_failures(
    store: &Arc<dyn Store>,
    symbols: &[String],
    limit: usize,
) -> Result<Vec<FailedOrderRecord>, EngineError> {
    let mut all = Vec::new();
    for symbol in symbols {
        let raw = store.list_range(&failed_key(symbol), 0, limit as isize - 1).await?;
        for entry in raw {
            if let Ok(record) = serde_json::from_str::<FailedOrderRecord>(&entry) {
                all.push(record);
            }
        }
    }
    all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    all.truncate(limit);
    Ok(all)
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
