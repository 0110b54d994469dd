//! Per-symbol order processor.
//!
//! A single-consumer loop bound to one symbol: pop from `pending:{symbol}`,
//! validate, dispatch to the book, repair misroutes, and push anything
//! that goes wrong onto the failed-order journal instead of propagating.
//! Spawn a task, drain a queue, never let a single bad item kill the
//! loop, consuming the shared store's pending list instead of an
//! in-process channel.

use crate::error::EngineError;
use crate::journal;
use crate::model::{Order, OrderStatus, OrderType, Side};
use crate::monitor::Monitor;
use crate::orderbook::OrderBook;
use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const POP_TIMEOUT_SECS: f64 = 1.0;
const IDLE_SPIN_GUARD: Duration = Duration::from_millis(1);

fn pending_key(symbol: &str) -> String {
    format!("pending:{symbol}")
}

pub struct Processor {
    symbol: String,
    store: Arc<dyn Store>,
    book: OrderBook,
    monitor: Arc<Monitor>,
}

impl Processor {
    pub fn new(symbol: String, store: Arc<dyn Store>, monitor: Arc<Monitor>) -> Self {
        let book = OrderBook::new(symbol.clone(), store.clone());
        Self {
            symbol,
            store,
            book,
            monitor,
        }
    }

    /// Runs until `token` is cancelled. Never returns an `Err`; a panic
    /// inside a single iteration is the only thing that stops it early,
    /// and that is intentional (no auto-restart).
    pub async fn run(&self, token: CancellationToken) {
        loop {
            if token.is_cancelled() {
                tracing::info!(symbol = %self.symbol, "processor stopping");
                return;
            }

            let popped = tokio::select! {
                result = self.store.list_bpop_right(&pending_key(&self.symbol), POP_TIMEOUT_SECS) => result,
                _ = token.cancelled() => {
                    tracing::info!(symbol = %self.symbol, "processor stopping");
                    return;
                }
            };

            match popped {
                Ok(Some(payload)) => {
                    let timer = std::time::Instant::now();
                    self.handle_payload(&payload).await;
                    self.monitor
                        .record(&self.symbol, "process_order", timer.elapsed().as_secs_f64() * 1000.0)
                        .await;
                }
                Ok(None) => {
                    // Timed out; loop around. Guard against a tight spin
                    // if the store returns instantly on some backends.
                    tokio::time::sleep(IDLE_SPIN_GUARD).await;
                }
                Err(e) => {
                    tracing::warn!(symbol = %self.symbol, error = %e, "pending pop failed");
                    tokio::time::sleep(IDLE_SPIN_GUARD).await;
                }
            }
        }
    }

    async fn handle_payload(&self, raw: &str) {
        let value: serde_json::Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(symbol = %self.symbol, error = %e, "malformed payload");
                let _ = journal::record_failure(
                    &self.store,
                    &self.symbol,
                    serde_json::json!({ "raw": raw }),
                    &EngineError::Validation(format!("malformed JSON: {e}")),
                )
                .await;
                return;
            }
        };

        let trading_pair = match value.get("trading_pair").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => {
                let _ = journal::record_failure(
                    &self.store,
                    &self.symbol,
                    value.clone(),
                    &EngineError::Validation("missing trading_pair".into()),
                )
                .await;
                return;
            }
        };

        if trading_pair != self.symbol {
            tracing::debug!(
                from = %self.symbol,
                to = %trading_pair,
                "misrouted order, re-enqueueing"
            );
            let _ = self
                .store
                .list_push_left(&pending_key(&trading_pair), raw)
                .await;
            return;
        }

        if let Err(e) = self.process(value.clone()).await {
            tracing::warn!(symbol = %self.symbol, error = %e, "order processing failed");
            let _ = journal::record_failure(&self.store, &self.symbol, value, &e).await;
        }
    }

    async fn process(&self, value: serde_json::Value) -> Result<(), EngineError> {
        let order_type_raw = value
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("limit");
        let order_type: OrderType = order_type_raw
            .parse()
            .map_err(|_| EngineError::Validation(format!("unknown order type: {order_type_raw}")))?;

        if order_type == OrderType::Cancel {
            let id = value
                .get("id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| EngineError::Validation("cancel missing id".into()))?;
            self.book.cancel(id).await?;
            return Ok(());
        }

        let side_raw = value
            .get("side")
            .and_then(|v| v.as_str())
            .ok_or_else(|| EngineError::Validation("missing side".into()))?;
        let side: Side = side_raw.parse()?;

        let amount_raw = value
            .get("amount")
            .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_f64().map(|f| f.to_string())))
            .ok_or_else(|| EngineError::Validation("missing amount".into()))?;
        let amount = crate::decimal::parse_positive(&amount_raw)?;

        let price = if order_type == OrderType::Limit {
            let price_raw = value
                .get("price")
                .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_f64().map(|f| f.to_string())))
                .ok_or_else(|| EngineError::Validation("missing price".into()))?;
            Some(crate::decimal::parse_positive(&price_raw)?)
        } else {
            None
        };

        let id = value
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(crate::model::new_order_id);

        let timestamp = value.get("timestamp").and_then(|v| v.as_i64()).unwrap_or_else(now_unix);

        let order = Order {
            id,
            symbol: self.symbol.clone(),
            side,
            order_type,
            price,
            amount,
            remaining: amount,
            status: OrderStatus::Open,
            timestamp,
            seq: self.book.next_seq(),
            error: None,
        };

        match order_type {
            OrderType::Limit => {
                self.book.add_limit(order).await?;
            }
            OrderType::Market => {
                self.book.add_market(order).await?;
            }
            OrderType::Cancel => unreachable!(),
        }
        Ok(())
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn make_processor(symbol: &str, store: Arc<dyn Store>) -> Processor {
        Processor::new(symbol.to_string(), store, Arc::new(Monitor::new()))
    }

    #[tokio::test]
    async fn malformed_payload_goes_to_failed_queue() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let processor = make_processor("BTCUSDT", store.clone());
        processor.handle_payload("not json").await;
        let failures = journal::recent_failures(&store, &["BTCUSDT".to_string()], 10)
            .await
            .unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].error_kind, "validation");
    }

    #[tokio::test]
    async fn misrouted_order_is_reenqueued() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let processor = make_processor("BTCUSDT", store.clone());
        let payload = serde_json::json!({
            "trading_pair": "ETHUSDT",
            "type": "limit",
            "side": "buy",
            "price": "100",
            "amount": "1"
        })
        .to_string();
        processor.handle_payload(&payload).await;
        let rerouted = store.list_range("pending:ETHUSDT", 0, -1).await.unwrap();
        assert_eq!(rerouted.len(), 1);
    }

    #[tokio::test]
    async fn valid_limit_order_rests_in_book() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let processor = make_processor("BTCUSDT", store.clone());
        let payload = serde_json::json!({
            "trading_pair": "BTCUSDT",
            "type": "limit",
            "side": "buy",
            "price": "100",
            "amount": "1"
        })
        .to_string();
        processor.handle_payload(&payload).await;
        assert_eq!(
            store.zset_card("BTCUSDT:buy_orders").await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn invalid_price_is_rejected() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let processor = make_processor("BTCUSDT", store.clone());
        let payload = serde_json::json!({
            "trading_pair": "BTCUSDT",
            "type": "limit",
            "side": "buy",
            "price": "-5",
            "amount": "1"
        })
        .to_string();
        processor.handle_payload(&payload).await;
        let failures = journal::recent_failures(&store, &["BTCUSDT".to_string()], 10)
            .await
            .unwrap();
        assert_eq!(failures.len(), 1);
    }
}
