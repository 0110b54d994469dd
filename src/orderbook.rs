//! Per-symbol matching engine.
//!
//! Walks price levels and fills oldest-first, removing exhausted makers,
//! the same shape as an in-process matching core, but every mutation goes
//! through the `Store` trait instead of an in-process `RwLock<BTreeMap<..>>`,
//! since the store (not process memory) is the source of truth and must
//! reflect every change atomically for concurrent readers (HTTP GETs, the
//! monitor).
//!
//! A symbol's book is only ever touched by that symbol's processor task
//! (see `processor.rs`), so no locking is needed here beyond what the
//! store itself provides for its own atomicity.

use crate::decimal::PriceLevel;
use crate::error::EngineError;
use crate::model::{Order, OrderStatus, OrderType, Side, Trade};
use crate::store::{Store, Write};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

const TRADE_JOURNAL_CAP: isize = 1000;

pub(crate) fn buy_key(symbol: &str) -> String {
    format!("{symbol}:buy_orders")
}

pub(crate) fn sell_key(symbol: &str) -> String {
    format!("{symbol}:sell_orders")
}

fn order_key(symbol: &str, id: &str) -> String {
    format!("order:{symbol}:{id}")
}

fn trades_key(symbol: &str) -> String {
    format!("trades:{symbol}")
}

/// Per-symbol matching core. One instance is owned by each symbol's
/// processor task.
pub struct OrderBook {
    symbol: String,
    store: Arc<dyn Store>,
    seq: AtomicU64,
}

impl OrderBook {
    pub fn new(symbol: String, store: Arc<dyn Store>) -> Self {
        Self {
            symbol,
            store,
            seq: AtomicU64::new(0),
        }
    }

    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, AtomicOrdering::Relaxed)
    }

    async fn load_order(&self, id: &str) -> Result<Option<Order>, EngineError> {
        let fields = self.store.hash_get_all(&order_key(&self.symbol, id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(Order::from_fields(&fields)?))
    }

    fn side_key(&self, side: Side) -> String {
        match side {
            Side::Buy => buy_key(&self.symbol),
            Side::Sell => sell_key(&self.symbol),
        }
    }

    fn opposite_key(&self, side: Side) -> String {
        match side {
            Side::Buy => sell_key(&self.symbol),
            Side::Sell => buy_key(&self.symbol),
        }
    }

    /// Best opposite-side price (lowest ask for a buy, highest bid for a
    /// sell), and the oldest order id resting there.
    async fn best_opposite(&self, side: Side) -> Result<Option<(Decimal, String)>, EngineError> {
        let key = self.opposite_key(side);
        let candidates = match side {
            // incoming buy matches against lowest ask first
            Side::Buy => self.store.zset_range(&key, 0, 0).await?,
            // incoming sell matches against highest bid first
            Side::Sell => self.store.zset_rev_range(&key, 0, 0).await?,
        };
        let Some(id) = candidates.into_iter().next() else {
            return Ok(None);
        };
        let order = self
            .load_order(&id)
            .await?
            .ok_or_else(|| EngineError::Internal(format!("index entry without backing order: {id}")))?;
        let price = order
            .price
            .ok_or_else(|| EngineError::Internal(format!("resting order without price: {id}")))?;
        Ok(Some((price, id)))
    }

    /// Among several resting orders tied at the same best price, pick the
    /// one with the lowest `seq` (oldest). Needed because the store's own
    /// member ordering at a shared score is not guaranteed to be
    /// insertion order (see DESIGN.md).
    async fn oldest_at_price(
        &self,
        side: Side,
        price: Decimal,
    ) -> Result<Option<Order>, EngineError> {
        let key = self.opposite_key(side);
        let score = PriceLevel::from_decimal(price).score();
        let candidates = self.store.zset_range_by_score(&key, score, score).await?;
        let mut best: Option<Order> = None;
        for id in candidates {
            if let Some(order) = self.load_order(&id).await? {
                if order.status != OrderStatus::Open && order.status != OrderStatus::PartiallyFilled {
                    continue;
                }
                best = match best {
                    None => Some(order),
                    Some(current) if order.seq < current.seq => Some(order),
                    Some(current) => Some(current),
                };
            }
        }
        Ok(best)
    }

    async fn insert_resting(&self, order: &Order) -> Result<(), EngineError> {
        let price = order
            .price
            .ok_or_else(|| EngineError::Internal("limit order without price".into()))?;
        let score = PriceLevel::from_decimal(price).score();
        self.store
            .txn(vec![
                Write::HashSet {
                    key: order_key(&self.symbol, &order.id),
                    fields: order.to_fields(),
                },
                Write::ZsetAdd {
                    key: self.side_key(order.side),
                    score,
                    member: order.id.clone(),
                },
            ])
            .await?;
        Ok(())
    }

    async fn remove_from_index(&self, order: &Order) -> Result<(), EngineError> {
        self.store
            .zset_rem(&self.side_key(order.side), &order.id)
            .await?;
        Ok(())
    }

    async fn append_trade(&self, trade: &Trade) -> Result<(), EngineError> {
        let payload = serde_json::to_string(trade)
            .map_err(|e| EngineError::Internal(format!("trade serialization: {e}")))?;
        self.store
            .txn(vec![
                Write::ListPushLeft {
                    key: trades_key(&self.symbol),
                    value: payload,
                },
                Write::ListTrim {
                    key: trades_key(&self.symbol),
                    start: 0,
                    stop: TRADE_JOURNAL_CAP - 1,
                },
            ])
            .await?;
        Ok(())
    }

    async fn persist(&self, order: &Order) -> Result<(), EngineError> {
        self.store
            .hash_set(&order_key(&self.symbol, &order.id), order.to_fields())
            .await?;
        Ok(())
    }

    /// Apply one fill against a resting maker order, mutating both sides
    /// in place and persisting the result. Returns the trade amount.
    async fn fill_against(
        &self,
        incoming: &mut Order,
        maker: &mut Order,
    ) -> Result<Decimal, EngineError> {
        let trade_amount = incoming.remaining.min(maker.remaining);
        // Trade always executes at the ask's price, not unconditionally the
        // maker's: when the incoming order is the sell, it is the ask.
        let ask = match incoming.side {
            Side::Sell => &*incoming,
            Side::Buy => &*maker,
        };
        let trade_price = ask
            .price
            .ok_or_else(|| EngineError::Internal("ask without price".into()))?;

        incoming.remaining -= trade_amount;
        maker.remaining -= trade_amount;

        incoming.status = if incoming.remaining.is_zero() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        maker.status = if maker.remaining.is_zero() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };

        let (bid_order_id, ask_order_id) = match incoming.side {
            Side::Buy => (incoming.id.clone(), maker.id.clone()),
            Side::Sell => (maker.id.clone(), incoming.id.clone()),
        };

        let trade = Trade {
            id: format!("trade:{}:{}", now_unix(), crate::model::random_hex(8)),
            symbol: self.symbol.clone(),
            price: trade_price,
            amount: trade_amount,
            bid_order_id,
            ask_order_id,
            timestamp: now_unix(),
        };

        let mut writes = vec![
            Write::HashSet {
                key: order_key(&self.symbol, &incoming.id),
                fields: incoming.to_fields(),
            },
            Write::HashSet {
                key: order_key(&self.symbol, &maker.id),
                fields: maker.to_fields(),
            },
        ];
        if maker.status == OrderStatus::Filled {
            writes.push(Write::ZsetRem {
                key: self.side_key(maker.side),
                member: maker.id.clone(),
            });
        }
        let trade_payload = serde_json::to_string(&trade)
            .map_err(|e| EngineError::Internal(format!("trade serialization: {e}")))?;
        writes.push(Write::ListPushLeft {
            key: trades_key(&self.symbol),
            value: trade_payload,
        });
        writes.push(Write::ListTrim {
            key: trades_key(&self.symbol),
            start: 0,
            stop: TRADE_JOURNAL_CAP - 1,
        });

        self.store.txn(writes).await?;
        Ok(trade_amount)
    }

    /// Add a limit order: insert into the book, then match it against the
    /// opposite side while the book remains crossed.
    pub async fn add_limit(&self, mut order: Order) -> Result<Order, EngineError> {
        order.order_type = OrderType::Limit;
        order.status = OrderStatus::Open;
        self.insert_resting(&order).await?;

        while order.remaining > Decimal::ZERO {
            let Some((best_price, _)) = self.best_opposite(order.side).await? else {
                break;
            };
            let incoming_price = order
                .price
                .ok_or_else(|| EngineError::Internal("limit order without price".into()))?;
            let crosses = match order.side {
                Side::Buy => incoming_price >= best_price,
                Side::Sell => incoming_price <= best_price,
            };
            if !crosses {
                break;
            }
            let Some(mut maker) = self.oldest_at_price(order.side, best_price).await? else {
                break;
            };
            self.fill_against(&mut order, &mut maker).await?;
            if order.status == OrderStatus::Filled {
                self.remove_from_index(&order).await?;
            }
        }
        Ok(order)
    }

    /// Add a market order: consume liquidity across price levels with no
    /// limit price, never resting in the book.
    pub async fn add_market(&self, mut order: Order) -> Result<Order, EngineError> {
        order.order_type = OrderType::Market;

        let opposite_empty = self.best_opposite(order.side).await?.is_none();
        if opposite_empty {
            order.status = OrderStatus::Failed;
            order.error = Some("No matching orders available".to_string());
            self.persist(&order).await?;
            return Ok(order);
        }

        order.status = OrderStatus::Open;
        self.persist(&order).await?;

        while order.remaining > Decimal::ZERO {
            let Some((best_price, _)) = self.best_opposite(order.side).await? else {
                break;
            };
            let Some(mut maker) = self.oldest_at_price(order.side, best_price).await? else {
                break;
            };
            self.fill_against(&mut order, &mut maker).await?;
        }

        order.status = if order.remaining.is_zero() {
            OrderStatus::Filled
        } else if order.remaining < order.amount {
            OrderStatus::PartiallyFilled
        } else {
            order.error = Some("No matching orders available".to_string());
            OrderStatus::Failed
        };
        self.persist(&order).await?;
        Ok(order)
    }

    /// Cancel a resting order. Returns `false` if it does not exist or is
    /// already terminal.
    pub async fn cancel(&self, id: &str) -> Result<bool, EngineError> {
        let Some(mut order) = self.load_order(id).await? else {
            return Ok(false);
        };
        if order.status != OrderStatus::Open && order.status != OrderStatus::PartiallyFilled {
            return Ok(false);
        }
        order.status = OrderStatus::Cancelled;
        self.store
            .txn(vec![
                Write::HashSet {
                    key: order_key(&self.symbol, &order.id),
                    fields: order.to_fields(),
                },
                Write::ZsetRem {
                    key: self.side_key(order.side),
                    member: order.id.clone(),
                },
            ])
            .await?;
        Ok(true)
    }

    pub async fn get_order(&self, id: &str) -> Result<Option<Order>, EngineError> {
        self.load_order(id).await
    }

    /// Aggregate resting depth per price on each side, for monitoring and
    /// the (non-spec, informational) snapshot helpers.
    pub async fn depth(&self, side: Side) -> Result<HashMap<Decimal, Decimal>, EngineError> {
        let key = self.side_key(side);
        let ids = self.store.zset_range(&key, 0, -1).await?;
        let mut levels: HashMap<Decimal, Decimal> = HashMap::new();
        for id in ids {
            if let Some(order) = self.load_order(&id).await? {
                if let Some(price) = order.price {
                    *levels.entry(price).or_insert(Decimal::ZERO) += order.remaining;
                }
            }
        }
        Ok(levels)
    }

    pub async fn resting_count(&self, side: Side) -> Result<u64, EngineError> {
        Ok(self.store.zset_card(&self.side_key(side)).await?)
    }

    pub async fn recent_trades(&self, n: isize) -> Result<Vec<Trade>, EngineError> {
        let raw = self.store.list_range(&trades_key(&self.symbol), 0, n - 1).await?;
        raw.into_iter()
            .map(|s| serde_json::from_str(&s).map_err(|e| EngineError::Internal(e.to_string())))
            .collect()
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
    use rust_decimal_macros::dec;

    fn new_order(symbol: &str, side: Side, price: Decimal, amount: Decimal, seq: u64) -> Order {
        Order {
            id: format!("order:{seq}"),
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Limit,
            price: Some(price),
            amount,
            remaining: amount,
            status: OrderStatus::Open,
            timestamp: now_unix(),
            seq,
            error: None,
        }
    }

    #[tokio::test]
    async fn non_crossing_orders_rest() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let book = OrderBook::new("BTCUSDT".into(), store);
        let buy = new_order("BTCUSDT", Side::Buy, dec!(100), dec!(1), 0);
        let result = book.add_limit(buy).await.unwrap();
        assert_eq!(result.status, OrderStatus::Open);
        assert_eq!(book.resting_count(Side::Buy).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn crossing_limit_orders_match_at_maker_price() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let book = OrderBook::new("BTCUSDT".into(), store);
        let ask = new_order("BTCUSDT", Side::Sell, dec!(100), dec!(1), 0);
        book.add_limit(ask).await.unwrap();

        let bid = new_order("BTCUSDT", Side::Buy, dec!(105), dec!(1), 1);
        let filled = book.add_limit(bid).await.unwrap();

        assert_eq!(filled.status, OrderStatus::Filled);
        let trades = book.recent_trades(10).await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, dec!(100)); // maker's price, not taker's
    }

    #[tokio::test]
    async fn incoming_aggressive_sell_trades_at_its_own_ask_price() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let book = OrderBook::new("BTCUSDT".into(), store);
        book.add_limit(new_order("BTCUSDT", Side::Buy, dec!(30000), dec!(1), 0))
            .await
            .unwrap();
        let b2 = new_order("BTCUSDT", Side::Buy, dec!(30100), dec!(1), 1);
        book.add_limit(b2.clone()).await.unwrap();

        let s1 = new_order("BTCUSDT", Side::Sell, dec!(30000), dec!(1), 2);
        let filled = book.add_limit(s1).await.unwrap();

        assert_eq!(filled.status, OrderStatus::Filled);
        let trades = book.recent_trades(10).await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, dec!(30000));
        assert_eq!(trades[0].bid_order_id, b2.id);
    }

    #[tokio::test]
    async fn partial_fill_leaves_remainder_resting() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let book = OrderBook::new("BTCUSDT".into(), store);
        let ask = new_order("BTCUSDT", Side::Sell, dec!(100), dec!(1), 0);
        book.add_limit(ask).await.unwrap();

        let bid = new_order("BTCUSDT", Side::Buy, dec!(100), dec!(2.5), 1);
        let result = book.add_limit(bid).await.unwrap();

        assert_eq!(result.status, OrderStatus::PartiallyFilled);
        assert_eq!(result.remaining, dec!(1.5));
        assert_eq!(book.resting_count(Side::Sell).await.unwrap(), 0);
        assert_eq!(book.resting_count(Side::Buy).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cancel_removes_resting_order() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let book = OrderBook::new("BTCUSDT".into(), store);
        let buy = new_order("BTCUSDT", Side::Buy, dec!(100), dec!(1), 0);
        book.add_limit(buy.clone()).await.unwrap();

        let cancelled = book.cancel(&buy.id).await.unwrap();
        assert!(cancelled);
        assert_eq!(book.resting_count(Side::Buy).await.unwrap(), 0);

        let again = book.cancel(&buy.id).await.unwrap();
        assert!(!again);
    }

    #[tokio::test]
    async fn market_order_with_no_liquidity_fails() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let book = OrderBook::new("BTCUSDT".into(), store);
        let market = Order {
            id: "order:0".into(),
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            order_type: OrderType::Market,
            price: None,
            amount: dec!(1),
            remaining: dec!(1),
            status: OrderStatus::Open,
            timestamp: now_unix(),
            seq: 0,
            error: None,
        };
        let result = book.add_market(market).await.unwrap();
        assert_eq!(result.status, OrderStatus::Failed);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn market_order_sweeps_multiple_price_levels() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let book = OrderBook::new("BTCUSDT".into(), store);
        book.add_limit(new_order("BTCUSDT", Side::Sell, dec!(100), dec!(1), 0))
            .await
            .unwrap();
        book.add_limit(new_order("BTCUSDT", Side::Sell, dec!(101), dec!(2), 1))
            .await
            .unwrap();

        let market = Order {
            id: "order:2".into(),
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            order_type: OrderType::Market,
            price: None,
            amount: dec!(1.5),
            remaining: dec!(1.5),
            status: OrderStatus::Open,
            timestamp: now_unix(),
            seq: 2,
            error: None,
        };
        let result = book.add_market(market).await.unwrap();
        assert_eq!(result.status, OrderStatus::Filled);
        let trades = book.recent_trades(10).await.unwrap();
        assert_eq!(trades.len(), 2);
    }
}
