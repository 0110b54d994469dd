//! Order and trade domain types.
//!
//! Every value is store-serializable (a hash of string fields) rather
//! than kept only as an in-process struct, since the store, not process
//! memory, is the source of truth.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

impl std::str::FromStr for Side {
    type Err = crate::error::EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            other => Err(crate::error::EngineError::Validation(format!(
                "invalid side: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
    Cancel,
}

impl std::str::FromStr for OrderType {
    type Err = crate::error::EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "limit" => Ok(OrderType::Limit),
            "market" => Ok(OrderType::Market),
            "cancel" => Ok(OrderType::Cancel),
            other => Err(crate::error::EngineError::Validation(format!(
                "invalid order type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Failed,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Open => write!(f, "open"),
            OrderStatus::PartiallyFilled => write!(f, "partially_filled"),
            OrderStatus::Filled => write!(f, "filled"),
            OrderStatus::Cancelled => write!(f, "cancelled"),
            OrderStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = crate::error::EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(OrderStatus::Open),
            "partially_filled" => Ok(OrderStatus::PartiallyFilled),
            "filled" => Ok(OrderStatus::Filled),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "failed" => Ok(OrderStatus::Failed),
            other => Err(crate::error::EngineError::Internal(format!(
                "corrupt order status: {other}"
            ))),
        }
    }
}

/// A resting or terminal order, as held in the `order:{symbol}:{id}` hash.
///
/// `seq` breaks price-time ties when the store's own sorted-set ordering
/// is ambiguous at a shared score (see DESIGN.md). It is never sent to
/// clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub amount: Decimal,
    pub remaining: Decimal,
    pub status: OrderStatus,
    pub timestamp: i64,
    pub seq: u64,
    pub error: Option<String>,
}

impl Order {
    pub fn to_fields(&self) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        fields.insert("id".into(), self.id.clone());
        fields.insert("symbol".into(), self.symbol.clone());
        fields.insert("side".into(), self.side.to_string());
        fields.insert(
            "type".into(),
            match self.order_type {
                OrderType::Limit => "limit".into(),
                OrderType::Market => "market".into(),
                OrderType::Cancel => "cancel".into(),
            },
        );
        if let Some(price) = self.price {
            fields.insert("price".into(), price.to_string());
        }
        fields.insert("amount".into(), self.amount.to_string());
        fields.insert("remaining".into(), self.remaining.to_string());
        fields.insert("status".into(), self.status.to_string());
        fields.insert("timestamp".into(), self.timestamp.to_string());
        fields.insert("seq".into(), self.seq.to_string());
        if let Some(err) = &self.error {
            fields.insert("error".into(), err.clone());
        }
        fields
    }

    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, crate::error::EngineError> {
        let get = |k: &str| -> Result<&String, crate::error::EngineError> {
            fields
                .get(k)
                .ok_or_else(|| crate::error::EngineError::Internal(format!("missing field {k}")))
        };
        Ok(Order {
            id: get("id")?.clone(),
            symbol: get("symbol")?.clone(),
            side: get("side")?.parse()?,
            order_type: get("type")?.parse()?,
            price: fields.get("price").and_then(|p| p.parse().ok()),
            amount: get("amount")?
                .parse()
                .map_err(|_| crate::error::EngineError::Internal("corrupt amount".into()))?,
            remaining: get("remaining")?
                .parse()
                .map_err(|_| crate::error::EngineError::Internal("corrupt remaining".into()))?,
            status: get("status")?.parse()?,
            timestamp: get("timestamp")?
                .parse()
                .map_err(|_| crate::error::EngineError::Internal("corrupt timestamp".into()))?,
            seq: fields.get("seq").and_then(|s| s.parse().ok()).unwrap_or(0),
            error: fields.get("error").cloned(),
        })
    }
}

/// An executed trade, immutable once journaled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub symbol: String,
    pub price: Decimal,
    pub amount: Decimal,
    pub bid_order_id: String,
    pub ask_order_id: String,
    pub timestamp: i64,
}

/// Raw JSON payload accepted off `pending:{symbol}`. Deliberately permissive;
/// the processor re-validates every field independently of the ingress.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrderPayload {
    pub id: Option<String>,
    pub trading_pair: String,
    #[serde(rename = "type")]
    pub order_type: Option<String>,
    pub side: Option<String>,
    pub price: Option<String>,
    pub amount: Option<String>,
    pub timestamp: Option<i64>,
}

/// Generates an `order:{unix_ts}:{rand_hex}` style id for orders that
/// arrive without one.
pub fn new_order_id() -> String {
    format!("order:{}:{}", now_unix(), random_hex(8))
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

pub fn random_hex(len: usize) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..len).map(|_| format!("{:x}", rng.gen_range(0..16))).collect()
}

/// A diagnostic record pushed onto `failed_orders:{symbol}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedOrderRecord {
    pub order: serde_json::Value,
    pub error: String,
    pub error_kind: String,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn round_trips_through_fields() {
        let order = Order {
            id: "order:1:abc".into(),
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            price: Some(dec!(100.5)),
            amount: dec!(2.0),
            remaining: dec!(2.0),
            status: OrderStatus::Open,
            timestamp: 1234,
            seq: 7,
            error: None,
        };
        let fields = order.to_fields();
        let back = Order::from_fields(&fields).unwrap();
        assert_eq!(back.id, order.id);
        assert_eq!(back.price, order.price);
        assert_eq!(back.status, OrderStatus::Open);
        assert_eq!(back.seq, 7);
    }
}
