//! HTTP request/response bodies.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub trading_pair: String,
    pub side: String,
    pub price: Option<String>,
    pub amount: String,
    #[serde(rename = "type")]
    pub order_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub order_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TradingPairQuery {
    pub trading_pair: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: i64,
    pub symbols: Vec<String>,
    pub store_reachable: bool,
}

#[derive(Debug, Serialize)]
pub struct FailedOrdersResponse {
    pub failed_orders: Vec<crate::model::FailedOrderRecord>,
}
