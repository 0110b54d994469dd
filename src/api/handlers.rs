//! HTTP ingress handlers.
//!
//! Plain `State<Arc<AppState>>` / `Json<T>` request-response handlers with
//! a typed error tuple; no auth or signature concerns here, since this
//! engine's ingress only needs to validate enough to enqueue. The
//! processor (`processor.rs`) independently re-validates everything.

use super::dto::{
    CreateOrderRequest, CreateOrderResponse, ErrorBody, FailedOrdersResponse, HealthResponse,
    TradingPairQuery,
};
use crate::journal;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

type ApiError = (StatusCode, Json<ErrorBody>);

fn bad_request(message: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorBody { error: message.into() }))
}

fn internal_error(message: impl Into<String>) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody { error: message.into() }),
    )
}

pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), ApiError> {
    if !state.config.get_trading_pairs().contains(&req.trading_pair) {
        return Err(bad_request(format!("unknown trading pair: {}", req.trading_pair)));
    }
    if req.side != "buy" && req.side != "sell" {
        return Err(bad_request("side must be buy or sell"));
    }
    let order_type = req.order_type.clone().unwrap_or_else(|| "limit".to_string());
    if order_type == "limit" && req.price.is_none() {
        return Err(bad_request("limit orders require a price"));
    }
    crate::decimal::parse_positive(&req.amount).map_err(|e| bad_request(e.to_string()))?;
    if let Some(price) = &req.price {
        crate::decimal::parse_positive(price).map_err(|e| bad_request(e.to_string()))?;
    }

    let order_id = crate::model::new_order_id();
    let payload = serde_json::json!({
        "id": order_id,
        "trading_pair": req.trading_pair,
        "type": order_type,
        "side": req.side,
        "price": req.price,
        "amount": req.amount,
        "timestamp": now_unix(),
    })
    .to_string();

    state
        .store
        .list_push_left(&format!("pending:{}", req.trading_pair), &payload)
        .await
        .map_err(|e| internal_error(e.to_string()))?;

    Ok((StatusCode::ACCEPTED, Json(CreateOrderResponse { order_id })))
}

pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
    Query(query): Query<TradingPairQuery>,
) -> Result<StatusCode, ApiError> {
    if !state.config.get_trading_pairs().contains(&query.trading_pair) {
        return Err(bad_request(format!("unknown trading pair: {}", query.trading_pair)));
    }
    let payload = serde_json::json!({
        "id": order_id,
        "trading_pair": query.trading_pair,
        "type": "cancel",
    })
    .to_string();

    state
        .store
        .list_push_left(&format!("pending:{}", query.trading_pair), &payload)
        .await
        .map_err(|e| internal_error(e.to_string()))?;

    Ok(StatusCode::ACCEPTED)
}

pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
    Query(query): Query<TradingPairQuery>,
) -> Result<Json<crate::model::Order>, ApiError> {
    if !state.config.get_trading_pairs().contains(&query.trading_pair) {
        return Err(bad_request(format!("unknown trading pair: {}", query.trading_pair)));
    }
    let fields = state
        .store
        .hash_get_all(&format!("order:{}:{order_id}", query.trading_pair))
        .await
        .map_err(|e| internal_error(e.to_string()))?;
    if fields.is_empty() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorBody { error: format!("order not found: {order_id}") }),
        ));
    }
    let order = crate::model::Order::from_fields(&fields).map_err(|e| internal_error(e.to_string()))?;
    Ok(Json(order))
}

pub async fn get_failed_orders(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FailedOrdersResponse>, ApiError> {
    let symbols = state.config.get_trading_pairs();
    let failed_orders = journal::recent_failures(&state.store, &symbols, 50)
        .await
        .map_err(|e| internal_error(e.to_string()))?;
    Ok(Json(FailedOrdersResponse { failed_orders }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let store_reachable = state.store.ping().await;
    Json(HealthResponse {
        status: if store_reachable { "ok".to_string() } else { "degraded".to_string() },
        timestamp: now_unix(),
        symbols: state.config.get_trading_pairs(),
        store_reachable,
    })
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
