//! HTTP ingress router.
//!
//! No auth middleware layer: client authentication is out of scope for
//! this engine.

pub mod dto;
pub mod handlers;

use crate::AppState;
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/orders", post(handlers::create_order))
        .route("/api/v1/orders/:order_id", get(handlers::get_order))
        .route("/api/v1/orders/:order_id", delete(handlers::cancel_order))
        .route("/api/v1/failed_orders", get(handlers::get_failed_orders))
        .with_state(state)
}
