//! Multi-symbol limit order book matching engine.

pub mod api;
pub mod config;
pub mod decimal;
pub mod error;
pub mod journal;
pub mod model;
pub mod monitor;
pub mod orderbook;
pub mod processor;
pub mod processor_manager;
pub mod store;
pub mod telemetry;

use crate::config::AppConfig;
use crate::monitor::Monitor;
use crate::processor_manager::ProcessorManager;
use crate::store::Store;
use std::sync::Arc;

/// Shared application state handed to every Axum handler.
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn Store>,
    pub monitor: Arc<Monitor>,
    pub processors: ProcessorManager,
}
