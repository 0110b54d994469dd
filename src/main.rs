use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use exchange_engine::config::AppConfig;
use exchange_engine::monitor::Monitor;
use exchange_engine::processor_manager::ProcessorManager;
use exchange_engine::store::{RedisStore, RedisStoreConfig, Store};
use exchange_engine::{api, telemetry, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;

    telemetry::init_tracing(&config.log_level);
    let _prometheus_handle = telemetry::init_metrics();

    tracing::info!("starting exchange_engine v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(environment = %config.environment, "loaded configuration");

    let store: Arc<dyn Store> = Arc::new(RedisStore::new(RedisStoreConfig {
        url: config.redis_url.clone(),
        pool_size: config.redis_pool_size,
    })?);
    tracing::info!(url = %config.redis_url, "store adapter initialized");

    let symbols = config.get_trading_pairs();
    for symbol in &symbols {
        store.set_add("trading_pairs", symbol).await.ok();
    }

    let monitor = Arc::new(Monitor::with_store(store.clone()));
    let processors = ProcessorManager::new(store.clone(), monitor.clone());
    processors.start(&symbols);
    tracing::info!(?symbols, "processors started");

    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        monitor,
        processors,
    });

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app: Router = api::create_router(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received, stopping processors");
            shutdown_state.processors.stop().await;
        })
        .await?;

    Ok(())
}
