//! Typed configuration loading.
//!
//! No `config.rs` survived in the retrieved teacher pack, only its call
//! sites in `main.rs` (`AppConfig::load()`, `config.environment`,
//! `config.get_trading_pairs()`); this module is built from scratch in
//! that shape, layering the `config` crate over environment variables
//! after `dotenvy::dotenv()` has populated `std::env`, matching the
//! teacher's load ordering.

use config::{Config, Environment};
use serde::Deserialize;

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_pool_size() -> usize {
    16
}

fn default_trading_pair() -> String {
    "BTCUSDT".to_string()
}

fn default_num_threads() -> usize {
    4
}

fn default_batch_size() -> usize {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    #[serde(default = "default_pool_size")]
    pub redis_pool_size: usize,

    /// Comma-separated in the environment; see `get_trading_pairs`.
    #[serde(default = "default_trading_pair")]
    pub trading_pair: String,

    #[serde(default)]
    pub num_orders: Option<usize>,

    #[serde(default = "default_num_threads")]
    pub num_threads: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_environment", rename = "rack_env")]
    pub environment: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = Config::builder()
            .set_default("redis_url", default_redis_url())?
            .set_default("redis_pool_size", default_pool_size() as i64)?
            .set_default("trading_pair", default_trading_pair())?
            .set_default("num_threads", default_num_threads() as i64)?
            .set_default("batch_size", default_batch_size() as i64)?
            .set_default("log_level", default_log_level())?
            .set_default("rack_env", default_environment())?
            .set_default("port", default_port() as i64)?
            .add_source(Environment::default().try_parsing(true))
            .build()?;

        config.try_deserialize()
    }

    pub fn get_trading_pairs(&self) -> Vec<String> {
        self.trading_pair
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_trading_pairs_on_comma() {
        let config = AppConfig {
            redis_url: default_redis_url(),
            redis_pool_size: default_pool_size(),
            trading_pair: "BTCUSDT, ETHUSDT,SOLUSDT".to_string(),
            num_orders: None,
            num_threads: default_num_threads(),
            batch_size: default_batch_size(),
            log_level: default_log_level(),
            environment: default_environment(),
            port: default_port(),
        };
        assert_eq!(
            config.get_trading_pairs(),
            vec!["BTCUSDT".to_string(), "ETHUSDT".to_string(), "SOLUSDT".to_string()]
        );
    }
}
