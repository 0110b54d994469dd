//! Starts and stops one processor task per registered symbol.
//!
//! One `tokio::spawn` task per symbol, each with its own failure domain:
//! a panic in one symbol's task is logged and does not touch its
//! siblings, and the manager does not restart it. A crashed processor is
//! meant to be visible, not silently papered over.

use crate::monitor::Monitor;
use crate::processor::Processor;
use crate::store::Store;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Handle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

pub struct ProcessorManager {
    store: Arc<dyn Store>,
    monitor: Arc<Monitor>,
    handles: DashMap<String, Handle>,
}

impl ProcessorManager {
    pub fn new(store: Arc<dyn Store>, monitor: Arc<Monitor>) -> Self {
        Self {
            store,
            monitor,
            handles: DashMap::new(),
        }
    }

    pub fn start(&self, symbols: &[String]) {
        for symbol in symbols {
            if self.handles.contains_key(symbol) {
                continue;
            }
            let token = CancellationToken::new();
            let processor = Processor::new(symbol.clone(), self.store.clone(), self.monitor.clone());
            let child_token = token.child_token();
            let symbol_for_log = symbol.clone();
            let join = tokio::spawn(async move {
                processor.run(child_token).await;
                tracing::info!(symbol = %symbol_for_log, "processor task exited");
            });
            self.handles.insert(symbol.clone(), Handle { token, join });
            tracing::info!(symbol = %symbol, "processor started");
        }
    }

    /// Cooperatively signal every processor to drain and exit, then await
    /// their completion.
    pub async fn stop(&self) {
        let symbols: Vec<String> = self.handles.iter().map(|e| e.key().clone()).collect();
        for symbol in &symbols {
            if let Some((_, handle)) = self.handles.remove(symbol) {
                handle.token.cancel();
                if let Err(e) = handle.join.await {
                    tracing::error!(symbol = %symbol, error = %e, "processor task panicked");
                }
            }
        }
    }

    pub fn active_symbols(&self) -> Vec<String> {
        self.handles.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn starts_one_task_per_symbol_and_stops_cleanly() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let monitor = Arc::new(Monitor::new());
        let manager = ProcessorManager::new(store, monitor);
        manager.start(&["BTCUSDT".to_string(), "ETHUSDT".to_string()]);
        assert_eq!(manager.active_symbols().len(), 2);
        manager.stop().await;
        assert_eq!(manager.active_symbols().len(), 0);
    }
}
