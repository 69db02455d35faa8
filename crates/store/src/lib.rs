//! Event store for the pipeline: the `EventStore` trait and its ClickHouse
//! and in-memory backends.

pub mod client;
pub mod clickhouse_store;
pub mod config;
pub mod memory;
pub mod schema;
pub mod store;

pub use client::ClickHouseClient;
pub use clickhouse_store::ClickHouseStore;
pub use config::*;
pub use memory::{MemoryStore, StoreOp};
pub use store::EventStore;

use pipeline_core::Result;
use std::sync::Arc;
use tracing::info;

/// Opens the configured backend, creating the ClickHouse schema if needed,
/// and verifies connectivity.
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn EventStore>> {
    let store: Arc<dyn EventStore> = match config.backend {
        StoreBackend::ClickHouse => {
            let store = ClickHouseStore::new(config.clickhouse.clone());
            store.init_schema().await?;
            Arc::new(store)
        }
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };

    store.ping().await?;
    info!(backend = store.backend(), "Connected to event store");
    Ok(store)
}
