//! Common test setup functions.

use api::{router, AppState};
use axum::Router;
use axum_test::TestServer;
use event_store::{ClickHouseConfig, ClickHouseStore, EventStore, MemoryStore};
use std::sync::Arc;
use worker::{Pipeline, RunScheduler, WorkerConfig};

use crate::containers::TestContainers;

/// Worker settings used by the tests: production cadence and thresholds.
pub fn worker_config() -> WorkerConfig {
    WorkerConfig {
        poll_interval_ms: 10_000,
        batch_size: 50,
        max_consecutive_errors: 5,
        shutdown_grace_ms: 1_000,
        ..WorkerConfig::default()
    }
}

/// Test context backed by the in-memory store.
///
/// Uses the real router and the real pipeline, so requests and ticks go
/// through the same code paths as production.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub router: Router,
}

impl TestContext {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let router = router(AppState::new(store.clone()));
        Self { store, router }
    }

    pub fn server(&self) -> TestServer {
        TestServer::new(self.router.clone()).expect("Failed to create test server")
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.store.clone(), worker_config().batch_size)
    }

    pub fn scheduler(&self) -> RunScheduler {
        scheduler_for(self.store.clone(), worker_config())
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Scheduler over any store.
pub fn scheduler_for(store: Arc<dyn EventStore>, config: WorkerConfig) -> RunScheduler {
    let pipeline = Arc::new(Pipeline::from_config(store, &config));
    RunScheduler::new(pipeline, config)
}

/// ClickHouse-backed store in a fresh container (or `PIPELINE_TEST_CLICKHOUSE_URL`).
pub struct ClickHouseContext {
    pub containers: TestContainers,
    pub store: Arc<ClickHouseStore>,
}

impl ClickHouseContext {
    pub async fn new() -> Self {
        let containers = TestContainers::start().await;
        let config = ClickHouseConfig {
            url: containers.clickhouse_url.clone(),
            database: containers.clickhouse_database.clone(),
            username: containers.clickhouse_username.clone(),
            password: containers.clickhouse_password.clone(),
        };

        let store = Arc::new(ClickHouseStore::new(config));
        store
            .init_schema()
            .await
            .expect("Failed to initialize schema");

        Self { containers, store }
    }
}
