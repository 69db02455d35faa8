//! ClickHouse client wrapper.

use crate::config::ClickHouseConfig;
use clickhouse::Client;
use tracing::info;

/// ClickHouse client wrapper bound to the configured database.
#[derive(Clone)]
pub struct ClickHouseClient {
    inner: Client,
    /// Same credentials, no default database. Used to create the database.
    server: Client,
    config: ClickHouseConfig,
}

impl ClickHouseClient {
    /// Creates a new ClickHouse client.
    pub fn new(config: ClickHouseConfig) -> Self {
        let mut server = Client::default().with_url(&config.url);

        if let Some(ref user) = config.username {
            server = server.with_user(user);
        }

        if let Some(ref pass) = config.password {
            server = server.with_password(pass);
        }

        let inner = server.clone().with_database(&config.database);

        info!(
            url = %config.url,
            database = %config.database,
            "Created ClickHouse client"
        );

        Self {
            inner,
            server,
            config,
        }
    }

    /// Returns the database-scoped clickhouse client.
    pub fn inner(&self) -> &Client {
        &self.inner
    }

    /// Returns a client without a default database.
    pub fn server(&self) -> &Client {
        &self.server
    }

    /// Fully qualified table name in the configured database.
    pub fn table(&self, name: &str) -> String {
        format!("{}.{}", self.config.database, name)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClickHouseConfig {
        &self.config
    }
}
