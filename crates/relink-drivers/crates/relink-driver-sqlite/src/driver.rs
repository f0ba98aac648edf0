//! SQLite driver implementation

use async_trait::async_trait;
use relink_core::{Connection, ConnectionConfig, DatabaseDriver, Result};
use std::sync::Arc;

use crate::SqliteConnection;

/// SQLite database driver
pub struct SqliteDriver;

impl SqliteDriver {
    /// Create a new SQLite driver instance
    pub fn new() -> Self {
        tracing::debug!("SQLite driver initialized");
        Self
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn display_name(&self) -> &'static str {
        "SQLite"
    }

    #[tracing::instrument(skip(self, config), fields(name = %config.name, dsn = %config.dsn))]
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        config.validate()?;

        let conn = SqliteConnection::open_with_config(config).map_err(|e| {
            tracing::error!(error = %e, "failed to connect to SQLite database");
            e
        })?;

        tracing::info!(dsn = %config.dsn, "SQLite connection created");
        Ok(Arc::new(conn))
    }
}
