//! Connection manager mapping logical names to reconnecting connections

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use relink_core::Result;
use relink_drivers::DriverRegistry;

use crate::{
    ConfigProvider, ReconnectConfig, ReconnectObserver, ReconnectStrategy, ReconnectingConnection,
};

/// Manages named database connections.
///
/// `get(name)` builds the connection on first lookup and hands out the same
/// instance afterwards. Connections whose configuration carries reconnect
/// settings get their own strategy; everything else shares the manager's.
pub struct ConnectionManager {
    drivers: DriverRegistry,
    provider: Arc<dyn ConfigProvider>,
    strategy: Arc<ReconnectStrategy>,
    observer: Option<Arc<dyn ReconnectObserver>>,
    active: RwLock<HashMap<String, Arc<ReconnectingConnection>>>,
}

impl ConnectionManager {
    /// Manager with the built-in drivers and the default strategy
    pub fn new(provider: Arc<dyn ConfigProvider>) -> Self {
        Self {
            drivers: DriverRegistry::with_defaults(),
            provider,
            strategy: Arc::new(ReconnectStrategy::default()),
            observer: None,
            active: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_drivers(mut self, drivers: DriverRegistry) -> Self {
        self.drivers = drivers;
        self
    }

    /// Strategy shared by every connection without its own settings
    pub fn with_strategy(mut self, strategy: Arc<ReconnectStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ReconnectObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Get the driver registry
    pub fn drivers(&self) -> &DriverRegistry {
        &self.drivers
    }

    pub fn strategy(&self) -> &Arc<ReconnectStrategy> {
        &self.strategy
    }

    /// Connection for `name`, created on first lookup.
    ///
    /// The driver connection itself is opened lazily by the first operation.
    #[tracing::instrument(skip(self))]
    pub fn get(&self, name: &str) -> Result<Arc<ReconnectingConnection>> {
        if let Some(existing) = self.active.read().get(name) {
            return Ok(Arc::clone(existing));
        }

        let mut active = self.active.write();
        if let Some(existing) = active.get(name) {
            return Ok(Arc::clone(existing));
        }

        let config = self.provider.connection_config(name)?;
        let driver = self.drivers.require(&config.driver)?;

        let strategy = match self.provider.reconnect_settings(name) {
            Some(settings) => {
                tracing::debug!(settings = ?settings, "using per-connection reconnect settings");
                Arc::new(ReconnectStrategy::from_settings(&settings))
            }
            None => Arc::clone(&self.strategy),
        };
        let mut reconnect = ReconnectConfig::new(strategy);
        if let Some(observer) = &self.observer {
            reconnect = reconnect.with_observer(Arc::clone(observer));
        }

        tracing::info!(driver = %config.driver, "registering connection");
        let connection = Arc::new(ReconnectingConnection::new(driver, config, reconnect));
        active.insert(name.to_string(), Arc::clone(&connection));
        Ok(connection)
    }

    /// Close and forget the connection for `name`
    #[tracing::instrument(skip(self))]
    pub async fn disconnect(&self, name: &str) -> Result<()> {
        tracing::info!("disconnecting connection");
        let connection = self.active.write().remove(name);
        if let Some(connection) = connection {
            connection.close().await?;
        }
        Ok(())
    }

    /// Close every connection, returning the first error encountered
    pub async fn disconnect_all(&self) -> Result<()> {
        let connections: Vec<_> = self.active.write().drain().collect();
        let mut first_error = None;
        for (name, connection) in connections {
            if let Err(e) = connection.close().await {
                tracing::warn!(name = %name, error = %e, "failed to close connection");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Check if a connection is active
    pub fn is_connected(&self, name: &str) -> bool {
        self.active.read().contains_key(name)
    }

    /// Names of all active connections, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.active.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ReconnectSettings, StaticConfigProvider};
    use relink_core::{ConnectionConfig, RelinkError, Value};

    fn provider() -> Arc<StaticConfigProvider> {
        Arc::new(
            StaticConfigProvider::new()
                .with_connection(ConnectionConfig::new_sqlite("primary", ":memory:"))
                .with_connection(ConnectionConfig::new_sqlite("reporting", ":memory:"))
                .with_connection(ConnectionConfig::new("oracle", "legacy").with_dsn("db"))
                .with_reconnect(
                    "reporting",
                    ReconnectSettings {
                        max_attempts: Some(4),
                        patterns: vec!["database is locked".into()],
                        ..Default::default()
                    },
                ),
        )
    }

    #[test]
    fn test_get_returns_same_instance() {
        let manager = ConnectionManager::new(provider());
        let first = manager.get("primary").unwrap();
        let second = manager.get("primary").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(manager.is_connected("primary"));
        assert_eq!(manager.names(), vec!["primary".to_string()]);
    }

    #[test]
    fn test_shared_and_per_connection_strategy() {
        let strategy = Arc::new(ReconnectStrategy::new().with_max_attempts(2));
        let manager = ConnectionManager::new(provider()).with_strategy(Arc::clone(&strategy));

        let primary = manager.get("primary").unwrap();
        assert!(Arc::ptr_eq(primary.strategy(), &strategy));

        let reporting = manager.get("reporting").unwrap();
        assert!(!Arc::ptr_eq(reporting.strategy(), &strategy));
        assert_eq!(reporting.strategy().max_attempts(), 4);
        assert!(reporting
            .strategy()
            .should_reconnect(&RelinkError::Query("database is locked".into())));
    }

    #[test]
    fn test_unknown_name_and_driver() {
        let manager = ConnectionManager::new(provider());
        assert!(matches!(manager.get("missing"), Err(RelinkError::NotFound(_))));
        assert!(matches!(
            manager.get("legacy"),
            Err(RelinkError::Configuration(_))
        ));
        assert!(!manager.is_connected("legacy"));
    }

    #[tokio::test]
    async fn test_disconnect_closes_and_forgets() {
        let manager = ConnectionManager::new(provider());
        let conn = manager.get("primary").unwrap();
        conn.execute("CREATE TABLE t (id INTEGER)", &[]).await.unwrap();

        manager.disconnect("primary").await.unwrap();
        assert!(!manager.is_connected("primary"));
        assert!(conn.handle().is_closed());
        assert!(conn.query("SELECT 1", &[]).await.is_err());

        // a fresh lookup builds a new connection
        let fresh = manager.get("primary").unwrap();
        assert!(!Arc::ptr_eq(&conn, &fresh));
        let result = fresh.query("SELECT 1", &[]).await.unwrap();
        assert_eq!(result.rows[0].get(0), Some(&Value::Int64(1)));

        // disconnecting an unknown name is a no-op
        manager.disconnect("nobody").await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_all() {
        let manager = ConnectionManager::new(provider());
        manager.get("primary").unwrap();
        manager.get("reporting").unwrap();
        assert_eq!(manager.names(), vec!["primary".to_string(), "reporting".to_string()]);

        manager.disconnect_all().await.unwrap();
        assert!(manager.names().is_empty());
    }
}
