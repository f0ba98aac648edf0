//! Database driver trait definition

use crate::{Connection, RelinkError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Core driver trait that all database drivers must implement
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Unique identifier for this driver (e.g., "postgres", "mysql", "sqlite")
    fn name(&self) -> &'static str;

    /// Display name for logs and diagnostics
    fn display_name(&self) -> &'static str {
        self.name()
    }

    /// Create a new connection
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>>;

    /// Open a throwaway connection and run a trivial query
    async fn test_connection(&self, config: &ConnectionConfig) -> Result<()> {
        let conn = self.connect(config).await?;
        conn.query("SELECT 1", &[]).await?;
        conn.close().await
    }
}

/// Connection parameters for one logical connection
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Logical name (e.g., "primary", "reporting")
    pub name: String,
    /// Driver ID (e.g., "postgres", "mysql", "sqlite")
    pub driver: String,
    /// Data source name understood by the driver
    pub dsn: String,
    /// Username
    pub username: Option<String>,
    /// Password
    pub password: Option<String>,
    /// Additional driver options
    pub options: HashMap<String, String>,
}

impl ConnectionConfig {
    /// Create a new configuration with an empty DSN
    pub fn new(driver: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            driver: driver.to_string(),
            dsn: String::new(),
            username: None,
            password: None,
            options: HashMap::new(),
        }
    }

    /// Create a SQLite configuration
    pub fn new_sqlite(name: &str, database_path: &str) -> Self {
        Self::new("sqlite", name).with_dsn(database_path)
    }

    pub fn with_dsn(mut self, dsn: impl Into<String>) -> Self {
        self.dsn = dsn.into();
        self
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    /// Set a driver option
    pub fn with_option(mut self, key: &str, value: impl Into<String>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }

    /// Get a driver option
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Check that the parameters every driver needs are present
    pub fn validate(&self) -> Result<()> {
        if self.driver.trim().is_empty() {
            return Err(RelinkError::Configuration(format!(
                "connection '{}' has no driver",
                self.name
            )));
        }
        if self.dsn.trim().is_empty() {
            return Err(RelinkError::Configuration(format!(
                "connection '{}' is missing required parameter 'dsn'",
                self.name
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("name", &self.name)
            .field("driver", &self.driver)
            .field("dsn", &self.dsn)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_dsn() {
        let config = ConnectionConfig::new("sqlite", "primary");
        let err = config.validate().unwrap_err();
        assert!(matches!(err, RelinkError::Configuration(_)));
        assert!(err.to_string().contains("'dsn'"));

        let config = config.with_dsn(":memory:");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_driver() {
        let config = ConnectionConfig::new("", "primary").with_dsn("db");
        assert!(matches!(
            config.validate(),
            Err(RelinkError::Configuration(_))
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = ConnectionConfig::new("mysql", "primary")
            .with_dsn("mysql://db.internal/app")
            .with_credentials("app", "hunter2");
        let debug = format!("{:?}", config);
        assert!(debug.contains("***"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_options() {
        let config = ConnectionConfig::new_sqlite("local", ":memory:")
            .with_option("busy_timeout_ms", "250");
        assert_eq!(config.option("busy_timeout_ms"), Some("250"));
        assert_eq!(config.option("missing"), None);
        assert_eq!(config.driver, "sqlite");
    }
}
