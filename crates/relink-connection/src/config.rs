//! Connection configuration sources
//!
//! A [`ConfigProvider`] turns a logical connection name into the
//! [`ConnectionConfig`] the driver needs, plus optional per-connection
//! reconnect settings.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use relink_core::{ConnectionConfig, RelinkError, Result};
use serde::{Deserialize, Serialize};

/// Looks up connection parameters by logical name
pub trait ConfigProvider: Send + Sync {
    /// Parameters for `name`; `NotFound` when the provider has no such entry
    fn connection_config(&self, name: &str) -> Result<ConnectionConfig>;

    /// Reconnect settings that override the shared strategy for `name`
    fn reconnect_settings(&self, _name: &str) -> Option<ReconnectSettings> {
        None
    }
}

/// Reconnect tuning as it appears in a config file.
///
/// Unset fields keep the strategy defaults; `patterns` are appended to the
/// default patterns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub max_delay_ms: Option<u64>,
    pub patterns: Vec<String>,
}

fn check_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(RelinkError::Configuration(
            "connection name must not be empty".into(),
        ));
    }
    Ok(())
}

/// In-memory provider
#[derive(Debug, Default, Clone)]
pub struct StaticConfigProvider {
    connections: HashMap<String, ConnectionConfig>,
    reconnect: HashMap<String, ReconnectSettings>,
}

impl StaticConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection, keyed by its `name`
    pub fn with_connection(mut self, config: ConnectionConfig) -> Self {
        self.insert(config);
        self
    }

    pub fn with_reconnect(mut self, name: &str, settings: ReconnectSettings) -> Self {
        self.reconnect.insert(name.to_string(), settings);
        self
    }

    pub fn insert(&mut self, config: ConnectionConfig) {
        self.connections.insert(config.name.clone(), config);
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn connection_config(&self, name: &str) -> Result<ConnectionConfig> {
        check_name(name)?;
        let config = self
            .connections
            .get(name)
            .cloned()
            .ok_or_else(|| RelinkError::NotFound(format!("connection '{}'", name)))?;
        config.validate()?;
        Ok(config)
    }

    fn reconnect_settings(&self, name: &str) -> Option<ReconnectSettings> {
        self.reconnect.get(name).cloned()
    }
}

/// One `[connections.<name>]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionEntry {
    #[serde(default)]
    pub driver: String,
    #[serde(default)]
    pub dsn: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Driver options; non-string TOML values are stored in their TOML form
    #[serde(default)]
    pub options: BTreeMap<String, toml::Value>,
    pub reconnect: Option<ReconnectSettings>,
}

impl ConnectionEntry {
    fn to_config(&self, name: &str) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(&self.driver, name).with_dsn(self.dsn.clone());
        config.username = self.username.clone();
        config.password = self.password.clone();
        for (key, value) in &self.options {
            let value = match value {
                toml::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            config = config.with_option(key, value);
        }
        config
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    connections: BTreeMap<String, ConnectionEntry>,
}

/// Provider backed by a TOML file.
///
/// ```toml
/// [connections.primary]
/// driver = "sqlite"
/// dsn = "/var/lib/app/primary.db"
///
/// [connections.primary.reconnect]
/// max_attempts = 3
/// ```
#[derive(Debug)]
pub struct FileConfigProvider {
    path: Option<PathBuf>,
    file: ConfigFile,
}

impl FileConfigProvider {
    /// Read and parse `path`
    #[tracing::instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut provider = Self::parse(&content)?;
        provider.path = Some(path.to_path_buf());
        tracing::info!(
            connections = provider.file.connections.len(),
            "loaded connection configuration"
        );
        Ok(provider)
    }

    /// Parse TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        Ok(Self { path: None, file })
    }

    /// File this provider was loaded from, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Names of all configured connections, sorted
    pub fn connection_names(&self) -> Vec<&str> {
        self.file.connections.keys().map(String::as_str).collect()
    }

    pub fn entry(&self, name: &str) -> Option<&ConnectionEntry> {
        self.file.connections.get(name)
    }
}

impl ConfigProvider for FileConfigProvider {
    fn connection_config(&self, name: &str) -> Result<ConnectionConfig> {
        check_name(name)?;
        let entry = self
            .entry(name)
            .ok_or_else(|| RelinkError::NotFound(format!("connection '{}'", name)))?;
        let config = entry.to_config(name);
        config.validate()?;
        Ok(config)
    }

    fn reconnect_settings(&self, name: &str) -> Option<ReconnectSettings> {
        self.entry(name).and_then(|entry| entry.reconnect.clone())
    }
}
