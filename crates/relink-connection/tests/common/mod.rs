//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::sync::{Arc, Once};

use parking_lot::Mutex;
use relink_connection::{
    ReconnectConfig, ReconnectEvent, ReconnectObserver, ReconnectStrategy, ReconnectingConnection,
};
use relink_core::ConnectionConfig;
use relink_drivers::sqlite::SqliteDriver;
use tempfile::TempDir;

static INIT: Once = Once::new();

/// Message the SQLite driver reports once its connection is closed
pub const SQLITE_CLOSED: &str = "connection is closed";

/// Install a test subscriber once per process (`RUST_LOG` controls the level)
pub fn initialize_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("relink_connection=debug".parse().unwrap()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A file-backed database that survives reconnects
pub struct TestDatabase {
    pub dir: TempDir,
    pub config: ConnectionConfig,
}

impl TestDatabase {
    pub fn new() -> Self {
        initialize_logging();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relink.db");
        let config = ConnectionConfig::new_sqlite("primary", &path.to_string_lossy());
        Self { dir, config }
    }

    /// Connection whose strategy treats a closed SQLite handle as a lost connection
    pub fn connect(
        &self,
        max_attempts: u32,
        observer: Arc<RecordingObserver>,
    ) -> ReconnectingConnection {
        let strategy = ReconnectStrategy::new()
            .with_max_attempts(max_attempts)
            .with_base_delay_ms(1);
        strategy.add_pattern(SQLITE_CLOSED);
        ReconnectingConnection::new(
            Arc::new(SqliteDriver::new()),
            self.config.clone(),
            ReconnectConfig::new(Arc::new(strategy)).with_observer(observer),
        )
    }
}

/// Simulate the server dropping the connection
pub async fn kill_connection(conn: &ReconnectingConnection) {
    if let Some(live) = conn.handle().peek().await {
        live.close().await.unwrap();
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ReconnectEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ReconnectEvent> {
        self.events.lock().clone()
    }

    pub fn reconnects(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, ReconnectEvent::Succeeded { .. }))
            .count()
    }
}

impl ReconnectObserver for RecordingObserver {
    fn on_event(&self, event: &ReconnectEvent) {
        self.events.lock().push(event.clone());
    }
}
