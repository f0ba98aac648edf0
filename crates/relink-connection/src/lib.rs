//! relink connection - reconnect and retry for database connections
//!
//! This crate wraps a driver connection so that transient connection loss is
//! hidden from the caller:
//!
//! - `ReconnectStrategy` decides which errors are worth a reconnect and how
//!   long to wait between attempts
//! - `ConnectionHandle` owns the live connection and the transaction flag
//! - `ExecutionGuard` runs an operation with reconnect-and-retry semantics and
//!   refuses to reconnect inside an open transaction
//! - `StatementCache` / `StatementProxy` keep prepared statements alive across
//!   reconnects
//! - `ReconnectingConnection` ties all of the above together
//! - `ConnectionManager` maps logical connection names to shared handles

mod config;
mod handle;
mod manager;
pub mod reconnect;
pub mod statement;

#[cfg(test)]
mod testing;

pub use config::{
    ConfigProvider, ConnectionEntry, FileConfigProvider, ReconnectSettings, StaticConfigProvider,
};
pub use handle::ConnectionHandle;
pub use manager::ConnectionManager;
pub use reconnect::{
    DEFAULT_PATTERNS, ExecutionGuard, ReconnectConfig, ReconnectEvent, ReconnectObserver,
    ReconnectStrategy, ReconnectingConnection, TracingObserver,
};
pub use statement::{Fingerprint, StatementCache, StatementProxy};
