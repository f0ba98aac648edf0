//! Auto-reconnect functionality for database connections
//!
//! This module decides when a failed operation may be retried on a fresh
//! connection, waits according to an exponential schedule, and refuses to
//! reconnect while a transaction is open.
//!
//! # Example
//!
//! ```ignore
//! use relink_connection::reconnect::{ReconnectConfig, ReconnectStrategy, ReconnectingConnection};
//!
//! let strategy = ReconnectStrategy::new().with_max_attempts(3);
//! let reconnect = ReconnectConfig::new(Arc::new(strategy));
//! let conn = ReconnectingConnection::new(driver, config, reconnect);
//!
//! // Operations will automatically retry on connection loss
//! let result = conn.query("SELECT 1", &[]).await?;
//! ```

mod events;
mod guard;
mod strategy;
mod wrapper;


pub use events::{ReconnectEvent, ReconnectObserver, TracingObserver};
pub use guard::ExecutionGuard;
pub use strategy::{DEFAULT_PATTERNS, ReconnectStrategy};
pub use wrapper::{ReconnectConfig, ReconnectingConnection};

pub(crate) use wrapper::Shared;
