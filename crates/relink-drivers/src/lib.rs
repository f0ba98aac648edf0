//! relink drivers - concrete database drivers
//!
//! This crate provides implementations of the driver traits defined in
//! `relink-core`, plus a registry to look them up by name.

#[cfg(feature = "sqlite")]
pub use relink_driver_sqlite as sqlite;

mod registry;

pub use registry::DriverRegistry;

/// Re-export commonly used types from relink-core
pub use relink_core::{
    Connection, ConnectionConfig, DatabaseDriver, PreparedStatement, QueryResult, RelinkError,
    Result, Row, StatementOptions, StatementResult, Value,
};
