//! relink core - shared abstractions for the reconnect layer
//!
//! This crate provides the traits and types every other relink crate
//! depends on:
//!
//! - `DatabaseDriver` - Trait for database driver implementations
//! - `Connection` - Trait for database connections
//! - `PreparedStatement` - Trait for driver-level prepared statements
//! - `RelinkError` - The single error channel drivers report through
//! - Common types like `Value`, `Row`, `QueryResult`, `StatementOptions`

mod connection;
mod driver;
mod error;
mod statement;
mod types;

pub use connection::*;
pub use driver::*;
pub use error::*;
pub use statement::*;
pub use types::*;
