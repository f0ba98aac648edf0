//! SQLite database driver implementation

mod connection;
mod driver;

#[cfg(test)]
mod driver_tests;

pub use connection::{CLOSED_MESSAGE, SqliteConnection, SqliteStatement};
pub use driver::SqliteDriver;
