//! Connection and prepared statement traits
//!
//! These are the driver capability the reconnect layer is built on. Every
//! method reports failure through [`RelinkError`](crate::RelinkError); drivers
//! must not signal errors any other way.

use crate::{QueryResult, Result, StatementOptions, StatementResult, Value};
use async_trait::async_trait;
use std::sync::Arc;

/// A database connection
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "sqlite", "postgresql", "mysql")
    fn driver_name(&self) -> &str;

    /// Prepare a statement for repeated execution
    async fn prepare(
        &self,
        sql: &str,
        options: &StatementOptions,
    ) -> Result<Arc<dyn PreparedStatement>>;

    /// Execute a statement that modifies data (INSERT/UPDATE/DELETE)
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Execute a query that returns rows (SELECT)
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Begin a transaction on this connection
    async fn begin_transaction(&self) -> Result<()>;

    /// Commit the open transaction
    async fn commit(&self) -> Result<()>;

    /// Roll back the open transaction
    async fn rollback(&self) -> Result<()>;

    /// Ask the server whether a transaction is open on this connection
    async fn in_transaction(&self) -> Result<bool>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}

/// A prepared statement
#[async_trait]
pub trait PreparedStatement: Send + Sync {
    /// The SQL text this statement was prepared from
    fn sql(&self) -> &str;

    /// Execute the prepared statement with parameters
    async fn execute(&self, params: &[Value]) -> Result<StatementResult>;

    /// Query the prepared statement with parameters
    async fn query(&self, params: &[Value]) -> Result<QueryResult>;

    /// Close/deallocate the prepared statement
    async fn close(&self) -> Result<()>;
}
