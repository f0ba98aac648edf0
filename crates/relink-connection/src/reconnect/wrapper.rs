//! Reconnecting connection wrapper with automatic retry
//!
//! This module provides the connection facade applications talk to. Every
//! operation runs through the [`ExecutionGuard`]; prepared statements come
//! from a per-connection [`StatementCache`].

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use relink_core::{
    Connection, ConnectionConfig, DatabaseDriver, PreparedStatement, QueryResult, RelinkError,
    Result, StatementOptions, StatementResult, Value,
};

use super::{ExecutionGuard, ReconnectObserver, ReconnectStrategy, TracingObserver};
use crate::ConnectionHandle;
use crate::statement::{Fingerprint, StatementCache, StatementProxy};

/// Configuration for automatic reconnection behavior
#[derive(Clone)]
pub struct ReconnectConfig {
    strategy: Arc<ReconnectStrategy>,
    observer: Option<Arc<dyn ReconnectObserver>>,
}

impl ReconnectConfig {
    pub fn new(strategy: Arc<ReconnectStrategy>) -> Self {
        Self {
            strategy,
            observer: None,
        }
    }

    /// Report reconnect events to `observer` instead of `tracing`
    pub fn with_observer(mut self, observer: Arc<dyn ReconnectObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn strategy(&self) -> &Arc<ReconnectStrategy> {
        &self.strategy
    }

    pub fn observer(&self) -> Option<&Arc<dyn ReconnectObserver>> {
        self.observer.as_ref()
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::new(Arc::new(ReconnectStrategy::default()))
    }
}

impl std::fmt::Debug for ReconnectConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectConfig")
            .field("strategy", &self.strategy)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

/// State shared between a connection and the statement proxies it hands out.
///
/// Proxies hold it weakly, so dropping the connection releases the cache.
pub(crate) struct Shared {
    pub(crate) handle: ConnectionHandle,
    pub(crate) guard: ExecutionGuard,
    pub(crate) statements: StatementCache,
}

/// A connection that reconnects and retries on connection loss.
///
/// The driver connection is opened lazily on first use. Failures whose
/// message matches the strategy's patterns are retried on a fresh connection,
/// unless a transaction is open, in which case the call fails with
/// [`RelinkError::TransactionLost`].
///
/// # Example
///
/// ```ignore
/// use relink_connection::{ReconnectConfig, ReconnectingConnection};
///
/// let conn = ReconnectingConnection::new(driver, config, ReconnectConfig::default());
///
/// let stmt = conn.prepare("SELECT name FROM users WHERE id = ?", &StatementOptions::new()).await?;
/// let rows = stmt.query(&[Value::Int64(1)]).await?;
/// ```
pub struct ReconnectingConnection {
    shared: Arc<Shared>,
}

impl ReconnectingConnection {
    pub fn new(
        driver: Arc<dyn DatabaseDriver>,
        config: ConnectionConfig,
        reconnect: ReconnectConfig,
    ) -> Self {
        let observer = reconnect
            .observer
            .unwrap_or_else(|| Arc::new(TracingObserver));
        Self {
            shared: Arc::new(Shared {
                handle: ConnectionHandle::new(driver, config),
                guard: ExecutionGuard::new(reconnect.strategy, observer),
                statements: StatementCache::new(),
            }),
        }
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.shared.handle
    }

    pub fn strategy(&self) -> &Arc<ReconnectStrategy> {
        self.shared.guard.strategy()
    }

    /// Run `operation` against the live connection with reconnect-and-retry.
    ///
    /// The operation receives the connection to use for that attempt and may
    /// be invoked more than once. Other calls on this connection wait until
    /// it is done, so it must not call back into `self`.
    pub async fn execute_with_retry<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn(Arc<dyn Connection>) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let handle = &self.shared.handle;
        let operation = &operation;
        self.shared
            .guard
            .run(handle, move || async move {
                let connection = handle.get().await?;
                operation(connection).await
            })
            .await
    }

    /// Prepare `sql`, reusing the cached proxy when there is one.
    #[tracing::instrument(
        skip(self, sql, options),
        fields(sql_preview = %sql.chars().take(100).collect::<String>())
    )]
    pub async fn prepare(
        &self,
        sql: &str,
        options: &StatementOptions,
    ) -> Result<Arc<StatementProxy>> {
        let fingerprint = Fingerprint::compute(sql, options)?;
        if let Some(proxy) = self.shared.statements.get(&fingerprint) {
            tracing::trace!(fingerprint = %fingerprint, "statement cache hit");
            return Ok(proxy);
        }

        let handle = &self.shared.handle;
        let (statement, generation) = self
            .shared
            .guard
            .run(handle, move || async move {
                let (connection, generation) = handle.checkout().await?;
                let statement = connection.prepare(sql, options).await?;
                Ok((statement, generation))
            })
            .await?;

        tracing::debug!(fingerprint = %fingerprint, generation = generation, "statement prepared");
        let proxy = StatementProxy::new(
            sql.to_string(),
            options.clone(),
            fingerprint,
            statement,
            generation,
            Arc::downgrade(&self.shared),
        );
        let cached = self.shared.statements.get_or_insert(Arc::clone(&proxy));
        if !Arc::ptr_eq(&cached, &proxy) {
            // a concurrent prepare of the same statement got there first
            proxy.detach();
        }
        Ok(cached)
    }

    #[tracing::instrument(
        skip(self, sql, params),
        fields(sql_preview = %sql.chars().take(100).collect::<String>())
    )]
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.execute_with_retry(move |connection| async move {
            connection.query(sql, params).await
        })
        .await
    }

    #[tracing::instrument(
        skip(self, sql, params),
        fields(sql_preview = %sql.chars().take(100).collect::<String>())
    )]
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.execute_with_retry(move |connection| async move {
            connection.execute(sql, params).await
        })
        .await
    }

    /// Open a transaction. Until it ends no operation will reconnect.
    pub async fn begin_transaction(&self) -> Result<()> {
        let handle = &self.shared.handle;
        // flag is set before the operation lock is released
        self.shared
            .guard
            .run(handle, move || async move {
                handle.get().await?.begin_transaction().await?;
                handle.mark_transaction_started();
                Ok(())
            })
            .await?;
        tracing::debug!(name = %self.shared.handle.config().name, "transaction started");
        Ok(())
    }

    /// Commit the open transaction. Never retried.
    pub async fn commit(&self) -> Result<()> {
        self.finish_transaction(true).await
    }

    /// Roll back the open transaction. Never retried.
    pub async fn rollback(&self) -> Result<()> {
        self.finish_transaction(false).await
    }

    async fn finish_transaction(&self, commit: bool) -> Result<()> {
        let handle = &self.shared.handle;
        let _exclusive = handle.lock_operations().await;
        let Some(connection) = handle.peek().await else {
            return Err(RelinkError::Query("no active transaction".into()));
        };

        let result = if commit {
            connection.commit().await
        } else {
            connection.rollback().await
        };

        match result {
            Ok(()) => {
                handle.mark_transaction_ended();
                Ok(())
            }
            Err(e) if self.strategy().should_reconnect(&e) => {
                tracing::warn!(
                    error = %e,
                    commit = commit,
                    "connection lost while ending transaction"
                );
                handle.discard().await;
                Err(self.shared.guard.transaction_lost(e))
            }
            Err(e) => Err(e),
        }
    }

    /// Whether a transaction opened through this connection is still open
    pub fn in_transaction(&self) -> bool {
        self.shared.handle.is_in_transaction()
    }

    /// Forget every cached statement, returning how many were dropped.
    ///
    /// Proxies handed out earlier keep working but are no longer returned by
    /// [`prepare`](Self::prepare).
    pub fn clear_statement_cache(&self) -> usize {
        let cleared = self.shared.statements.clear();
        tracing::debug!(cleared = cleared, "statement cache cleared");
        cleared
    }

    pub fn cached_statements(&self) -> usize {
        self.shared.statements.len()
    }

    /// Close the connection for good. Later calls fail without reconnecting.
    pub async fn close(&self) -> Result<()> {
        tracing::info!(name = %self.shared.handle.config().name, "closing reconnecting connection");
        let _exclusive = self.shared.handle.lock_operations().await;
        self.shared.statements.clear();
        self.shared.handle.close().await
    }
}

#[async_trait]
impl Connection for ReconnectingConnection {
    fn driver_name(&self) -> &str {
        &self.shared.handle.config().driver
    }

    async fn prepare(
        &self,
        sql: &str,
        options: &StatementOptions,
    ) -> Result<Arc<dyn PreparedStatement>> {
        let proxy = ReconnectingConnection::prepare(self, sql, options).await?;
        Ok(proxy)
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        ReconnectingConnection::execute(self, sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        ReconnectingConnection::query(self, sql, params).await
    }

    async fn begin_transaction(&self) -> Result<()> {
        ReconnectingConnection::begin_transaction(self).await
    }

    async fn commit(&self) -> Result<()> {
        ReconnectingConnection::commit(self).await
    }

    async fn rollback(&self) -> Result<()> {
        ReconnectingConnection::rollback(self).await
    }

    async fn in_transaction(&self) -> Result<bool> {
        Ok(ReconnectingConnection::in_transaction(self))
    }

    async fn close(&self) -> Result<()> {
        ReconnectingConnection::close(self).await
    }

    fn is_closed(&self) -> bool {
        self.shared.handle.is_closed()
    }
}

impl std::fmt::Debug for ReconnectingConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectingConnection")
            .field("handle", &self.shared.handle)
            .field("cached_statements", &self.cached_statements())
            .finish()
    }
}
