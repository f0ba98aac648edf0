//! Retry loop shared by every guarded operation

use std::future::Future;
use std::sync::Arc;

use relink_core::{RelinkError, Result};

use super::{ReconnectEvent, ReconnectObserver, ReconnectStrategy, TracingObserver};
use crate::ConnectionHandle;

/// Runs operations against a [`ConnectionHandle`] with reconnect-and-retry.
///
/// A failure that the strategy does not recognise is returned untouched. A
/// recognised failure while a transaction is open becomes
/// [`RelinkError::TransactionLost`] and the operation is not run again.
/// Otherwise the guard waits, discards the connection and re-runs the
/// operation, up to `max_attempts` times.
#[derive(Clone)]
pub struct ExecutionGuard {
    strategy: Arc<ReconnectStrategy>,
    observer: Arc<dyn ReconnectObserver>,
}

impl ExecutionGuard {
    pub fn new(strategy: Arc<ReconnectStrategy>, observer: Arc<dyn ReconnectObserver>) -> Self {
        Self { strategy, observer }
    }

    /// Guard that reports through [`TracingObserver`]
    pub fn with_tracing(strategy: Arc<ReconnectStrategy>) -> Self {
        Self::new(strategy, Arc::new(TracingObserver))
    }

    pub fn strategy(&self) -> &Arc<ReconnectStrategy> {
        &self.strategy
    }

    /// Run `operation`, retrying on a fresh connection when it fails with a
    /// reconnectable error.
    ///
    /// The operation must fetch its connection from `handle` on every call;
    /// a connection captured before the first call is stale after a retry.
    ///
    /// The handle's operation lock is held until `run` returns, retry waits
    /// included. `operation` must not start another guarded call on the same
    /// handle.
    pub async fn run<T, F, Fut>(&self, handle: &ConnectionHandle, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let _exclusive = handle.lock_operations().await;

        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !self.strategy.should_reconnect(&error) {
            return Err(error);
        }

        let mut cause = self.ensure_no_transaction(handle, error).await?;
        let max_attempts = self.strategy.max_attempts();

        for attempt in 1..=max_attempts {
            let delay = self.strategy.delay(attempt);
            self.emit(ReconnectEvent::Attempting {
                attempt,
                max_attempts,
                delay,
            });

            tokio::time::sleep(delay).await;
            cause = self.ensure_no_transaction(handle, cause).await?;
            handle.discard().await;

            match operation().await {
                Ok(value) => {
                    self.emit(ReconnectEvent::Succeeded {
                        dsn: handle.config().dsn.clone(),
                        error: cause.to_string(),
                        attempts_taken: attempt,
                    });
                    return Ok(value);
                }
                Err(e) if !self.strategy.should_reconnect(&e) => return Err(e),
                Err(e) => {
                    self.emit(ReconnectEvent::Failed {
                        attempt,
                        error: e.to_string(),
                    });
                    cause = e;
                }
            }
        }

        if max_attempts > 0 {
            self.emit(ReconnectEvent::Exhausted {
                total_attempts: max_attempts,
            });
        }
        Err(cause)
    }

    /// Hand `cause` back when a reconnect is safe, or fail with
    /// `TransactionLost` when a transaction is open.
    async fn ensure_no_transaction(
        &self,
        handle: &ConnectionHandle,
        cause: RelinkError,
    ) -> Result<RelinkError> {
        if handle.is_in_transaction() {
            return Err(self.transaction_lost(cause));
        }

        // Covers transactions opened behind our back, e.g. a raw BEGIN.
        if let Some(connection) = handle.peek().await {
            match connection.in_transaction().await {
                Ok(true) => return Err(self.transaction_lost(cause)),
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "transaction check failed, assuming none open");
                }
            }
        }

        Ok(cause)
    }

    pub(crate) fn transaction_lost(&self, cause: RelinkError) -> RelinkError {
        self.emit(ReconnectEvent::TransactionLost {
            error: cause.to_string(),
        });
        RelinkError::transaction_lost(cause)
    }

    fn emit(&self, event: ReconnectEvent) {
        self.observer.on_event(&event);
    }
}

impl std::fmt::Debug for ExecutionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionGuard")
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}
