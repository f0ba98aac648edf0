//! Reconnect notifications

use std::time::Duration;

/// Reconnection event for monitoring
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectEvent {
    /// A retry is about to wait `delay` and reconnect
    Attempting {
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
    },
    /// An operation succeeded on a fresh connection.
    ///
    /// Emitted exactly once per successful reconnect. `error` is the failure
    /// that triggered it.
    Succeeded {
        dsn: String,
        error: String,
        attempts_taken: u32,
    },
    /// A retry failed with another reconnectable error
    Failed { attempt: u32, error: String },
    /// All retries used up
    Exhausted { total_attempts: u32 },
    /// A reconnect was refused because a transaction was open
    TransactionLost { error: String },
}

/// Receives reconnect events.
///
/// Observers are called inline on the task running the operation and must not
/// block.
pub trait ReconnectObserver: Send + Sync {
    fn on_event(&self, event: &ReconnectEvent);
}

/// Default observer: forwards every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ReconnectObserver for TracingObserver {
    fn on_event(&self, event: &ReconnectEvent) {
        match event {
            ReconnectEvent::Succeeded {
                dsn,
                error,
                attempts_taken,
            } => {
                tracing::warn!(
                    dsn = %dsn,
                    error = %error,
                    attempts_taken = attempts_taken,
                    "reconnected to database"
                );
            }
            ReconnectEvent::Attempting {
                attempt,
                max_attempts,
                delay,
            } => {
                tracing::debug!(
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "reconnect attempt starting"
                );
            }
            ReconnectEvent::Failed { attempt, error } => {
                tracing::debug!(attempt = attempt, error = %error, "reconnect attempt failed");
            }
            ReconnectEvent::Exhausted { total_attempts } => {
                tracing::debug!(total_attempts = total_attempts, "reconnect attempts exhausted");
            }
            ReconnectEvent::TransactionLost { error } => {
                tracing::debug!(error = %error, "refusing to reconnect inside a transaction");
            }
        }
    }
}
