//! Owner of the live connection for one logical database

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use relink_core::{Connection, ConnectionConfig, DatabaseDriver, RelinkError, Result};
use tokio::sync::{Mutex, MutexGuard};

struct Slot {
    connection: Arc<dyn Connection>,
    generation: u64,
}

/// Lazily-connected slot holding at most one driver connection.
///
/// The connection is created on first use and again after every
/// [`discard`](Self::discard). Each new connection gets the next generation
/// number, starting at 1, so callers can tell whether something they prepared
/// earlier belongs to the current connection.
///
/// Guarded operations, including their retry waits, hold the handle's
/// operation lock, so no other operation can see the connection being
/// replaced underneath it.
pub struct ConnectionHandle {
    driver: Arc<dyn DatabaseDriver>,
    config: ConnectionConfig,
    /// Held across `connect` so concurrent callers never open two connections
    slot: Mutex<Option<Slot>>,
    operations: Mutex<()>,
    in_transaction: AtomicBool,
    generations: AtomicU64,
    closed: AtomicBool,
}

impl ConnectionHandle {
    pub fn new(driver: Arc<dyn DatabaseDriver>, config: ConnectionConfig) -> Self {
        Self {
            driver,
            config,
            slot: Mutex::new(None),
            operations: Mutex::new(()),
            in_transaction: AtomicBool::new(false),
            generations: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Wait for any in-flight operation on this handle to finish
    pub(crate) async fn lock_operations(&self) -> MutexGuard<'_, ()> {
        self.operations.lock().await
    }

    /// Get the live connection, connecting first if there is none
    pub async fn get(&self) -> Result<Arc<dyn Connection>> {
        self.checkout().await.map(|(connection, _)| connection)
    }

    /// Like [`get`](Self::get), also returning the connection's generation
    pub(crate) async fn checkout(&self) -> Result<(Arc<dyn Connection>, u64)> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RelinkError::Connection("Connection permanently closed".into()));
        }

        let mut slot = self.slot.lock().await;
        if let Some(live) = slot.as_ref() {
            return Ok((Arc::clone(&live.connection), live.generation));
        }

        let connection = self.driver.connect(&self.config).await?;
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(
            name = %self.config.name,
            driver = %self.config.driver,
            generation = generation,
            "database connection established"
        );

        *slot = Some(Slot {
            connection: Arc::clone(&connection),
            generation,
        });
        Ok((connection, generation))
    }

    /// The live connection, if any, without connecting
    pub async fn peek(&self) -> Option<Arc<dyn Connection>> {
        self.slot
            .lock()
            .await
            .as_ref()
            .map(|live| Arc::clone(&live.connection))
    }

    /// Drop the live connection and clear the transaction flag.
    ///
    /// Closing the old connection is best effort; its error is logged and
    /// otherwise ignored.
    pub async fn discard(&self) {
        let old = self.slot.lock().await.take();
        self.in_transaction.store(false, Ordering::SeqCst);

        if let Some(old) = old {
            tracing::debug!(
                name = %self.config.name,
                generation = old.generation,
                "discarding database connection"
            );
            if let Err(e) = old.connection.close().await {
                tracing::debug!(error = %e, "error closing discarded connection");
            }
        }
    }

    /// Close the live connection and refuse to reconnect afterwards
    pub async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.in_transaction.store(false, Ordering::SeqCst);
        let old = self.slot.lock().await.take();
        match old {
            Some(old) => old.connection.close().await,
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::SeqCst)
    }

    /// Record that a transaction was opened on the live connection
    pub fn mark_transaction_started(&self) {
        self.in_transaction.store(true, Ordering::SeqCst);
    }

    /// Record that the open transaction was committed or rolled back
    pub fn mark_transaction_ended(&self) {
        self.in_transaction.store(false, Ordering::SeqCst);
    }

    /// Generation of the most recently created connection (0 = never connected)
    pub fn generation(&self) -> u64 {
        self.generations.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("config", &self.config)
            .field("in_transaction", &self.is_in_transaction())
            .field("generation", &self.generation())
            .field("closed", &self.is_closed())
            .finish()
    }
}
