use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::RwLock;
use relink_core::{
    PreparedStatement, QueryResult, RelinkError, Result, StatementOptions, StatementResult, Value,
};

use super::Fingerprint;
use crate::reconnect::Shared;

struct Bound {
    statement: Arc<dyn PreparedStatement>,
    generation: u64,
}

/// Stable handle to a prepared statement.
///
/// The driver statement underneath is tied to one connection. When the
/// connection is replaced the proxy prepares its SQL again on the new one and
/// swaps the statement in place, so callers holding the proxy never notice.
pub struct StatementProxy {
    sql: String,
    options: StatementOptions,
    fingerprint: Fingerprint,
    bound: RwLock<Bound>,
    /// Set once the proxy leaves the cache; it never goes back in
    detached: AtomicBool,
    owner: Weak<Shared>,
    me: Weak<StatementProxy>,
}

impl StatementProxy {
    pub(crate) fn new(
        sql: String,
        options: StatementOptions,
        fingerprint: Fingerprint,
        statement: Arc<dyn PreparedStatement>,
        generation: u64,
        owner: Weak<Shared>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            sql,
            options,
            fingerprint,
            bound: RwLock::new(Bound {
                statement,
                generation,
            }),
            detached: AtomicBool::new(false),
            owner,
            me: me.clone(),
        })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn options(&self) -> &StatementOptions {
        &self.options
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Connection generation the current statement was prepared against
    pub fn generation(&self) -> u64 {
        self.bound.read().generation
    }

    /// The driver statement currently bound to this proxy
    pub fn statement(&self) -> Arc<dyn PreparedStatement> {
        Arc::clone(&self.bound.read().statement)
    }

    /// Whether the proxy was dropped from its cache by a clear or close.
    ///
    /// A detached proxy keeps working on its own but is never returned by
    /// `prepare` again.
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    pub(crate) fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }

    /// Execute with reconnect-and-retry
    #[tracing::instrument(skip(self, params), fields(fingerprint = %self.fingerprint))]
    pub async fn execute(&self, params: &[Value]) -> Result<StatementResult> {
        let shared = self.shared()?;
        let shared = &*shared;
        shared
            .guard
            .run(&shared.handle, move || async move {
                let statement = self.current_statement(shared).await?;
                statement.execute(params).await
            })
            .await
    }

    /// Query with reconnect-and-retry
    #[tracing::instrument(skip(self, params), fields(fingerprint = %self.fingerprint))]
    pub async fn query(&self, params: &[Value]) -> Result<QueryResult> {
        let shared = self.shared()?;
        let shared = &*shared;
        shared
            .guard
            .run(&shared.handle, move || async move {
                let statement = self.current_statement(shared).await?;
                statement.query(params).await
            })
            .await
    }

    /// Close the driver statement and leave the cache.
    pub async fn close(&self) -> Result<()> {
        let statement = self.statement();
        if let Some(shared) = self.owner.upgrade() {
            shared.statements.remove(self);
        }
        statement.close().await
    }

    fn shared(&self) -> Result<Arc<Shared>> {
        self.owner.upgrade().ok_or_else(|| {
            RelinkError::Connection("statement outlived its connection".into())
        })
    }

    /// The statement for the live connection, preparing it again if the
    /// connection changed since it was last bound.
    async fn current_statement(&self, shared: &Shared) -> Result<Arc<dyn PreparedStatement>> {
        let (connection, generation) = shared.handle.checkout().await?;
        {
            let bound = self.bound.read();
            if bound.generation == generation {
                return Ok(Arc::clone(&bound.statement));
            }
        }

        tracing::debug!(
            fingerprint = %self.fingerprint,
            generation = generation,
            "re-preparing statement on new connection"
        );
        let statement = connection.prepare(&self.sql, &self.options).await?;
        *self.bound.write() = Bound {
            statement: Arc::clone(&statement),
            generation,
        };

        if let Some(me) = self.me.upgrade() {
            shared.statements.reregister(&me);
        }
        Ok(statement)
    }
}

#[async_trait]
impl PreparedStatement for StatementProxy {
    fn sql(&self) -> &str {
        &self.sql
    }

    async fn execute(&self, params: &[Value]) -> Result<StatementResult> {
        StatementProxy::execute(self, params).await
    }

    async fn query(&self, params: &[Value]) -> Result<QueryResult> {
        StatementProxy::query(self, params).await
    }

    async fn close(&self) -> Result<()> {
        StatementProxy::close(self).await
    }
}

impl std::fmt::Debug for StatementProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementProxy")
            .field("sql", &self.sql)
            .field("options", &self.options)
            .field("fingerprint", &self.fingerprint)
            .field("generation", &self.generation())
            .field("detached", &self.is_detached())
            .finish()
    }
}
