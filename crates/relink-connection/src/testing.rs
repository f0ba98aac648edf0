//! Scripted driver used by the unit tests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use relink_core::{
    Connection, ConnectionConfig, DatabaseDriver, PreparedStatement, QueryResult, RelinkError,
    Result, StatementOptions, StatementResult, Value,
};

use crate::{ReconnectEvent, ReconnectObserver};

pub(crate) type MakeError = fn(String) -> RelinkError;

pub(crate) const LOST: &str =
    "SQLSTATE[HY000]: General error: 2013 Lost connection to MySQL server during query";
pub(crate) const GONE: &str = "MySQL server has gone away";

/// State shared by the driver and every connection it hands out
#[derive(Default)]
pub(crate) struct MockState {
    pub connects: AtomicU32,
    pub connect_failures: AtomicU32,
    /// Calls to execute/query, on connections and statements alike
    pub operations: AtomicU32,
    pub prepares: AtomicU32,
    pub closes: AtomicU32,
    pub in_transaction_fails: AtomicBool,
    failures: Mutex<Vec<(MakeError, String)>>,
    commit_failure: Mutex<Option<(MakeError, String)>>,
}

impl MockState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next operations fail, in order
    pub fn fail_next(&self, make: MakeError, message: &str, times: usize) {
        let mut failures = self.failures.lock();
        for _ in 0..times {
            failures.push((make, message.to_string()));
        }
    }

    pub fn fail_commit(&self, make: MakeError, message: &str) {
        *self.commit_failure.lock() = Some((make, message.to_string()));
    }

    pub fn fail_connects(&self, times: u32) {
        self.connect_failures.store(times, Ordering::SeqCst);
    }

    pub fn operations(&self) -> u32 {
        self.operations.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn prepares(&self) -> u32 {
        self.prepares.load(Ordering::SeqCst)
    }

    fn operation(&self) -> Result<()> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        let mut failures = self.failures.lock();
        if failures.is_empty() {
            return Ok(());
        }
        let (make, message) = failures.remove(0);
        Err(make(message))
    }
}

pub(crate) struct MockDriver {
    state: Arc<MockState>,
}

impl MockDriver {
    pub fn new(state: &Arc<MockState>) -> Arc<Self> {
        Arc::new(Self {
            state: Arc::clone(state),
        })
    }
}

#[async_trait]
impl DatabaseDriver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn connect(&self, _config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        let generation = self.state.connects.fetch_add(1, Ordering::SeqCst) + 1;
        let remaining = self.state.connect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state.connect_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(RelinkError::Connection(
                "could not connect: no connection to the server".into(),
            ));
        }
        Ok(Arc::new(MockConnection {
            generation: generation as i64,
            state: Arc::clone(&self.state),
            in_transaction: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Results carry the connect ordinal of the connection that produced them in
/// `last_insert_id`, so tests can tell which connection served a call.
pub(crate) struct MockConnection {
    generation: i64,
    state: Arc<MockState>,
    in_transaction: AtomicBool,
    closed: AtomicBool,
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn prepare(
        &self,
        sql: &str,
        _options: &StatementOptions,
    ) -> Result<Arc<dyn PreparedStatement>> {
        self.state.prepares.fetch_add(1, Ordering::SeqCst);
        // lets a concurrent caller interleave, as a network round trip would
        tokio::task::yield_now().await;
        Ok(Arc::new(MockStatement {
            sql: sql.to_string(),
            generation: self.generation,
            state: Arc::clone(&self.state),
        }))
    }

    async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<StatementResult> {
        self.state.operation()?;
        Ok(StatementResult {
            affected_rows: 1,
            last_insert_id: Some(self.generation),
        })
    }

    async fn query(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
        self.state.operation()?;
        Ok(QueryResult::empty())
    }

    async fn begin_transaction(&self) -> Result<()> {
        self.state.operation()?;
        self.in_transaction.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        if let Some((make, message)) = self.state.commit_failure.lock().take() {
            return Err(make(message));
        }
        self.in_transaction.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.in_transaction.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn in_transaction(&self) -> Result<bool> {
        if self.state.in_transaction_fails.load(Ordering::SeqCst) {
            return Err(RelinkError::Connection("status check failed".into()));
        }
        Ok(self.in_transaction.load(Ordering::SeqCst))
    }

    async fn close(&self) -> Result<()> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub(crate) struct MockStatement {
    sql: String,
    generation: i64,
    state: Arc<MockState>,
}

impl MockStatement {
    /// Statement not tied to any driver, for cache-level tests
    pub fn standalone(sql: &str) -> Arc<dyn PreparedStatement> {
        Arc::new(Self {
            sql: sql.to_string(),
            generation: 0,
            state: MockState::new(),
        })
    }
}

#[async_trait]
impl PreparedStatement for MockStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    async fn execute(&self, _params: &[Value]) -> Result<StatementResult> {
        self.state.operation()?;
        Ok(StatementResult {
            affected_rows: 1,
            last_insert_id: Some(self.generation),
        })
    }

    async fn query(&self, _params: &[Value]) -> Result<QueryResult> {
        self.state.operation()?;
        Ok(QueryResult::empty())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Observer that keeps every event it sees
#[derive(Default)]
pub(crate) struct RecordingObserver {
    events: Mutex<Vec<ReconnectEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ReconnectEvent> {
        self.events.lock().clone()
    }

    pub fn succeeded(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, ReconnectEvent::Succeeded { .. }))
            .count()
    }
}

impl ReconnectObserver for RecordingObserver {
    fn on_event(&self, event: &ReconnectEvent) {
        self.events.lock().push(event.clone());
    }
}

pub(crate) fn mock_config() -> ConnectionConfig {
    ConnectionConfig::new("mock", "primary").with_dsn("mock://db.internal/app")
}
