//! SQLite connection implementation

use async_trait::async_trait;
use parking_lot::Mutex;
use relink_core::{
    ColumnMeta, Connection, ConnectionConfig, PreparedStatement, QueryResult, RelinkError, Result,
    Row, StatementOptions, StatementResult, Value,
};
use rusqlite::{Connection as RusqliteConnection, OpenFlags, params_from_iter};
use std::sync::Arc;
use std::time::Duration;

/// Message reported for any call made after `close()`.
pub const CLOSED_MESSAGE: &str = "SQLite connection is closed";

type SharedConnection = Arc<Mutex<Option<RusqliteConnection>>>;

/// SQLite connection wrapper
pub struct SqliteConnection {
    conn: SharedConnection,
}

impl SqliteConnection {
    /// Open a SQLite database
    pub fn open(path: &str) -> Result<Self> {
        tracing::info!(path = %path, "opening SQLite database");
        let expanded_path = Self::expand_path(path)?;

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = if path == ":memory:" {
            RusqliteConnection::open_in_memory().map_err(|e| {
                RelinkError::Connection(format!("Failed to open in-memory database: {}", e))
            })?
        } else {
            if !expanded_path.starts_with("file:") {
                let file_path = std::path::Path::new(&expanded_path);
                if let Some(parent) = file_path.parent() {
                    if !parent.exists() {
                        return Err(RelinkError::Connection(format!(
                            "Parent directory does not exist: {}",
                            parent.display()
                        )));
                    }
                }
            }

            RusqliteConnection::open_with_flags(&expanded_path, flags).map_err(|e| {
                RelinkError::Connection(format!(
                    "Failed to open SQLite database at '{}': {}",
                    expanded_path, e
                ))
            })?
        };

        conn.pragma_update(None, "foreign_keys", "ON").map_err(|e| {
            RelinkError::Connection(format!("Failed to enable foreign keys: {}", e))
        })?;

        tracing::info!(path = %expanded_path, "SQLite database connection established");
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Open the database described by `config`, applying driver options
    pub fn open_with_config(config: &ConnectionConfig) -> Result<Self> {
        let connection = Self::open(&config.dsn)?;

        if let Some(raw) = config.option("busy_timeout_ms") {
            let millis: u64 = raw.parse().map_err(|_| {
                RelinkError::Configuration(format!(
                    "busy_timeout_ms must be an integer, got '{}'",
                    raw
                ))
            })?;
            connection.with_conn(|conn| {
                conn.busy_timeout(Duration::from_millis(millis)).map_err(|e| {
                    RelinkError::Connection(format!("Failed to set busy timeout: {}", e))
                })
            })?;
        }

        Ok(connection)
    }

    /// Expand path to handle ~ (home directory) and relative paths
    fn expand_path(path: &str) -> Result<String> {
        if path == ":memory:" || path.starts_with("file:") {
            return Ok(path.to_string());
        }

        let expanded = if let Some(rest) = path.strip_prefix("~/") {
            match std::env::var_os("HOME") {
                Some(home) => std::path::PathBuf::from(home)
                    .join(rest)
                    .to_string_lossy()
                    .to_string(),
                None => {
                    return Err(RelinkError::Configuration(
                        "Unable to determine HOME directory".into(),
                    ));
                }
            }
        } else if path.starts_with('~') {
            return Err(RelinkError::Configuration(
                "User-specific home directories (~user) are not supported".into(),
            ));
        } else {
            path.to_string()
        };

        let path_buf = std::path::PathBuf::from(&expanded);
        let result = if path_buf.is_relative() {
            std::env::current_dir()?
                .join(path_buf)
                .to_string_lossy()
                .to_string()
        } else {
            expanded
        };

        Ok(result)
    }

    fn with_conn<T>(&self, f: impl FnOnce(&RusqliteConnection) -> Result<T>) -> Result<T> {
        with_open(&self.conn, f)
    }
}

fn with_open<T>(
    shared: &SharedConnection,
    f: impl FnOnce(&RusqliteConnection) -> Result<T>,
) -> Result<T> {
    let guard = shared.lock();
    match guard.as_ref() {
        Some(conn) => f(conn),
        None => Err(RelinkError::Connection(CLOSED_MESSAGE.into())),
    }
}

fn run_execute(conn: &RusqliteConnection, sql: &str, params: &[Value]) -> Result<StatementResult> {
    let rusqlite_params = values_to_rusqlite(params);
    let mut stmt = conn
        .prepare_cached(sql)
        .map_err(|e| RelinkError::Query(format!("Failed to prepare statement: {}", e)))?;

    let rows_affected = stmt
        .execute(params_from_iter(rusqlite_params.iter()))
        .map_err(|e| RelinkError::Query(format!("Failed to execute statement: {}", e)))?;

    tracing::debug!(affected_rows = rows_affected, "statement executed");
    Ok(StatementResult {
        affected_rows: rows_affected as u64,
        last_insert_id: Some(conn.last_insert_rowid()),
    })
}

fn run_query(conn: &RusqliteConnection, sql: &str, params: &[Value]) -> Result<QueryResult> {
    let start_time = std::time::Instant::now();
    let rusqlite_params = values_to_rusqlite(params);

    let mut stmt = conn
        .prepare_cached(sql)
        .map_err(|e| RelinkError::Query(format!("Failed to prepare query: {}", e)))?;

    let mut column_names: Vec<String> = Vec::with_capacity(stmt.column_count());
    let mut columns: Vec<ColumnMeta> = Vec::with_capacity(stmt.column_count());
    for col in stmt.columns() {
        let name = col.name().to_string();
        let data_type = col.decl_type().unwrap_or("DYNAMIC").to_string();
        column_names.push(name.clone());
        columns.push(ColumnMeta { name, data_type });
    }

    let mut rows = Vec::new();
    let mut query_rows = stmt
        .query(params_from_iter(rusqlite_params.iter()))
        .map_err(|e| RelinkError::Query(format!("Failed to execute query: {}", e)))?;

    while let Some(row) = query_rows
        .next()
        .map_err(|e| RelinkError::Query(format!("Failed to fetch row: {}", e)))?
    {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(rusqlite_to_value(row, i)?);
        }
        rows.push(Row::new(column_names.clone(), values));
    }

    let execution_time_ms = start_time.elapsed().as_millis() as u64;
    tracing::debug!(
        row_count = rows.len(),
        execution_time_ms = execution_time_ms,
        "query executed successfully"
    );
    Ok(QueryResult { columns, rows })
}

#[async_trait]
impl Connection for SqliteConnection {
    fn driver_name(&self) -> &str {
        "sqlite"
    }

    #[tracing::instrument(
        skip(self, sql, options),
        fields(sql_preview = %sql.chars().take(100).collect::<String>())
    )]
    async fn prepare(
        &self,
        sql: &str,
        options: &StatementOptions,
    ) -> Result<Arc<dyn PreparedStatement>> {
        if !options.is_empty() {
            tracing::debug!(options = ?options, "SQLite ignores statement options");
        }
        self.with_conn(|conn| {
            conn.prepare_cached(sql)
                .map(|_| ())
                .map_err(|e| RelinkError::Query(format!("Failed to prepare statement: {}", e)))
        })?;

        Ok(Arc::new(SqliteStatement {
            conn: Arc::clone(&self.conn),
            sql: sql.to_string(),
        }))
    }

    #[tracing::instrument(
        skip(self, sql, params),
        fields(sql_preview = %sql.chars().take(100).collect::<String>())
    )]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.with_conn(|conn| run_execute(conn, sql, params))
    }

    #[tracing::instrument(
        skip(self, sql, params),
        fields(sql_preview = %sql.chars().take(100).collect::<String>())
    )]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.with_conn(|conn| run_query(conn, sql, params))
    }

    async fn begin_transaction(&self) -> Result<()> {
        tracing::debug!("beginning SQLite transaction");
        // DEFERRED: the write lock is taken on the first write, not at BEGIN.
        self.with_conn(|conn| {
            conn.execute_batch("BEGIN DEFERRED")
                .map_err(|e| RelinkError::Query(format!("Failed to begin transaction: {}", e)))
        })
    }

    async fn commit(&self) -> Result<()> {
        tracing::debug!("committing SQLite transaction");
        self.with_conn(|conn| {
            conn.execute_batch("COMMIT")
                .map_err(|e| RelinkError::Query(format!("Failed to commit transaction: {}", e)))
        })
    }

    async fn rollback(&self) -> Result<()> {
        tracing::debug!("rolling back SQLite transaction");
        self.with_conn(|conn| {
            conn.execute_batch("ROLLBACK")
                .map_err(|e| RelinkError::Query(format!("Failed to rollback transaction: {}", e)))
        })
    }

    async fn in_transaction(&self) -> Result<bool> {
        self.with_conn(|conn| Ok(!conn.is_autocommit()))
    }

    async fn close(&self) -> Result<()> {
        tracing::info!("closing SQLite connection");
        let conn = self.conn.lock().take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| {
                RelinkError::Connection(format!("Failed to close SQLite connection: {}", e))
            })?;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.conn.lock().is_none()
    }
}

/// A statement prepared on a [`SqliteConnection`].
///
/// rusqlite statements borrow their connection, so the compiled statement
/// lives in the connection's statement cache and is looked up by SQL text on
/// each call.
pub struct SqliteStatement {
    conn: SharedConnection,
    sql: String,
}

#[async_trait]
impl PreparedStatement for SqliteStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    async fn execute(&self, params: &[Value]) -> Result<StatementResult> {
        with_open(&self.conn, |conn| run_execute(conn, &self.sql, params))
    }

    async fn query(&self, params: &[Value]) -> Result<QueryResult> {
        with_open(&self.conn, |conn| run_query(conn, &self.sql, params))
    }

    async fn close(&self) -> Result<()> {
        // Evicting one entry is not supported by rusqlite; flushing the whole
        // cache is harmless since other statements re-compile on demand.
        let guard = self.conn.lock();
        if let Some(conn) = guard.as_ref() {
            conn.flush_prepared_statement_cache();
        }
        Ok(())
    }
}

fn values_to_rusqlite(values: &[Value]) -> Vec<rusqlite::types::Value> {
    values.iter().map(value_to_rusqlite).collect()
}

fn value_to_rusqlite(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(i64::from(*b)),
        Value::Int64(i) => rusqlite::types::Value::Integer(*i),
        Value::Float64(f) => rusqlite::types::Value::Real(*f),
        Value::String(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Bytes(b) => rusqlite::types::Value::Blob(b.clone()),
    }
}

fn rusqlite_to_value(row: &rusqlite::Row, idx: usize) -> Result<Value> {
    use rusqlite::types::ValueRef;

    let value_ref = row
        .get_ref(idx)
        .map_err(|e| RelinkError::Query(e.to_string()))?;

    let value = match value_ref {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    };

    Ok(value)
}
