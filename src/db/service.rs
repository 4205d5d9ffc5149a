use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::error::{BackendError, DbError};
use super::table::Table;

/// One result row, column name to value.
pub type Row = serde_json::Map<String, Value>;

#[allow(clippy::expect_used)]
static TABLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("table name regex should be valid"));

#[allow(clippy::expect_used)]
static COLUMN_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("column name regex should be valid")
});

fn check(re: &Regex, name: &str) -> Result<(), DbError> {
    if re.is_match(name) {
        Ok(())
    } else {
        Err(DbError::InvalidIdentifier(name.to_string()))
    }
}

pub(crate) fn check_table(name: &str) -> Result<(), DbError> {
    check(&TABLE_NAME, name)
}

/// Plain or dotted (`table.column`) column name.
pub(crate) fn check_column(name: &str) -> Result<(), DbError> {
    check(&COLUMN_NAME, name)
}

/// A relational store reached with `?`-placeholder statements.
pub trait Connection {
    /// Run a statement returning rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, BackendError>;
    /// Run a statement returning the number of affected rows.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, BackendError>;
}

impl<C: Connection + ?Sized> Connection for Rc<C> {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, BackendError> {
        (**self).query(sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, BackendError> {
        (**self).execute(sql, params)
    }
}

/// Statement counters, shareable between services and a metrics reader.
#[derive(Debug, Default)]
pub struct QueryStats {
    queries: AtomicU64,
    statements: AtomicU64,
}

impl QueryStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    fn record_statement(&self) {
        self.statements.fetch_add(1, Ordering::Relaxed);
    }

    /// Row-returning statements run so far.
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    /// Write statements run so far.
    pub fn statements(&self) -> u64 {
        self.statements.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.queries() + self.statements()
    }

    pub fn reset(&self) {
        self.queries.store(0, Ordering::Relaxed);
        self.statements.store(0, Ordering::Relaxed);
    }
}

/// Entry point to the store: raw statements and [`Table`] builders.
///
/// Cheap to clone; clones share the connection and the counters. Not
/// `Send`: create one per request.
#[derive(Clone)]
pub struct DatabaseService {
    conn: Rc<dyn Connection>,
    stats: Arc<QueryStats>,
}

impl DatabaseService {
    pub fn new(conn: impl Connection + 'static) -> Self {
        Self::with_stats(conn, Arc::new(QueryStats::new()))
    }

    pub fn with_stats(conn: impl Connection + 'static, stats: Arc<QueryStats>) -> Self {
        Self {
            conn: Rc::new(conn),
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<QueryStats> {
        &self.stats
    }

    /// Builder over `name`.
    ///
    /// # Errors
    ///
    /// [`DbError::InvalidIdentifier`].
    pub fn table(&self, name: &str) -> Result<Table, DbError> {
        check_table(name)?;
        Ok(Table::new(self.clone(), name))
    }

    /// Run a row-returning statement.
    ///
    /// # Errors
    ///
    /// [`DbError::Backend`].
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        debug!(sql = %sql, params = params.len(), "Running query");
        self.stats.record_query();
        self.conn.query(sql, params).map_err(|source| DbError::Backend {
            sql: sql.to_string(),
            source,
        })
    }

    /// Run a write statement.
    ///
    /// # Errors
    ///
    /// [`DbError::Backend`].
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        debug!(sql = %sql, params = params.len(), "Running statement");
        self.stats.record_statement();
        self.conn.execute(sql, params).map_err(|source| DbError::Backend {
            sql: sql.to_string(),
            source,
        })
    }
}

impl fmt::Debug for DatabaseService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseService")
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
