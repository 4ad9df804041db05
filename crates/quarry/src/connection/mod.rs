//! Connections, transactions and execution.
//!
//! A [`Connection`] wraps one native [`Driver`] handle plus a transaction
//! nesting counter. Only the outermost `begin`/`commit`/`rollback` reach the
//! driver; nested pairs collapse into it.
//!
//! Statements run through an [`Executor`]:
//!
//! - [`Database`]: opens a connection, runs one statement, closes it
//! - [`Transaction`]: an explicit handle returned by [`Database::begin`];
//!   every builder executed through it shares the same connection
//! - [`PooledConnection`]: a worker-keyed connection checked out from a
//!   [`ConnectionPool`]
//!
//! There is no global name-keyed registry: a transaction is only joined by
//! passing its handle.

mod driver;
mod keys;
mod manager;
mod pool;
mod transaction;

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use driver::{Connector, Driver, ExecResult};
pub use keys::GeneratedKeys;
pub use manager::Database;
pub use pool::{ConnectionPool, PoolStats, PooledConnection, WorkerId};
pub use transaction::Transaction;

use crate::config::ConnectionConfig;
use crate::error::{QuarryError, QuarryResult};
use crate::grammar::{Action, CompiledQuery, Dialect};
use crate::row::Row;
use crate::value::Value;
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Raw result of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub rows: Vec<Row>,
    pub rows_affected: u64,
    /// Generated key of an INSERT, when the dialect's strategy yields one.
    pub last_insert_id: Option<Value>,
}

/// Anything a builder can execute against.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Dialect of the named (or default) connection.
    fn dialect(&self, connection: Option<&str>) -> QuarryResult<Dialect>;

    /// Run a compiled `?`-form query. `timeout` overrides the connection's
    /// configured deadline.
    async fn run(
        &self,
        connection: Option<&str>,
        query: &CompiledQuery,
        timeout: Option<Duration>,
    ) -> QuarryResult<Outcome>;
}

/// One native handle plus its nesting counter.
pub struct Connection {
    name: String,
    dialect: Dialect,
    driver: Option<Box<dyn Driver>>,
    depth: usize,
    pooled: bool,
    log_queries: bool,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("dialect", &self.dialect)
            .field("open", &self.is_open())
            .field("depth", &self.depth)
            .field("pooled", &self.pooled)
            .finish()
    }
}

impl Connection {
    pub fn new(name: impl Into<String>, config: &ConnectionConfig, driver: Box<dyn Driver>) -> Self {
        let dialect = driver.dialect();
        let connection = Self {
            name: name.into(),
            dialect,
            driver: Some(driver),
            depth: 0,
            pooled: false,
            log_queries: config.log_queries,
            timeout: config.timeout(),
        };
        tracing::debug!(
            target: "quarry.tx",
            connection = %connection.name,
            dialect = %dialect,
            "connection opened"
        );
        connection
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn is_open(&self) -> bool {
        self.driver.is_some()
    }

    /// Current transaction nesting depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn in_transaction(&self) -> bool {
        self.depth > 0
    }

    pub(crate) fn set_pooled(&mut self, pooled: bool) {
        self.pooled = pooled;
    }

    fn closed_error(&self) -> QuarryError {
        QuarryError::usage(format!("connection '{}' is closed", self.name))
    }

    /// Run one compiled statement.
    pub async fn execute(
        &mut self,
        query: &CompiledQuery,
        timeout: Option<Duration>,
    ) -> QuarryResult<Outcome> {
        let sql = query.native_sql();
        let timeout = timeout.or(self.timeout);
        let keys = GeneratedKeys::for_dialect(self.dialect);
        let started = Instant::now();

        let result = {
            let closed = self.closed_error();
            let driver = self.driver.as_deref_mut().ok_or(closed)?;
            match timeout {
                Some(limit) => {
                    let statement =
                        run_statement(&mut *driver, query.action, &sql, &query.bindings, keys);
                    let timed = tokio::time::timeout(limit, statement).await;
                    match timed {
                        Ok(result) => result,
                        Err(_) => {
                            if let Err(e) = driver.cancel().await {
                                tracing::warn!(target: "quarry.sql", error = %e, "cancel after timeout failed");
                            }
                            Err(QuarryError::Timeout(limit))
                        }
                    }
                }
                None => run_statement(driver, query.action, &sql, &query.bindings, keys).await,
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(outcome) if self.log_queries => tracing::debug!(
                target: "quarry.sql",
                connection = %self.name,
                dialect = %self.dialect,
                action = %query.action,
                param_count = query.bindings.len(),
                rows = outcome.rows.len(),
                rows_affected = outcome.rows_affected,
                elapsed_ms,
                sql = %sql,
            ),
            Ok(_) => {}
            Err(e) => tracing::warn!(
                target: "quarry.sql",
                connection = %self.name,
                dialect = %self.dialect,
                action = %query.action,
                elapsed_ms,
                sql = %sql,
                error = %e,
                "statement failed"
            ),
        }
        result
    }

    /// Increment the nesting counter; only 0 -> 1 begins natively.
    pub async fn begin(&mut self) -> QuarryResult<()> {
        if self.depth == 0 {
            let closed = self.closed_error();
            self.driver.as_deref_mut().ok_or(closed)?.begin().await?;
        }
        self.depth += 1;
        tracing::debug!(target: "quarry.tx", connection = %self.name, depth = self.depth, "begin");
        Ok(())
    }

    /// Decrement the nesting counter; only the outermost commit reaches the
    /// driver. A non-pooled connection closes once the counter hits zero.
    pub async fn commit(&mut self) -> QuarryResult<()> {
        self.finish(true).await
    }

    /// Symmetric to [`Connection::commit`].
    pub async fn rollback(&mut self) -> QuarryResult<()> {
        self.finish(false).await
    }

    async fn finish(&mut self, commit: bool) -> QuarryResult<()> {
        let verb = if commit { "commit" } else { "rollback" };
        if self.depth == 0 {
            return Err(QuarryError::usage(format!(
                "{verb} without an open transaction on '{}'",
                self.name
            )));
        }

        self.depth -= 1;
        tracing::debug!(target: "quarry.tx", connection = %self.name, depth = self.depth, "{verb}");
        if self.depth > 0 {
            return Ok(());
        }

        let closed = self.closed_error();
        let driver = self.driver.as_deref_mut().ok_or(closed)?;
        let result = if commit {
            driver.commit().await
        } else {
            driver.rollback().await
        };
        if !self.pooled {
            self.close().await?;
        }
        result
    }

    pub async fn close(&mut self) -> QuarryResult<()> {
        if let Some(mut driver) = self.driver.take() {
            tracing::debug!(target: "quarry.tx", connection = %self.name, "connection closed");
            driver.close().await?;
        }
        Ok(())
    }
}

async fn run_statement(
    driver: &mut dyn Driver,
    action: Action,
    sql: &str,
    bindings: &[Value],
    keys: GeneratedKeys,
) -> QuarryResult<Outcome> {
    let returns_rows = action == Action::Select || (action.is_insert() && keys.returns_rows());
    if returns_rows {
        let rows = driver.query(sql, bindings).await?;
        let rows_affected = if action == Action::Select {
            0
        } else {
            rows.len() as u64
        };
        return Ok(Outcome {
            rows,
            rows_affected,
            last_insert_id: None,
        });
    }

    let result = driver.execute(sql, bindings).await?;
    let last_insert_id = if action == Action::Insert {
        keys.fetch(driver, &result).await?
    } else {
        None
    };
    Ok(Outcome {
        rows: Vec::new(),
        rows_affected: result.rows_affected,
        last_insert_id,
    })
}
