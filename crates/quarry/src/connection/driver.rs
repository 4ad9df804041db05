//! Native driver seam.

use crate::config::ConnectionConfig;
use crate::error::QuarryResult;
use crate::grammar::Dialect;
use crate::row::Row;
use crate::value::Value;
use async_trait::async_trait;

/// Result of a statement that returns no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Driver-reported id of the last inserted row, where the backend has one.
    pub last_insert_id: Option<i64>,
}

/// One open native connection.
///
/// `sql` arrives in the driver's native placeholder form; `bindings` are in
/// placeholder order.
#[async_trait]
pub trait Driver: Send {
    fn dialect(&self) -> Dialect;

    async fn query(&mut self, sql: &str, bindings: &[Value]) -> QuarryResult<Vec<Row>>;

    async fn execute(&mut self, sql: &str, bindings: &[Value]) -> QuarryResult<ExecResult>;

    /// Start a native transaction (disable autocommit).
    async fn begin(&mut self) -> QuarryResult<()>;

    async fn commit(&mut self) -> QuarryResult<()>;

    async fn rollback(&mut self) -> QuarryResult<()>;

    /// Ask the server to abandon the statement in flight, after a timeout.
    async fn cancel(&mut self) -> QuarryResult<()> {
        Ok(())
    }

    async fn close(&mut self) -> QuarryResult<()> {
        Ok(())
    }
}

/// Opens [`Driver`]s for one dialect.
#[async_trait]
pub trait Connector: Send + Sync {
    fn dialect(&self) -> Dialect;

    async fn connect(&self, config: &ConnectionConfig) -> QuarryResult<Box<dyn Driver>>;
}
