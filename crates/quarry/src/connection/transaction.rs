//! Explicit transaction handles and the `transaction!` macros.
//!
//! [`Database::begin`](super::Database::begin) opens a connection and returns
//! a [`Transaction`]. Every builder executed through that handle runs on the
//! same connection. Nested `begin`/`commit` pairs only move the nesting
//! counter; the outermost pair reaches the driver.
//!
//! # Example
//!
//! ```ignore
//! use quarry::{Database, QuarryResult};
//!
//! # async fn demo(db: &Database) -> QuarryResult<()> {
//! quarry::transaction!(db, tx, {
//!     tx.table("accounts").where_eq("id", 1).decrement(&tx, "balance", 100).await?;
//!     tx.table("accounts").where_eq("id", 2).increment(&tx, "balance", 100).await?;
//!     Ok(())
//! })?;
//! # Ok(()) }
//! ```

use super::{Connection, Executor, Outcome};
use crate::builder::QueryBuilder;
use crate::error::{QuarryError, QuarryResult};
use crate::grammar::{CompiledQuery, Dialect};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Runs the given block inside a transaction on the default connection.
///
/// - Begins via `$db.begin(None).await`.
/// - Commits on `Ok(_)`.
/// - Rolls back on `Err(_)`.
///
/// The block must evaluate to `quarry::QuarryResult<T>`.
#[macro_export]
macro_rules! transaction {
    ($db:expr, $tx:ident, $body:block) => {{
        let $tx = ($db).begin(None).await?;
        $crate::__finish_transaction!($tx, $body)
    }};
}

/// Like [`transaction!`], on a named connection.
#[macro_export]
macro_rules! transaction_on {
    ($db:expr, $name:expr, $tx:ident, $body:block) => {{
        let $tx = ($db).begin(Some($name)).await?;
        $crate::__finish_transaction!($tx, $body)
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __finish_transaction {
    ($tx:ident, $body:block) => {{
        let __quarry_tx_body_result = async { $body }.await;
        match __quarry_tx_body_result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(error) => match $tx.rollback().await {
                Ok(()) => Err(error),
                Err(rollback_err) => Err($crate::QuarryError::execution(format!(
                    "{error} (rollback failed: {rollback_err})"
                ))),
            },
        }
    }};
}

/// Handle to a connection with an open transaction.
///
/// Cheap to clone; clones share the connection and its nesting counter.
#[derive(Clone)]
pub struct Transaction {
    connection: Arc<Mutex<Connection>>,
    name: String,
    dialect: Dialect,
    prefix: String,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("connection", &self.name)
            .field("dialect", &self.dialect)
            .finish()
    }
}

impl Transaction {
    pub(crate) async fn start(mut connection: Connection, prefix: String) -> QuarryResult<Self> {
        if let Err(e) = connection.begin().await {
            if let Err(close_err) = connection.close().await {
                tracing::warn!(target: "quarry.tx", connection = %connection.name(), error = %close_err, "closing connection after failed begin failed");
            }
            return Err(e);
        }
        Ok(Self {
            name: connection.name().to_string(),
            dialect: connection.dialect(),
            connection: Arc::new(Mutex::new(connection)),
            prefix,
        })
    }

    /// Logical connection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Builder bound to this transaction's connection settings.
    pub fn table(&self, table: &str) -> QueryBuilder {
        QueryBuilder::table(self.dialect, table).prefix(self.prefix.clone())
    }

    /// Nested begin; only bumps the counter.
    pub async fn begin(&self) -> QuarryResult<()> {
        self.connection.lock().await.begin().await
    }

    pub async fn commit(&self) -> QuarryResult<()> {
        self.connection.lock().await.commit().await
    }

    pub async fn rollback(&self) -> QuarryResult<()> {
        self.connection.lock().await.rollback().await
    }

    pub async fn depth(&self) -> usize {
        self.connection.lock().await.depth()
    }

    pub async fn in_transaction(&self) -> bool {
        self.connection.lock().await.in_transaction()
    }

    fn check_connection(&self, connection: Option<&str>) -> QuarryResult<()> {
        match connection {
            Some(name) if name != self.name => Err(QuarryError::usage(format!(
                "query targets connection '{name}' but the transaction is on '{}'",
                self.name
            ))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Executor for Transaction {
    fn dialect(&self, connection: Option<&str>) -> QuarryResult<Dialect> {
        self.check_connection(connection)?;
        Ok(self.dialect)
    }

    async fn run(
        &self,
        connection: Option<&str>,
        query: &CompiledQuery,
        timeout: Option<Duration>,
    ) -> QuarryResult<Outcome> {
        self.check_connection(connection)?;
        let mut conn = self.connection.lock().await;
        conn.execute(query, timeout).await
    }
}
