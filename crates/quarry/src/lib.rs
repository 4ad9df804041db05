//! # quarry
//!
//! A dialect-independent query builder and SQL compiler for MySQL, Postgres,
//! SQLite and MSSQL, with a small async connection layer.
//!
//! ## Features
//!
//! - **One builder, four dialects**: the same [`QueryBuilder`] chain renders
//!   backtick, double-quote or bracket SQL depending on the connection
//! - **Two compile modes**: `to_sql()` for logs and assertions, `to_qmark()`
//!   for `?` SQL plus bindings in placeholder order
//! - **Explicit transactions**: `begin()` returns a handle; nested
//!   begin/commit pairs collapse into the outermost one
//! - **Scopes**: soft deletes, timestamps and UUID keys applied at compile time
//! - **Safe defaults**: builder errors surface before any I/O, DELETE requires
//!   WHERE
//!
//! ## Building SQL
//!
//! ```rust
//! use quarry::{Dialect, QueryBuilder};
//!
//! let sql = QueryBuilder::table(Dialect::MySql, "users")
//!     .select(["username", "password"])
//!     .where_eq("id", 1)
//!     .to_sql()
//!     .unwrap();
//! assert_eq!(
//!     sql,
//!     "SELECT `users`.`username`, `users`.`password` FROM `users` WHERE `users`.`id` = '1'"
//! );
//! ```
//!
//! ## Executing
//!
//! ```ignore
//! use quarry::{Database, DatabaseConfig};
//!
//! let db = Database::new(DatabaseConfig::from_path("database.toml")?)?;
//!
//! let active = db.table("users").where_eq("active", true).get(&db).await?;
//!
//! quarry::transaction!(db, tx, {
//!     tx.table("accounts").where_eq("id", 1).decrement(&tx, "balance", 100).await?;
//!     tx.table("accounts").where_eq("id", 2).increment(&tx, "balance", 100).await?;
//!     Ok(())
//! })?;
//! ```

pub mod builder;
pub mod config;
pub mod connection;
pub mod error;
pub mod expr;
pub mod grammar;
pub mod prelude;
pub mod row;
pub mod scope;
pub mod value;

pub use builder::{new_query, QueryBuilder, Table};
pub use config::{ConnectionConfig, DatabaseConfig};
pub use connection::{
    Connection, ConnectionPool, Database, Driver, ExecResult, Executor, GeneratedKeys, Outcome,
    PoolStats, PooledConnection, Transaction, WorkerId,
};
pub use error::{QuarryError, QuarryResult};
pub use expr::{
    Aggregate, Connector, Direction, JoinClause, JoinKind, Lock, Operator, WhereExpr,
};
pub use grammar::{Action, CompiledQuery, Dialect, Grammar, Mode};
pub use row::{FromRow, Row};
pub use scope::{Scope, SoftDelete, Timestamps, UuidKey};
pub use value::{FromValue, Value};
