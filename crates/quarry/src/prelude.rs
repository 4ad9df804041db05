//! Convenient imports for typical `quarry` usage.
//!
//! ```ignore
//! use quarry::prelude::*;
//! ```

pub use crate::{
    Database, DatabaseConfig, Dialect, Executor, FromRow, FromValue, QuarryError, QuarryResult,
    QueryBuilder, Row, Table, Transaction, Value,
};
pub use crate::{SoftDelete, Timestamps, UuidKey};
