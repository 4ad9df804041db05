//! Generated-key retrieval after INSERT.

use super::driver::{Driver, ExecResult};
use crate::error::QuarryResult;
use crate::grammar::Dialect;
use crate::value::Value;

/// How a dialect reports the key of a freshly inserted row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratedKeys {
    /// The INSERT already carries `RETURNING *`; keys are in the result rows.
    Returning,
    /// The driver reports a last-row id alongside the affected count.
    LastRowId,
    /// A follow-up query on the same connection.
    IdentityQuery(&'static str),
}

impl GeneratedKeys {
    pub fn for_dialect(dialect: Dialect) -> Self {
        match dialect {
            Dialect::Postgres => GeneratedKeys::Returning,
            Dialect::MySql | Dialect::Sqlite => GeneratedKeys::LastRowId,
            Dialect::Mssql => GeneratedKeys::IdentityQuery("SELECT @@Identity AS id"),
        }
    }

    /// Whether the INSERT itself yields rows.
    pub fn returns_rows(&self) -> bool {
        matches!(self, GeneratedKeys::Returning)
    }

    /// Key of the row just inserted through `driver`, if the strategy can
    /// provide one.
    pub(crate) async fn fetch(
        &self,
        driver: &mut dyn Driver,
        result: &ExecResult,
    ) -> QuarryResult<Option<Value>> {
        match self {
            GeneratedKeys::Returning => Ok(None),
            GeneratedKeys::LastRowId => Ok(result
                .last_insert_id
                .filter(|id| *id > 0)
                .map(Value::Int)),
            GeneratedKeys::IdentityQuery(sql) => {
                let rows = driver.query(sql, &[]).await?;
                Ok(rows
                    .first()
                    .and_then(|row| row.get_index(0))
                    .filter(|v| !v.is_null())
                    .cloned())
            }
        }
    }
}
