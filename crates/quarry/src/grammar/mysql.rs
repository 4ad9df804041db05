use super::{quote_with, Dialect, Grammar};
use crate::expr::Lock;

/// MySQL / MariaDB.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlGrammar;

impl Grammar for MySqlGrammar {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn quote_identifier(&self, ident: &str) -> String {
        quote_with(ident, '`', '`')
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            (Some(l), Some(o)) => Some(format!("LIMIT {l} OFFSET {o}")),
            (Some(l), None) => Some(format!("LIMIT {l}")),
            // MySQL has no bare OFFSET; use the documented "all rows" limit.
            (None, Some(o)) => Some(format!("LIMIT 18446744073709551615 OFFSET {o}")),
            (None, None) => None,
        }
    }

    fn lock_clause(&self, lock: Lock) -> Option<&'static str> {
        match lock {
            Lock::Update => Some("FOR UPDATE"),
            Lock::Share => Some("LOCK IN SHARE MODE"),
        }
    }
}
