use super::{quote_with, Dialect, Grammar};

/// SQLite. Row locks are not supported and render nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteGrammar;

impl Grammar for SqliteGrammar {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn quote_identifier(&self, ident: &str) -> String {
        quote_with(ident, '"', '"')
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            (Some(l), Some(o)) => Some(format!("LIMIT {l} OFFSET {o}")),
            (Some(l), None) => Some(format!("LIMIT {l}")),
            // OFFSET is only valid after a LIMIT; -1 means unbounded.
            (None, Some(o)) => Some(format!("LIMIT -1 OFFSET {o}")),
            (None, None) => None,
        }
    }
}
