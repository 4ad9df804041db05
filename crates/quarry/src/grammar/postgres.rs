use super::{quote_with, Dialect, Grammar};
use crate::expr::Lock;

/// PostgreSQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresGrammar;

impl Grammar for PostgresGrammar {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn quote_identifier(&self, ident: &str) -> String {
        quote_with(ident, '"', '"')
    }

    fn bool_literal(&self, value: bool) -> String {
        if value { "true".to_string() } else { "false".to_string() }
    }

    fn native_placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn lock_clause(&self, lock: Lock) -> Option<&'static str> {
        match lock {
            Lock::Update => Some("FOR UPDATE"),
            Lock::Share => Some("FOR SHARE"),
        }
    }

    fn insert_returning(&self) -> Option<&'static str> {
        Some("RETURNING *")
    }
}
