//! SQL grammars: one per dialect, all sharing a single compiler.
//!
//! A [`Grammar`] only answers the questions on which dialects disagree
//! (identifier quoting, booleans, pagination, locks, insert returning,
//! driver placeholders). Everything else lives in the shared compiler, so a
//! clause renders the same way for SELECT, UPDATE and DELETE.
//!
//! Compilation has two modes:
//! - [`Mode::Literal`] inlines every value in single quotes without escaping.
//!   It exists for logging and assertions and is never executed.
//! - [`Mode::Qmark`] emits `?` placeholders and an ordered binding list; it
//!   is the only mode the connection layer runs.

mod compiler;
mod mssql;
mod mysql;
mod postgres;
mod sqlite;


pub use mssql::MssqlGrammar;
pub use mysql::MySqlGrammar;
pub use postgres::PostgresGrammar;
pub use sqlite::SqliteGrammar;

pub(crate) use compiler::compile;

use crate::error::{QuarryError, QuarryResult};
use crate::expr::Lock;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A supported SQL backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    MySql,
    #[default]
    Postgres,
    Sqlite,
    Mssql,
}

static MYSQL: MySqlGrammar = MySqlGrammar;
static POSTGRES: PostgresGrammar = PostgresGrammar;
static SQLITE: SqliteGrammar = SqliteGrammar;
static MSSQL: MssqlGrammar = MssqlGrammar;

impl Dialect {
    /// Resolve a configured driver name (`mysql`, `postgres`, `pgsql`,
    /// `sqlite3`, `sqlserver`, ...).
    pub fn from_driver(driver: &str) -> QuarryResult<Self> {
        match driver.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "postgres" | "postgresql" | "pgsql" => Ok(Dialect::Postgres),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "mssql" | "sqlserver" => Ok(Dialect::Mssql),
            other => Err(QuarryError::configuration(format!(
                "unknown database driver '{other}'"
            ))),
        }
    }

    pub fn grammar(&self) -> &'static dyn Grammar {
        match self {
            Dialect::MySql => &MYSQL,
            Dialect::Postgres => &POSTGRES,
            Dialect::Sqlite => &SQLITE,
            Dialect::Mssql => &MSSQL,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
            Dialect::Mssql => "mssql",
        }
    }

    pub(crate) fn url_scheme(&self) -> &'static str {
        self.name()
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Statement kind being compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    #[default]
    Select,
    Insert,
    BulkCreate,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Select => "select",
            Action::Insert => "insert",
            Action::BulkCreate => "bulk_create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Action::Insert | Action::BulkCreate)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compilation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Values inlined as `'value'`; for logs and tests only.
    Literal,
    /// `?` placeholders plus ordered bindings.
    Qmark,
}

/// Dialect-specific rendering decisions.
pub trait Grammar: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Quote a single identifier segment (no dots).
    fn quote_identifier(&self, ident: &str) -> String;

    /// Literal-mode rendering of a boolean.
    fn bool_literal(&self, value: bool) -> String {
        if value { "'1'".to_string() } else { "'0'".to_string() }
    }

    /// Driver-native placeholder for the 1-based `index`-th binding.
    fn native_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    /// Rendered right after `SELECT [DISTINCT]`, before the column list.
    fn top(&self, _limit: Option<u64>, _offset: Option<u64>) -> Option<String> {
        None
    }

    /// Trailing pagination clause.
    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            (Some(l), Some(o)) => Some(format!("LIMIT {l} OFFSET {o}")),
            (Some(l), None) => Some(format!("LIMIT {l}")),
            (None, Some(o)) => Some(format!("OFFSET {o}")),
            (None, None) => None,
        }
    }

    /// Pagination is only valid with an ORDER BY clause.
    fn offset_requires_order(&self) -> bool {
        false
    }

    fn lock_clause(&self, _lock: Lock) -> Option<&'static str> {
        None
    }

    /// Suffix appended to INSERT statements.
    fn insert_returning(&self) -> Option<&'static str> {
        None
    }
}

/// Quote `ident` with `open`/`close`, doubling any embedded closing quote.
pub(crate) fn quote_with(ident: &str, open: char, close: char) -> String {
    let mut out = String::with_capacity(ident.len() + 2);
    out.push(open);
    for c in ident.chars() {
        if c == close {
            out.push(close);
        }
        out.push(c);
    }
    out.push(close);
    out
}

/// The output of a compile step: SQL text plus the ordered bindings.
///
/// `sql` always uses `?`; call [`CompiledQuery::native_sql`] for the form a
/// driver expects.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub bindings: Vec<Value>,
    pub action: Action,
    pub dialect: Dialect,
}

impl CompiledQuery {
    /// Number of `?` placeholders outside quoted text.
    pub fn placeholder_count(&self) -> usize {
        count_placeholders(&self.sql)
    }

    /// SQL with `?` replaced by the dialect's native placeholder
    /// (`$1` for Postgres, `@P1` for MSSQL).
    pub fn native_sql(&self) -> String {
        let grammar = self.dialect.grammar();
        replace_placeholders(&self.sql, |index| grammar.native_placeholder(index))
    }
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

pub(crate) fn count_placeholders(sql: &str) -> usize {
    let mut count = 0;
    replace_placeholders(sql, |_| {
        count += 1;
        "?".to_string()
    });
    count
}

/// Replace each `?` outside quoted text with `next(n)`, `n` starting at 1.
///
/// Single-quoted strings, double-quoted and backtick identifiers and
/// bracketed identifiers are copied through untouched.
pub(crate) fn replace_placeholders(sql: &str, mut next: impl FnMut(usize) -> String) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut closing: Option<char> = None;
    let mut index = 0;

    for c in sql.chars() {
        if let Some(end) = closing {
            out.push(c);
            if c == end {
                closing = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                closing = Some(c);
                out.push(c);
            }
            '[' => {
                closing = Some(']');
                out.push(c);
            }
            '?' => {
                index += 1;
                out.push_str(&next(index));
            }
            _ => out.push(c),
        }
    }
    out
}
