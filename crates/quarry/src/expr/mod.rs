//! Expression AST: one immutable node per query fragment.
//!
//! Nodes are created by the builder in call order and never mutated
//! afterwards. The grammar walks them to produce SQL; nothing in here knows
//! about dialects.

mod join;

pub use join::{JoinClause, JoinKind, OnCondition, OnKind};

use crate::builder::QueryBuilder;
use crate::error::{QuarryError, QuarryResult};
use crate::value::Value;
use std::fmt;
use std::str::FromStr;

/// Comparison operator accepted by predicate builders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// `!=`
    Ne,
    /// `<>`
    NotEq,
    Like,
    NotLike,
    Regexp,
    NotRegexp,
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Ne => "!=",
            Operator::NotEq => "<>",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::Regexp => "REGEXP",
            Operator::NotRegexp => "NOT REGEXP",
        }
    }

    /// Whether the operator means "not equal" (used for `NULL` rewriting).
    pub fn is_negative_equality(&self) -> bool {
        matches!(self, Operator::Ne | Operator::NotEq)
    }
}

impl FromStr for Operator {
    type Err = QuarryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let op = match normalized.as_str() {
            "=" => Operator::Eq,
            ">" => Operator::Gt,
            ">=" => Operator::Gte,
            "<" => Operator::Lt,
            "<=" => Operator::Lte,
            "!=" => Operator::Ne,
            "<>" => Operator::NotEq,
            "like" => Operator::Like,
            "not like" => Operator::NotLike,
            "regexp" => Operator::Regexp,
            "not regexp" => Operator::NotRegexp,
            _ => {
                return Err(QuarryError::validation(format!(
                    "invalid comparison operator '{s}'"
                )));
            }
        };
        Ok(op)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Boolean connector placed before every predicate except the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

impl Connector {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Connector::And => "AND",
            Connector::Or => "OR",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl Aggregate {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Aggregate::Count => "COUNT",
            Aggregate::Sum => "SUM",
            Aggregate::Avg => "AVG",
            Aggregate::Min => "MIN",
            Aggregate::Max => "MAX",
        }
    }
}

/// Row lock requested for a SELECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lock {
    /// `FOR UPDATE`
    Update,
    /// `LOCK IN SHARE MODE` / `FOR SHARE`
    Share,
}

/// Split `"name as alias"` (case-insensitive ` as `) into its two halves.
pub(crate) fn split_alias(input: &str) -> (String, Option<String>) {
    let lowered = input.to_ascii_lowercase();
    match lowered.find(" as ") {
        Some(idx) => (
            input[..idx].trim().to_string(),
            Some(input[idx + 4..].trim().to_string()),
        ),
        None => (input.trim().to_string(), None),
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone)]
pub enum Operand {
    Value(Value),
    List(Vec<Value>),
    Subquery(Box<QueryBuilder>),
    Raw(String),
}

/// One WHERE-kind predicate.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// `column op value` / `column op (SELECT ...)` / `column op raw`
    Compare {
        column: String,
        op: Operator,
        value: Operand,
    },
    /// `column IS [NOT] NULL`
    Null { column: String, negated: bool },
    /// `column [NOT] IN (...)`; the operand is a list or a sub-select
    In {
        column: String,
        values: Operand,
        negated: bool,
    },
    /// `column [NOT] BETWEEN low AND high`
    Between {
        column: String,
        low: Value,
        high: Value,
        negated: bool,
    },
    /// `[NOT] EXISTS (SELECT ...)`
    Exists {
        query: Box<QueryBuilder>,
        negated: bool,
    },
    /// `left op right`, both sides column references
    Column {
        left: String,
        op: Operator,
        right: String,
    },
    /// Parenthesised nested predicate list
    Group(Vec<WhereExpr>),
    /// Raw fragment with `?` placeholders
    Raw { sql: String, bindings: Vec<Value> },
}

/// A predicate plus the connector that joins it to its predecessor.
#[derive(Debug, Clone)]
pub struct WhereExpr {
    pub connector: Connector,
    pub predicate: Predicate,
}

impl WhereExpr {
    pub fn new(connector: Connector, predicate: Predicate) -> Self {
        Self {
            connector,
            predicate,
        }
    }

    pub fn and(predicate: Predicate) -> Self {
        Self::new(Connector::And, predicate)
    }

    pub fn or(predicate: Predicate) -> Self {
        Self::new(Connector::Or, predicate)
    }

    /// Whether the predicate renders any SQL; empty groups are dropped.
    pub fn is_effective(&self) -> bool {
        match &self.predicate {
            Predicate::Group(inner) => inner.iter().any(WhereExpr::is_effective),
            Predicate::Raw { sql, .. } => !sql.trim().is_empty(),
            _ => true,
        }
    }

    /// Equality or inequality against `NULL` is rewritten to `IS [NOT] NULL`;
    /// other operators keep the literal comparison.
    pub fn compare(
        connector: Connector,
        column: impl Into<String>,
        op: Operator,
        value: impl Into<Value>,
    ) -> Self {
        let column = column.into();
        let value = value.into();
        let predicate = match (&value, op) {
            (Value::Null, Operator::Eq) => Predicate::Null {
                column,
                negated: false,
            },
            (Value::Null, o) if o.is_negative_equality() => Predicate::Null {
                column,
                negated: true,
            },
            _ => Predicate::Compare {
                column,
                op,
                value: Operand::Value(value),
            },
        };
        Self::new(connector, predicate)
    }
}

/// What a select-list entry refers to.
#[derive(Debug, Clone)]
pub enum SelectKind {
    Column,
    Raw,
    Subquery(Box<QueryBuilder>),
}

/// One entry in the select list.
#[derive(Debug, Clone)]
pub struct SelectExpr {
    pub column: String,
    pub alias: Option<String>,
    pub kind: SelectKind,
}

impl SelectExpr {
    /// Parse a column reference, splitting off `" as alias"`.
    pub fn column(input: &str) -> Self {
        let (column, alias) = split_alias(input);
        Self {
            column,
            alias,
            kind: SelectKind::Column,
        }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            column: sql.into(),
            alias: None,
            kind: SelectKind::Raw,
        }
    }

    pub fn subquery(query: QueryBuilder, alias: impl Into<String>) -> Self {
        Self {
            column: String::new(),
            alias: Some(alias.into()),
            kind: SelectKind::Subquery(Box::new(query)),
        }
    }
}

/// One ORDER BY entry.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    pub column: String,
    pub direction: Direction,
    pub raw: bool,
}

impl OrderByExpr {
    pub fn new(column: impl Into<String>, direction: Direction) -> Self {
        Self {
            column: column.into(),
            direction,
            raw: false,
        }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            column: sql.into(),
            direction: Direction::Asc,
            raw: true,
        }
    }

    /// Parse `"name desc, email"` shorthand.
    ///
    /// A trailing ` desc`/` asc` on an entry overrides `default`.
    pub fn parse_list(input: &str, default: Direction) -> Vec<Self> {
        input
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                let lowered = part.to_ascii_lowercase();
                if lowered.ends_with(" desc") {
                    Self::new(part[..part.len() - 5].trim(), Direction::Desc)
                } else if lowered.ends_with(" asc") {
                    Self::new(part[..part.len() - 4].trim(), Direction::Asc)
                } else {
                    Self::new(part, default)
                }
            })
            .collect()
    }
}

/// One GROUP BY entry.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupByExpr {
    pub column: String,
    pub raw: bool,
}

impl GroupByExpr {
    pub fn parse_list(input: &str) -> Vec<Self> {
        input
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| Self {
                column: part.to_string(),
                raw: false,
            })
            .collect()
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            column: sql.into(),
            raw: true,
        }
    }
}

/// HAVING predicate.
#[derive(Debug, Clone)]
pub enum HavingKind {
    /// Bare column or alias, e.g. `HAVING total`
    Column(String),
    Compare {
        column: String,
        op: Operator,
        value: Value,
    },
    Raw { sql: String, bindings: Vec<Value> },
}

#[derive(Debug, Clone)]
pub struct HavingExpr {
    pub connector: Connector,
    pub kind: HavingKind,
}

/// An aggregate in the select list.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateExpr {
    pub function: Aggregate,
    pub column: String,
    pub alias: String,
}

impl AggregateExpr {
    /// `column` may carry its own alias (`"age as total"`); otherwise the
    /// alias is the bare column name, or the function name for `*`.
    pub fn new(function: Aggregate, column: &str) -> Self {
        let (column, alias) = split_alias(column);
        let column = if column.is_empty() {
            "*".to_string()
        } else {
            column
        };
        let alias = alias.unwrap_or_else(|| {
            if column == "*" {
                function.as_sql().to_ascii_lowercase()
            } else {
                column.rsplit('.').next().unwrap_or(&column).to_string()
            }
        });
        Self {
            function,
            column,
            alias,
        }
    }
}

/// One SET assignment of an UPDATE.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateExpr {
    Set { column: String, value: Value },
    Increment { column: String, amount: Value },
    Decrement { column: String, amount: Value },
    Raw { sql: String, bindings: Vec<Value> },
}

impl UpdateExpr {
    pub fn column(&self) -> Option<&str> {
        match self {
            UpdateExpr::Set { column, .. }
            | UpdateExpr::Increment { column, .. }
            | UpdateExpr::Decrement { column, .. } => Some(column),
            UpdateExpr::Raw { .. } => None,
        }
    }
}

/// Validate an operator string, used by every builder method that takes one.
pub(crate) fn parse_operator(op: &str) -> QuarryResult<Operator> {
    op.parse()
}
