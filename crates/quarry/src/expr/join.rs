//! JOIN clauses: a table reference plus its own ON predicate list.

use super::{split_alias, Connector, Operator};
use crate::value::Value;

/// Join flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
}

impl JoinKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
        }
    }
}

/// Body of one ON sub-condition.
#[derive(Debug, Clone, PartialEq)]
pub enum OnKind {
    /// `left op right`, both column references
    Columns {
        left: String,
        op: Operator,
        right: String,
    },
    /// `column op value`, the value is bound
    Value {
        column: String,
        op: Operator,
        value: Value,
    },
    /// `column IS [NOT] NULL`
    Null { column: String, negated: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OnCondition {
    pub connector: Connector,
    pub kind: OnKind,
}

/// A join against one table.
///
/// ```ignore
/// let join = JoinClause::new("contacts as c", JoinKind::Left)
///     .on("c.user_id", Operator::Eq, "users.id")
///     .on_value("c.active", Operator::Eq, true);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub table: String,
    pub alias: Option<String>,
    pub kind: JoinKind,
    pub conditions: Vec<OnCondition>,
}

impl JoinClause {
    /// `table` may carry an alias (`"contacts as c"`).
    pub fn new(table: &str, kind: JoinKind) -> Self {
        let (table, alias) = split_alias(table);
        Self {
            table,
            alias,
            kind,
            conditions: Vec::new(),
        }
    }

    pub fn inner(table: &str) -> Self {
        Self::new(table, JoinKind::Inner)
    }

    pub fn left(table: &str) -> Self {
        Self::new(table, JoinKind::Left)
    }

    pub fn right(table: &str) -> Self {
        Self::new(table, JoinKind::Right)
    }

    /// Name used to qualify this join's columns: the alias if present.
    pub fn reference(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    fn push(mut self, connector: Connector, kind: OnKind) -> Self {
        self.conditions.push(OnCondition { connector, kind });
        self
    }

    pub fn on(self, left: impl Into<String>, op: Operator, right: impl Into<String>) -> Self {
        self.push(
            Connector::And,
            OnKind::Columns {
                left: left.into(),
                op,
                right: right.into(),
            },
        )
    }

    pub fn or_on(self, left: impl Into<String>, op: Operator, right: impl Into<String>) -> Self {
        self.push(
            Connector::Or,
            OnKind::Columns {
                left: left.into(),
                op,
                right: right.into(),
            },
        )
    }

    pub fn on_value(self, column: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        self.push(
            Connector::And,
            OnKind::Value {
                column: column.into(),
                op,
                value: value.into(),
            },
        )
    }

    pub fn or_on_value(
        self,
        column: impl Into<String>,
        op: Operator,
        value: impl Into<Value>,
    ) -> Self {
        self.push(
            Connector::Or,
            OnKind::Value {
                column: column.into(),
                op,
                value: value.into(),
            },
        )
    }

    pub fn on_null(self, column: impl Into<String>) -> Self {
        self.push(
            Connector::And,
            OnKind::Null {
                column: column.into(),
                negated: false,
            },
        )
    }

    pub fn on_not_null(self, column: impl Into<String>) -> Self {
        self.push(
            Connector::And,
            OnKind::Null {
                column: column.into(),
                negated: true,
            },
        )
    }
}
