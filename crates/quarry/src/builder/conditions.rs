//! WHERE predicate builders.
//!
//! Every method appends exactly one node. `or_*` variants only change the
//! connector, and the first predicate never renders one.

use super::{check_raw_bindings, QueryBuilder};
use crate::expr::{parse_operator, Connector, Operand, Operator, Predicate, WhereExpr};
use crate::value::Value;

impl QueryBuilder {
    fn push_compare(mut self, connector: Connector, column: &str, op: &str, value: Value) -> Self {
        match parse_operator(op) {
            Ok(op) => self.wheres.push(WhereExpr::compare(connector, column, op, value)),
            Err(e) => self.fail(e),
        }
        self
    }

    fn push_predicate(mut self, connector: Connector, predicate: Predicate) -> Self {
        self.wheres.push(WhereExpr::new(connector, predicate));
        self
    }

    /// `column = value`
    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.push_compare(Connector::And, column, "=", value.into())
    }

    /// `column op value`; `op` is validated against the supported operator set.
    pub fn where_op(self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        self.push_compare(Connector::And, column, op, value.into())
    }

    pub fn or_where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.push_compare(Connector::Or, column, "=", value.into())
    }

    pub fn or_where_op(self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        self.push_compare(Connector::Or, column, op, value.into())
    }

    pub fn where_like(self, column: &str, pattern: impl Into<Value>) -> Self {
        self.push_compare(Connector::And, column, "like", pattern.into())
    }

    pub fn where_not_like(self, column: &str, pattern: impl Into<Value>) -> Self {
        self.push_compare(Connector::And, column, "not like", pattern.into())
    }

    pub fn or_where_like(self, column: &str, pattern: impl Into<Value>) -> Self {
        self.push_compare(Connector::Or, column, "like", pattern.into())
    }

    fn push_in(self, connector: Connector, column: &str, values: Vec<Value>, negated: bool) -> Self {
        self.push_predicate(
            connector,
            Predicate::In {
                column: column.to_string(),
                values: Operand::List(values),
                negated,
            },
        )
    }

    /// `column IN (...)`; an empty list compiles to `0 = 1`.
    pub fn where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.push_in(Connector::And, column, values, false)
    }

    /// `column NOT IN (...)`; an empty list compiles to `1 = 1`.
    pub fn where_not_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.push_in(Connector::And, column, values, true)
    }

    pub fn or_where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.push_in(Connector::Or, column, values, false)
    }

    pub fn or_where_not_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.push_in(Connector::Or, column, values, true)
    }

    /// `column IN (SELECT ...)`
    pub fn where_in_sub(mut self, column: &str, sub: QueryBuilder) -> Self {
        match self.attach_sub(sub) {
            Some(sub) => self.push_predicate(
                Connector::And,
                Predicate::In {
                    column: column.to_string(),
                    values: Operand::Subquery(Box::new(sub)),
                    negated: false,
                },
            ),
            None => self,
        }
    }

    /// `column NOT IN (SELECT ...)`
    pub fn where_not_in_sub(mut self, column: &str, sub: QueryBuilder) -> Self {
        match self.attach_sub(sub) {
            Some(sub) => self.push_predicate(
                Connector::And,
                Predicate::In {
                    column: column.to_string(),
                    values: Operand::Subquery(Box::new(sub)),
                    negated: true,
                },
            ),
            None => self,
        }
    }

    /// `column op (SELECT ...)`
    pub fn where_sub(mut self, column: &str, op: &str, sub: QueryBuilder) -> Self {
        let op = match parse_operator(op) {
            Ok(op) => op,
            Err(e) => {
                self.fail(e);
                return self;
            }
        };
        match self.attach_sub(sub) {
            Some(sub) => self.push_predicate(
                Connector::And,
                Predicate::Compare {
                    column: column.to_string(),
                    op,
                    value: Operand::Subquery(Box::new(sub)),
                },
            ),
            None => self,
        }
    }

    fn push_null(self, connector: Connector, column: &str, negated: bool) -> Self {
        self.push_predicate(
            connector,
            Predicate::Null {
                column: column.to_string(),
                negated,
            },
        )
    }

    pub fn where_null(self, column: &str) -> Self {
        self.push_null(Connector::And, column, false)
    }

    pub fn where_not_null(self, column: &str) -> Self {
        self.push_null(Connector::And, column, true)
    }

    pub fn or_where_null(self, column: &str) -> Self {
        self.push_null(Connector::Or, column, false)
    }

    pub fn or_where_not_null(self, column: &str) -> Self {
        self.push_null(Connector::Or, column, true)
    }

    fn push_between(
        self,
        connector: Connector,
        column: &str,
        low: Value,
        high: Value,
        negated: bool,
    ) -> Self {
        self.push_predicate(
            connector,
            Predicate::Between {
                column: column.to_string(),
                low,
                high,
                negated,
            },
        )
    }

    pub fn where_between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.push_between(Connector::And, column, low.into(), high.into(), false)
    }

    pub fn where_not_between(
        self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.push_between(Connector::And, column, low.into(), high.into(), true)
    }

    pub fn or_where_between(
        self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.push_between(Connector::Or, column, low.into(), high.into(), false)
    }

    fn push_exists(mut self, connector: Connector, sub: QueryBuilder, negated: bool) -> Self {
        match self.attach_sub(sub) {
            Some(sub) => self.push_predicate(
                connector,
                Predicate::Exists {
                    query: Box::new(sub),
                    negated,
                },
            ),
            None => self,
        }
    }

    pub fn where_exists(self, sub: QueryBuilder) -> Self {
        self.push_exists(Connector::And, sub, false)
    }

    pub fn where_not_exists(self, sub: QueryBuilder) -> Self {
        self.push_exists(Connector::And, sub, true)
    }

    pub fn or_where_exists(self, sub: QueryBuilder) -> Self {
        self.push_exists(Connector::Or, sub, false)
    }

    fn push_column(mut self, connector: Connector, left: &str, op: &str, right: &str) -> Self {
        match parse_operator(op) {
            Ok(op) => self.wheres.push(WhereExpr::new(
                connector,
                Predicate::Column {
                    left: left.to_string(),
                    op,
                    right: right.to_string(),
                },
            )),
            Err(e) => self.fail(e),
        }
        self
    }

    /// `left op right`, both sides column references.
    pub fn where_column(self, left: &str, op: &str, right: &str) -> Self {
        self.push_column(Connector::And, left, op, right)
    }

    pub fn or_where_column(self, left: &str, op: &str, right: &str) -> Self {
        self.push_column(Connector::Or, left, op, right)
    }

    fn push_raw(mut self, connector: Connector, sql: &str, bindings: Vec<Value>) -> Self {
        if let Err(e) = check_raw_bindings(sql, &bindings) {
            self.fail(e);
            return self;
        }
        self.push_predicate(
            connector,
            Predicate::Raw {
                sql: sql.to_string(),
                bindings,
            },
        )
    }

    /// Raw predicate; each `?` consumes one binding.
    pub fn where_raw(self, sql: &str, bindings: Vec<Value>) -> Self {
        self.push_raw(Connector::And, sql, bindings)
    }

    pub fn or_where_raw(self, sql: &str, bindings: Vec<Value>) -> Self {
        self.push_raw(Connector::Or, sql, bindings)
    }

    fn push_group<F>(mut self, connector: Connector, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let mut nested = QueryBuilder::new(self.dialect);
        nested.table = self.table.clone();
        nested.alias = self.alias.clone();
        let nested = build(nested);
        if let Some(err) = nested.build_error {
            self.fail(err);
            return self;
        }
        self.push_predicate(connector, Predicate::Group(nested.wheres))
    }

    /// Parenthesised group built in a callback:
    /// `where_group(|q| q.where_eq("a", 1).or_where_eq("b", 2))`.
    pub fn where_group<F>(self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.push_group(Connector::And, build)
    }

    pub fn or_where_group<F>(self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.push_group(Connector::Or, build)
    }

    /// Primary-key equality.
    pub fn where_key(self, id: impl Into<Value>) -> Self {
        let column = self.primary_key.clone();
        self.push_compare(Connector::And, &column, "=", id.into())
    }

    /// Append a pre-built predicate.
    pub fn where_expr(mut self, expr: WhereExpr) -> Self {
        self.wheres.push(expr);
        self
    }

    /// Convenience for `where_op(column, "!=", value)`.
    pub fn where_not(self, column: &str, value: impl Into<Value>) -> Self {
        let op = Operator::Ne.as_sql();
        self.push_compare(Connector::And, column, op, value.into())
    }
}
