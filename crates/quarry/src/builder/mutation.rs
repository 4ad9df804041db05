//! Staging INSERT / UPDATE / DELETE statements.
//!
//! These methods only record the statement; `to_sql`/`to_qmark` compile it
//! and [`QueryBuilder::execute`] runs it. The one-shot forms (`create`,
//! `update`, `delete`, ...) live in `execute.rs`.

use super::{check_raw_bindings, QueryBuilder};
use crate::expr::UpdateExpr;
use crate::grammar::Action;
use crate::row::Row;
use crate::value::Value;

impl QueryBuilder {
    /// Stage a single-row INSERT.
    pub fn insert_values<I, K, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.action = Action::Insert;
        self.inserts = vec![Row::from_pairs(values)];
        self
    }

    /// Stage a multi-row INSERT. Every row must provide the first row's
    /// columns.
    pub fn bulk_values<R, I, K, V>(mut self, rows: R) -> Self
    where
        R: IntoIterator<Item = I>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.action = Action::BulkCreate;
        self.inserts = rows.into_iter().map(|row| Row::from_pairs(row)).collect();
        self
    }

    /// Stage `column = value` in an UPDATE.
    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.action = Action::Update;
        self.updates.push(UpdateExpr::Set {
            column: column.to_string(),
            value: value.into(),
        });
        self
    }

    /// Stage several assignments at once.
    pub fn set_values<I, K, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.action = Action::Update;
        for (column, value) in values {
            self.updates.push(UpdateExpr::Set {
                column: column.into(),
                value: value.into(),
            });
        }
        self
    }

    /// Raw SET fragment, e.g. `set_raw("score = score * ?", vec![2.into()])`.
    pub fn set_raw(mut self, sql: &str, bindings: Vec<Value>) -> Self {
        if let Err(e) = check_raw_bindings(sql, &bindings) {
            self.fail(e);
            return self;
        }
        self.action = Action::Update;
        self.updates.push(UpdateExpr::Raw {
            sql: sql.to_string(),
            bindings,
        });
        self
    }

    /// Stage `column = column + amount`.
    pub fn increment_by(mut self, column: &str, amount: impl Into<Value>) -> Self {
        self.action = Action::Update;
        self.updates.push(UpdateExpr::Increment {
            column: column.to_string(),
            amount: amount.into(),
        });
        self
    }

    /// Stage `column = column - amount`.
    pub fn decrement_by(mut self, column: &str, amount: impl Into<Value>) -> Self {
        self.action = Action::Update;
        self.updates.push(UpdateExpr::Decrement {
            column: column.to_string(),
            amount: amount.into(),
        });
        self
    }

    /// Stage a DELETE of the matching rows.
    pub fn for_delete(mut self) -> Self {
        self.action = Action::Delete;
        self
    }

    /// Switch back to a SELECT without clearing any clause.
    pub fn for_select(mut self) -> Self {
        self.action = Action::Select;
        self
    }
}
