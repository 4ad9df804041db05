//! Execution entry points.
//!
//! Every method takes the executor explicitly: a [`Database`] for one-off
//! statements, a [`Transaction`] or a [`PooledConnection`] to share a
//! connection. The builder is recompiled in the executor's dialect, so the
//! builder's own dialect only matters for `to_sql`/`to_qmark`.
//!
//! [`Database`]: crate::Database
//! [`Transaction`]: crate::Transaction
//! [`PooledConnection`]: crate::PooledConnection

use super::QueryBuilder;
use crate::connection::{Executor, Outcome};
use crate::error::{QuarryError, QuarryResult};
use crate::expr::{Aggregate, AggregateExpr, Direction, SelectExpr, WhereExpr};
use crate::grammar::{self, Action, Mode};
use crate::row::{FromRow, Row};
use crate::value::{FromValue, Value};

impl QueryBuilder {
    /// Compile `action` for the executor's dialect and run it. Returns the
    /// prepared builder (scopes applied) alongside the raw outcome.
    async fn dispatch<E>(&self, db: &E, action: Action) -> QuarryResult<(QueryBuilder, Outcome)>
    where
        E: Executor + ?Sized,
    {
        self.validate()?;
        let restricted = self.wheres.iter().any(WhereExpr::is_effective);
        if action == Action::Delete && !restricted && !self.allow_delete_all {
            return Err(QuarryError::validation(format!(
                "refusing to delete every row of '{}' without a WHERE clause; call allow_delete_all()",
                self.table
            )));
        }

        let dialect = db.dialect(self.connection.as_deref())?;
        let query = self.clone().dialect(dialect).prepared(action)?;
        let compiled = grammar::compile(&query, query.action, Mode::Qmark)?;
        let outcome = db
            .run(query.connection.as_deref(), &compiled, query.timeout)
            .await?;
        Ok((query, outcome))
    }

    async fn fetch<E>(&self, db: &E) -> QuarryResult<Vec<Row>>
    where
        E: Executor + ?Sized,
    {
        Ok(self.dispatch(db, Action::Select).await?.1.rows)
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    /// All matching rows.
    pub async fn get<E>(&self, db: &E) -> QuarryResult<Vec<Row>>
    where
        E: Executor + ?Sized,
    {
        self.fetch(db).await
    }

    pub async fn get_as<T, E>(&self, db: &E) -> QuarryResult<Vec<T>>
    where
        T: FromRow,
        E: Executor + ?Sized,
    {
        self.fetch(db).await?.iter().map(T::from_row).collect()
    }

    /// Every row of the table. Clause state is ignored; global scopes still
    /// apply.
    pub async fn all<E>(&self, db: &E) -> QuarryResult<Vec<Row>>
    where
        E: Executor + ?Sized,
    {
        self.clone().reset().fetch(db).await
    }

    /// First matching row, or `None`.
    pub async fn first<E>(&self, db: &E) -> QuarryResult<Option<Row>>
    where
        E: Executor + ?Sized,
    {
        Ok(self.clone().limit(1).fetch(db).await?.into_iter().next())
    }

    pub async fn first_as<T, E>(&self, db: &E) -> QuarryResult<Option<T>>
    where
        T: FromRow,
        E: Executor + ?Sized,
    {
        self.first(db).await?.as_ref().map(T::from_row).transpose()
    }

    /// Last matching row: the existing ORDER BY reversed, or the primary key
    /// descending when there is none.
    pub async fn last<E>(&self, db: &E) -> QuarryResult<Option<Row>>
    where
        E: Executor + ?Sized,
    {
        let mut query = self.clone();
        if query.orders.iter().all(|order| order.raw) {
            let key = query.primary_key.clone();
            query = query.order_by_desc(&key);
        } else {
            for order in query.orders.iter_mut().filter(|order| !order.raw) {
                order.direction = match order.direction {
                    Direction::Asc => Direction::Desc,
                    Direction::Desc => Direction::Asc,
                };
            }
        }
        query.first(db).await
    }

    /// Row by primary key, or `None`.
    pub async fn find<E>(&self, db: &E, id: impl Into<Value>) -> QuarryResult<Option<Row>>
    where
        E: Executor + ?Sized,
    {
        self.clone().where_key(id).first(db).await
    }

    /// Row by primary key; `NotFound` when there is none.
    pub async fn find_or_fail<E>(&self, db: &E, id: impl Into<Value>) -> QuarryResult<Row>
    where
        E: Executor + ?Sized,
    {
        let id = id.into();
        self.find(db, id.clone()).await?.ok_or_else(|| {
            QuarryError::not_found(format!(
                "no row in '{}' with {} = {}",
                self.table,
                self.primary_key,
                id.literal_text()
            ))
        })
    }

    /// First matching row; `NotFound` when there is none.
    pub async fn first_or_fail<E>(&self, db: &E) -> QuarryResult<Row>
    where
        E: Executor + ?Sized,
    {
        self.first(db)
            .await?
            .ok_or_else(|| QuarryError::not_found(format!("no matching row in '{}'", self.table)))
    }

    /// The only matching row. `NotFound` for none, `MultipleRecords` for
    /// more than one.
    pub async fn sole<E>(&self, db: &E) -> QuarryResult<Row>
    where
        E: Executor + ?Sized,
    {
        let mut rows = self.clone().limit(2).fetch(db).await?;
        match rows.len() {
            0 => Err(QuarryError::not_found(format!(
                "no matching row in '{}'",
                self.table
            ))),
            1 => Ok(rows.remove(0)),
            n => Err(QuarryError::MultipleRecords(n)),
        }
    }

    /// Whether at least one row matches.
    pub async fn exists<E>(&self, db: &E) -> QuarryResult<bool>
    where
        E: Executor + ?Sized,
    {
        let mut query = self.clone();
        query.columns = vec![SelectExpr::raw("1")];
        query.aggregates.clear();
        query.orders.clear();
        query.offset = None;
        Ok(!query.limit(1).fetch(db).await?.is_empty())
    }

    /// Values of one column, in row order.
    pub async fn pluck<E>(&self, db: &E, column: &str) -> QuarryResult<Vec<Value>>
    where
        E: Executor + ?Sized,
    {
        let rows = self.clone().select([column]).fetch(db).await?;
        Ok(rows
            .iter()
            .map(|row| row.get_index(0).cloned().unwrap_or(Value::Null))
            .collect())
    }

    // ---------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------

    /// Insert one row and return it as stored.
    ///
    /// Postgres returns the row from `RETURNING *`. Elsewhere the row is the
    /// inserted values (after insert scopes ran) plus the generated key.
    pub async fn create<E, I, K, V>(&self, db: &E, values: I) -> QuarryResult<Row>
    where
        E: Executor + ?Sized,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let (query, outcome) = self
            .clone()
            .insert_values(values)
            .dispatch(db, Action::Insert)
            .await?;

        if let Some(row) = outcome.rows.into_iter().next() {
            return Ok(row);
        }
        let mut row = query.inserts.into_iter().next().unwrap_or_default();
        if let Some(id) = outcome.last_insert_id {
            if row.get(&query.primary_key).is_none() {
                row.insert(query.primary_key.clone(), id);
            }
        }
        Ok(row)
    }

    /// Insert several rows in one statement; returns the affected count.
    pub async fn bulk_create<E, R, I, K, V>(&self, db: &E, rows: R) -> QuarryResult<u64>
    where
        E: Executor + ?Sized,
        R: IntoIterator<Item = I>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let (_, outcome) = self
            .clone()
            .bulk_values(rows)
            .dispatch(db, Action::BulkCreate)
            .await?;
        Ok(outcome.rows_affected)
    }

    /// Update the matching rows; returns the affected count.
    pub async fn update<E, I, K, V>(&self, db: &E, values: I) -> QuarryResult<u64>
    where
        E: Executor + ?Sized,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let (_, outcome) = self
            .clone()
            .set_values(values)
            .dispatch(db, Action::Update)
            .await?;
        Ok(outcome.rows_affected)
    }

    /// Delete the matching rows; returns the affected count.
    ///
    /// Refused without a WHERE clause unless
    /// [`allow_delete_all`](QueryBuilder::allow_delete_all) was called.
    pub async fn delete<E>(&self, db: &E) -> QuarryResult<u64>
    where
        E: Executor + ?Sized,
    {
        Ok(self.dispatch(db, Action::Delete).await?.1.rows_affected)
    }

    /// `column = column + amount` on the matching rows.
    pub async fn increment<E>(&self, db: &E, column: &str, amount: impl Into<Value>) -> QuarryResult<u64>
    where
        E: Executor + ?Sized,
    {
        let query = self.clone().increment_by(column, amount);
        Ok(query.dispatch(db, Action::Update).await?.1.rows_affected)
    }

    /// `column = column - amount` on the matching rows.
    pub async fn decrement<E>(&self, db: &E, column: &str, amount: impl Into<Value>) -> QuarryResult<u64>
    where
        E: Executor + ?Sized,
    {
        let query = self.clone().decrement_by(column, amount);
        Ok(query.dispatch(db, Action::Update).await?.1.rows_affected)
    }

    /// Run the staged statement (see `insert_values`, `set`, `for_delete`).
    /// Returns the affected count, or the row count for a SELECT.
    pub async fn execute<E>(&self, db: &E) -> QuarryResult<u64>
    where
        E: Executor + ?Sized,
    {
        let (_, outcome) = self.dispatch(db, self.action).await?;
        Ok(match self.action {
            Action::Select => outcome.rows.len() as u64,
            _ => outcome.rows_affected,
        })
    }

    // ---------------------------------------------------------------
    // Aggregates
    // ---------------------------------------------------------------

    /// Run `function(column)` over the matching rows and return the scalar.
    /// `NULL` for an empty set (except `COUNT`).
    pub async fn fetch_aggregate<E>(&self, db: &E, function: Aggregate, column: &str) -> QuarryResult<Value>
    where
        E: Executor + ?Sized,
    {
        let mut query = self.clone();
        query.columns.clear();
        query.aggregates = vec![AggregateExpr::new(function, column)];
        query.orders.clear();
        query.limit = None;
        query.offset = None;
        let rows = query.fetch(db).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get_index(0))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// `COUNT(*)` of the matching rows.
    pub async fn fetch_count<E>(&self, db: &E) -> QuarryResult<i64>
    where
        E: Executor + ?Sized,
    {
        match self.fetch_aggregate(db, Aggregate::Count, "*").await? {
            Value::Null => Ok(0),
            value => i64::from_value(&value),
        }
    }

    pub async fn fetch_sum<E>(&self, db: &E, column: &str) -> QuarryResult<Value>
    where
        E: Executor + ?Sized,
    {
        self.fetch_aggregate(db, Aggregate::Sum, column).await
    }

    pub async fn fetch_avg<E>(&self, db: &E, column: &str) -> QuarryResult<Value>
    where
        E: Executor + ?Sized,
    {
        self.fetch_aggregate(db, Aggregate::Avg, column).await
    }

    pub async fn fetch_min<E>(&self, db: &E, column: &str) -> QuarryResult<Value>
    where
        E: Executor + ?Sized,
    {
        self.fetch_aggregate(db, Aggregate::Min, column).await
    }

    pub async fn fetch_max<E>(&self, db: &E, column: &str) -> QuarryResult<Value>
    where
        E: Executor + ?Sized,
    {
        self.fetch_aggregate(db, Aggregate::Max, column).await
    }
}
