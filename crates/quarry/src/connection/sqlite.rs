//! SQLite driver over `sqlx`.

use super::driver::{Connector, Driver, ExecResult};
use crate::config::ConnectionConfig;
use crate::error::{QuarryError, QuarryResult};
use crate::grammar::Dialect;
use crate::row::Row;
use crate::value::Value;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, ConnectOptions, Connection, Executor as _, Row as _, TypeInfo, ValueRef};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

#[async_trait]
impl Connector for SqliteConnector {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn connect(&self, config: &ConnectionConfig) -> QuarryResult<Box<dyn Driver>> {
        let url = config.connection_url()?;
        let conn = SqliteConnectOptions::from_str(&url)
            .map_err(|e| QuarryError::configuration(e.to_string()))?
            .create_if_missing(true)
            .connect()
            .await
            .map_err(|e| QuarryError::Connection(e.to_string()))?;
        Ok(Box::new(SqliteDriver { conn: Some(conn) }))
    }
}

pub struct SqliteDriver {
    conn: Option<SqliteConnection>,
}

impl SqliteDriver {
    fn conn(&mut self) -> QuarryResult<&mut SqliteConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| QuarryError::usage("sqlite connection is closed"))
    }
}

fn bind<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.clone()),
        Value::Bytes(b) => query.bind(b.clone()),
        Value::Timestamp(ts) => query.bind(*ts),
        Value::Uuid(u) => query.bind(u.to_string()),
        Value::Json(j) => query.bind(j.to_string()),
    }
}

fn prepare<'q>(sql: &'q str, bindings: &[Value]) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    bindings
        .iter()
        .fold(sqlx::query(sql), |query, value| bind(query, value))
}

#[async_trait]
impl Driver for SqliteDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn query(&mut self, sql: &str, bindings: &[Value]) -> QuarryResult<Vec<Row>> {
        let rows = prepare(sql, bindings).fetch_all(self.conn()?).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&mut self, sql: &str, bindings: &[Value]) -> QuarryResult<ExecResult> {
        let result = prepare(sql, bindings).execute(self.conn()?).await?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_rowid()),
        })
    }

    async fn begin(&mut self) -> QuarryResult<()> {
        self.conn()?.execute("BEGIN").await?;
        Ok(())
    }

    async fn commit(&mut self) -> QuarryResult<()> {
        self.conn()?.execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> QuarryResult<()> {
        self.conn()?.execute("ROLLBACK").await?;
        Ok(())
    }

    async fn close(&mut self) -> QuarryResult<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
        }
        Ok(())
    }
}

fn decode_row(row: &SqliteRow) -> QuarryResult<Row> {
    let mut out = Row::new();
    for column in row.columns() {
        let index = column.ordinal();
        let type_name = column.type_info().name().to_string();
        let value = decode_column(row, index, &type_name)
            .ok_or_else(|| QuarryError::decode(column.name(), format!("unsupported type {type_name}")))?;
        out.insert(column.name(), value);
    }
    Ok(out)
}

// SQLite columns are dynamically typed; the declared type only hints.
fn decode_column(row: &SqliteRow, index: usize, type_name: &str) -> Option<Value> {
    if row.try_get_raw(index).ok()?.is_null() {
        return Some(Value::Null);
    }
    match type_name {
        "BOOLEAN" => row.try_get::<bool, _>(index).ok().map(Value::Bool),
        "DATETIME" => row
            .try_get::<NaiveDateTime, _>(index)
            .ok()
            .map(Value::Timestamp)
            .or_else(|| row.try_get::<String, _>(index).ok().map(Value::Text)),
        "BLOB" => row.try_get::<Vec<u8>, _>(index).ok().map(Value::Bytes),
        _ => row
            .try_get::<i64, _>(index)
            .ok()
            .map(Value::Int)
            .or_else(|| row.try_get::<f64, _>(index).ok().map(Value::Float))
            .or_else(|| row.try_get::<String, _>(index).ok().map(Value::Text))
            .or_else(|| row.try_get::<Vec<u8>, _>(index).ok().map(Value::Bytes)),
    }
}
