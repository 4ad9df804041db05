//! MySQL driver over `sqlx`.

use super::driver::{Connector, Driver, ExecResult};
use crate::config::ConnectionConfig;
use crate::error::{QuarryError, QuarryResult};
use crate::grammar::Dialect;
use crate::row::Row;
use crate::value::Value;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnection, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, Executor as _, Row as _, TypeInfo, ValueRef};

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnector;

#[async_trait]
impl Connector for MySqlConnector {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn connect(&self, config: &ConnectionConfig) -> QuarryResult<Box<dyn Driver>> {
        let url = config.connection_url()?;
        let conn = MySqlConnection::connect(&url)
            .await
            .map_err(|e| QuarryError::Connection(e.to_string()))?;
        Ok(Box::new(MySqlDriver { conn: Some(conn) }))
    }
}

pub struct MySqlDriver {
    conn: Option<MySqlConnection>,
}

impl MySqlDriver {
    fn conn(&mut self) -> QuarryResult<&mut MySqlConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| QuarryError::usage("mysql connection is closed"))
    }
}

fn bind<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &Value,
) -> Query<'q, MySql, MySqlArguments> {
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

fn prepare<'q>(sql: &'q str, bindings: &[Value]) -> Query<'q, MySql, MySqlArguments> {
    bindings
        .iter()
        .fold(sqlx::query(sql), |query, value| bind(query, value))
}

#[async_trait]
impl Driver for MySqlDriver {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn query(&mut self, sql: &str, bindings: &[Value]) -> QuarryResult<Vec<Row>> {
        let rows = prepare(sql, bindings).fetch_all(self.conn()?).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&mut self, sql: &str, bindings: &[Value]) -> QuarryResult<ExecResult> {
        let result = prepare(sql, bindings).execute(self.conn()?).await?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: i64::try_from(result.last_insert_id()).ok(),
        })
    }

    async fn begin(&mut self) -> QuarryResult<()> {
        self.conn()?.execute("START TRANSACTION").await?;
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

fn decode_row(row: &MySqlRow) -> QuarryResult<Row> {
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

fn decode_column(row: &MySqlRow, index: usize, type_name: &str) -> Option<Value> {
    if row.try_get_raw(index).ok()?.is_null() {
        return Some(Value::Null);
    }
    if type_name == "BOOLEAN" {
        return row.try_get::<bool, _>(index).ok().map(Value::Bool);
    }
    if let Ok(v) = row.try_get::<i64, _>(index) {
        return Some(Value::Int(v));
    }
    if let Ok(v) = row.try_get::<u64, _>(index) {
        return Some(i64::try_from(v).map(Value::Int).unwrap_or(Value::Float(v as f64)));
    }
    if type_name == "DECIMAL" {
        if let Ok(v) = row.try_get::<rust_decimal::Decimal, _>(index) {
            return Some(Value::Text(v.to_string()));
        }
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return Some(Value::Float(v));
    }
    if let Ok(v) = row.try_get::<NaiveDateTime, _>(index) {
        return Some(Value::Timestamp(v));
    }
    if let Ok(v) = row.try_get::<NaiveDate, _>(index) {
        return v.and_hms_opt(0, 0, 0).map(Value::Timestamp);
    }
    if type_name == "JSON" {
        if let Ok(v) = row.try_get::<serde_json::Value, _>(index) {
            return Some(Value::Json(v));
        }
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return Some(Value::Text(v));
    }
    row.try_get::<Vec<u8>, _>(index).ok().map(Value::Bytes)
}
