//! Postgres driver over `tokio-postgres`.

use super::driver::{Connector, Driver, ExecResult};
use crate::config::ConnectionConfig;
use crate::error::{QuarryError, QuarryResult};
use crate::grammar::Dialect;
use crate::row::Row;
use crate::value::Value;
use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::error::Error;
use std::str::FromStr;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_postgres::{Client, NoTls};

/// Opens [`PostgresDriver`]s without TLS.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresConnector;

#[async_trait]
impl Connector for PostgresConnector {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn connect(&self, config: &ConnectionConfig) -> QuarryResult<Box<dyn Driver>> {
        let url = config.connection_url()?;
        let pg_config: tokio_postgres::Config = url
            .parse()
            .map_err(|e: tokio_postgres::Error| QuarryError::Connection(e.to_string()))?;
        let (client, connection) = pg_config
            .connect(NoTls)
            .await
            .map_err(|e| QuarryError::Connection(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(target: "quarry.tx", error = %e, "postgres connection task ended");
            }
        });

        Ok(Box::new(PostgresDriver { client }))
    }
}

pub struct PostgresDriver {
    client: Client,
}

impl PostgresDriver {
    fn params(bindings: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
        bindings.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
    }
}

#[async_trait]
impl Driver for PostgresDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn query(&mut self, sql: &str, bindings: &[Value]) -> QuarryResult<Vec<Row>> {
        let params = Self::params(bindings);
        let rows = self.client.query(sql, &params).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&mut self, sql: &str, bindings: &[Value]) -> QuarryResult<ExecResult> {
        let params = Self::params(bindings);
        let rows_affected = self.client.execute(sql, &params).await?;
        Ok(ExecResult {
            rows_affected,
            last_insert_id: None,
        })
    }

    async fn begin(&mut self) -> QuarryResult<()> {
        self.client.batch_execute("BEGIN").await?;
        Ok(())
    }

    async fn commit(&mut self) -> QuarryResult<()> {
        self.client.batch_execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> QuarryResult<()> {
        self.client.batch_execute("ROLLBACK").await?;
        Ok(())
    }

    async fn cancel(&mut self) -> QuarryResult<()> {
        let token = self.client.cancel_token();
        tokio::spawn(async move {
            let _ = token.cancel_query(NoTls).await;
        });
        Ok(())
    }
}

/// Parameters are bound in binary format, so every value is converted to the
/// wire type Postgres inferred for its placeholder. Text columns take the
/// value's textual form and text values are parsed into numeric, boolean,
/// uuid and temporal parameters; anything else is an encode error.
impl ToSql for Value {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        if matches!(self, Value::Null) {
            return Ok(IsNull::Yes);
        }
        if is_text(ty) {
            return match self {
                Value::Text(s) => s.as_str().to_sql(ty, out),
                Value::Bool(b) => b.to_string().to_sql(ty, out),
                Value::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S%.f").to_string().to_sql(ty, out),
                Value::Bytes(b) => std::str::from_utf8(b)?.to_sql(ty, out),
                other => other.literal_text().to_sql(ty, out),
            };
        }

        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                Type::INT2 | Type::INT4 | Type::INT8 => Value::Int(i64::from(*b)).to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            Value::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::INT8 => i.to_sql(ty, out),
                Type::OID => u32::try_from(*i)?.to_sql(ty, out),
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                Type::BOOL => (*i != 0).to_sql(ty, out),
                Type::NUMERIC => Decimal::from(*i).to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            Value::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                Type::FLOAT8 => f.to_sql(ty, out),
                Type::NUMERIC => Decimal::try_from(*f)?.to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            Value::Text(s) => match *ty {
                Type::JSON | Type::JSONB => {
                    serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out)
                }
                Type::NUMERIC => Decimal::from_str(s.trim())?.to_sql(ty, out),
                Type::INT2 => s.trim().parse::<i16>()?.to_sql(ty, out),
                Type::INT4 => s.trim().parse::<i32>()?.to_sql(ty, out),
                Type::INT8 => s.trim().parse::<i64>()?.to_sql(ty, out),
                Type::OID => s.trim().parse::<u32>()?.to_sql(ty, out),
                Type::FLOAT4 => s.trim().parse::<f32>()?.to_sql(ty, out),
                Type::FLOAT8 => s.trim().parse::<f64>()?.to_sql(ty, out),
                Type::BOOL => parse_bool(s).ok_or_else(|| mismatch(self, ty))?.to_sql(ty, out),
                Type::UUID => uuid::Uuid::parse_str(s.trim())?.to_sql(ty, out),
                Type::BYTEA => s.as_bytes().to_sql(ty, out),
                Type::TIMESTAMP | Type::TIMESTAMPTZ | Type::DATE => {
                    let ts = parse_timestamp(s).ok_or_else(|| mismatch(self, ty))?;
                    Value::Timestamp(ts).to_sql(ty, out)
                }
                // enums, citext and other text-like user types
                _ => s.as_str().to_sql(ty, out),
            },
            Value::Bytes(b) => match *ty {
                Type::BYTEA => b.as_slice().to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            Value::Timestamp(ts) => match *ty {
                Type::TIMESTAMP => ts.to_sql(ty, out),
                Type::TIMESTAMPTZ => Utc.from_utc_datetime(ts).to_sql(ty, out),
                Type::DATE => ts.date().to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            Value::Uuid(u) => match *ty {
                Type::UUID => u.to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            Value::Json(j) => match *ty {
                Type::JSON | Type::JSONB => j.to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
        }
    }

    // Value is dynamically typed; mismatches are rejected in to_sql.
    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn is_text(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    )
}

fn mismatch(value: &Value, ty: &Type) -> Box<dyn Error + Sync + Send> {
    format!("cannot bind a {} value to a {ty} parameter", value.type_name()).into()
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "y" | "yes" | "on" | "1" => Some(true),
        "f" | "false" | "n" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_utc()))
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn decode_row(row: &tokio_postgres::Row) -> QuarryResult<Row> {
    let mut out = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, index, column.type_())
            .map_err(|e| QuarryError::decode(column.name(), e.to_string()))?;
        out.insert(column.name(), value);
    }
    Ok(out)
}

fn decode_column(
    row: &tokio_postgres::Row,
    index: usize,
    ty: &Type,
) -> Result<Value, tokio_postgres::Error> {
    fn get<'a, T>(row: &'a tokio_postgres::Row, index: usize) -> Result<Option<T>, tokio_postgres::Error>
    where
        T: tokio_postgres::types::FromSql<'a>,
    {
        row.try_get::<_, Option<T>>(index)
    }

    let value = match *ty {
        Type::BOOL => get::<bool>(row, index)?.map(Value::Bool),
        Type::INT2 => get::<i16>(row, index)?.map(|v| Value::Int(v.into())),
        Type::INT4 => get::<i32>(row, index)?.map(|v| Value::Int(v.into())),
        Type::INT8 => get::<i64>(row, index)?.map(Value::Int),
        Type::OID => get::<u32>(row, index)?.map(|v| Value::Int(v.into())),
        Type::FLOAT4 => get::<f32>(row, index)?.map(|v| Value::Float(v.into())),
        Type::FLOAT8 => get::<f64>(row, index)?.map(Value::Float),
        Type::NUMERIC => {
            get::<Decimal>(row, index)?.map(|v| Value::Text(v.to_string()))
        }
        Type::BYTEA => get::<Vec<u8>>(row, index)?.map(Value::Bytes),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, index)?.map(Value::Timestamp),
        Type::TIMESTAMPTZ => {
            get::<DateTime<Utc>>(row, index)?.map(|v| Value::Timestamp(v.naive_utc()))
        }
        Type::DATE => get::<NaiveDate>(row, index)?
            .map(|d| Value::Timestamp(d.and_hms_opt(0, 0, 0).unwrap_or_default())),
        Type::UUID => get::<uuid::Uuid>(row, index)?.map(Value::Uuid),
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, index)?.map(Value::Json),
        _ => get::<String>(row, index)?.map(Value::Text),
    };
    Ok(value.unwrap_or(Value::Null))
}
