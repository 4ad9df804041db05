//! In-memory driver that records every call it receives.

#![allow(dead_code)]

use async_trait::async_trait;
use quarry::connection::{Connector, Driver, ExecResult};
use quarry::{ConnectionConfig, Database, DatabaseConfig, Dialect, QuarryError, QuarryResult, Row, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Query(String, Vec<Value>),
    Execute(String, Vec<Value>),
    Begin,
    Commit,
    Rollback,
    Cancel,
    Close,
}

#[derive(Default)]
struct State {
    calls: Mutex<Vec<Call>>,
    results: Mutex<VecDeque<Vec<Row>>>,
    rows_affected: Mutex<u64>,
    last_insert_id: Mutex<Option<i64>>,
    delay: Mutex<Option<Duration>>,
    fail_begin: Mutex<bool>,
    fail_rollback: Mutex<bool>,
    fail_close: Mutex<bool>,
    connects: AtomicUsize,
}

/// Shared view over everything the recording drivers saw.
#[derive(Clone, Default)]
pub struct Recorder {
    state: Arc<State>,
}

impl Recorder {
    pub fn calls(&self) -> Vec<Call> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    /// SQL of every query/execute call, in order.
    pub fn statements(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Query(sql, _) | Call::Execute(sql, _) => Some(sql),
                _ => None,
            })
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Queue the rows returned by the next `query` call.
    pub fn push_rows(&self, rows: Vec<Row>) {
        self.state.results.lock().unwrap().push_back(rows);
    }

    pub fn set_rows_affected(&self, n: u64) {
        *self.state.rows_affected.lock().unwrap() = n;
    }

    pub fn set_last_insert_id(&self, id: i64) {
        *self.state.last_insert_id.lock().unwrap() = Some(id);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_begin(&self) {
        *self.state.fail_begin.lock().unwrap() = true;
    }

    pub fn fail_rollback(&self) {
        *self.state.fail_rollback.lock().unwrap() = true;
    }

    pub fn fail_close(&self) {
        *self.state.fail_close.lock().unwrap() = true;
    }

    fn record(&self, call: Call) {
        self.state.calls.lock().unwrap().push(call);
    }
}

pub struct RecordingConnector {
    dialect: Dialect,
    recorder: Recorder,
}

impl RecordingConnector {
    pub fn new(dialect: Dialect, recorder: Recorder) -> Self {
        Self { dialect, recorder }
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn connect(&self, _config: &ConnectionConfig) -> QuarryResult<Box<dyn Driver>> {
        self.recorder.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingDriver {
            dialect: self.dialect,
            recorder: self.recorder.clone(),
        }))
    }
}

struct RecordingDriver {
    dialect: Dialect,
    recorder: Recorder,
}

impl RecordingDriver {
    async fn pause(&self) {
        let delay = *self.recorder.state.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Driver for RecordingDriver {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn query(&mut self, sql: &str, bindings: &[Value]) -> QuarryResult<Vec<Row>> {
        self.recorder
            .record(Call::Query(sql.to_string(), bindings.to_vec()));
        self.pause().await;
        let rows = self.recorder.state.results.lock().unwrap().pop_front();
        Ok(rows.unwrap_or_default())
    }

    async fn execute(&mut self, sql: &str, bindings: &[Value]) -> QuarryResult<ExecResult> {
        self.recorder
            .record(Call::Execute(sql.to_string(), bindings.to_vec()));
        self.pause().await;
        Ok(ExecResult {
            rows_affected: *self.recorder.state.rows_affected.lock().unwrap(),
            last_insert_id: *self.recorder.state.last_insert_id.lock().unwrap(),
        })
    }

    async fn begin(&mut self) -> QuarryResult<()> {
        self.recorder.record(Call::Begin);
        if *self.recorder.state.fail_begin.lock().unwrap() {
            return Err(QuarryError::execution("begin refused"));
        }
        Ok(())
    }

    async fn commit(&mut self) -> QuarryResult<()> {
        self.recorder.record(Call::Commit);
        Ok(())
    }

    async fn rollback(&mut self) -> QuarryResult<()> {
        self.recorder.record(Call::Rollback);
        if *self.recorder.state.fail_rollback.lock().unwrap() {
            return Err(QuarryError::execution("connection reset"));
        }
        Ok(())
    }

    async fn cancel(&mut self) -> QuarryResult<()> {
        self.recorder.record(Call::Cancel);
        Ok(())
    }

    async fn close(&mut self) -> QuarryResult<()> {
        self.recorder.record(Call::Close);
        if *self.recorder.state.fail_close.lock().unwrap() {
            return Err(QuarryError::execution("socket already closed"));
        }
        Ok(())
    }
}

pub fn driver_name(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::MySql => "mysql",
        Dialect::Postgres => "postgres",
        Dialect::Sqlite => "sqlite",
        Dialect::Mssql => "sqlserver",
    }
}

/// A database whose default connection `main` uses `dialect`, backed by the
/// recording driver.
pub fn database(dialect: Dialect) -> (Database, Recorder) {
    database_with(
        DatabaseConfig::new("main").with_connection("main", ConnectionConfig::new(driver_name(dialect))),
        dialect,
    )
}

pub fn database_with(config: DatabaseConfig, dialect: Dialect) -> (Database, Recorder) {
    let recorder = Recorder::default();
    let db = Database::new(config)
        .unwrap()
        .with_connector(RecordingConnector::new(dialect, recorder.clone()));
    (db, recorder)
}

pub fn row<const N: usize>(pairs: [(&str, Value); N]) -> Row {
    Row::from_pairs(pairs)
}
