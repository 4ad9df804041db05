//! Worker-keyed connection pool.
//!
//! Each worker (a thread, or any caller-chosen key) owns at most one
//! connection. Checking out twice from the same worker yields handles to
//! the same connection; different workers never share one. Once the pool
//! holds more connections than its high-water mark, idle connections are
//! closed oldest first. A connection that is checked out or inside a
//! transaction is never recycled.

use super::manager::Database;
use super::{Connection, Executor, Outcome};
use crate::builder::QueryBuilder;
use crate::error::{QuarryError, QuarryResult};
use crate::grammar::{CompiledQuery, Dialect};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::ThreadId;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Identity a pooled connection is keyed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WorkerId {
    Thread(ThreadId),
    Key(String),
}

impl WorkerId {
    /// The calling OS thread.
    pub fn current() -> Self {
        WorkerId::Thread(std::thread::current().id())
    }

    /// A caller-chosen key, e.g. a task or request id.
    pub fn key(key: impl Into<String>) -> Self {
        WorkerId::Key(key.into())
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerId::Thread(id) => write!(f, "{id:?}"),
            WorkerId::Key(key) => f.write_str(key),
        }
    }
}

struct Slot {
    connection: Arc<Mutex<Connection>>,
    checkouts: Arc<AtomicUsize>,
    last_used: Instant,
}

impl Slot {
    fn is_busy(&self) -> bool {
        if self.checkouts.load(Ordering::Acquire) > 0 {
            return true;
        }
        match self.connection.try_lock() {
            Ok(conn) => conn.in_transaction(),
            Err(_) => true,
        }
    }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub connections: usize,
    pub checked_out: usize,
    pub high_water: usize,
}

/// Connections for one logical connection name, keyed by worker.
pub struct ConnectionPool {
    db: Arc<Database>,
    connection: Option<String>,
    high_water: usize,
    slots: Mutex<HashMap<WorkerId, Slot>>,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("connection", &self.connection)
            .field("high_water", &self.high_water)
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    pub fn new(db: Arc<Database>, connection: Option<&str>, high_water: usize) -> Self {
        Self {
            db,
            connection: connection.map(str::to_string),
            high_water,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Check out `worker`'s connection, opening one if needed.
    pub async fn checkout(&self, worker: WorkerId) -> QuarryResult<PooledConnection> {
        let mut slots = self.slots.lock().await;

        if !slots.contains_key(&worker) {
            let mut conn = self.db.connect(self.connection.as_deref()).await?;
            conn.set_pooled(true);
            tracing::debug!(
                target: "quarry.tx",
                connection = %conn.name(),
                worker = %worker,
                "pooled connection opened"
            );
            slots.insert(
                worker.clone(),
                Slot {
                    connection: Arc::new(Mutex::new(conn)),
                    checkouts: Arc::new(AtomicUsize::new(0)),
                    last_used: Instant::now(),
                },
            );
        }

        let slot = slots
            .get_mut(&worker)
            .ok_or_else(|| QuarryError::usage(format!("worker {worker} has no connection")))?;
        slot.last_used = Instant::now();
        slot.checkouts.fetch_add(1, Ordering::AcqRel);
        let connection = slot.connection.clone();
        let checkouts = slot.checkouts.clone();

        let (name, dialect) = {
            let conn = connection.lock().await;
            (conn.name().to_string(), conn.dialect())
        };
        let prefix = self
            .db
            .config()
            .connection(Some(&name))
            .map(|(_, cfg)| cfg.prefix.clone())
            .unwrap_or_default();

        let handle = PooledConnection {
            worker,
            connection,
            checkouts,
            name,
            dialect,
            prefix,
        };

        if slots.len() > self.high_water {
            Self::recycle_locked(&mut slots, self.high_water).await;
        }
        Ok(handle)
    }

    /// Check out the connection of the calling thread.
    pub async fn checkout_current(&self) -> QuarryResult<PooledConnection> {
        self.checkout(WorkerId::current()).await
    }

    /// Close idle connections, oldest first, until the pool is back at its
    /// high-water mark. Returns how many were closed.
    pub async fn recycle_idle(&self) -> usize {
        let mut slots = self.slots.lock().await;
        Self::recycle_locked(&mut slots, self.high_water).await
    }

    /// Close `worker`'s connection if it is idle.
    pub async fn release(&self, worker: &WorkerId) -> bool {
        let mut slots = self.slots.lock().await;
        match slots.get(worker) {
            Some(slot) if !slot.is_busy() => {}
            _ => return false,
        }
        match slots.remove(worker) {
            Some(slot) => {
                close_slot(worker, slot).await;
                true
            }
            None => false,
        }
    }

    pub async fn stats(&self) -> PoolStats {
        let slots = self.slots.lock().await;
        PoolStats {
            connections: slots.len(),
            checked_out: slots
                .values()
                .filter(|slot| slot.checkouts.load(Ordering::Acquire) > 0)
                .count(),
            high_water: self.high_water,
        }
    }

    async fn recycle_locked(slots: &mut HashMap<WorkerId, Slot>, high_water: usize) -> usize {
        let mut idle: Vec<(WorkerId, Instant)> = slots
            .iter()
            .filter(|(_, slot)| !slot.is_busy())
            .map(|(worker, slot)| (worker.clone(), slot.last_used))
            .collect();
        idle.sort_by_key(|(_, last_used)| *last_used);

        let mut closed = 0;
        for (worker, _) in idle {
            if slots.len() <= high_water {
                break;
            }
            if let Some(slot) = slots.remove(&worker) {
                close_slot(&worker, slot).await;
                closed += 1;
            }
        }
        closed
    }
}

async fn close_slot(worker: &WorkerId, slot: Slot) {
    let mut conn = slot.connection.lock().await;
    tracing::debug!(target: "quarry.tx", connection = %conn.name(), worker = %worker, "recycling idle connection");
    if let Err(e) = conn.close().await {
        tracing::warn!(target: "quarry.tx", worker = %worker, error = %e, "closing pooled connection failed");
    }
}

/// A checked-out pool connection. Dropping it returns the checkout.
pub struct PooledConnection {
    worker: WorkerId,
    connection: Arc<Mutex<Connection>>,
    checkouts: Arc<AtomicUsize>,
    name: String,
    dialect: Dialect,
    prefix: String,
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("worker", &self.worker)
            .field("connection", &self.name)
            .finish()
    }
}

impl PooledConnection {
    pub fn worker(&self) -> &WorkerId {
        &self.worker
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self, table: &str) -> QueryBuilder {
        QueryBuilder::table(self.dialect, table).prefix(self.prefix.clone())
    }

    pub async fn begin(&self) -> QuarryResult<()> {
        self.connection.lock().await.begin().await
    }

    pub async fn commit(&self) -> QuarryResult<()> {
        self.connection.lock().await.commit().await
    }

    pub async fn rollback(&self) -> QuarryResult<()> {
        self.connection.lock().await.rollback().await
    }

    pub async fn depth(&self) -> usize {
        self.connection.lock().await.depth()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.checkouts.fetch_sub(1, Ordering::AcqRel);
    }
}

#[async_trait]
impl Executor for PooledConnection {
    fn dialect(&self, connection: Option<&str>) -> QuarryResult<Dialect> {
        match connection {
            Some(name) if name != self.name => Err(QuarryError::usage(format!(
                "query targets connection '{name}' but the pooled connection is '{}'",
                self.name
            ))),
            _ => Ok(self.dialect),
        }
    }

    async fn run(
        &self,
        connection: Option<&str>,
        query: &CompiledQuery,
        timeout: Option<Duration>,
    ) -> QuarryResult<Outcome> {
        Executor::dialect(self, connection)?;
        self.connection.lock().await.execute(query, timeout).await
    }
}
