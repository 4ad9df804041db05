//! `Database`: configuration, connectors and one-statement execution.

use super::driver::Connector;
use super::transaction::Transaction;
use super::{Connection, Executor, Outcome};
use crate::builder::{QueryBuilder, Table};
use crate::config::DatabaseConfig;
use crate::error::{QuarryError, QuarryResult};
use crate::grammar::{CompiledQuery, Dialect};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Entry point: resolves logical connection names and opens connections.
///
/// Outside a transaction every statement gets its own connection, which is
/// closed as soon as the statement completes.
///
/// ```ignore
/// let db = Database::new(DatabaseConfig::from_path("database.toml")?)?;
///
/// let admins = db.table("users").where_eq("role", "admin").get(&db).await?;
///
/// let tx = db.begin(None).await?;
/// tx.table("accounts").where_eq("id", 1).decrement(&tx, "balance", 100).await?;
/// tx.commit().await?;
/// ```
pub struct Database {
    config: DatabaseConfig,
    connectors: HashMap<Dialect, Arc<dyn Connector>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("connectors", &self.connectors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Database {
    /// Validate `config` and register the connectors compiled into this build.
    pub fn new(config: DatabaseConfig) -> QuarryResult<Self> {
        config.validate()?;
        let mut db = Self {
            config,
            connectors: HashMap::new(),
        };

        #[cfg(feature = "postgres")]
        db.register_connector(Arc::new(super::postgres::PostgresConnector));
        #[cfg(feature = "mysql")]
        db.register_connector(Arc::new(super::mysql::MySqlConnector));
        #[cfg(feature = "sqlite")]
        db.register_connector(Arc::new(super::sqlite::SqliteConnector));

        Ok(db)
    }

    /// Install (or replace) the connector for its dialect.
    pub fn register_connector(&mut self, connector: Arc<dyn Connector>) {
        self.connectors.insert(connector.dialect(), connector);
    }

    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.register_connector(Arc::new(connector));
        self
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn has_connector(&self, dialect: Dialect) -> bool {
        self.connectors.contains_key(&dialect)
    }

    fn builder(&self, connection: Option<&str>, table: &str) -> QueryBuilder {
        match self.config.connection(connection).and_then(|(name, cfg)| {
            Ok((name.to_string(), cfg.dialect()?, cfg.prefix.clone()))
        }) {
            Ok((name, dialect, prefix)) => {
                let query = QueryBuilder::table(dialect, table).prefix(prefix);
                match connection {
                    Some(_) => query.on_connection(name),
                    None => query,
                }
            }
            Err(e) => {
                let mut query = QueryBuilder::table(Dialect::default(), table);
                query.fail(e);
                query
            }
        }
    }

    /// Builder on the default connection.
    pub fn table(&self, table: &str) -> QueryBuilder {
        self.builder(None, table)
    }

    /// Builder on a named connection. An unknown name surfaces as a
    /// configuration error when the builder is compiled or executed.
    pub fn query_on(&self, connection: &str, table: &str) -> QueryBuilder {
        self.builder(Some(connection), table)
    }

    /// Builder for table metadata, with its primary key and global scopes.
    pub fn query_table(&self, table: &Table) -> QueryBuilder {
        let base = self.builder(table.connection_name(), table.name());
        table.apply(base)
    }

    /// Open a connection by name (or the default one).
    pub async fn connect(&self, connection: Option<&str>) -> QuarryResult<Connection> {
        let (name, config) = self.config.connection(connection)?;
        let dialect = config.dialect()?;
        let connector = self.connectors.get(&dialect).ok_or_else(|| {
            QuarryError::DriverUnavailable(format!(
                "no {dialect} driver is compiled in or registered (connection '{name}')"
            ))
        })?;
        let driver = connector.connect(config).await?;
        Ok(Connection::new(name, config, driver))
    }

    /// Open a connection and begin a transaction on it.
    pub async fn begin(&self, connection: Option<&str>) -> QuarryResult<Transaction> {
        let (_, config) = self.config.connection(connection)?;
        let prefix = config.prefix.clone();
        let conn = self.connect(connection).await?;
        Transaction::start(conn, prefix).await
    }

    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
    pub async fn transaction<F, Fut, T>(&self, connection: Option<&str>, f: F) -> QuarryResult<T>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = QuarryResult<T>>,
    {
        let tx = self.begin(connection).await?;
        match f(tx.clone()).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(error) => match tx.rollback().await {
                Ok(()) => Err(error),
                Err(rollback_err) => Err(QuarryError::execution(format!(
                    "{error} (rollback failed: {rollback_err})"
                ))),
            },
        }
    }
}

#[async_trait]
impl Executor for Database {
    fn dialect(&self, connection: Option<&str>) -> QuarryResult<Dialect> {
        self.config.connection(connection)?.1.dialect()
    }

    async fn run(
        &self,
        connection: Option<&str>,
        query: &CompiledQuery,
        timeout: Option<Duration>,
    ) -> QuarryResult<Outcome> {
        let mut conn = self.connect(connection).await?;
        let result = conn.execute(query, timeout).await;
        let closed = conn.close().await;
        let outcome = result?;
        closed?;
        Ok(outcome)
    }
}
