//! Connection configuration: logical connection name -> connection settings.
//!
//! ```toml
//! default = "main"
//!
//! [connections.main]
//! driver = "postgres"
//! host = "localhost"
//! port = 5432
//! user = "app"
//! password = "${APP_DB_PASSWORD}"
//! database = "app"
//! log_queries = true
//!
//! [connections.cache]
//! driver = "sqlite"
//! database = ":memory:"
//! ```

use crate::error::{QuarryError, QuarryResult};
use crate::grammar::Dialect;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Settings for one logical connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub driver: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    /// Prepended to every table name compiled through this connection.
    pub prefix: String,
    /// Extra driver options, passed through as URL query parameters.
    pub options: BTreeMap<String, String>,
    /// Emit a `quarry.sql` tracing event for every statement.
    pub log_queries: bool,
    /// Full connection URL; when set it wins over the discrete fields.
    pub url: Option<String>,
    pub query_timeout_ms: Option<u64>,
}

impl ConnectionConfig {
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            ..Self::default()
        }
    }

    /// Parse `postgres://user:pw@host:5432/db?sslmode=disable` style URLs.
    ///
    /// The scheme selects the driver. For SQLite the path is the database
    /// file (`sqlite:///tmp/app.db`, `sqlite::memory:`).
    pub fn from_url(input: &str) -> QuarryResult<Self> {
        let url = Url::parse(input)?;
        let driver = url.scheme().to_string();
        let dialect = Dialect::from_driver(&driver)?;

        let mut config = Self::new(driver);
        if let Some(host) = url.host_str().filter(|h| !h.is_empty()) {
            config.host = Some(host.to_string());
        }
        config.port = url.port();
        if !url.username().is_empty() {
            config.user = Some(url.username().to_string());
        }
        config.password = url.password().map(str::to_string);

        let path = url.path();
        let database = match dialect {
            Dialect::Sqlite => path.to_string(),
            _ => path.trim_start_matches('/').to_string(),
        };
        if !database.is_empty() {
            config.database = Some(database);
        }
        for (key, value) in url.query_pairs() {
            config.options.insert(key.into_owned(), value.into_owned());
        }
        config.url = Some(input.to_string());
        Ok(config)
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn log_queries(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self
    }

    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn dialect(&self) -> QuarryResult<Dialect> {
        Dialect::from_driver(&self.driver)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }

    /// Connection URL handed to the native client.
    pub fn connection_url(&self) -> QuarryResult<String> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }

        let dialect = self.dialect()?;
        if dialect == Dialect::Sqlite {
            let database = self.database.as_deref().unwrap_or(":memory:");
            return Ok(format!("sqlite:{database}"));
        }

        let host = self.host.as_deref().unwrap_or("localhost");
        let mut url = Url::parse(&format!("{}://{host}", dialect.url_scheme()))?;
        url.set_port(self.port)
            .map_err(|_| QuarryError::configuration("connection url cannot carry a port"))?;
        if let Some(user) = &self.user {
            url.set_username(user)
                .map_err(|_| QuarryError::configuration("connection url cannot carry a user"))?;
        }
        if let Some(password) = &self.password {
            url.set_password(Some(password))
                .map_err(|_| QuarryError::configuration("connection url cannot carry a password"))?;
        }
        if let Some(database) = &self.database {
            url.set_path(&format!("/{}", database.trim_start_matches('/')));
        }
        if !self.options.is_empty() {
            url.query_pairs_mut().extend_pairs(self.options.iter());
        }
        Ok(url.to_string())
    }

    fn expand_env(&mut self) -> QuarryResult<()> {
        self.driver = expand_env_vars(&self.driver)?;
        for field in [
            &mut self.host,
            &mut self.user,
            &mut self.password,
            &mut self.database,
            &mut self.url,
        ] {
            if let Some(value) = field.as_mut() {
                *value = expand_env_vars(value)?;
            }
        }
        self.prefix = expand_env_vars(&self.prefix)?;
        for value in self.options.values_mut() {
            *value = expand_env_vars(value)?;
        }
        Ok(())
    }

    fn validate(&self, name: &str) -> QuarryResult<()> {
        self.dialect().map_err(|e| {
            QuarryError::configuration(format!("connection '{name}': {e}"))
        })?;
        if let Some(url) = &self.url {
            Url::parse(url).map_err(|e| {
                QuarryError::configuration(format!(
                    "connection '{name}': malformed connection url: {e}"
                ))
            })?;
        }
        Ok(())
    }
}

/// All logical connections plus the name used when none is given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub default: String,
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionConfig>,
}

impl DatabaseConfig {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            connections: BTreeMap::new(),
        }
    }

    pub fn with_connection(mut self, name: impl Into<String>, config: ConnectionConfig) -> Self {
        self.connections.insert(name.into(), config);
        self
    }

    /// Parse, expand `${VAR}` references, then validate.
    pub fn from_toml_str(raw: &str) -> QuarryResult<Self> {
        let mut config: DatabaseConfig = toml::from_str(raw)?;
        config.default = expand_env_vars(&config.default)?;
        for connection in config.connections.values_mut() {
            connection.expand_env()?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> QuarryResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            QuarryError::configuration(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> QuarryResult<()> {
        if self.default.trim().is_empty() {
            return Err(QuarryError::configuration(
                "default connection name must not be empty",
            ));
        }
        if !self.connections.contains_key(&self.default) {
            return Err(QuarryError::configuration(format!(
                "default connection '{}' is not configured",
                self.default
            )));
        }
        for (name, connection) in &self.connections {
            connection.validate(name)?;
        }
        Ok(())
    }

    /// Resolve a connection name (or the default) to its settings.
    pub fn connection(&self, name: Option<&str>) -> QuarryResult<(&str, &ConnectionConfig)> {
        let name = name.unwrap_or(&self.default);
        self.connections
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| {
                QuarryError::configuration(format!("unknown connection name '{name}'"))
            })
    }
}

fn expand_env_vars(input: &str) -> QuarryResult<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut key = String::new();
            let mut closed = false;
            for ch in chars.by_ref() {
                if ch == '}' {
                    closed = true;
                    break;
                }
                key.push(ch);
            }

            if !closed {
                return Err(QuarryError::configuration(format!(
                    "unterminated env var reference: ${{{key}}}"
                )));
            }
            if key.is_empty() {
                return Err(QuarryError::configuration(
                    "invalid env var reference: ${}",
                ));
            }

            let value = std::env::var(&key).map_err(|_| {
                QuarryError::configuration(format!("missing env var for config expansion: {key}"))
            })?;
            out.push_str(&value);
            continue;
        }

        out.push(c);
    }

    Ok(out)
}
