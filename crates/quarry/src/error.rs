//! Error types for quarry

use std::time::Duration;
use thiserror::Error;

/// Result type alias for quarry operations
pub type QuarryResult<T> = Result<T, QuarryError>;

/// Error types for query construction and execution
#[derive(Debug, Clone, Error)]
pub enum QuarryError {
    /// Unknown connection name, unknown driver, malformed connection URL
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid operator or conflicting builder options
    #[error("Validation error: {0}")]
    Validation(String),

    /// The native client for a dialect is not compiled in or not registered
    #[error("Driver unavailable: {0}")]
    DriverUnavailable(String),

    /// Could not open a connection to the backend
    #[error("Connection error: {0}")]
    Connection(String),

    /// The driver rejected a statement; carries the driver message verbatim
    #[error("Query execution error: {0}")]
    Execution(String),

    /// Row not found (strict call sites only)
    #[error("Not found: {0}")]
    NotFound(String),

    /// More than one row where exactly one was required
    #[error("Multiple records: expected 1, got {0}")]
    MultipleRecords(usize),

    /// API misuse, e.g. commit without begin or an unknown macro
    #[error("Usage error: {0}")]
    Usage(String),

    /// Query timeout error
    #[error("Query timeout after {0:?}")]
    Timeout(Duration),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },
}

impl QuarryError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Create an execution error from any driver message
    pub fn execution(message: impl std::fmt::Display) -> Self {
        Self::Execution(message.to_string())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Check if the driver for the requested backend is missing
    pub fn is_driver_unavailable(&self) -> bool {
        matches!(self, Self::DriverUnavailable(_))
    }

    /// Check if a statement failed inside the driver
    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for QuarryError {
    fn from(err: tokio_postgres::Error) -> Self {
        match err.as_db_error() {
            Some(db_err) => Self::Execution(db_err.message().to_string()),
            None => Self::Execution(err.to_string()),
        }
    }
}

#[cfg(any(feature = "mysql", feature = "sqlite"))]
impl From<sqlx::Error> for QuarryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => Self::Execution(db_err.message().to_string()),
            other => Self::Execution(other.to_string()),
        }
    }
}

impl From<url::ParseError> for QuarryError {
    fn from(err: url::ParseError) -> Self {
        Self::Configuration(format!("malformed connection url: {err}"))
    }
}

impl From<toml::de::Error> for QuarryError {
    fn from(err: toml::de::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for QuarryError {
    fn from(err: serde_json::Error) -> Self {
        Self::decode("<row>", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_keeps_driver_message() {
        let err = QuarryError::execution("relation \"users\" does not exist");
        assert!(err.is_execution());
        assert_eq!(
            err.to_string(),
            "Query execution error: relation \"users\" does not exist"
        );
    }

    #[test]
    fn url_errors_are_configuration_errors() {
        let err: QuarryError = url::Url::parse("not a url").unwrap_err().into();
        assert!(err.is_configuration());
    }
}
