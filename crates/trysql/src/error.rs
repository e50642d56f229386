//! Error types for trysql

use std::time::Duration;
use thiserror::Error;

/// Result type alias for trysql operations
pub type SqlResult<T> = Result<T, TrySqlError>;

/// Error types for statement building, execution and row decoding
#[derive(Debug, Error)]
pub enum TrySqlError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Postgres driver error
    #[cfg(feature = "postgres")]
    #[error("Query error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// MySQL driver error
    #[cfg(feature = "mysql")]
    #[error("Query error: {0}")]
    MySql(#[from] sqlx::Error),

    /// Error reported by a handle that is not backed by one of the bundled drivers
    #[error("Driver error: {0}")]
    Driver(String),

    /// The statement returned no rows
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// A value could not be converted into the requested destination type
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// Validation error (raised before anything reaches the database)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Pool error
    #[error("Pool error: {0}")]
    Pool(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Statement timeout error
    #[error("Statement timeout after {0:?}")]
    Timeout(Duration),

    /// The unit of work failed and the rollback that followed failed too
    #[error("{original} (rollback failed: {rollback})")]
    Rollback {
        original: Box<TrySqlError>,
        rollback: Box<TrySqlError>,
    },

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl TrySqlError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl ToString) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.to_string(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a type mismatch error
    pub fn type_mismatch(expected: &'static str, actual: &'static str) -> Self {
        Self::TypeMismatch { expected, actual }
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Parse a tokio_postgres error into a more specific error
    #[cfg(feature = "postgres")]
    pub fn from_pg_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(format!("{}: {}", constraint, message)),
                "23503" => {
                    return Self::ForeignKeyViolation(format!("{}: {}", constraint, message));
                }
                _ => {}
            }
        }
        Self::Postgres(err)
    }

    /// Parse a sqlx MySQL error into a more specific error
    #[cfg(feature = "mysql")]
    pub fn from_mysql_error(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::not_found("Expected one row, got none"),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => Self::Pool(err.to_string()),
            sqlx::Error::Database(ref db_err) => {
                let message = db_err.message().to_string();
                match db_err.kind() {
                    sqlx::error::ErrorKind::UniqueViolation => Self::UniqueViolation(message),
                    sqlx::error::ErrorKind::ForeignKeyViolation => {
                        Self::ForeignKeyViolation(message)
                    }
                    _ => Self::MySql(err),
                }
            }
            other => Self::MySql(other),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<deadpool_postgres::PoolError> for TrySqlError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

impl From<toml::de::Error> for TrySqlError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
