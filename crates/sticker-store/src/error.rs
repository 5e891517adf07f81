//! Error types for the sticker store

use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    /// The database could not be reached or the store has been closed.
    StorageUnavailable(String),
    /// Migrations could not be applied.
    Schema(String),
    /// Insert rejected because the id already exists.
    DuplicateKey(String),
    Database(Box<sqlx::Error>),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::StorageUnavailable(msg) => write!(f, "Storage unavailable: {}", msg),
            StoreError::Schema(msg) => write!(f, "Schema error: {}", msg),
            StoreError::DuplicateKey(id) => write!(f, "Duplicate key: {}", id),
            StoreError::Database(err) => write!(f, "Database error: {}", err),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Database(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolClosed => {
                StoreError::StorageUnavailable("connection pool is closed".to_string())
            }
            sqlx::Error::PoolTimedOut => {
                StoreError::StorageUnavailable("timed out acquiring a connection".to_string())
            }
            sqlx::Error::Io(err) => StoreError::StorageUnavailable(err.to_string()),
            other => StoreError::Database(Box::new(other)),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Schema(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
