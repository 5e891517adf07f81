//! Error types for the sticker worker

use std::fmt;

#[derive(Debug)]
pub enum WorkerError {
    Store(sticker_store::StoreError),
    Io(Box<std::io::Error>),
    Config(String),
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::Store(err) => write!(f, "Store error: {}", err),
            WorkerError::Io(err) => write!(f, "IO error: {}", err),
            WorkerError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for WorkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WorkerError::Store(err) => Some(err),
            WorkerError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<sticker_store::StoreError> for WorkerError {
    fn from(err: sticker_store::StoreError) -> Self {
        WorkerError::Store(err)
    }
}

impl From<std::io::Error> for WorkerError {
    fn from(err: std::io::Error) -> Self {
        WorkerError::Io(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for WorkerError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        WorkerError::Config(err.to_string())
    }
}

impl From<crate::proxy::FetchError> for WorkerError {
    fn from(err: crate::proxy::FetchError) -> Self {
        WorkerError::Config(format!("Upstream client: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;
