//! Store types

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Raw image bytes plus the type tag they were served with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
}

/// A cached sticker, keyed by its request path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAsset {
    pub id: String,
    pub payload: Payload,
}

impl CachedAsset {
    pub fn new(id: impl Into<String>, data: Vec<u8>, content_type: Option<String>) -> Self {
        Self {
            id: id.into(),
            payload: Payload { data, content_type },
        }
    }
}

/// Outcome of a keyed lookup. `NotFound` is not an error.
#[derive(Debug)]
pub enum Lookup {
    Found(CachedAsset),
    NotFound,
    Failed(StoreError),
}

impl Lookup {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

/// Statistics about the store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub entries: u64,
    pub total_size: u64,
    pub schema_version: i64,
}

/// Configuration for the sticker store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/sticker-db.sqlite"),
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
        }
    }
}
