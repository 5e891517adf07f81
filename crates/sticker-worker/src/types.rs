//! Core types for the sticker worker

use axum::body::Bytes;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use serde::{Deserialize, Serialize};
use sticker_store::StoreStats;

/// Request header carrying the browser's destination classification
pub const FETCH_DEST_HEADER: &str = "sec-fetch-dest";

/// A request observed by the worker before it reaches the origin
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InterceptedRequest {
    /// Destination classification, e.g. `image` or `document`
    pub fn destination(&self) -> Option<&str> {
        self.headers
            .get(FETCH_DEST_HEADER)
            .and_then(|v| v.to_str().ok())
    }

    /// Path component only; query string is not part of it
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn path_and_query(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }
}

/// A completed network exchange, whatever its status
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchedResponse {
    pub fn content_type(&self) -> Option<String> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

/// Counters kept by the interception policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyStats {
    pub hits: u64,
    pub misses: u64,
    pub store_failures: u64,
    pub network_failures: u64,
    pub writes_stored: u64,
    pub writes_duplicate: u64,
    pub writes_failed: u64,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub store: StoreStats,
    pub policy: PolicyStats,
}
