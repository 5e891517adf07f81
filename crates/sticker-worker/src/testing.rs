//! Test doubles shared by the policy and server tests

use crate::proxy::{FetchError, Upstream};
use crate::types::{FetchedResponse, InterceptedRequest, FETCH_DEST_HEADER};
use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use sticker_store::{StickerStore, StoreConfig};
use tokio::sync::Barrier;

/// Upstream that answers every request with a canned response
pub struct MockUpstream {
    response: Option<FetchedResponse>,
    barrier: Option<Barrier>,
    calls: AtomicUsize,
    seen: Mutex<Vec<InterceptedRequest>>,
}

impl MockUpstream {
    pub fn serving(status: StatusCode, content_type: &str, body: &'static [u8]) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_str(content_type).unwrap(),
        );
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=60"),
        );
        Self::with_response(Some(FetchedResponse {
            status,
            headers,
            body: Bytes::from_static(body),
        }))
    }

    pub fn failing() -> Self {
        Self::with_response(None)
    }

    fn with_response(response: Option<FetchedResponse>) -> Self {
        Self {
            response,
            barrier: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Hold every fetch until `n` fetches are in flight
    pub fn rendezvous(mut self, n: usize) -> Self {
        self.barrier = Some(Barrier::new(n));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<InterceptedRequest> {
        self.seen.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Upstream for MockUpstream {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<FetchedResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.clone());
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        self.response
            .clone()
            .ok_or_else(|| FetchError::InvalidUrl("mock upstream is down".to_string()))
    }
}

pub fn request(method: Method, uri: &str, destination: Option<&str>) -> InterceptedRequest {
    let mut headers = HeaderMap::new();
    if let Some(dest) = destination {
        headers.insert(FETCH_DEST_HEADER, HeaderValue::from_str(dest).unwrap());
    }
    headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip, br"));
    InterceptedRequest {
        method,
        uri: uri.parse().unwrap(),
        headers,
        body: Bytes::new(),
    }
}

pub fn image_request(uri: &str) -> InterceptedRequest {
    request(Method::GET, uri, Some("image"))
}

pub fn temp_store(dir: &Path) -> StickerStore {
    StickerStore::new(StoreConfig {
        path: dir.join("sticker-db.sqlite"),
        ..StoreConfig::default()
    })
}
