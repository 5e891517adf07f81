//! Cache-first interception policy for sticker images
//!
//! Matching requests are answered from the sticker store when possible.
//! On a miss the request goes to the network once, the response is handed
//! back unchanged, and the payload is written to the store by a detached
//! task that the response path never waits for.

use crate::proxy::{FetchError, Upstream};
use crate::types::{FetchedResponse, InterceptedRequest, PolicyStats};
use axum::http::{header, Method, StatusCode};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use sticker_store::{CachedAsset, Lookup, StickerStore, StoreError};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

pub const DEFAULT_PREFIX: &str = "/sticker/";

/// What to do when the store lookup itself fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreErrorPolicy {
    /// Treat the failure as a miss and go to the network
    #[default]
    Fallback,
    /// Fail the request
    Propagate,
}

impl FromStr for StoreErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fallback" => Ok(StoreErrorPolicy::Fallback),
            "propagate" => Ok(StoreErrorPolicy::Propagate),
            other => Err(format!("unknown store error policy: {}", other)),
        }
    }
}

#[derive(Debug)]
pub enum PolicyError {
    Network(FetchError),
    Store(StoreError),
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyError::Network(err) => write!(f, "Network error: {}", err),
            PolicyError::Store(err) => write!(f, "Store error: {}", err),
        }
    }
}

impl std::error::Error for PolicyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PolicyError::Network(err) => Some(err),
            PolicyError::Store(err) => Some(err),
        }
    }
}

/// Result of the background write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Stored,
    Duplicate,
    Failed,
}

pub enum Served {
    /// Answered from the store; no network access happened
    Cached(CachedAsset),
    /// Answered by the network. `persist` is the detached store write, if one
    /// was started.
    Network {
        response: FetchedResponse,
        persist: Option<JoinHandle<PersistOutcome>>,
    },
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    store_failures: AtomicU64,
    network_failures: AtomicU64,
    writes_stored: AtomicU64,
    writes_duplicate: AtomicU64,
    writes_failed: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct StickerPolicy {
    store: Arc<StickerStore>,
    upstream: Arc<dyn Upstream>,
    prefix: String,
    on_store_error: StoreErrorPolicy,
    counters: Arc<Counters>,
}

impl StickerPolicy {
    pub fn new(store: Arc<StickerStore>, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            store,
            upstream,
            prefix: DEFAULT_PREFIX.to_string(),
            on_store_error: StoreErrorPolicy::default(),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_store_error_policy(mut self, policy: StoreErrorPolicy) -> Self {
        self.on_store_error = policy;
        self
    }

    /// Only image requests under the sticker prefix are handled here
    pub fn intercepts(&self, request: &InterceptedRequest) -> bool {
        request.destination() == Some("image") && request.path().starts_with(&self.prefix)
    }

    pub async fn handle(&self, request: &InterceptedRequest) -> Result<Served, PolicyError> {
        let id = request.path().to_string();

        match self.store.get(&id).await {
            Lookup::Found(asset) => {
                Counters::bump(&self.counters.hits);
                debug!(id = %id, size = asset.payload.data.len(), "Sticker cache hit");
                return Ok(Served::Cached(asset));
            }
            Lookup::NotFound => {
                Counters::bump(&self.counters.misses);
                debug!(id = %id, "Sticker not in store");
            }
            Lookup::Failed(e) => {
                Counters::bump(&self.counters.store_failures);
                error!(id = %id, error = %e, "Sticker lookup failed");
                if self.on_store_error == StoreErrorPolicy::Propagate {
                    return Err(PolicyError::Store(e));
                }
                Counters::bump(&self.counters.misses);
            }
        }

        let response = self
            .upstream
            .fetch(&identity_encoded(request))
            .await
            .map_err(|e| {
                Counters::bump(&self.counters.network_failures);
                warn!(id = %id, error = %e, "Sticker fetch failed");
                PolicyError::Network(e)
            })?;

        let persist = if is_complete_image(request, &response) {
            Some(self.persist_in_background(id, &response))
        } else {
            debug!(
                id = %id,
                method = %request.method,
                status = %response.status,
                "Not caching incomplete response"
            );
            None
        };

        Ok(Served::Network { response, persist })
    }

    fn persist_in_background(
        &self,
        id: String,
        response: &FetchedResponse,
    ) -> JoinHandle<PersistOutcome> {
        let asset = CachedAsset::new(id, response.body.to_vec(), response.content_type());
        let store = Arc::clone(&self.store);
        let counters = Arc::clone(&self.counters);

        tokio::spawn(async move {
            match store.put(&asset).await {
                Ok(()) => {
                    Counters::bump(&counters.writes_stored);
                    debug!(id = %asset.id, "Sticker cached");
                    PersistOutcome::Stored
                }
                Err(StoreError::DuplicateKey(_)) => {
                    Counters::bump(&counters.writes_duplicate);
                    debug!(id = %asset.id, "Sticker already cached by a concurrent request");
                    PersistOutcome::Duplicate
                }
                Err(e) => {
                    Counters::bump(&counters.writes_failed);
                    error!(id = %asset.id, error = %e, "Failed to cache sticker");
                    PersistOutcome::Failed
                }
            }
        })
    }

    pub fn stats(&self) -> PolicyStats {
        let c = &self.counters;
        PolicyStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            store_failures: c.store_failures.load(Ordering::Relaxed),
            network_failures: c.network_failures.load(Ordering::Relaxed),
            writes_stored: c.writes_stored.load(Ordering::Relaxed),
            writes_duplicate: c.writes_duplicate.load(Ordering::Relaxed),
            writes_failed: c.writes_failed.load(Ordering::Relaxed),
        }
    }
}

/// Only a full `GET` body is the whole image. `HEAD` has no body and `206`
/// holds a slice, and a stored entry is never replaced.
fn is_complete_image(request: &InterceptedRequest, response: &FetchedResponse) -> bool {
    request.method == Method::GET && response.status == StatusCode::OK
}

/// The stored payload must be the decoded image, so ask for identity bytes
fn identity_encoded(request: &InterceptedRequest) -> InterceptedRequest {
    let mut request = request.clone();
    request.headers.remove(header::ACCEPT_ENCODING);
    request
}
