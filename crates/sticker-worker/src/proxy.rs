//! Network fetching against the origin server

use crate::types::{FetchedResponse, InterceptedRequest};
use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use reqwest::Client;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug)]
pub enum FetchError {
    Http(Box<reqwest::Error>),
    InvalidUrl(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Http(err) => write!(f, "HTTP error: {}", err),
            FetchError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Http(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Http(Box::new(err))
    }
}

/// Where intercepted requests go when they cannot be answered locally
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Perform the request. Any completed exchange is `Ok`, including
    /// error statuses; only transport failures are `Err`.
    async fn fetch(&self, request: &InterceptedRequest) -> Result<FetchedResponse, FetchError>;
}

/// Connection-level headers that must not be forwarded by a proxy
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

/// Copy `headers` without hop-by-hop entries or `Content-Length`
pub fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if HOP_BY_HOP.contains(&name.as_str()) || *name == header::CONTENT_LENGTH {
            continue;
        }
        forwarded.append(name.clone(), value.clone());
    }
    forwarded
}

/// HTTP client for the origin server
pub struct HttpUpstream {
    client: Client,
    base_url: Url,
}

impl HttpUpstream {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, FetchError> {
        if base_url.cannot_be_a_base() {
            return Err(FetchError::InvalidUrl(base_url.to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    fn target_url(&self, path_and_query: &str) -> String {
        format!(
            "{}{}",
            self.base_url.as_str().trim_end_matches('/'),
            path_and_query
        )
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<FetchedResponse, FetchError> {
        let url = self.target_url(request.path_and_query());
        debug!(method = %request.method, url = %url, "Fetching from upstream");

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(forwardable_headers(&request.headers));
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Upstream request failed");
            e
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        debug!(url = %url, status = %status, size = body.len(), "Fetched from upstream");

        Ok(FetchedResponse {
            status,
            headers,
            body,
        })
    }
}
