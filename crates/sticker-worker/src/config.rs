use crate::error::{Result, WorkerError};
use crate::policy::{StoreErrorPolicy, DEFAULT_PREFIX};
use std::path::PathBuf;
use std::time::Duration;
use sticker_store::StoreConfig;
use url::Url;

/// Worker configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub port: u16,
    pub upstream_url: Url,
    pub upstream_timeout: Duration,
    pub sticker_prefix: String,
    pub store_error_policy: StoreErrorPolicy,
    pub store: StoreConfig,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse configuration from any key lookup. Unparsable numbers fall back
    /// to defaults; an invalid URL or policy name is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store_defaults = StoreConfig::default();

        let port = lookup("PORT")
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(3002);

        let upstream_raw =
            lookup("UPSTREAM_URL").unwrap_or_else(|| "http://localhost:3000".to_string());
        let upstream_url = Url::parse(&upstream_raw).map_err(|e| {
            WorkerError::Config(format!("invalid UPSTREAM_URL {}: {}", upstream_raw, e))
        })?;

        let upstream_timeout = lookup("UPSTREAM_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        let sticker_prefix =
            lookup("STICKER_PREFIX").unwrap_or_else(|| DEFAULT_PREFIX.to_string());
        if !sticker_prefix.starts_with('/') {
            return Err(WorkerError::Config(format!(
                "STICKER_PREFIX must start with '/': {}",
                sticker_prefix
            )));
        }

        let store_error_policy = match lookup("STORE_ERROR_POLICY") {
            Some(raw) => raw.parse().map_err(WorkerError::Config)?,
            None => StoreErrorPolicy::default(),
        };

        let store = StoreConfig {
            path: lookup("STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(store_defaults.path),
            max_connections: lookup("STORE_MAX_CONNECTIONS")
                .and_then(|s| s.parse::<u32>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(store_defaults.max_connections),
            busy_timeout: store_defaults.busy_timeout,
        };

        Ok(Self {
            port,
            upstream_url,
            upstream_timeout,
            sticker_prefix,
            store_error_policy,
            store,
        })
    }
}
