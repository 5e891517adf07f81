//! Sticker worker - cache-first interception of sticker images
//!
//! Sits between pages and the origin. Image requests under the sticker
//! prefix are answered from a local store when possible and fetched from
//! the origin (then stored) otherwise. All other traffic is forwarded as is.

mod config;
mod error;
mod policy;
mod proxy;
mod server;
#[cfg(test)]
mod testing;
mod types;

use crate::config::WorkerConfig;
use crate::error::Result;
use crate::policy::StickerPolicy;
use crate::proxy::{HttpUpstream, Upstream};
use crate::server::{start_server, ServerState, SharedState};
use std::sync::Arc;
use sticker_store::StickerStore;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env().add_directive("sticker_worker=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting sticker worker...");

    let config = WorkerConfig::from_env()?;
    info!("Port: {}", config.port);
    info!("Upstream: {}", config.upstream_url);
    info!("Store: {:?}", config.store.path);
    info!("Sticker prefix: {}", config.sticker_prefix);
    info!("Store error policy: {:?}", config.store_error_policy);

    let store = Arc::new(StickerStore::new(config.store.clone()));

    // Install: prepare the store before taking traffic. Lookups retry the
    // open lazily, so a failure here only means network-served stickers.
    if let Err(e) = store.open().await {
        error!(error = %e, "Sticker store unavailable at startup");
    }

    let upstream: Arc<dyn Upstream> = Arc::new(HttpUpstream::new(
        config.upstream_url.clone(),
        config.upstream_timeout,
    )?);

    let policy = StickerPolicy::new(Arc::clone(&store), Arc::clone(&upstream))
        .with_prefix(config.sticker_prefix.clone())
        .with_store_error_policy(config.store_error_policy);

    let state: SharedState = Arc::new(ServerState::new(Arc::clone(&store), policy, upstream));

    // Activate immediately; there is no previous instance to wait for
    let served = start_server(state, config.port, shutdown_signal()).await;

    store.close().await;
    served?;

    info!("Sticker worker stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
