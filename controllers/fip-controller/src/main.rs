//! Floating IP Controller
//!
//! Keeps the floating IP allocation store consistent with the cluster.
//!
//! This controller watches pods, statefulsets and deployments, releases or
//! re-reserves addresses whose pod is gone, undoes their cloud assignment,
//! and records the addresses of running pods that the store does not know.

mod backoff;
mod cache;
mod config;
mod controller;
mod error;
mod reconciler;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("rustls crypto provider already installed");
    }

    info!("Starting Floating IP Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Watch namespace: {}", config.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Store namespace: {}", config.store_namespace);
    info!(
        "  Second store namespace: {}",
        config.second_store_namespace.as_deref().unwrap_or("disabled")
    );
    info!("  Floating IP resources: {} / {}", config.resources.primary, config.resources.secondary);
    info!("  Resync interval: {:?}", config.resync_interval);
    info!("  Sync IP interval: {:?}", config.sync_ip_interval);
    info!(
        "  Cloud provider: {}",
        config.cloud_provider_url.as_deref().unwrap_or("disabled")
    );

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
