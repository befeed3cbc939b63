//! Floating IP reconciliation.
//!
//! - `keys`: allocation store key grammar
//! - `policy`: release policy, resource and attribute resolution
//! - `snapshot`: per-cycle view of live pods, statefulsets and deployments
//! - `resync`: releases, rebinds and cloud unassignment of records whose pod is gone
//! - `sync`: records the addresses of running pods into the store

pub mod keys;
pub mod policy;
pub mod resync;
pub mod snapshot;
pub mod sync;
#[cfg(test)]
mod sync_test;

use crate::cache::ClusterCache;
use crate::error::ControllerError;
use cloud_provider_client::{CloudProviderTrait, UnassignIpRequest};
use ipam_store::FloatingIpStore;
use policy::ResourceNames;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const CACHE_SYNC_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Reconciles the allocation store(s) against the cluster cache.
pub struct Reconciler {
    pub(crate) ipam: Arc<dyn FloatingIpStore>,
    pub(crate) second_ipam: Option<Arc<dyn FloatingIpStore>>,
    pub(crate) cloud_provider: Option<Arc<dyn CloudProviderTrait>>,
    pub(crate) cache: Arc<dyn ClusterCache>,
    pub(crate) resources: ResourceNames,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        ipam: Arc<dyn FloatingIpStore>,
        second_ipam: Option<Arc<dyn FloatingIpStore>>,
        cloud_provider: Option<Arc<dyn CloudProviderTrait>>,
        cache: Arc<dyn ClusterCache>,
        resources: ResourceNames,
    ) -> Self {
        Self {
            ipam,
            second_ipam,
            cloud_provider,
            cache,
            resources,
        }
    }

    /// Configured stores, primary first
    pub(crate) fn stores(&self) -> impl Iterator<Item = &Arc<dyn FloatingIpStore>> {
        std::iter::once(&self.ipam).chain(self.second_ipam.iter())
    }

    /// Whether every cache finished its initial list
    pub(crate) fn store_ready(&self) -> bool {
        if !self.cache.pods_synced() {
            debug!("the pod store has not been synced yet");
            return false;
        }
        if !self.cache.stateful_sets_synced() {
            debug!("the statefulset store has not been synced yet");
            return false;
        }
        if !self.cache.deployments_synced() {
            debug!("the deployment store has not been synced yet");
            return false;
        }
        true
    }

    /// Resolves once every cache finished its initial list
    pub async fn wait_for_cache_sync(&self) {
        while !self.store_ready() {
            tokio::time::sleep(CACHE_SYNC_POLL_INTERVAL).await;
        }
        info!("caches synced");
    }

    /// Detaches an address from its node; a no-op without a cloud provider
    pub(crate) async fn cloud_provider_unassign_ip(
        &self,
        request: &UnassignIpRequest,
    ) -> Result<(), ControllerError> {
        let Some(cloud_provider) = &self.cloud_provider else {
            return Ok(());
        };
        cloud_provider.unassign_ip(request).await?;
        info!("unassigned ip {} from node {}", request.ip_address, request.node_name);
        Ok(())
    }
}
