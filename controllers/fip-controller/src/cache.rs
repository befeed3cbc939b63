//! Read-only view of the cluster state cache.
//!
//! The reconciler never talks to the API server for pods or controllers; it
//! reads whatever the reflectors have observed so far, gated on each cache
//! having completed its initial list.

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;

/// Snapshot source for pods, statefulsets and deployments
pub trait ClusterCache: Send + Sync {
    fn pods(&self) -> Vec<Arc<Pod>>;
    fn stateful_sets(&self) -> Vec<Arc<StatefulSet>>;
    fn deployments(&self) -> Vec<Arc<Deployment>>;

    fn pods_synced(&self) -> bool;
    fn stateful_sets_synced(&self) -> bool;
    fn deployments_synced(&self) -> bool;
}
