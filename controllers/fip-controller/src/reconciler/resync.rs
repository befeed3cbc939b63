//! Reconciliation of store records whose pod no longer exists.
//!
//! A record is released from
//! 1. deleted pods whose parent app does not exist (deployment keys)
//! 2. deleted pods whose parent deployment or statefulset exists but is not ip immutable
//! 3. deleted pods whose parent deployment no longer needs so many ips
//! 4. deleted pods whose parent statefulset exists but pod index >= replicas
//! 5. existing pods that have been evicted
//! 6. deleted pods whose parent app no longer requests floating ips
//!
//! Deployment pod records that are kept are moved back to the deployment (or
//! pool) reservation key so the next pod of that deployment can reuse them.

use cloud_provider_client::UnassignIpRequest;
use ipam_store::{FloatingIp, FloatingIpStore, ReleasePolicy};
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use tracing::{debug, error, info, warn};

use super::Reconciler;
use super::keys::{
    FipKey, deployment_pool_prefix, deployment_prefix, is_pool_key, parse_pod_index, pool_prefix,
};
use super::policy::{Attr, parse_release_policy};
use super::snapshot::ClusterSnapshot;
use crate::error::ControllerError;

pub const DELETED_AND_LABEL_MISS_MATCH_POD: &str = "deleted pod with label miss match";
pub const DELETED_AND_IP_MUTABLE_POD: &str = "deleted pod whose app is ip mutable";
pub const DELETED_AND_SCALED_DOWN_DP_POD: &str = "deleted pod of scaled down deployment";
pub const DELETED_AND_SCALED_DOWN_SS_POD: &str = "deleted pod of scaled down statefulset";
pub const DELETED_AND_DP_DELETED_POD: &str = "deleted pod of deleted deployment";

/// A store record taking part in one cycle
#[derive(Debug, Clone)]
pub(crate) struct ResyncObj {
    /// Key as stored
    pub(crate) key: String,
    pub(crate) parsed: FipKey,
    pub(crate) app_full_name: String,
    pub(crate) attr: String,
    pub(crate) ip: Ipv4Addr,
}

/// Records classified in one traversal of the store, one entry per address.
///
/// A deployment or pool reservation key may own several addresses, so
/// records are indexed by address rather than by key.
#[derive(Debug, Default)]
pub(crate) struct ResyncCandidates {
    /// Every parseable record; their cloud assignment is undone once the pod is gone
    pub(crate) assigned: BTreeMap<Ipv4Addr, ResyncObj>,
    /// Records whose store entry may be released or rebound once the pod is gone
    pub(crate) releasable: BTreeMap<Ipv4Addr, ResyncObj>,
}

/// Splits store records into cloud-unassign and release candidates
pub(crate) fn classify(fips: &[FloatingIp]) -> ResyncCandidates {
    let mut candidates = ResyncCandidates::default();
    for fip in fips {
        if fip.key.is_empty() || is_pool_key(&fip.key) {
            continue;
        }
        let parsed = FipKey::parse(&fip.key);
        let Some(app_full_name) = parsed.app_full_name() else {
            warn!("unexpected key: {}", fip.key);
            continue;
        };
        let obj = ResyncObj {
            key: fip.key.clone(),
            parsed,
            app_full_name,
            attr: fip.attr.clone(),
            ip: fip.ip,
        };
        // unassign from the cloud provider whatever the release policy
        candidates.assigned.insert(fip.ip, obj.clone());
        // never-policy statefulset pods keep their ip under their own pod name and
        // deployment reservations are kept for the next pod; only deployment pods
        // are candidates to be moved back to their reservation key
        if fip.policy == ReleasePolicy::Never && !obj.parsed.is_deployment_pod() {
            continue;
        }
        candidates.releasable.insert(fip.ip, obj);
    }
    candidates
}

/// Records of one store as the running pass sees them: the listing taken at
/// the start of the pass with the pass's own releases and rebinds applied.
#[derive(Debug, Default)]
pub(crate) struct StoreView {
    records: BTreeMap<Ipv4Addr, FloatingIp>,
}

impl StoreView {
    pub(crate) fn new(fips: &[FloatingIp]) -> Self {
        Self {
            records: fips.iter().map(|fip| (fip.ip, fip.clone())).collect(),
        }
    }

    /// Number of allocated records whose key starts with `prefix`
    pub(crate) fn count_prefix(&self, prefix: &str) -> usize {
        self.records
            .values()
            .filter(|fip| !fip.key.is_empty() && fip.key.starts_with(prefix))
            .count()
    }

    /// Any one record stored under exactly `key`
    pub(crate) fn first(&self, key: &str) -> Option<&FloatingIp> {
        self.records.values().find(|fip| fip.key == key)
    }

    fn released(&mut self, ip: Ipv4Addr) {
        self.records.remove(&ip);
    }

    fn rebound(&mut self, ip: Ipv4Addr, key: &str) {
        if let Some(fip) = self.records.get_mut(&ip) {
            fip.key = key.to_string();
        }
    }
}

fn template_policy(template: &PodTemplateSpec) -> ReleasePolicy {
    template
        .metadata
        .as_ref()
        .map(parse_release_policy)
        .unwrap_or_default()
}

async fn release_ip(ipam: &dyn FloatingIpStore, view: &mut StoreView, obj: &ResyncObj, reason: &str) {
    match ipam.release(&obj.key, obj.ip, reason).await {
        Ok(()) => {
            view.released(obj.ip);
            info!("[{}] released ip {} of {}: {}", ipam.name(), obj.ip, obj.key, reason);
        }
        Err(e) => warn!("[{}] failed to release ip {} of {}: {}", ipam.name(), obj.ip, obj.key, e),
    }
}

async fn reserve_ip(ipam: &dyn FloatingIpStore, view: &mut StoreView, obj: &ResyncObj, reserve_key: &str) {
    match ipam.update_key(obj.ip, &obj.key, reserve_key).await {
        Ok(()) => {
            view.rebound(obj.ip, reserve_key);
            info!("[{}] reserved ip {} of {} for {}", ipam.name(), obj.ip, obj.key, reserve_key);
        }
        Err(e) => error!("[{}] failed reserve ip {} of {} for {}: {}", ipam.name(), obj.ip, obj.key, reserve_key, e),
    }
}

impl Reconciler {
    /// Runs one reconciliation cycle over every configured store.
    ///
    /// Skipped entirely until all caches have synced.
    pub async fn reconcile(&self) {
        if !self.store_ready() {
            return;
        }
        info!("resync pods");
        let snapshot = ClusterSnapshot::build(self.cache.as_ref(), &self.resources.primary);
        for ipam in self.stores() {
            if let Err(e) = self.resync_store(ipam.as_ref(), &snapshot).await {
                error!("[{}] resync failed: {}", ipam.name(), e);
            }
        }
    }

    pub(crate) async fn resync_store(
        &self,
        ipam: &dyn FloatingIpStore,
        snapshot: &ClusterSnapshot,
    ) -> Result<(), ControllerError> {
        let all = ipam.by_prefix("").await?;
        let mut candidates = classify(&all);
        let mut view = StoreView::new(&all);

        self.unassign_deleted_pods(ipam, snapshot, &mut candidates).await;

        for obj in candidates.releasable.values() {
            if snapshot.existing_pods.contains_key(&obj.key) {
                continue;
            }
            self.resync_record(ipam, snapshot, &mut view, obj).await;
        }
        Ok(())
    }

    async fn unassign_deleted_pods(
        &self,
        ipam: &dyn FloatingIpStore,
        snapshot: &ClusterSnapshot,
        candidates: &mut ResyncCandidates,
    ) {
        for (ip, obj) in &candidates.assigned {
            if snapshot.existing_pods.contains_key(&obj.key) {
                continue;
            }
            let attr = match Attr::parse(&obj.attr) {
                Ok(attr) => attr,
                Err(e) => {
                    error!("[{}] failed to unmarshal attr {} for pod {}: {}", ipam.name(), obj.attr, obj.key, e);
                    continue;
                }
            };
            if attr.node_name.is_empty() {
                error!("[{}] empty nodeName for {} in store", ipam.name(), obj.key);
                continue;
            }
            let request = UnassignIpRequest {
                node_name: attr.node_name,
                ip_address: ip.to_string(),
            };
            if let Err(e) = self.cloud_provider_unassign_ip(&request).await {
                // keep the record so the next cycle retries the unassignment first
                candidates.releasable.remove(ip);
                warn!("[{}] failed to unassign ip {} of {}: {}", ipam.name(), ip, obj.key, e);
            }
        }
    }

    async fn resync_record(
        &self,
        ipam: &dyn FloatingIpStore,
        snapshot: &ClusterSnapshot,
        view: &mut StoreView,
        obj: &ResyncObj,
    ) {
        // labels of a deleted pod are gone, so decide from its statefulset or deployment
        match &obj.parsed {
            FipKey::StatefulSetPod { .. } => {
                if let Some(ss) = snapshot.stateful_sets.get(&obj.app_full_name) {
                    resync_statefulset_pod(ipam, view, obj, ss).await;
                } else if snapshot.non_requesting_stateful_sets.contains(&obj.app_full_name) {
                    release_ip(ipam, view, obj, DELETED_AND_LABEL_MISS_MATCH_POD).await;
                }
            }
            FipKey::DeploymentPod {
                namespace,
                deployment,
                ..
            }
            | FipKey::Deployment {
                namespace,
                deployment,
            } => {
                if let Some(dp) = snapshot.deployments.get(&obj.app_full_name) {
                    resync_deployment_pod(ipam, view, obj, dp).await;
                } else if snapshot.non_requesting_deployments.contains(&obj.app_full_name) {
                    release_ip(ipam, view, obj, DELETED_AND_LABEL_MISS_MATCH_POD).await;
                } else {
                    resync_deleted_deployment(ipam, view, obj, namespace, deployment).await;
                }
            }
            FipKey::Plain { .. } | FipKey::Pool { .. } | FipKey::Unrecognized(_) => {}
        }
    }
}

async fn resync_statefulset_pod(
    ipam: &dyn FloatingIpStore,
    view: &mut StoreView,
    obj: &ResyncObj,
    ss: &StatefulSet,
) {
    let Some(spec) = ss.spec.as_ref() else {
        return;
    };
    if template_policy(&spec.template) != ReleasePolicy::Immutable {
        release_ip(ipam, view, obj, DELETED_AND_IP_MUTABLE_POD).await;
        return;
    }
    let index = match parse_pod_index(&obj.key) {
        Ok(index) => index,
        Err(e) => {
            error!(
                "[{}] invalid pod name {} of statefulset {}: {}",
                ipam.name(),
                obj.key,
                ss.metadata.name.as_deref().unwrap_or_default(),
                e
            );
            return;
        }
    };
    if let Some(replicas) = spec.replicas {
        if i64::from(replicas) < i64::from(index) + 1 {
            release_ip(ipam, view, obj, DELETED_AND_SCALED_DOWN_SS_POD).await;
            return;
        }
    }
    debug!("[{}] keeping ip of {} for statefulset pod recreation", ipam.name(), obj.key);
}

async fn resync_deployment_pod(
    ipam: &dyn FloatingIpStore,
    view: &mut StoreView,
    obj: &ResyncObj,
    dp: &Deployment,
) {
    let Some(spec) = dp.spec.as_ref() else {
        return;
    };
    let policy = template_policy(&spec.template);
    if policy == ReleasePolicy::PodDelete {
        release_ip(ipam, view, obj, DELETED_AND_IP_MUTABLE_POD).await;
        return;
    }
    let dp_key = deployment_pool_prefix(
        spec.template
            .metadata
            .as_ref()
            .and_then(|meta| meta.annotations.as_ref()),
        dp.metadata.name.as_deref().unwrap_or_default(),
        dp.metadata.namespace.as_deref().unwrap_or_default(),
    );
    // the API server defaults replicas to 1
    let replicas = usize::try_from(spec.replicas.unwrap_or(1)).unwrap_or(0);
    if replicas < view.count_prefix(&dp_key) && policy == ReleasePolicy::Immutable {
        release_ip(ipam, view, obj, DELETED_AND_SCALED_DOWN_DP_POD).await;
    } else if dp_key != obj.key {
        reserve_ip(ipam, view, obj, &dp_key).await;
    }
}

/// The deployment is gone but records still point at it
async fn resync_deleted_deployment(
    ipam: &dyn FloatingIpStore,
    view: &mut StoreView,
    obj: &ResyncObj,
    namespace: &str,
    deployment: &str,
) {
    let Some(policy) = view.first(&obj.key).map(|fip| fip.policy) else {
        return;
    };
    if policy != ReleasePolicy::Never {
        release_ip(ipam, view, obj, DELETED_AND_DP_DELETED_POD).await;
        return;
    }
    let attr = match Attr::parse(&obj.attr) {
        Ok(attr) => attr,
        Err(e) => {
            error!("[{}] failed to unmarshal attr {} for pod {}: {}", ipam.name(), obj.attr, obj.key, e);
            return;
        }
    };
    let reserve_key = if attr.pool.is_empty() {
        deployment_prefix(deployment, namespace)
    } else {
        pool_prefix(&attr.pool)
    };
    if reserve_key == obj.key {
        return;
    }
    reserve_ip(ipam, view, obj, &reserve_key).await;
}
