//! Per-cycle view of the live cluster, keyed the way the store keys records.

use crate::cache::ClusterCache;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Pod, PodSpec};
use kube::Resource;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{Level, trace};

use super::keys::{deployment_pod_key, full_name, pod_key};
use super::policy::requests_resource;

const POD_FAILED: &str = "Failed";
const EVICTED_REASON: &str = "Evicted";
const REPLICA_SET_KIND: &str = "ReplicaSet";

/// Live pods and controllers that take part in floating IP allocation.
///
/// Rebuilt every cycle; never persisted.
#[derive(Debug, Default)]
pub struct ClusterSnapshot {
    /// Non-evicted floating IP pods by store key
    pub existing_pods: HashMap<String, Arc<Pod>>,
    /// Floating IP statefulsets by `<namespace>_<name>`
    pub stateful_sets: HashMap<String, Arc<StatefulSet>>,
    /// Floating IP deployments by `<namespace>_<name>`
    pub deployments: HashMap<String, Arc<Deployment>>,
    /// Cached statefulsets whose template does not request the resource
    pub non_requesting_stateful_sets: HashSet<String>,
    /// Cached deployments whose template does not request the resource
    pub non_requesting_deployments: HashSet<String>,
}

impl ClusterSnapshot {
    /// Builds the snapshot from `cache`, keeping only workloads requesting `resource`
    pub fn build(cache: &dyn ClusterCache, resource: &str) -> Self {
        let all_deployments = cache.deployments();
        let deployment_names = deployment_names(&all_deployments);

        let mut existing_pods = HashMap::new();
        for pod in wanted_pods(cache, resource) {
            if is_evicted(&pod) {
                // treated as deleted
                continue;
            }
            existing_pods.insert(store_key(&pod, &deployment_names), pod);
        }

        let (stateful_sets, non_requesting_stateful_sets) =
            partition_by_template(cache.stateful_sets(), resource, |ss| {
                ss.spec.as_ref().and_then(|spec| spec.template.spec.as_ref())
            });
        let (deployments, non_requesting_deployments) =
            partition_by_template(all_deployments, resource, |dp| {
                dp.spec.as_ref().and_then(|spec| spec.template.spec.as_ref())
            });

        let snapshot = Self {
            existing_pods,
            stateful_sets,
            deployments,
            non_requesting_stateful_sets,
            non_requesting_deployments,
        };
        snapshot.trace_dump();
        snapshot
    }

    fn trace_dump(&self) {
        if !tracing::enabled!(Level::TRACE) {
            return;
        }
        let pods: HashMap<&str, String> = self
            .existing_pods
            .iter()
            .map(|(key, pod)| (key.as_str(), object_full_name(&pod.metadata)))
            .collect();
        trace!("existPods {:?}", pods);
        trace!("statefulsets {:?}", self.stateful_sets.keys().collect::<Vec<_>>());
        trace!("deployments {:?}", self.deployments.keys().collect::<Vec<_>>());
        trace!("statefulsets without resource {:?}", self.non_requesting_stateful_sets);
        trace!("deployments without resource {:?}", self.non_requesting_deployments);
    }
}

/// Splits controllers into those whose pod template requests `resource`,
/// keyed by full name, and the full names of the rest
fn partition_by_template<T, F>(
    objects: Vec<Arc<T>>,
    resource: &str,
    template: F,
) -> (HashMap<String, Arc<T>>, HashSet<String>)
where
    T: Resource<DynamicType = ()>,
    F: Fn(&T) -> Option<&PodSpec>,
{
    let mut requesting = HashMap::new();
    let mut others = HashSet::new();
    for obj in objects {
        let name = object_full_name(obj.meta());
        if template(obj.as_ref()).is_some_and(|spec| requests_resource(spec, resource)) {
            requesting.insert(name, obj);
        } else {
            others.insert(name);
        }
    }
    (requesting, others)
}

/// Pods whose spec requests `resource`
pub fn wanted_pods(cache: &dyn ClusterCache, resource: &str) -> Vec<Arc<Pod>> {
    cache
        .pods()
        .into_iter()
        .filter(|pod| {
            pod.spec
                .as_ref()
                .is_some_and(|spec| requests_resource(spec, resource))
        })
        .collect()
}

/// `<namespace>_<name>` of every deployment in the cache
pub fn deployment_names(deployments: &[Arc<Deployment>]) -> HashSet<String> {
    deployments
        .iter()
        .map(|dp| object_full_name(&dp.metadata))
        .collect()
}

pub fn is_evicted(pod: &Pod) -> bool {
    pod.status.as_ref().is_some_and(|status| {
        status.phase.as_deref() == Some(POD_FAILED) && status.reason.as_deref() == Some(EVICTED_REASON)
    })
}

/// Name of the deployment owning `pod`, if it is still in the cache.
///
/// The owner is a single ReplicaSet named `<deployment>-<pod-template-hash>`.
pub fn pod_deployment(pod: &Pod, deployment_names: &HashSet<String>) -> Option<String> {
    let owners = pod.metadata.owner_references.as_ref()?;
    let [owner] = owners.as_slice() else {
        return None;
    };
    if owner.kind != REPLICA_SET_KIND {
        return None;
    }
    let (deployment, _hash) = owner.name.rsplit_once('-')?;
    let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();
    deployment_names
        .contains(&full_name(namespace, deployment))
        .then(|| deployment.to_string())
}

/// Store key of a live pod
pub fn store_key(pod: &Pod, deployment_names: &HashSet<String>) -> String {
    let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();
    let name = pod.metadata.name.as_deref().unwrap_or_default();
    match pod_deployment(pod, deployment_names) {
        Some(deployment) => deployment_pod_key(namespace, &deployment, name),
        None => pod_key(namespace, name),
    }
}

fn object_full_name(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> String {
    full_name(
        meta.namespace.as_deref().unwrap_or_default(),
        meta.name.as_deref().unwrap_or_default(),
    )
}
