//! Test utilities for unit testing the reconciler
//!
//! This module provides helpers for creating pods, statefulsets, deployments
//! and store records, plus an in-memory cluster cache.

use crate::cache::ClusterCache;
use crate::reconciler::Reconciler;
use crate::reconciler::policy::{IP_POOL_ANNOTATION, RELEASE_POLICY_ANNOTATION, ResourceNames};
use crate::reconciler::sync::EXTENDED_CNI_ARGS_ANNOTATION;
use cloud_provider_client::{CloudProviderTrait, MockCloudProvider};
use ipam_store::{FloatingIp, FloatingIpStore, MockFloatingIpStore, ReleasePolicy};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, Pod, PodSpec, PodStatus, PodTemplateSpec, ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

pub const FIP_RESOURCE: &str = "tke.cloud.tencent.com/eni-ip";
pub const SECOND_FIP_RESOURCE: &str = "tke.cloud.tencent.com/eni-ip2";

pub fn test_resources() -> ResourceNames {
    ResourceNames {
        primary: FIP_RESOURCE.to_string(),
        secondary: SECOND_FIP_RESOURCE.to_string(),
    }
}

pub fn test_ip(last: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, last)
}

/// Store record owned by `key` on `node`
pub fn fip(key: &str, last: u8, policy: ReleasePolicy, node: &str) -> FloatingIp {
    FloatingIp::new(key, test_ip(last), policy, format!(r#"{{"NodeName":"{}"}}"#, node))
}

fn container_requesting(resources: &[&str]) -> Container {
    let quantities: BTreeMap<String, Quantity> = resources
        .iter()
        .map(|name| (name.to_string(), Quantity("1".to_string())))
        .collect();
    Container {
        name: "app".to_string(),
        resources: Some(ResourceRequirements {
            requests: Some(quantities.clone()),
            limits: Some(quantities),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn pod_spec_requesting(resources: &[&str]) -> PodSpec {
    PodSpec {
        containers: vec![container_requesting(resources)],
        ..Default::default()
    }
}

/// Running pod requesting a floating IP, scheduled on `node`
pub fn create_test_pod(name: &str, namespace: &str, node: &str) -> Pod {
    let mut spec = pod_spec_requesting(&[FIP_RESOURCE]);
    spec.node_name = Some(node.to_string());
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(spec),
        status: Some(PodStatus {
            phase: Some("Running".to_string()),
            ..Default::default()
        }),
    }
}

pub fn with_annotation(mut pod: Pod, key: &str, value: &str) -> Pod {
    pod.metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value.to_string());
    pod
}

/// Sets the CNI args annotation to the given CIDR addresses, in slot order
pub fn with_ip_infos(pod: Pod, ips: &[&str]) -> Pod {
    let infos: Vec<serde_json::Value> = ips
        .iter()
        .map(|ip| serde_json::json!({"ip": ip, "vlan": 0, "gateway": "10.0.0.254"}))
        .collect();
    let annotation = serde_json::json!({"common": {"ipinfos": infos}}).to_string();
    with_annotation(pod, EXTENDED_CNI_ARGS_ANNOTATION, &annotation)
}

pub fn with_replica_set_owner(mut pod: Pod, replica_set: &str) -> Pod {
    pod.metadata.owner_references = Some(vec![OwnerReference {
        api_version: "apps/v1".to_string(),
        kind: "ReplicaSet".to_string(),
        name: replica_set.to_string(),
        uid: format!("uid-{}", replica_set),
        controller: Some(true),
        ..Default::default()
    }]);
    pod
}

pub fn with_second_ip_resource(mut pod: Pod) -> Pod {
    if let Some(spec) = pod.spec.as_mut() {
        spec.containers = vec![container_requesting(&[FIP_RESOURCE, SECOND_FIP_RESOURCE])];
    }
    pod
}

pub fn with_phase(mut pod: Pod, phase: &str, reason: Option<&str>) -> Pod {
    pod.status = Some(PodStatus {
        phase: Some(phase.to_string()),
        reason: reason.map(str::to_string),
        ..Default::default()
    });
    pod
}

/// Pod template; `requests_fip` controls whether it asks for a floating IP
pub fn pod_template(policy: Option<&str>, pool: Option<&str>, requests_fip: bool) -> PodTemplateSpec {
    let mut annotations = BTreeMap::new();
    if let Some(policy) = policy {
        annotations.insert(RELEASE_POLICY_ANNOTATION.to_string(), policy.to_string());
    }
    if let Some(pool) = pool {
        annotations.insert(IP_POOL_ANNOTATION.to_string(), pool.to_string());
    }
    let resources: &[&str] = if requests_fip { &[FIP_RESOURCE] } else { &[] };
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            annotations: Some(annotations),
            ..Default::default()
        }),
        spec: Some(pod_spec_requesting(resources)),
    }
}

pub fn create_test_statefulset(
    name: &str,
    namespace: &str,
    replicas: i32,
    template: PodTemplateSpec,
) -> StatefulSet {
    StatefulSet {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            replicas: Some(replicas),
            template,
            ..Default::default()
        }),
        status: None,
    }
}

pub fn create_test_deployment(
    name: &str,
    namespace: &str,
    replicas: i32,
    template: PodTemplateSpec,
) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            template,
            ..Default::default()
        }),
        status: None,
    }
}

/// In-memory `ClusterCache`
#[derive(Debug, Clone)]
pub struct StaticClusterCache {
    pub pods: Vec<Arc<Pod>>,
    pub stateful_sets: Vec<Arc<StatefulSet>>,
    pub deployments: Vec<Arc<Deployment>>,
    pub synced: bool,
}

impl StaticClusterCache {
    pub fn new() -> Self {
        Self {
            pods: Vec::new(),
            stateful_sets: Vec::new(),
            deployments: Vec::new(),
            synced: true,
        }
    }

    pub fn with_pod(mut self, pod: Pod) -> Self {
        self.pods.push(Arc::new(pod));
        self
    }

    pub fn with_stateful_set(mut self, ss: StatefulSet) -> Self {
        self.stateful_sets.push(Arc::new(ss));
        self
    }

    pub fn with_deployment(mut self, dp: Deployment) -> Self {
        self.deployments.push(Arc::new(dp));
        self
    }

    pub fn unsynced(mut self) -> Self {
        self.synced = false;
        self
    }
}

impl ClusterCache for StaticClusterCache {
    fn pods(&self) -> Vec<Arc<Pod>> {
        self.pods.clone()
    }

    fn stateful_sets(&self) -> Vec<Arc<StatefulSet>> {
        self.stateful_sets.clone()
    }

    fn deployments(&self) -> Vec<Arc<Deployment>> {
        self.deployments.clone()
    }

    fn pods_synced(&self) -> bool {
        self.synced
    }

    fn stateful_sets_synced(&self) -> bool {
        self.synced
    }

    fn deployments_synced(&self) -> bool {
        self.synced
    }
}

/// Reconciler over a mock store, optional mock cloud provider and static cache
pub fn create_test_reconciler(
    store: &MockFloatingIpStore,
    cloud: Option<&MockCloudProvider>,
    cache: StaticClusterCache,
) -> Reconciler {
    Reconciler::new(
        Arc::new(store.clone()) as Arc<dyn FloatingIpStore>,
        None,
        cloud.map(|cloud| Arc::new(cloud.clone()) as Arc<dyn CloudProviderTrait>),
        Arc::new(cache),
        test_resources(),
    )
}

/// Same as `create_test_reconciler` with a secondary store
pub fn create_test_reconciler_with_second(
    store: &MockFloatingIpStore,
    second: &MockFloatingIpStore,
    cache: StaticClusterCache,
) -> Reconciler {
    Reconciler::new(
        Arc::new(store.clone()),
        Some(Arc::new(second.clone()) as Arc<dyn FloatingIpStore>),
        None,
        Arc::new(cache),
        test_resources(),
    )
}
