//! Release policy and attribute resolution from workload metadata.

use ipam_store::ReleasePolicy;
use k8s_openapi::api::core::v1::{Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const RELEASE_POLICY_ANNOTATION: &str = "k8s.v1.cni.galaxy.io/release-policy";
pub const IP_POOL_ANNOTATION: &str = "tke.cloud.tencent.com/eni-ip-pool";

/// Extended resource names marking pods that want floating IPs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    /// Resource requested by every floating IP pod
    pub primary: String,
    /// Resource additionally requested by pods wanting a second address
    pub secondary: String,
}

/// Release policy declared by `meta`; `PodDelete` when absent or unknown
pub fn parse_release_policy(meta: &ObjectMeta) -> ReleasePolicy {
    let value = meta
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(RELEASE_POLICY_ANNOTATION));
    match value.map(String::as_str) {
        Some("immutable") => ReleasePolicy::Immutable,
        Some("never") => ReleasePolicy::Never,
        _ => ReleasePolicy::PodDelete,
    }
}

/// Whether any container requests or limits `resource`
pub fn requests_resource(spec: &PodSpec, resource: &str) -> bool {
    spec.containers.iter().any(|container| {
        container.resources.as_ref().is_some_and(|resources| {
            let has = |quantities: &Option<BTreeMap<String, _>>| {
                quantities
                    .as_ref()
                    .is_some_and(|map| map.contains_key(resource))
            };
            has(&resources.requests) || has(&resources.limits)
        })
    })
}

/// Non-empty pool name from the pool annotation
pub fn pool_annotation(annotations: Option<&BTreeMap<String, String>>) -> Option<&str> {
    annotations
        .and_then(|annotations| annotations.get(IP_POOL_ANNOTATION))
        .map(String::as_str)
        .filter(|pool| !pool.is_empty())
}

/// Attribute blob stored alongside each floating IP.
///
/// Field names follow the persisted JSON (`{"NodeName":"...","Pool":"..."}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attr {
    #[serde(rename = "NodeName", default)]
    pub node_name: String,
    #[serde(rename = "Pool", default, skip_serializing_if = "String::is_empty")]
    pub pool: String,
}

impl Attr {
    /// Attributes of `pod` scheduled to `node_name`
    pub fn for_pod(pod: &Pod, node_name: &str) -> Self {
        Self {
            node_name: node_name.to_string(),
            pool: pool_annotation(pod.metadata.annotations.as_ref())
                .unwrap_or_default()
                .to_string(),
        }
    }

    pub fn parse(attr: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(attr)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
