//! FloatingIP CRD
//!
//! One object per allocated floating IP. The object name is the dotted IPv4
//! address, so at most one object can own a given address.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[kube(
    group = "galaxy.k8s.io",
    version = "v1alpha1",
    kind = "FloatingIP",
    plural = "floatingips",
    shortname = "fip",
    namespaced,
    printcolumn = r#"{"name":"Key","type":"string","jsonPath":".spec.key"}"#,
    printcolumn = r#"{"name":"Policy","type":"integer","jsonPath":".spec.policy"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FloatingIPSpec {
    /// Owning key (`<namespace>_<pod>`, `_deployment_...` or `_ippool__...`)
    pub key: String,

    /// Opaque attribute blob, JSON encoded (`{"NodeName":"...","Pool":"..."}`)
    #[serde(default)]
    pub attribute: String,

    /// Release policy: 0 = release on pod delete, 1 = immutable, 2 = never
    #[serde(default)]
    pub policy: u16,

    /// Last time the key or attribute changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<chrono::DateTime<chrono::Utc>>,
}
