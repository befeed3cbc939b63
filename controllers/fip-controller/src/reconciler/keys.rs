//! Allocation store key grammar.
//!
//! Every floating IP record is owned by a key of one of these shapes:
//!
//! | Shape | Format |
//! |---|---|
//! | statefulset / unowned pod | `<namespace>_<pod>` |
//! | deployment pod | `_deployment_<namespace>_<deployment>_<pod>` |
//! | deployment reservation | `_deployment_<namespace>_<deployment>_` |
//! | pool reservation | `_ippool__<pool>_` |
//!
//! The format is persisted; changing it breaks existing stores. Namespaces
//! and names never contain `_`, which is what makes the grammar unambiguous.

use std::collections::BTreeMap;
use std::fmt;
use std::num::ParseIntError;

use super::policy::pool_annotation;

pub const DEPLOYMENT_PREFIX: &str = "_deployment_";
pub const POOL_PREFIX: &str = "_ippool__";

/// A decoded allocation store key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FipKey {
    /// `<namespace>_<pod>` where the pod name has no `-`, so no owner can be derived
    Plain { namespace: String, pod: String },
    /// `<namespace>_<app>-<suffix>`; the suffix is the ordinal for statefulset pods
    StatefulSetPod {
        namespace: String,
        app: String,
        suffix: String,
    },
    /// `_deployment_<namespace>_<deployment>_<pod>`
    DeploymentPod {
        namespace: String,
        deployment: String,
        pod: String,
    },
    /// `_deployment_<namespace>_<deployment>_`, an address kept for the next pod
    Deployment { namespace: String, deployment: String },
    /// `_ippool__<pool>_`, shared across namespaces
    Pool { pool: String },
    /// Anything else
    Unrecognized(String),
}

impl FipKey {
    /// Decodes a key. Never fails; unknown shapes map to `Unrecognized`.
    pub fn parse(key: &str) -> Self {
        if let Some(rest) = key.strip_prefix(POOL_PREFIX) {
            return match rest.strip_suffix('_') {
                Some(pool) if !pool.is_empty() && !pool.contains('_') => Self::Pool {
                    pool: pool.to_string(),
                },
                _ => Self::Unrecognized(key.to_string()),
            };
        }
        if key.starts_with(DEPLOYMENT_PREFIX) {
            return Self::parse_deployment(key);
        }
        Self::parse_pod(key)
    }

    // "_deployment_default_dp1_dp1-rs1-pod1" => ["", "deployment", "default", "dp1", "dp1-rs1-pod1"]
    fn parse_deployment(key: &str) -> Self {
        let parts: Vec<&str> = key.split('_').collect();
        let (namespace, deployment, pod) = match parts.as_slice() {
            [_, _, ns, dp] => (*ns, *dp, ""),
            [_, _, ns, dp, pod] => (*ns, *dp, *pod),
            _ => return Self::Unrecognized(key.to_string()),
        };
        if namespace.is_empty() || deployment.is_empty() {
            return Self::Unrecognized(key.to_string());
        }
        if pod.is_empty() {
            Self::Deployment {
                namespace: namespace.to_string(),
                deployment: deployment.to_string(),
            }
        } else {
            Self::DeploymentPod {
                namespace: namespace.to_string(),
                deployment: deployment.to_string(),
                pod: pod.to_string(),
            }
        }
    }

    // "kube-system_fip-bj-111" => app "fip-bj", suffix "111", namespace "kube-system"
    fn parse_pod(key: &str) -> Self {
        let mut parts = key.split('_');
        let (Some(namespace), Some(pod), None) = (parts.next(), parts.next(), parts.next()) else {
            return Self::Unrecognized(key.to_string());
        };
        if namespace.is_empty() || pod.is_empty() {
            return Self::Unrecognized(key.to_string());
        }
        match pod.rsplit_once('-') {
            Some((app, suffix)) if !app.is_empty() => Self::StatefulSetPod {
                namespace: namespace.to_string(),
                app: app.to_string(),
                suffix: suffix.to_string(),
            },
            Some(_) => Self::Unrecognized(key.to_string()),
            None => Self::Plain {
                namespace: namespace.to_string(),
                pod: pod.to_string(),
            },
        }
    }

    /// `<namespace>_<name>` of the owning statefulset or deployment
    pub fn app_full_name(&self) -> Option<String> {
        match self {
            Self::StatefulSetPod { namespace, app, .. } => Some(full_name(namespace, app)),
            Self::DeploymentPod {
                namespace,
                deployment,
                ..
            }
            | Self::Deployment {
                namespace,
                deployment,
            } => Some(full_name(namespace, deployment)),
            Self::Plain { .. } | Self::Pool { .. } | Self::Unrecognized(_) => None,
        }
    }

    /// Whether the key names one specific deployment pod
    pub fn is_deployment_pod(&self) -> bool {
        matches!(self, Self::DeploymentPod { .. })
    }
}

impl fmt::Display for FipKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain { namespace, pod } => write!(f, "{}", pod_key(namespace, pod)),
            Self::StatefulSetPod {
                namespace,
                app,
                suffix,
            } => write!(f, "{}_{}-{}", namespace, app, suffix),
            Self::DeploymentPod {
                namespace,
                deployment,
                pod,
            } => write!(f, "{}", deployment_pod_key(namespace, deployment, pod)),
            Self::Deployment {
                namespace,
                deployment,
            } => write!(f, "{}", deployment_prefix(deployment, namespace)),
            Self::Pool { pool } => write!(f, "{}", pool_prefix(pool)),
            Self::Unrecognized(key) => f.write_str(key),
        }
    }
}

/// `<namespace>_<name>`, the full name used to index statefulsets and deployments
pub fn full_name(namespace: &str, name: &str) -> String {
    format!("{}_{}", namespace, name)
}

/// Key of a pod not owned by a deployment
pub fn pod_key(namespace: &str, pod: &str) -> String {
    full_name(namespace, pod)
}

/// Key of a pod owned by `deployment`
pub fn deployment_pod_key(namespace: &str, deployment: &str, pod: &str) -> String {
    format!("{}{}_{}_{}", DEPLOYMENT_PREFIX, namespace, deployment, pod)
}

/// Reservation key of a deployment; also the prefix of all its pod keys
pub fn deployment_prefix(deployment: &str, namespace: &str) -> String {
    format!("{}{}_{}_", DEPLOYMENT_PREFIX, namespace, deployment)
}

/// Reservation key of an address pool
pub fn pool_prefix(pool: &str) -> String {
    format!("{}{}_", POOL_PREFIX, pool)
}

/// Reservation key for a deployment whose pod template carries `annotations`.
///
/// A pool annotation wins; pools may be shared with other namespaces, so the
/// pool key carries no namespace.
pub fn deployment_pool_prefix(
    annotations: Option<&BTreeMap<String, String>>,
    deployment: &str,
    namespace: &str,
) -> String {
    match pool_annotation(annotations) {
        Some(pool) => pool_prefix(pool),
        None => deployment_prefix(deployment, namespace),
    }
}

pub fn is_pool_key(key: &str) -> bool {
    key.starts_with(POOL_PREFIX)
}

pub fn is_deployment_key(key: &str) -> bool {
    key.starts_with(DEPLOYMENT_PREFIX)
}

/// Ordinal of a statefulset pod key: the number after the last `-`
pub fn parse_pod_index(key: &str) -> Result<u32, ParseIntError> {
    key.rsplit('-').next().unwrap_or(key).parse()
}
