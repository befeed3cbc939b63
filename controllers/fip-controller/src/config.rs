//! Controller configuration loaded from environment variables.

use crate::error::ControllerError;
use crate::reconciler::policy::ResourceNames;
use std::time::Duration;

const DEFAULT_STORE_NAMESPACE: &str = "kube-system";
const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;
const DEFAULT_SYNC_IP_INTERVAL_SECS: u64 = 60;
const DEFAULT_CLOUD_PROVIDER_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_FLOATING_IP_RESOURCE: &str = "tke.cloud.tencent.com/eni-ip";
pub const DEFAULT_SECOND_FLOATING_IP_RESOURCE: &str = "tke.cloud.tencent.com/eni-ip2";

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace watched for pods and controllers; `None` watches all namespaces
    pub watch_namespace: Option<String>,
    /// Namespace holding the primary `FloatingIP` objects
    pub store_namespace: String,
    /// Namespace holding the secondary `FloatingIP` objects; enables the second slot
    pub second_store_namespace: Option<String>,
    /// Period of the reconciliation pass
    pub resync_interval: Duration,
    /// Period of the instance sync pass
    pub sync_ip_interval: Duration,
    /// Extended resource names marking address-requesting pods
    pub resources: ResourceNames,
    /// Cloud provider endpoint; `None` disables cloud-provider calls
    pub cloud_provider_url: Option<String>,
    /// Cloud provider request timeout
    pub cloud_provider_timeout: Duration,
}

impl ControllerConfig {
    /// Loads the configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the configuration through `lookup`, treating empty values as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let secs = |name: &str, default: u64| -> Result<Duration, ControllerError> {
            match get(name) {
                Some(value) => value
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs)
                    .ok_or_else(|| {
                        ControllerError::InvalidConfig(format!(
                            "{} must be a positive number of seconds, got {:?}",
                            name, value
                        ))
                    }),
                None => Ok(Duration::from_secs(default)),
            }
        };

        Ok(Self {
            watch_namespace: get("WATCH_NAMESPACE"),
            store_namespace: get("FIP_STORE_NAMESPACE")
                .unwrap_or_else(|| DEFAULT_STORE_NAMESPACE.to_string()),
            second_store_namespace: get("SECOND_FIP_STORE_NAMESPACE"),
            resync_interval: secs("RESYNC_INTERVAL_SECS", DEFAULT_RESYNC_INTERVAL_SECS)?,
            sync_ip_interval: secs("SYNC_IP_INTERVAL_SECS", DEFAULT_SYNC_IP_INTERVAL_SECS)?,
            resources: ResourceNames {
                primary: get("FLOATING_IP_RESOURCE")
                    .unwrap_or_else(|| DEFAULT_FLOATING_IP_RESOURCE.to_string()),
                secondary: get("SECOND_FLOATING_IP_RESOURCE")
                    .unwrap_or_else(|| DEFAULT_SECOND_FLOATING_IP_RESOURCE.to_string()),
            },
            cloud_provider_url: get("CLOUD_PROVIDER_URL"),
            cloud_provider_timeout: secs(
                "CLOUD_PROVIDER_TIMEOUT_SECS",
                DEFAULT_CLOUD_PROVIDER_TIMEOUT_SECS,
            )?,
        })
    }
}
