//! Records the addresses of running pods into the allocation store.
//!
//! A pod's address annotation is written by the CNI plugin after it set up
//! the network, so it is the ground truth for an address that is in use. If
//! the store does not know about it yet, it is allocated to the pod's key.

use ipam_store::FloatingIpStore;
use k8s_openapi::api::core::v1::Pod;
use serde::Deserialize;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use tracing::{info, warn};

use super::Reconciler;
use super::policy::{Attr, parse_release_policy, requests_resource};
use super::snapshot::{deployment_names, store_key, wanted_pods};
use crate::error::ControllerError;

pub const EXTENDED_CNI_ARGS_ANNOTATION: &str = "k8s.v1.cni.galaxy.io/args";

const POD_RUNNING: &str = "Running";

/// One address entry of the CNI args annotation
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IpInfo {
    /// Address in CIDR notation (`10.0.0.2/24`)
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub vlan: u16,
    #[serde(default)]
    pub gateway: Option<String>,
}

impl IpInfo {
    /// The address without its prefix length
    pub fn address(&self) -> Option<Ipv4Addr> {
        let ip = self.ip.as_deref()?;
        ip.split('/').next()?.parse().ok()
    }
}

#[derive(Debug, Default, Deserialize)]
struct CniArgs {
    #[serde(default)]
    common: CommonCniArgs,
}

#[derive(Debug, Default, Deserialize)]
struct CommonCniArgs {
    #[serde(default, rename = "ipinfos")]
    ip_infos: Vec<IpInfo>,
}

/// Parses `{"common":{"ipinfos":[...]}}`
pub fn parse_ip_infos(annotation: &str) -> Result<Vec<IpInfo>, serde_json::Error> {
    let args: CniArgs = serde_json::from_str(annotation)?;
    Ok(args.common.ip_infos)
}

impl Reconciler {
    /// Allocates the observed address of every running floating IP pod that
    /// the store does not know about yet.
    pub async fn sync_pod_ips_into_store(&self) {
        info!("sync pod ips into store");
        if !self.store_ready() {
            return;
        }
        let deployment_names = deployment_names(&self.cache.deployments());
        for pod in wanted_pods(self.cache.as_ref(), &self.resources.primary) {
            if let Err(e) = self.sync_pod_ip(&pod, &deployment_names).await {
                warn!("{}", e);
            }
        }
    }

    pub(crate) async fn sync_pod_ip(
        &self,
        pod: &Pod,
        deployment_names: &HashSet<String>,
    ) -> Result<(), ControllerError> {
        let running = pod
            .status
            .as_ref()
            .is_some_and(|status| status.phase.as_deref() == Some(POD_RUNNING));
        if !running {
            return Ok(());
        }
        let Some(annotation) = pod
            .metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(EXTENDED_CNI_ARGS_ANNOTATION))
            .filter(|value| !value.is_empty())
        else {
            return Ok(());
        };

        let key = store_key(pod, deployment_names);
        let ip_infos = parse_ip_infos(annotation)?;
        let ip = ip_infos
            .first()
            .and_then(IpInfo::address)
            .ok_or_else(|| ControllerError::MissingIpInfo(format!("empty ipinfo for pod {}", key)))?;
        sync_ip(self.ipam.as_ref(), &key, ip, pod).await?;

        if let Some(second_ipam) = &self.second_ipam {
            if self.enabled_second_ip(pod) {
                let ip = ip_infos.get(1).and_then(IpInfo::address).ok_or_else(|| {
                    ControllerError::MissingIpInfo(format!("none second ipinfo for pod {}", key))
                })?;
                sync_ip(second_ipam.as_ref(), &key, ip, pod).await?;
            }
        }
        Ok(())
    }

    fn enabled_second_ip(&self, pod: &Pod) -> bool {
        pod.spec
            .as_ref()
            .is_some_and(|spec| requests_resource(spec, &self.resources.secondary))
    }
}

async fn sync_ip(
    ipam: &dyn FloatingIpStore,
    key: &str,
    ip: Ipv4Addr,
    pod: &Pod,
) -> Result<(), ControllerError> {
    match ipam.by_ip(ip).await? {
        Some(fip) if fip.key != key => Err(ControllerError::ConflictingIp {
            ip,
            key: key.to_string(),
            stored_key: fip.key,
        }),
        Some(_) => Ok(()),
        None => {
            let node_name = pod
                .spec
                .as_ref()
                .and_then(|spec| spec.node_name.as_deref())
                .unwrap_or_default();
            let attr = Attr::for_pod(pod, node_name).to_json()?;
            ipam.allocate_specific_ip(key, ip, parse_release_policy(&pod.metadata), &attr)
                .await?;
            info!("[{}] updated floatingip {} to key {}", ipam.name(), ip, key);
            Ok(())
        }
    }
}
