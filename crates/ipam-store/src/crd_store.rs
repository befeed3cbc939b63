//! Allocation store backed by `FloatingIP` custom resources.
//!
//! Each allocated address is one `FloatingIP` object named after the dotted
//! address. Object creation gives allocate-if-absent semantics, and replace
//! or delete with the observed `resourceVersion` gives optimistic per-address
//! rebinding and release.

use crate::error::StoreError;
use crate::models::{FloatingIp, ReleasePolicy};
use crate::store_trait::FloatingIpStore;
use crds::{FloatingIP, FloatingIPSpec};
use kube::api::{DeleteParams, ListParams, PostParams, Preconditions};
use kube::{Api, ResourceExt};
use std::net::Ipv4Addr;
use tracing::{debug, info, warn};

/// HTTP status returned by the API server when an object already exists
const CONFLICT: u16 = 409;

/// `FloatingIP` CRD backed allocation store
#[derive(Clone)]
pub struct CrdFloatingIpStore {
    name: String,
    api: Api<FloatingIP>,
}

impl std::fmt::Debug for CrdFloatingIpStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrdFloatingIpStore")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl CrdFloatingIpStore {
    /// Create a store named `name` over the given `FloatingIP` API
    pub fn new(name: impl Into<String>, api: Api<FloatingIP>) -> Self {
        Self {
            name: name.into(),
            api,
        }
    }

    async fn list_all(&self) -> Result<Vec<FloatingIP>, StoreError> {
        Ok(self.api.list(&ListParams::default()).await?.items)
    }

    /// The object of `ip` if it is owned by `key`; `None` if it does not exist
    async fn owned_object(&self, key: &str, ip: Ipv4Addr) -> Result<Option<FloatingIP>, StoreError> {
        let Some(obj) = self.api.get_opt(&ip.to_string()).await? else {
            return Ok(None);
        };
        if obj.spec.key != key {
            return Err(StoreError::Conflict {
                ip,
                owner: obj.spec.key,
            });
        }
        Ok(Some(obj))
    }

    async fn list_by_key(&self, key: &str) -> Result<Vec<FloatingIP>, StoreError> {
        let mut objects = self.list_all().await?;
        objects.retain(|obj| obj.spec.key == key);
        Ok(objects)
    }
}

/// Converts a `FloatingIP` object into a store record
pub fn to_record(obj: &FloatingIP) -> Result<FloatingIp, StoreError> {
    let name = obj.name_any();
    let ip = name
        .parse::<Ipv4Addr>()
        .map_err(|e| StoreError::InvalidRecord(format!("object name {name} is not an ipv4 address: {e}")))?;
    Ok(FloatingIp {
        key: obj.spec.key.clone(),
        ip,
        policy: ReleasePolicy::from(obj.spec.policy),
        attr: obj.spec.attribute.clone(),
        update_time: obj.spec.update_time,
    })
}

fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == CONFLICT)
}

#[async_trait::async_trait]
impl FloatingIpStore for CrdFloatingIpStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn by_prefix(&self, prefix: &str) -> Result<Vec<FloatingIp>, StoreError> {
        let mut fips = Vec::new();
        for obj in self.list_all().await? {
            if obj.spec.key.is_empty() || !obj.spec.key.starts_with(prefix) {
                continue;
            }
            match to_record(&obj) {
                Ok(fip) => fips.push(fip),
                Err(e) => warn!("[{}] skipping object: {}", self.name, e),
            }
        }
        Ok(fips)
    }

    async fn by_ip(&self, ip: Ipv4Addr) -> Result<Option<FloatingIp>, StoreError> {
        match self.api.get_opt(&ip.to_string()).await? {
            Some(obj) if !obj.spec.key.is_empty() => Ok(Some(to_record(&obj)?)),
            _ => Ok(None),
        }
    }

    async fn first(&self, key: &str) -> Result<Option<FloatingIp>, StoreError> {
        match self.list_by_key(key).await?.first() {
            Some(obj) => Ok(Some(to_record(obj)?)),
            None => Ok(None),
        }
    }

    async fn allocate_specific_ip(
        &self,
        key: &str,
        ip: Ipv4Addr,
        policy: ReleasePolicy,
        attr: &str,
    ) -> Result<(), StoreError> {
        let spec = FloatingIPSpec {
            key: key.to_string(),
            attribute: attr.to_string(),
            policy: policy.as_u16(),
            update_time: Some(chrono::Utc::now()),
        };
        let obj = FloatingIP::new(&ip.to_string(), spec);
        match self.api.create(&PostParams::default(), &obj).await {
            Ok(_) => {
                debug!("[{}] allocated {} to {}", self.name, ip, key);
                Ok(())
            }
            Err(e) if is_conflict(&e) => {
                let owner = self
                    .api
                    .get_opt(&ip.to_string())
                    .await?
                    .map(|existing| existing.spec.key)
                    .unwrap_or_default();
                if owner == key {
                    Ok(())
                } else {
                    Err(StoreError::Conflict { ip, owner })
                }
            }
            Err(e) => Err(StoreError::Kube(e)),
        }
    }

    async fn release(&self, key: &str, ip: Ipv4Addr, reason: &str) -> Result<(), StoreError> {
        let Some(obj) = self.owned_object(key, ip).await? else {
            return Ok(());
        };
        let params = DeleteParams {
            preconditions: Some(Preconditions {
                resource_version: obj.resource_version(),
                uid: obj.uid(),
            }),
            ..DeleteParams::default()
        };
        self.api.delete(&obj.name_any(), &params).await?;
        info!("[{}] released {} of {}: {}", self.name, ip, key, reason);
        Ok(())
    }

    async fn update_key(&self, ip: Ipv4Addr, old_key: &str, new_key: &str) -> Result<(), StoreError> {
        let Some(mut obj) = self.owned_object(old_key, ip).await? else {
            return Err(StoreError::NotFound(format!("{ip} is not allocated")));
        };
        let name = obj.name_any();
        obj.spec.key = new_key.to_string();
        obj.spec.update_time = Some(chrono::Utc::now());
        // replace carries the fetched resourceVersion, so a concurrent change fails with 409
        self.api.replace(&name, &PostParams::default(), &obj).await?;
        info!("[{}] moved {} from {} to {}", self.name, ip, old_key, new_key);
        Ok(())
    }
}
