//! Mock FloatingIpStore for unit testing
//!
//! Keeps records in memory and logs every mutation so tests can assert on
//! exactly which releases and rebinds a reconciliation pass issued.

use crate::error::StoreError;
use crate::models::{FloatingIp, ReleasePolicy};
use crate::store_trait::FloatingIpStore;
use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A mutation issued against the mock store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    /// `allocate_specific_ip(key, ip, ..)`
    Allocate { key: String, ip: Ipv4Addr },
    /// `release(key, ip, reason)`
    Release { key: String, ip: Ipv4Addr, reason: String },
    /// `update_key(ip, old_key, new_key)`
    UpdateKey {
        ip: Ipv4Addr,
        old_key: String,
        new_key: String,
    },
}

/// In-memory allocation store
#[derive(Debug, Clone)]
pub struct MockFloatingIpStore {
    name: String,
    records: Arc<Mutex<BTreeMap<Ipv4Addr, FloatingIp>>>,
    calls: Arc<Mutex<Vec<StoreCall>>>,
    failing_keys: Arc<Mutex<HashSet<String>>>,
    failing_prefixes: Arc<Mutex<HashSet<String>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockFloatingIpStore {
    /// Create an empty mock store
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Arc::new(Mutex::new(BTreeMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            failing_keys: Arc::new(Mutex::new(HashSet::new())),
            failing_prefixes: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Add a record (for test setup)
    pub fn add_record(&self, fip: FloatingIp) {
        lock(&self.records).insert(fip.ip, fip);
    }

    /// Snapshot of all records, ordered by address
    pub fn records(&self) -> Vec<FloatingIp> {
        lock(&self.records).values().cloned().collect()
    }

    /// The record owning `ip`
    pub fn get(&self, ip: Ipv4Addr) -> Option<FloatingIp> {
        lock(&self.records).get(&ip).cloned()
    }

    /// Mutations issued so far, in order
    pub fn calls(&self) -> Vec<StoreCall> {
        lock(&self.calls).clone()
    }

    /// Keys passed to `release`, in order
    pub fn released_keys(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Release { key, .. } => Some(key),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded calls (records are kept)
    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Make every mutation of `key` fail
    pub fn fail_key(&self, key: impl Into<String>) {
        lock(&self.failing_keys).insert(key.into());
    }

    /// Make `by_prefix(prefix)` fail
    pub fn fail_prefix(&self, prefix: impl Into<String>) {
        lock(&self.failing_prefixes).insert(prefix.into());
    }

    fn check_key(&self, key: &str) -> Result<(), StoreError> {
        if lock(&self.failing_keys).contains(key) {
            return Err(StoreError::Unavailable(format!("injected failure for {key}")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl FloatingIpStore for MockFloatingIpStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn by_prefix(&self, prefix: &str) -> Result<Vec<FloatingIp>, StoreError> {
        if lock(&self.failing_prefixes).contains(prefix) {
            return Err(StoreError::Unavailable(format!("injected failure for prefix {prefix}")));
        }
        Ok(lock(&self.records)
            .values()
            .filter(|fip| !fip.key.is_empty() && fip.key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn by_ip(&self, ip: Ipv4Addr) -> Result<Option<FloatingIp>, StoreError> {
        Ok(lock(&self.records)
            .get(&ip)
            .filter(|fip| !fip.key.is_empty())
            .cloned())
    }

    async fn first(&self, key: &str) -> Result<Option<FloatingIp>, StoreError> {
        self.check_key(key)?;
        Ok(lock(&self.records).values().find(|fip| fip.key == key).cloned())
    }

    async fn allocate_specific_ip(
        &self,
        key: &str,
        ip: Ipv4Addr,
        policy: ReleasePolicy,
        attr: &str,
    ) -> Result<(), StoreError> {
        self.check_key(key)?;
        let mut records = lock(&self.records);
        if let Some(existing) = records.get(&ip) {
            if !existing.key.is_empty() && existing.key != key {
                return Err(StoreError::Conflict {
                    ip,
                    owner: existing.key.clone(),
                });
            }
        }
        records.insert(ip, FloatingIp::new(key, ip, policy, attr));
        lock(&self.calls).push(StoreCall::Allocate {
            key: key.to_string(),
            ip,
        });
        Ok(())
    }

    async fn release(&self, key: &str, ip: Ipv4Addr, reason: &str) -> Result<(), StoreError> {
        self.check_key(key)?;
        let mut records = lock(&self.records);
        match records.get(&ip) {
            None => return Ok(()),
            Some(fip) if fip.key != key => {
                return Err(StoreError::Conflict {
                    ip,
                    owner: fip.key.clone(),
                });
            }
            Some(_) => {}
        }
        records.remove(&ip);
        lock(&self.calls).push(StoreCall::Release {
            key: key.to_string(),
            ip,
            reason: reason.to_string(),
        });
        Ok(())
    }

    async fn update_key(&self, ip: Ipv4Addr, old_key: &str, new_key: &str) -> Result<(), StoreError> {
        self.check_key(old_key)?;
        let mut records = lock(&self.records);
        let Some(fip) = records.get_mut(&ip) else {
            return Err(StoreError::NotFound(format!("{ip} is not allocated")));
        };
        if fip.key != old_key {
            return Err(StoreError::Conflict {
                ip,
                owner: fip.key.clone(),
            });
        }
        fip.key = new_key.to_string();
        lock(&self.calls).push(StoreCall::UpdateKey {
            ip,
            old_key: old_key.to_string(),
            new_key: new_key.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    #[tokio::test]
    async fn test_allocate_conflict_leaves_first_owner() {
        let store = MockFloatingIpStore::new("test");
        store
            .allocate_specific_ip("ns1_a-0", ip(1), ReleasePolicy::PodDelete, "")
            .await
            .unwrap();
        let err = store
            .allocate_specific_ip("ns1_b-0", ip(1), ReleasePolicy::PodDelete, "")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { ref owner, .. } if owner == "ns1_a-0"));
        assert_eq!(store.get(ip(1)).unwrap().key, "ns1_a-0");
    }

    #[tokio::test]
    async fn test_update_key_and_prefix() {
        let store = MockFloatingIpStore::new("test");
        store.add_record(FloatingIp::new("_deployment_ns1_dep1_pod-a", ip(1), ReleasePolicy::Never, ""));
        store.add_record(FloatingIp::new("_deployment_ns1_dep10_pod-b", ip(2), ReleasePolicy::Never, ""));

        store
            .update_key(ip(1), "_deployment_ns1_dep1_pod-a", "_deployment_ns1_dep1_")
            .await
            .unwrap();

        let fips = store.by_prefix("_deployment_ns1_dep1_").await.unwrap();
        assert_eq!(fips.len(), 1);
        assert_eq!(fips[0].key, "_deployment_ns1_dep1_");
    }

    #[tokio::test]
    async fn test_release_only_touches_given_address() {
        let store = MockFloatingIpStore::new("test");
        store.add_record(FloatingIp::new("_deployment_ns1_dep1_", ip(1), ReleasePolicy::Immutable, ""));
        store.add_record(FloatingIp::new("_deployment_ns1_dep1_", ip(2), ReleasePolicy::Immutable, ""));

        store.release("_deployment_ns1_dep1_", ip(1), "test").await.unwrap();

        assert!(store.get(ip(1)).is_none());
        assert_eq!(store.get(ip(2)).unwrap().key, "_deployment_ns1_dep1_");
        // already released
        store.release("_deployment_ns1_dep1_", ip(1), "test").await.unwrap();
        assert_eq!(store.released_keys().len(), 1);
    }

    #[tokio::test]
    async fn test_release_and_update_key_check_owner() {
        let store = MockFloatingIpStore::new("test");
        store.add_record(FloatingIp::new("ns1_b-0", ip(1), ReleasePolicy::PodDelete, ""));

        let err = store.release("ns1_a-0", ip(1), "test").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { ref owner, .. } if owner == "ns1_b-0"));
        let err = store.update_key(ip(1), "ns1_a-0", "ns1_c-0").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.get(ip(1)).unwrap().key, "ns1_b-0");
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = MockFloatingIpStore::new("test");
        store.add_record(FloatingIp::new("ns1_a-0", ip(1), ReleasePolicy::PodDelete, ""));
        store.fail_key("ns1_a-0");
        assert!(store.release("ns1_a-0", ip(1), "test").await.is_err());
        assert!(store.get(ip(1)).is_some());
        assert!(store.calls().is_empty());
    }
}
