//! FloatingIpStore trait for mocking
//!
//! The reconciler only talks to the allocation store through this trait, so
//! the CRD backed store and the in-memory mock are interchangeable.

use crate::error::StoreError;
use crate::models::{FloatingIp, ReleasePolicy};
use std::net::Ipv4Addr;

/// Allocation store operations
///
/// Operations are atomic per address; there are no cross-key transactions.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait FloatingIpStore: Send + Sync {
    /// Store name used as a log prefix
    fn name(&self) -> &str;

    /// All allocated records whose key starts with `prefix` (`""` lists everything)
    async fn by_prefix(&self, prefix: &str) -> Result<Vec<FloatingIp>, StoreError>;

    /// The allocated record owning `ip`, if any
    async fn by_ip(&self, ip: Ipv4Addr) -> Result<Option<FloatingIp>, StoreError>;

    /// Any one record stored under exactly `key`
    async fn first(&self, key: &str) -> Result<Option<FloatingIp>, StoreError>;

    /// Allocates `ip` to `key`; fails with `StoreError::Conflict` if another key owns it
    async fn allocate_specific_ip(
        &self,
        key: &str,
        ip: Ipv4Addr,
        policy: ReleasePolicy,
        attr: &str,
    ) -> Result<(), StoreError>;

    /// Releases `ip` if `key` still owns it.
    ///
    /// Several addresses may share one reservation key; only `ip` is released.
    /// Releasing an address that is no longer allocated is a no-op; one now
    /// owned by another key fails with `StoreError::Conflict`.
    async fn release(&self, key: &str, ip: Ipv4Addr, reason: &str) -> Result<(), StoreError>;

    /// Moves `ip` from `old_key` to `new_key`, with the same ownership rules as `release`
    async fn update_key(&self, ip: Ipv4Addr, old_key: &str, new_key: &str) -> Result<(), StoreError>;
}
