//! Allocation store data models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Retention policy of a floating IP once its pod goes away.
///
/// Stored as a small integer; the numbering is part of the persisted format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u16", from = "u16")]
pub enum ReleasePolicy {
    /// Released as soon as the pod is deleted
    #[default]
    PodDelete,
    /// Kept while the owning statefulset/deployment still needs it
    Immutable,
    /// Kept forever and handed to the next pod of the same owner
    Never,
}

impl ReleasePolicy {
    /// Stored integer value
    #[must_use]
    pub fn as_u16(self) -> u16 {
        match self {
            Self::PodDelete => 0,
            Self::Immutable => 1,
            Self::Never => 2,
        }
    }
}

impl From<u16> for ReleasePolicy {
    /// Unknown values fall back to `PodDelete`.
    fn from(value: u16) -> Self {
        match value {
            1 => Self::Immutable,
            2 => Self::Never,
            _ => Self::PodDelete,
        }
    }
}

impl From<ReleasePolicy> for u16 {
    fn from(policy: ReleasePolicy) -> Self {
        policy.as_u16()
    }
}

impl fmt::Display for ReleasePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PodDelete => f.write_str("podDelete"),
            Self::Immutable => f.write_str("immutable"),
            Self::Never => f.write_str("never"),
        }
    }
}

/// A floating IP record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloatingIp {
    /// Owning key; empty when the address is unallocated
    pub key: String,
    /// The address
    pub ip: Ipv4Addr,
    /// Retention policy
    pub policy: ReleasePolicy,
    /// Serialized attribute blob (owning node, optional pool)
    pub attr: String,
    /// Last time the record changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl FloatingIp {
    /// Creates a record with no update timestamp
    pub fn new(key: impl Into<String>, ip: Ipv4Addr, policy: ReleasePolicy, attr: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ip,
            policy,
            attr: attr.into(),
            update_time: None,
        }
    }

    /// The address as a 32-bit value
    #[must_use]
    pub fn ip_u32(&self) -> u32 {
        u32::from(self.ip)
    }
}
