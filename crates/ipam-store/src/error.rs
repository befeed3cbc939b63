//! Allocation store errors

use std::net::Ipv4Addr;
use thiserror::Error;

/// Errors that can occur when talking to the allocation store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Kubernetes API error from the CRD backed store
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No record for the requested key
    #[error("Not found: {0}")]
    NotFound(String),

    /// The address is already owned by another key
    #[error("ip {ip} is already allocated to {owner}")]
    Conflict {
        /// Contested address
        ip: Ipv4Addr,
        /// Key currently owning the address
        owner: String,
    },

    /// A stored object could not be turned into a record
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Injected failure (mock store only)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
