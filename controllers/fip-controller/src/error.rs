//! Controller-specific error types.
//!
//! Per-record failures are logged inside a reconciliation pass and never
//! surface here; these errors abort a single pod sync or the controller.

use cloud_provider_client::CloudProviderError;
use ipam_store::StoreError;
use kube::Error as KubeError;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Errors that can occur in the floating IP controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Allocation store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Cloud provider error
    #[error("Cloud provider error: {0}")]
    CloudProvider(#[from] CloudProviderError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Malformed attribute blob or address annotation
    #[error("Malformed data: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Pod carries no usable address for a configured slot
    #[error("Missing ip info: {0}")]
    MissingIpInfo(String),

    /// The same address is claimed by two keys
    #[error("conflict ip {ip} found for both {key} and {stored_key}")]
    ConflictingIp {
        /// Contested address
        ip: Ipv4Addr,
        /// Key of the pod being synced
        key: String,
        /// Key already stored for the address
        stored_key: String,
    },
}
