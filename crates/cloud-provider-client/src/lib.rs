//! Cloud Provider Client
//!
//! Client for the cloud provider's floating IP assignment API. The controller
//! only needs to undo assignments of addresses whose pod is gone.
//!
//! # Example
//!
//! ```no_run
//! use cloud_provider_client::{CloudProviderClient, CloudProviderTrait, UnassignIpRequest};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CloudProviderClient::new("http://cloud-provider:8080".to_string(), Duration::from_secs(10))?;
//! client.unassign_ip(&UnassignIpRequest {
//!     node_name: "node-1".to_string(),
//!     ip_address: "10.0.0.2".to_string(),
//! }).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod provider_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::CloudProviderClient;
pub use error::CloudProviderError;
pub use models::*;
pub use provider_trait::CloudProviderTrait;
#[cfg(feature = "test-util")]
pub use mock::MockCloudProvider;
