//! Floating IP Allocation Store
//!
//! The allocation store is the single source of truth for which key owns
//! which floating IP. This crate defines the store interface consumed by the
//! reconciler, the record model, and a store backed by `FloatingIP` objects.
//!
//! # Example
//!
//! ```no_run
//! use ipam_store::{CrdFloatingIpStore, FloatingIpStore};
//! use crds::FloatingIP;
//! use kube::{Api, Client};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::try_default().await?;
//! let store = CrdFloatingIpStore::new("floating_ips", Api::<FloatingIP>::namespaced(client, "kube-system"));
//!
//! // Every address reserved for deployment dep1 in namespace ns1
//! let fips = store.by_prefix("_deployment_ns1_dep1_").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Per-key atomicity**: allocate, release and rebind are atomic per address object
//! - **Mocking**: `MockFloatingIpStore` behind the `test-util` feature

pub mod crd_store;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use crd_store::CrdFloatingIpStore;
pub use error::StoreError;
pub use models::*;
pub use store_trait::FloatingIpStore;
#[cfg(feature = "test-util")]
pub use mock::MockFloatingIpStore;
