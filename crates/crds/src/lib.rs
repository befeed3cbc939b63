//! Floating IP CRD Definitions
//!
//! Kubernetes Custom Resource Definitions used as the durable allocation
//! store of the floating IP controller.

pub mod floating_ip;

pub use floating_ip::*;
