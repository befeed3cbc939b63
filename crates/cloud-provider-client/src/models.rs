//! Cloud provider API models

use serde::{Deserialize, Serialize};

/// Request to detach a floating IP from a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnassignIpRequest {
    /// Node the address is currently attached to
    pub node_name: String,
    /// Dotted IPv4 address
    pub ip_address: String,
}

/// Reply to an unassign request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnassignIpReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
