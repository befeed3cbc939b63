//! CloudProviderTrait for mocking

use crate::error::CloudProviderError;
use crate::models::UnassignIpRequest;

/// Cloud provider address-assignment operations
#[async_trait::async_trait]
pub trait CloudProviderTrait: Send + Sync {
    /// Detach `request.ip_address` from `request.node_name`
    async fn unassign_ip(&self, request: &UnassignIpRequest) -> Result<(), CloudProviderError>;
}
