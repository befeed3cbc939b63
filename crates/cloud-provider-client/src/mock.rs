//! Mock CloudProvider for unit testing

use crate::error::CloudProviderError;
use crate::models::UnassignIpRequest;
use crate::provider_trait::CloudProviderTrait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Records unassign requests and fails those for configured addresses
#[derive(Debug, Clone, Default)]
pub struct MockCloudProvider {
    requests: Arc<Mutex<Vec<UnassignIpRequest>>>,
    failing_ips: Arc<Mutex<HashSet<String>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockCloudProvider {
    /// Create a new mock provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Make unassign requests for `ip` fail
    pub fn fail_ip(&self, ip: impl Into<String>) {
        lock(&self.failing_ips).insert(ip.into());
    }

    /// All requests received so far (including failed ones)
    pub fn requests(&self) -> Vec<UnassignIpRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait::async_trait]
impl CloudProviderTrait for MockCloudProvider {
    async fn unassign_ip(&self, request: &UnassignIpRequest) -> Result<(), CloudProviderError> {
        lock(&self.requests).push(request.clone());
        if lock(&self.failing_ips).contains(&request.ip_address) {
            return Err(CloudProviderError::Api(format!(
                "injected failure for {}",
                request.ip_address
            )));
        }
        Ok(())
    }
}
