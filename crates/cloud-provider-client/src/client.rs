//! Cloud provider REST client

use crate::error::CloudProviderError;
use crate::models::{UnassignIpReply, UnassignIpRequest};
use crate::provider_trait::CloudProviderTrait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Cloud provider REST client
#[derive(Debug, Clone)]
pub struct CloudProviderClient {
    client: Client,
    base_url: String,
}

impl CloudProviderClient {
    /// Create a new cloud provider client
    ///
    /// # Arguments
    /// * `base_url` - Cloud provider endpoint (e.g., "http://cloud-provider:8080")
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, CloudProviderError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait::async_trait]
impl CloudProviderTrait for CloudProviderClient {
    async fn unassign_ip(&self, request: &UnassignIpRequest) -> Result<(), CloudProviderError> {
        if request.node_name.is_empty() || request.ip_address.is_empty() {
            return Err(CloudProviderError::InvalidRequest(format!(
                "node name and ip address are required: {:?}",
                request
            )));
        }

        let url = format!("{}/v1/unassignip", self.base_url);
        debug!("POST {} {:?}", url, request);

        let response = self.client
            .post(&url)
            .header("Accept", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(CloudProviderError::Api(format!(
                "Failed to unassign {} from {}: {} - {}",
                request.ip_address, request.node_name, status, body
            )));
        }

        let reply: UnassignIpReply = serde_json::from_str(&body)?;
        if !reply.success {
            return Err(CloudProviderError::Api(format!(
                "unassign {} from {} not successful: {}",
                request.ip_address,
                request.node_name,
                reply.message.unwrap_or_default()
            )));
        }
        Ok(())
    }
}
