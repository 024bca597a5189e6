//! HTTP node-finder bootstrap.

use crate::domain::config::DiscoveryConfig;
use crate::domain::error::{ClientError, ClientResult};
use crate::ports::outbound::PeerBootstrap;
use async_trait::async_trait;
use tracing::debug;

/// Asks a node-finder service for one seed peer location.
pub struct HttpNodeFinder {
    http_client: reqwest::Client,
    url: String,
}

impl HttpNodeFinder {
    pub fn new(url: impl Into<String>, config: &DiscoveryConfig) -> ClientResult<Self> {
        let http_client = build_http_client(config)?;
        Ok(Self::with_client(url, http_client))
    }

    pub fn with_client(url: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// HTTP client configured for node-finder requests.
pub fn build_http_client(config: &DiscoveryConfig) -> ClientResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(config.http_timeout)
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .build()?)
}

#[async_trait]
impl PeerBootstrap for HttpNodeFinder {
    async fn fetch_seed(&self) -> Result<String, ClientError> {
        let response = self.http_client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::transport(format!(
                "Error retrieving peer: {}",
                status
            )));
        }

        let body = response.text().await?;
        let seed = body.trim();
        if seed.is_empty() {
            return Err(ClientError::transport("Received empty peer."));
        }
        debug!(url = %self.url, seed, "Node finder returned seed");
        Ok(seed.to_string())
    }
}
