use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::config::AppConfig;
use crate::infrastructure::peer::error::PeerError;
use crate::utils::logging;

/// Read access to the peer's view of the canonical chain
#[async_trait]
pub trait ChainPeer: Send + Sync {
    /// Id of the block the peer considers canonical at `height`, if any
    async fn block_id_at_height(&self, height: i32) -> Result<Option<String>, PeerError>;
}

/// Client for the full node HTTP API
pub struct HttpChainPeer {
    client: Client,
    base_url: String,
}

impl HttpChainPeer {
    /// Create a new peer client
    pub fn new(config: &AppConfig) -> Result<Self, PeerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| PeerError::ResponseError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(HttpChainPeer {
            client,
            base_url: config.feed.fullnode_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ChainPeer for HttpChainPeer {
    async fn block_id_at_height(&self, height: i32) -> Result<Option<String>, PeerError> {
        let url = format!("{}/block_at_height", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("height", height)])
            .send()
            .await?;
        let status = response.status();

        if status.as_u16() == 404 {
            return Ok(None);
        } else if !status.is_success() {
            logging::log_error(&format!(
                "Full node returned error status {} for height {}",
                status, height
            ));
            return Err(PeerError::ApiError(format!(
                "Full node returned error status: {}",
                status
            )));
        }

        let body: Value = response.json().await?;
        parse_block_at_height(&body)
    }
}

/// Extract the block id from a `block_at_height` response
fn parse_block_at_height(body: &Value) -> Result<Option<String>, PeerError> {
    if !body.get("success").and_then(Value::as_bool).unwrap_or(false) {
        return Ok(None);
    }

    match body
        .get("block")
        .and_then(|block| block.get("tx_id"))
        .and_then(Value::as_str)
    {
        Some(tx_id) => Ok(Some(tx_id.to_string())),
        None => Err(PeerError::ResponseError(
            "block_at_height response without block.tx_id".to_string(),
        )),
    }
}
