//! Esplora HTTP API used as an external view of the bitcoin tip.

use super::{BestBlock, BestBlockSource, RpcError};
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

pub struct EsploraBlockSource {
    http_client: reqwest::Client,
    base_url: Url,
}

impl EsploraBlockSource {
    /// `base_url` is the API root, e.g. `https://blockstream.info/api`.
    pub fn new(base_url: Url) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.as_str().trim_end_matches('/'))
    }

    async fn get_text(&self, path: &str) -> Result<String, RpcError> {
        let response = self
            .http_client
            .get(self.endpoint(path))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?.trim().to_string())
    }
}

#[async_trait]
impl BestBlockSource for EsploraBlockSource {
    fn name(&self) -> String {
        self.base_url.to_string()
    }

    async fn best_block(&self) -> Result<BestBlock, RpcError> {
        let hash = self.get_text("blocks/tip/hash").await?;
        let height = self.get_text("blocks/tip/height").await?;
        let height = height
            .parse::<u64>()
            .map_err(|e| RpcError::Decode(format!("tip height {height}: {e}")))?;
        Ok(BestBlock { hash, height })
    }
}
