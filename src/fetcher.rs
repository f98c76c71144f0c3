use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;

use crate::config::Config;
use crate::error::AlertError;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// Source of rendered page markup.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, AlertError>;
}

pub struct HttpPageFetcher {
    client: Client,
    settle_delay: Duration,
}

impl HttpPageFetcher {
    pub fn new(cfg: &Config) -> Result<Self, AlertError> {
        // No idle connections survive a check; every theatre starts clean.
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(cfg.fetch_timeout_secs))
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| AlertError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            settle_delay: Duration::from_millis(cfg.settle_delay_ms),
        })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AlertError> {
        let fetch_error = |e: reqwest::Error| AlertError::Fetch {
            url: url.to_string(),
            reason: if e.is_timeout() { "timed out".to_string() } else { e.to_string() },
        };

        let response = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.5")
            .send()
            .await
            .map_err(fetch_error)?
            .error_for_status()
            .map_err(fetch_error)?;

        let body = response.text().await.map_err(fetch_error)?;
        debug!("Fetched {} ({} bytes)", url, body.len());

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        Ok(body)
    }
}
