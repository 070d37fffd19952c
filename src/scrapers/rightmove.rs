use crate::error::ConfigError;
use crate::scrapers::traits::PageSource;
use crate::scrapers::types::{HarvestConfig, NonSuccessPolicy, PageFetchResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

/// Fetches Rightmove search result pages over plain HTTP
pub struct RightmoveFetcher {
    client: Client,
    config: HarvestConfig,
}

impl RightmoveFetcher {
    /// Create a fetcher for the given search; the config is validated first
    pub fn new(config: HarvestConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    async fn fetch_page(&self, page_index: usize) -> Result<PageFetchResult, ConfigError> {
        let url = self.config.page_url(page_index)?;
        debug!("Fetching URL: {}", url);

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return Ok(PageFetchResult::TransientError(describe(&e))),
        };

        let status = response.status();
        if status != StatusCode::OK {
            return Ok(classify_status(status, self.config.non_success_policy));
        }

        match response.bytes().await {
            Ok(body) => {
                debug!("Downloaded {} bytes", body.len());
                Ok(PageFetchResult::Success(body.to_vec()))
            }
            Err(e) => Ok(PageFetchResult::TransientError(describe(&e))),
        }
    }
}

#[async_trait]
impl PageSource for RightmoveFetcher {
    async fn fetch(&self, page_index: usize) -> PageFetchResult {
        match self.fetch_page(page_index).await {
            Ok(result) => result,
            // Unreachable in practice: new() validated the base URL.
            Err(e) => PageFetchResult::TransientError(e.to_string()),
        }
    }

    fn source_name(&self) -> &'static str {
        "Rightmove"
    }
}

/// Map a non-200 status onto a fetch result according to the policy.
fn classify_status(status: StatusCode, policy: NonSuccessPolicy) -> PageFetchResult {
    if policy.is_transient(status) {
        warn!("Server answered {}, skipping page", status);
        PageFetchResult::TransientError(format!("HTTP {status}"))
    } else {
        PageFetchResult::NotFound {
            status: status.as_u16(),
        }
    }
}

fn describe(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("request timed out: {error}")
    } else if error.is_connect() {
        format!("connection failed: {error}")
    } else {
        error.to_string()
    }
}
