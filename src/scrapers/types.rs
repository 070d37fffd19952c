use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Listings per result page on the upstream site.
pub const DEFAULT_PAGE_SIZE: usize = 24;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Result ordering requested from the search endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SortType {
    LowestPrice,
    HighestPrice,
    #[default]
    NewestListed,
    OldestListed,
}

impl SortType {
    /// Value sent as the `sortType` query parameter.
    pub fn code(self) -> u8 {
        match self {
            SortType::LowestPrice => 1,
            SortType::HighestPrice => 2,
            SortType::NewestListed => 6,
            SortType::OldestListed => 10,
        }
    }
}

/// How a non-200 answer from the search endpoint is interpreted.
///
/// The site signals the end of the result set by failing the first page past
/// it, so `StopHarvest` treats every non-200 as exhaustion. That also ends the
/// run on a passing 503; `SkipServerErrors` treats 5xx and 429 as transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum NonSuccessPolicy {
    #[default]
    StopHarvest,
    SkipServerErrors,
}

impl NonSuccessPolicy {
    /// Whether a non-200 status should be retried on the next page instead of
    /// ending the harvest.
    pub fn is_transient(self, status: StatusCode) -> bool {
        match self {
            NonSuccessPolicy::StopHarvest => false,
            NonSuccessPolicy::SkipServerErrors => {
                status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
            }
        }
    }
}

/// Search and run parameters for one harvest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Number of result pages to walk at most
    pub max_pages: usize,
    /// Listings per page; the `index` parameter advances by this much
    pub page_size: usize,
    /// Pause between pages (milliseconds)
    pub politeness_delay_ms: u64,
    /// Minimum price (GBP)
    pub min_price: u64,
    /// Maximum price (GBP)
    pub max_price: u64,
    /// Location filter, e.g. `REGION^281`
    pub region_identifier: String,
    /// Search radius in miles
    pub radius: f64,
    pub sort_type: SortType,
    /// Search endpoint, without query string
    pub base_url: String,
    /// Prefix for the relative `propertyUrl` of each listing
    pub origin: String,
    pub user_agent: String,
    /// `id` of the script element holding the page's JSON
    pub data_carrier_id: String,
    /// Upper bound for a single page request (seconds)
    pub request_timeout_secs: u64,
    /// Abort after this many transient failures in a row; 0 never aborts
    pub max_consecutive_failures: u32,
    pub non_success_policy: NonSuccessPolicy,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_pages: 70,
            page_size: DEFAULT_PAGE_SIZE,
            politeness_delay_ms: 500,
            min_price: 200_000,
            max_price: 500_000,
            region_identifier: "REGION^281".to_string(),
            radius: 3.0,
            sort_type: SortType::default(),
            base_url: "https://www.rightmove.co.uk/property-for-sale/find.html".to_string(),
            origin: "https://www.rightmove.co.uk".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            data_carrier_id: "__NEXT_DATA__".to_string(),
            request_timeout_secs: 30,
            max_consecutive_failures: 5,
            non_success_policy: NonSuccessPolicy::default(),
        }
    }
}

impl HarvestConfig {
    /// Check everything that would make the run meaningless before it starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::InvalidPageSize);
        }
        if self.max_pages == 0 {
            return Err(ConfigError::InvalidMaxPages);
        }
        self.result_index(self.max_pages - 1)?;
        if self.min_price > self.max_price {
            return Err(ConfigError::InvertedPriceBounds {
                min: self.min_price,
                max: self.max_price,
            });
        }
        if !self.radius.is_finite() || self.radius < 0.0 {
            return Err(ConfigError::InvalidRadius(self.radius));
        }
        if self.region_identifier.trim().is_empty() {
            return Err(ConfigError::EmptyRegion);
        }
        parse_url("base", &self.base_url)?;
        parse_url("origin", &self.origin)?;
        if self.data_carrier_id.is_empty() {
            return Err(ConfigError::InvalidCarrierId {
                id: self.data_carrier_id.clone(),
                reason: "must not be empty".to_string(),
            });
        }
        if self
            .data_carrier_id
            .chars()
            .any(|c| c == '"' || c == '\\' || c.is_whitespace())
        {
            return Err(ConfigError::InvalidCarrierId {
                id: self.data_carrier_id.clone(),
                reason: "must not contain quotes, backslashes or whitespace".to_string(),
            });
        }
        Ok(())
    }

    /// Offset of the first listing on a page, sent as `index`.
    pub fn result_index(&self, page_index: usize) -> Result<usize, ConfigError> {
        page_index
            .checked_mul(self.page_size)
            .ok_or(ConfigError::IndexOverflow {
                page_index,
                page_size: self.page_size,
            })
    }

    /// Build the search URL for a zero-based page index.
    pub fn page_url(&self, page_index: usize) -> Result<Url, ConfigError> {
        let index = self.result_index(page_index)?;
        let mut url = parse_url("base", &self.base_url)?;
        url.query_pairs_mut()
            .append_pair("locationIdentifier", &self.region_identifier)
            .append_pair("maxPrice", &self.max_price.to_string())
            .append_pair("minPrice", &self.min_price.to_string())
            .append_pair("radius", &format_radius(self.radius))
            .append_pair("sortType", &self.sort_type.code().to_string())
            .append_pair("index", &index.to_string());
        Ok(url)
    }

    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// `3.0` stays `3.0` rather than `3`, matching the site's own links.
fn format_radius(radius: f64) -> String {
    if radius.fract() == 0.0 {
        format!("{radius:.1}")
    } else {
        radius.to_string()
    }
}

fn parse_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        field,
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Outcome of requesting one result page.
#[derive(Debug, Clone, PartialEq)]
pub enum PageFetchResult {
    /// 200 with the raw response body
    Success(Vec<u8>),
    /// Any status the policy reads as "no more pages"
    NotFound { status: u16 },
    /// Timeout, connection failure, unreadable body, or a status the policy
    /// reads as temporary
    TransientError(String),
}
