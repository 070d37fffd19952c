use thiserror::Error;

/// Problems with a harvest configuration, detected before any request is sent.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("page size must be greater than zero")]
    InvalidPageSize,

    #[error("max pages must be greater than zero")]
    InvalidMaxPages,

    #[error("page {page_index} with page size {page_size} overflows the result index")]
    IndexOverflow { page_index: usize, page_size: usize },

    #[error("min price {min} is greater than max price {max}")]
    InvertedPriceBounds { min: u64, max: u64 },

    #[error("radius must be a finite, non-negative number (got {0})")]
    InvalidRadius(f64),

    #[error("region identifier must not be empty")]
    EmptyRegion,

    #[error("invalid {field} URL \"{url}\": {reason}")]
    InvalidUrl {
        field: &'static str,
        url: String,
        reason: String,
    },

    #[error("invalid data carrier id \"{id}\": {reason}")]
    InvalidCarrierId { id: String, reason: String },
}

/// Why the embedded data carrier could not be turned into a JSON value.
///
/// Both variants are recoverable: the page is skipped and the harvest goes on.
#[derive(Debug, Error)]
pub enum EmbeddedDataError {
    #[error("no <script id=\"{carrier_id}\"> element on the page")]
    Missing { carrier_id: String },

    #[error("data carrier nests deeper than {limit} levels")]
    TooDeep { limit: usize },

    #[error("data carrier content is not valid JSON: {source}")]
    Malformed {
        #[source]
        source: serde_json::Error,
    },
}
