use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Number;

/// Fallback value for `property_type` when the listing carries no sub type.
pub const UNKNOWN_PROPERTY_TYPE: &str = "N/A";

/// Output column order, shared by every tabular export.
pub const COLUMNS: [&str; 10] = [
    "price",
    "bedrooms",
    "bathrooms",
    "latitude",
    "longitude",
    "property_type",
    "tenure",
    "listing_update_reason",
    "summary",
    "url",
];

/// Fixed-schema listing row.
///
/// Every field is always serialized; absent values become `null` in JSON and
/// an empty cell in CSV. Field order matches [`COLUMNS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub price: Option<Number>,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub property_type: String,
    pub tenure: Option<String>,
    pub listing_update_reason: Option<String>,
    pub summary: Option<String>,
    pub url: Option<String>,
}

/// Why a harvest run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// The origin answered a page with a non-success status.
    PaginationExhausted { status: u16 },
    /// A page parsed fine but held no listing array.
    NoRecordList,
    /// The configured page limit was reached.
    MaxPagesReached,
    /// Too many transient failures in a row.
    TooManyFailures { consecutive: u32 },
    /// The caller cancelled between pages.
    Cancelled,
}

/// Outcome of one harvest run: the records plus some bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestReport {
    pub records: Vec<NormalizedRecord>,
    pub pages_fetched: usize,
    pub pages_skipped: usize,
    pub stop_reason: StopReason,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
