//! Harvests property listings from the JSON that search result pages embed
//! for client-side hydration, and flattens them into fixed-schema rows.

pub mod error;
pub mod export;
pub mod models;
pub mod scrapers;

pub use error::{ConfigError, EmbeddedDataError};
pub use models::{HarvestReport, NormalizedRecord, StopReason};
pub use scrapers::{HarvestConfig, Harvester, PageFetchResult, PageSource, RightmoveFetcher};
