use crate::scrapers::types::PageFetchResult;
use async_trait::async_trait;

/// One page of search results per call.
/// The harvester only talks to this, so tests and other sites can plug in their own source.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch the zero-based result page `page_index`.
    ///
    /// Never retries; failures are reported in the returned value.
    async fn fetch(&self, page_index: usize) -> PageFetchResult;

    /// Get the name of the source, for logs
    fn source_name(&self) -> &'static str;
}
