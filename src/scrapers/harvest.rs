//! Pagination controller: walks result pages until the site runs dry.
//!
//! Each page goes through fetch -> locate -> find -> normalize. The site never
//! says how many pages there are, so the end of the run is inferred from what
//! comes back: a non-success status or a document without a listing array.
//! Recoverable trouble on one page (a network blip, an interstitial without
//! the data carrier) skips that page and the walk carries on.

use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::models::{HarvestReport, NormalizedRecord, StopReason};
use crate::scrapers::embedded::EmbeddedDataLocator;
use crate::scrapers::finder::find_record_list;
use crate::scrapers::normalize::normalize;
use crate::scrapers::traits::PageSource;
use crate::scrapers::types::{HarvestConfig, PageFetchResult};

/// Mutable bookkeeping for a single run. Never shared between runs.
#[derive(Debug, Default)]
pub struct HarvestState {
    pub page_index: usize,
    pub records: Vec<NormalizedRecord>,
    pub consecutive_failures: u32,
    pub pages_fetched: usize,
    pub pages_skipped: usize,
}

enum Phase {
    Fetching,
    Locating(Vec<u8>),
    FindingList(Value),
    Advancing,
    Stopped(StopReason),
}

/// Drives a [`PageSource`] across successive pages.
pub struct Harvester<S> {
    source: S,
    locator: EmbeddedDataLocator,
    origin: String,
    max_pages: usize,
    politeness_delay: Duration,
    max_consecutive_failures: u32,
}

impl<S: PageSource> Harvester<S> {
    /// Validate `config` and set up a harvester over `source`.
    pub fn new(config: &HarvestConfig, source: S) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            source,
            locator: EmbeddedDataLocator::new(&config.data_carrier_id)?,
            origin: config.origin.clone(),
            max_pages: config.max_pages,
            politeness_delay: config.politeness_delay(),
            max_consecutive_failures: config.max_consecutive_failures,
        })
    }

    /// Run to completion and return the records in page order.
    pub async fn harvest(&self) -> Vec<NormalizedRecord> {
        self.run(&CancellationToken::new()).await.records
    }

    /// Run until the pages run out, the limit is hit or `cancel` fires.
    ///
    /// Cancellation is honoured between pages only; whatever was gathered up
    /// to that point is returned.
    pub async fn run(&self, cancel: &CancellationToken) -> HarvestReport {
        let started_at = Utc::now();
        let mut state = HarvestState::default();
        let mut phase = Phase::Fetching;

        let stop_reason = loop {
            phase = match phase {
                Phase::Fetching => {
                    if cancel.is_cancelled() {
                        Phase::Stopped(StopReason::Cancelled)
                    } else {
                        self.fetch(&mut state).await
                    }
                }
                Phase::Locating(page) => self.locate(&mut state, &page),
                Phase::FindingList(document) => self.collect(&mut state, &document),
                Phase::Advancing => self.advance(&mut state, cancel).await,
                Phase::Stopped(reason) => break reason,
            };
        };

        info!(
            "Harvest from {} stopped after {} page(s): {:?}",
            self.source.source_name(),
            state.pages_fetched,
            stop_reason
        );

        HarvestReport {
            records: state.records,
            pages_fetched: state.pages_fetched,
            pages_skipped: state.pages_skipped,
            stop_reason,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn fetch(&self, state: &mut HarvestState) -> Phase {
        let page = state.page_index;
        info!(
            "Fetching page {} of at most {} from {}",
            page + 1,
            self.max_pages,
            self.source.source_name()
        );

        match self.source.fetch(page).await {
            PageFetchResult::Success(body) => {
                state.pages_fetched += 1;
                state.consecutive_failures = 0;
                Phase::Locating(body)
            }
            PageFetchResult::NotFound { status } => {
                info!(
                    "Page {} answered with status {}, assuming it is past the last page",
                    page + 1,
                    status
                );
                Phase::Stopped(StopReason::PaginationExhausted { status })
            }
            PageFetchResult::TransientError(cause) => {
                state.consecutive_failures += 1;
                state.pages_skipped += 1;
                warn!(
                    "Skipping page {} after fetch failure ({} in a row): {}",
                    page + 1,
                    state.consecutive_failures,
                    cause
                );
                if self.max_consecutive_failures > 0
                    && state.consecutive_failures >= self.max_consecutive_failures
                {
                    warn!("Too many consecutive failures, giving up");
                    Phase::Stopped(StopReason::TooManyFailures {
                        consecutive: state.consecutive_failures,
                    })
                } else {
                    Phase::Advancing
                }
            }
        }
    }

    fn locate(&self, state: &mut HarvestState, page: &[u8]) -> Phase {
        match self.locator.extract(page) {
            Ok(document) => Phase::FindingList(document),
            Err(e) => {
                state.pages_skipped += 1;
                warn!("Skipping page {}: {}", state.page_index + 1, e);
                Phase::Advancing
            }
        }
    }

    fn collect(&self, state: &mut HarvestState, document: &Value) -> Phase {
        let Some(raw_records) = find_record_list(document) else {
            info!(
                "No listings in the data on page {}, ending harvest",
                state.page_index + 1
            );
            return Phase::Stopped(StopReason::NoRecordList);
        };

        for raw in raw_records {
            let record = normalize(raw, &self.origin);
            debug!("Listing {:?} at {:?}", record.property_type, record.url);
            state.records.push(record);
        }
        info!(
            "Page {} gave {} listing(s), {} so far",
            state.page_index + 1,
            raw_records.len(),
            state.records.len()
        );
        Phase::Advancing
    }

    async fn advance(&self, state: &mut HarvestState, cancel: &CancellationToken) -> Phase {
        state.page_index += 1;
        if state.page_index >= self.max_pages {
            return Phase::Stopped(StopReason::MaxPagesReached);
        }

        tokio::select! {
            _ = cancel.cancelled() => Phase::Stopped(StopReason::Cancelled),
            _ = tokio::time::sleep(self.politeness_delay) => Phase::Fetching,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses, then reports 404 forever.
    struct ScriptedSource {
        responses: Mutex<VecDeque<PageFetchResult>>,
        requested: Mutex<Vec<usize>>,
        cancel_on_page: Option<(usize, CancellationToken)>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<PageFetchResult>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requested: Mutex::new(Vec::new()),
                cancel_on_page: None,
            }
        }

        fn cancelling_on(mut self, page: usize, token: CancellationToken) -> Self {
            self.cancel_on_page = Some((page, token));
            self
        }

        fn requested(&self) -> Vec<usize> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageSource for ScriptedSource {
        async fn fetch(&self, page_index: usize) -> PageFetchResult {
            self.requested.lock().unwrap().push(page_index);
            if let Some((page, token)) = &self.cancel_on_page {
                if *page == page_index {
                    token.cancel();
                }
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(PageFetchResult::NotFound { status: 404 })
        }

        fn source_name(&self) -> &'static str {
            "scripted"
        }
    }

    fn config() -> HarvestConfig {
        HarvestConfig {
            max_pages: 10,
            politeness_delay_ms: 0,
            origin: "https://example.test".to_string(),
            ..HarvestConfig::default()
        }
    }

    fn listing(id: u64) -> Value {
        json!({
            "price": {"amount": 100_000 + id},
            "bedrooms": 2,
            "propertyUrl": format!("/properties/{id}")
        })
    }

    fn page(data: Value) -> PageFetchResult {
        PageFetchResult::Success(
            format!(r#"<html><script id="__NEXT_DATA__" type="application/json">{data}</script></html>"#)
                .into_bytes(),
        )
    }

    fn listings_page(ids: &[u64]) -> PageFetchResult {
        let listings: Vec<Value> = ids.iter().copied().map(listing).collect();
        page(json!({"props": {"pageProps": {"properties": listings}}}))
    }

    fn urls(records: &[NormalizedRecord]) -> Vec<String> {
        records.iter().filter_map(|r| r.url.clone()).collect()
    }

    fn expected_urls(ids: &[u64]) -> Vec<String> {
        ids.iter()
            .map(|id| format!("https://example.test/properties/{id}"))
            .collect()
    }

    fn transient() -> PageFetchResult {
        PageFetchResult::TransientError("connection reset".to_string())
    }

    #[tokio::test]
    async fn collects_pages_in_order_until_not_found() {
        let source = ScriptedSource::new(vec![
            listings_page(&[1, 2]),
            listings_page(&[3]),
            PageFetchResult::NotFound { status: 404 },
        ]);
        let harvester = Harvester::new(&config(), source).unwrap();

        let report = harvester.run(&CancellationToken::new()).await;

        assert_eq!(urls(&report.records), expected_urls(&[1, 2, 3]));
        assert_eq!(report.stop_reason, StopReason::PaginationExhausted { status: 404 });
        assert_eq!(report.pages_fetched, 2);
        assert_eq!(harvester.source.requested(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn page_without_carrier_yields_empty_result() {
        let source = ScriptedSource::new(vec![PageFetchResult::Success(
            b"<html><body>nothing here</body></html>".to_vec(),
        )]);
        let harvester = Harvester::new(
            &HarvestConfig {
                max_pages: 1,
                ..config()
            },
            source,
        )
        .unwrap();

        let report = harvester.run(&CancellationToken::new()).await;

        assert!(report.records.is_empty());
        assert_eq!(report.pages_skipped, 1);
        assert_eq!(report.stop_reason, StopReason::MaxPagesReached);
    }

    #[tokio::test]
    async fn transient_failure_skips_page_and_continues() {
        let source = ScriptedSource::new(vec![transient(), listings_page(&[5])]);
        let harvester = Harvester::new(&config(), source).unwrap();

        let records = harvester.harvest().await;

        assert_eq!(urls(&records), expected_urls(&[5]));
        assert_eq!(harvester.source.requested(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn malformed_and_missing_carriers_are_skipped() {
        let source = ScriptedSource::new(vec![
            PageFetchResult::Success(br#"<script id="__NEXT_DATA__">{oops</script>"#.to_vec()),
            PageFetchResult::Success(b"<p>captcha</p>".to_vec()),
            listings_page(&[8]),
        ]);
        let harvester = Harvester::new(&config(), source).unwrap();

        let report = harvester.run(&CancellationToken::new()).await;

        assert_eq!(urls(&report.records), expected_urls(&[8]));
        assert_eq!(report.pages_skipped, 2);
        assert_eq!(report.pages_fetched, 3);
    }

    #[tokio::test]
    async fn missing_listing_array_ends_the_harvest() {
        let source = ScriptedSource::new(vec![
            listings_page(&[1]),
            page(json!({"props": {"pageProps": {"properties": []}}})),
            listings_page(&[2]),
        ]);
        let harvester = Harvester::new(&config(), source).unwrap();

        let report = harvester.run(&CancellationToken::new()).await;

        assert_eq!(urls(&report.records), expected_urls(&[1]));
        assert_eq!(report.stop_reason, StopReason::NoRecordList);
        assert_eq!(harvester.source.requested(), vec![0, 1]);
    }

    #[tokio::test]
    async fn stops_at_max_pages() {
        let source = ScriptedSource::new(vec![
            listings_page(&[1]),
            listings_page(&[2]),
            listings_page(&[3]),
        ]);
        let harvester = Harvester::new(
            &HarvestConfig {
                max_pages: 2,
                ..config()
            },
            source,
        )
        .unwrap();

        let report = harvester.run(&CancellationToken::new()).await;

        assert_eq!(urls(&report.records), expected_urls(&[1, 2]));
        assert_eq!(report.stop_reason, StopReason::MaxPagesReached);
        assert_eq!(harvester.source.requested(), vec![0, 1]);
    }

    #[tokio::test]
    async fn gives_up_after_consecutive_failures() {
        let source = ScriptedSource::new(vec![
            listings_page(&[1]),
            transient(),
            transient(),
            transient(),
            listings_page(&[2]),
        ]);
        let harvester = Harvester::new(
            &HarvestConfig {
                max_consecutive_failures: 3,
                ..config()
            },
            source,
        )
        .unwrap();

        let report = harvester.run(&CancellationToken::new()).await;

        assert_eq!(urls(&report.records), expected_urls(&[1]));
        assert_eq!(
            report.stop_reason,
            StopReason::TooManyFailures { consecutive: 3 }
        );
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let source = ScriptedSource::new(vec![
            transient(),
            transient(),
            listings_page(&[1]),
            transient(),
            transient(),
            listings_page(&[2]),
        ]);
        let harvester = Harvester::new(
            &HarvestConfig {
                max_consecutive_failures: 3,
                ..config()
            },
            source,
        )
        .unwrap();

        let report = harvester.run(&CancellationToken::new()).await;

        assert_eq!(urls(&report.records), expected_urls(&[1, 2]));
        assert_eq!(report.stop_reason, StopReason::PaginationExhausted { status: 404 });
    }

    #[tokio::test]
    async fn zero_threshold_never_gives_up() {
        let mut responses: Vec<PageFetchResult> = (0..8).map(|_| transient()).collect();
        responses.push(listings_page(&[4]));
        let harvester = Harvester::new(
            &HarvestConfig {
                max_consecutive_failures: 0,
                ..config()
            },
            ScriptedSource::new(responses),
        )
        .unwrap();

        assert_eq!(urls(&harvester.harvest().await), expected_urls(&[4]));
    }

    #[tokio::test]
    async fn cancelled_before_start_fetches_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let harvester =
            Harvester::new(&config(), ScriptedSource::new(vec![listings_page(&[1])])).unwrap();

        let report = harvester.run(&token).await;

        assert!(report.records.is_empty());
        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert!(harvester.source.requested().is_empty());
    }

    #[tokio::test]
    async fn cancellation_between_pages_keeps_partial_result() {
        let token = CancellationToken::new();
        let source = ScriptedSource::new(vec![listings_page(&[1, 2]), listings_page(&[3])])
            .cancelling_on(0, token.clone());
        let harvester = Harvester::new(
            &HarvestConfig {
                politeness_delay_ms: 60_000,
                ..config()
            },
            source,
        )
        .unwrap();

        let report = harvester.run(&token).await;

        assert_eq!(urls(&report.records), expected_urls(&[1, 2]));
        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert_eq!(harvester.source.requested(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_between_pages() {
        let source = ScriptedSource::new(vec![listings_page(&[1]), listings_page(&[2])]);
        let harvester = Harvester::new(
            &HarvestConfig {
                politeness_delay_ms: 500,
                ..config()
            },
            source,
        )
        .unwrap();

        let start = tokio::time::Instant::now();
        let records = harvester.harvest().await;

        assert_eq!(records.len(), 2);
        // Two pauses: after page 1 and after page 2; the 404 on page 3 ends it.
        assert!(start.elapsed() >= Duration::from_millis(1000));
        assert!(start.elapsed() < Duration::from_millis(1500));
    }

    #[test]
    fn invalid_config_fails_before_the_run() {
        let result = Harvester::new(
            &HarvestConfig {
                page_size: 0,
                ..config()
            },
            ScriptedSource::new(Vec::new()),
        );
        assert!(matches!(result, Err(ConfigError::InvalidPageSize)));
    }

    #[tokio::test]
    async fn deeply_nested_listings_are_harvested() {
        let mut data = json!({"properties": [listing(6)]});
        for _ in 0..400 {
            data = json!({"wrapper": data});
        }
        let harvester = Harvester::new(&config(), ScriptedSource::new(vec![page(data)])).unwrap();

        let report = harvester.run(&CancellationToken::new()).await;

        assert_eq!(urls(&report.records), expected_urls(&[6]));
        assert_eq!(report.pages_skipped, 0);
    }

    #[tokio::test]
    async fn records_without_url_keep_their_place() {
        let source = ScriptedSource::new(vec![page(json!({
            "properties": [
                {"price": {"amount": 1}, "bedrooms": 1, "propertyUrl": "/properties/1"},
                {"price": {"amount": 2}, "bedrooms": 2},
                {"price": {"amount": 3}, "bedrooms": 3, "propertyUrl": "/properties/3"}
            ]
        }))]);
        let harvester = Harvester::new(&config(), source).unwrap();

        let records = harvester.harvest().await;

        let bedrooms: Vec<Option<i64>> = records.iter().map(|r| r.bedrooms).collect();
        assert_eq!(bedrooms, vec![Some(1), Some(2), Some(3)]);
        assert_eq!(records[1].url, None);
    }
}
