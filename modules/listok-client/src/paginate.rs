use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::Result;
use crate::retry::RetryingClient;
use crate::transport::{ApiRequest, HttpTransport};
use crate::types::Collection;

/// Items per page the API serves. A shorter page is the last one.
pub const DEFAULT_PAGE_SIZE: usize = 50;
/// Pause between page requests; the provider rate-limits aggressively.
const DEFAULT_INTER_PAGE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct PageSettings {
    pub page_size: usize,
    pub inter_page_delay: Duration,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            inter_page_delay: DEFAULT_INTER_PAGE_DELAY,
        }
    }
}

/// Walks a paginated collection one page at a time, strictly sequentially.
pub struct Paginator<'a, T> {
    http: &'a RetryingClient<T>,
    settings: &'a PageSettings,
}

impl<'a, T: HttpTransport> Paginator<'a, T> {
    pub fn new(http: &'a RetryingClient<T>, settings: &'a PageSettings) -> Self {
        Self { http, settings }
    }

    /// Fetch pages 1, 2, 3… until a page comes back shorter than `page_size`.
    ///
    /// Any error aborts the walk; pages already fetched are discarded rather
    /// than returned as a silently truncated list.
    pub async fn fetch_all<I, F>(&self, label: &str, request_for_page: F) -> Result<Vec<I>>
    where
        I: DeserializeOwned,
        F: Fn(u32) -> ApiRequest,
    {
        let page_size = self.settings.page_size.max(1);
        let mut items = Vec::new();
        let mut page = 1u32;

        loop {
            let batch: Vec<I> = self
                .http
                .call_json::<Collection<I>>(&request_for_page(page))
                .await?
                .into_items();
            let fetched = batch.len();
            items.extend(batch);

            if fetched < page_size {
                info!(label, pages = page, total = items.len(), "Pagination complete");
                return Ok(items);
            }

            debug!(
                label,
                page,
                total = items.len(),
                delay_ms = self.settings.inter_page_delay.as_millis() as u64,
                "Page full, fetching next"
            );
            page += 1;
            tokio::time::sleep(self.settings.inter_page_delay).await;
        }
    }

    /// First page only. Used for per-contact sub-collections, which are
    /// assumed to fit in one page.
    pub async fn first_page<I: DeserializeOwned>(&self, request: &ApiRequest) -> Result<Vec<I>> {
        Ok(self
            .http
            .call_json::<Collection<I>>(request)
            .await?
            .into_items())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrmError;
    use crate::retry::RetryPolicy;
    use crate::testing::ScriptedTransport;
    use serde_json::json;

    const BASE: &str = "https://crm.test/api/external/v2/contacts";

    fn page_url(page: u32) -> String {
        format!("{BASE}?page={page}")
    }

    fn page_of(ids: std::ops::Range<i64>) -> serde_json::Value {
        let items: Vec<_> = ids.map(|id| json!({ "id": id })).collect();
        json!({ "data": items })
    }

    fn settings(page_size: usize) -> PageSettings {
        PageSettings {
            page_size,
            inter_page_delay: Duration::ZERO,
        }
    }

    fn ids(items: &[serde_json::Value]) -> Vec<i64> {
        items.iter().map(|v| v["id"].as_i64().unwrap()).collect()
    }

    #[tokio::test]
    async fn stops_on_short_page_and_keeps_order() {
        let transport = ScriptedTransport::new()
            .respond_json(&page_url(1), page_of(0..3))
            .respond_json(&page_url(2), page_of(3..6))
            .respond_json(&page_url(3), page_of(6..7));
        let http = RetryingClient::new(transport, RetryPolicy::default().without_delays());
        let settings = settings(3);

        let items: Vec<serde_json::Value> = Paginator::new(&http, &settings)
            .fetch_all("contacts", |p| ApiRequest::get(page_url(p)))
            .await
            .unwrap();

        assert_eq!(ids(&items), (0..7).collect::<Vec<_>>());
        // ceil(7 / 3) requests
        assert_eq!(http.transport().call_count(), 3);
    }

    #[tokio::test]
    async fn single_short_page_is_one_request() {
        let transport = ScriptedTransport::new().respond_json(&page_url(1), page_of(0..2));
        let http = RetryingClient::new(transport, RetryPolicy::default().without_delays());
        let settings = settings(50);

        let items: Vec<serde_json::Value> = Paginator::new(&http, &settings)
            .fetch_all("contacts", |p| ApiRequest::get(page_url(p)))
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(http.transport().call_count(), 1);
    }

    #[tokio::test]
    async fn exact_multiple_needs_trailing_empty_page() {
        let transport = ScriptedTransport::new()
            .respond_json(&page_url(1), page_of(0..2))
            .respond_json(&page_url(2), json!({ "data": [] }));
        let http = RetryingClient::new(transport, RetryPolicy::default().without_delays());
        let settings = settings(2);

        let items: Vec<serde_json::Value> = Paginator::new(&http, &settings)
            .fetch_all("contacts", |p| ApiRequest::get(page_url(p)))
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(http.transport().call_count(), 2);
    }

    #[tokio::test]
    async fn error_mid_walk_discards_partial_results() {
        let transport = ScriptedTransport::new()
            .respond_json(&page_url(1), page_of(0..2))
            .respond(&page_url(2), 500, "boom");
        let http = RetryingClient::new(transport, RetryPolicy::default().without_delays());
        let settings = settings(2);

        let result: Result<Vec<serde_json::Value>> = Paginator::new(&http, &settings)
            .fetch_all("contacts", |p| ApiRequest::get(page_url(p)))
            .await;

        assert!(matches!(result, Err(CrmError::Upstream { status: 500, .. })));
    }

    #[tokio::test]
    async fn rate_limited_page_is_retried_in_place() {
        let transport = ScriptedTransport::new()
            .respond(&page_url(1), 429, "")
            .respond_json(&page_url(1), page_of(0..1));
        let http = RetryingClient::new(transport, RetryPolicy::default().without_delays());
        let settings = settings(2);

        let items: Vec<serde_json::Value> = Paginator::new(&http, &settings)
            .fetch_all("contacts", |p| ApiRequest::get(page_url(p)))
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(http.transport().calls_to(&page_url(1)), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_between_pages() {
        let transport = ScriptedTransport::new()
            .respond_json(&page_url(1), page_of(0..1))
            .respond_json(&page_url(2), page_of(1..2))
            .respond_json(&page_url(3), json!({ "data": [] }));
        let http = RetryingClient::new(transport, RetryPolicy::default().without_delays());
        let settings = PageSettings {
            page_size: 1,
            inter_page_delay: Duration::from_millis(500),
        };

        let started = tokio::time::Instant::now();
        let _: Vec<serde_json::Value> = Paginator::new(&http, &settings)
            .fetch_all("contacts", |p| ApiRequest::get(page_url(p)))
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn first_page_reads_one_request() {
        let url = format!("{BASE}/9/listings");
        let transport = ScriptedTransport::new()
            .respond_json(&url, json!({ "data": [{ "event_id": 1 }, { "event_id": 2 }] }));
        let http = RetryingClient::new(transport, RetryPolicy::default().without_delays());
        let settings = settings(1);

        let items: Vec<serde_json::Value> = Paginator::new(&http, &settings)
            .first_page(&ApiRequest::get(url.clone()))
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(http.transport().call_count(), 1);
    }
}
