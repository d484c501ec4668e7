pub mod error;
pub mod oauth;
pub mod paginate;
pub mod retry;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod transport;
pub mod types;

pub use error::{CrmError, Result};
pub use oauth::{OAuthClient, OAuthCredentials};
pub use paginate::{PageSettings, Paginator};
pub use retry::{RetryPolicy, RetryingClient};
pub use transport::{ApiRequest, HttpTransport, RawResponse, ReqwestTransport};
pub use types::{
    parse_timestamp, Admission, Contact, ContactPass, Event, Listing, PassCatalogEntry, Source,
    TokenPair,
};

use std::time::Duration;

use types::Item;

pub const DEFAULT_BASE_URL: &str = "https://an8242.listokcrm.ru";

const API_PREFIX: &str = "/api/external/v2";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// ListokCRM external API v2.
///
/// Collections (`contacts`, `passes`) are walked page by page; per-contact
/// sub-collections only read their first page.
pub struct ListokClient<T = ReqwestTransport> {
    http: RetryingClient<T>,
    base_url: String,
    pages: PageSettings,
}

impl ListokClient<ReqwestTransport> {
    pub fn new(base_url: &str, policy: RetryPolicy, pages: PageSettings) -> Result<Self> {
        let transport = ReqwestTransport::new(REQUEST_TIMEOUT)?;
        Ok(Self::with_transport(transport, base_url, policy, pages))
    }
}

impl<T: HttpTransport> ListokClient<T> {
    pub fn with_transport(
        transport: T,
        base_url: &str,
        policy: RetryPolicy,
        pages: PageSettings,
    ) -> Self {
        Self {
            http: RetryingClient::new(transport, policy),
            base_url: base_url.trim_end_matches('/').to_string(),
            pages,
        }
    }

    pub fn http(&self) -> &RetryingClient<T> {
        &self.http
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    fn get(&self, token: &str, url: String) -> ApiRequest {
        ApiRequest::get(url)
            .bearer(token)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .header("X-Requested-With", "XMLHttpRequest")
    }

    fn paginator(&self) -> Paginator<'_, T> {
        Paginator::new(&self.http, &self.pages)
    }

    /// Every marketing source configured in the account.
    pub async fn sources(&self, token: &str) -> Result<Vec<Source>> {
        let sources: Vec<Source> = self
            .paginator()
            .first_page(&self.get(token, self.api_url("/sources")))
            .await?;
        tracing::info!(count = sources.len(), "Fetched sources");
        Ok(sources)
    }

    /// Every contact, across all pages.
    pub async fn contacts(&self, token: &str) -> Result<Vec<Contact>> {
        let url = self.api_url("/contacts");
        self.paginator()
            .fetch_all("contacts", |page| self.get(token, format!("{url}?page={page}")))
            .await
    }

    /// Account-wide pass catalogue, across all pages.
    pub async fn pass_catalog(&self, token: &str) -> Result<Vec<PassCatalogEntry>> {
        let url = self.api_url("/passes");
        self.paginator()
            .fetch_all("passes", |page| self.get(token, format!("{url}?page={page}")))
            .await
    }

    pub async fn contact_listings(&self, token: &str, contact_id: i64) -> Result<Vec<Listing>> {
        let url = self.api_url(&format!("/contacts/{contact_id}/listings"));
        self.paginator().first_page(&self.get(token, url)).await
    }

    pub async fn event(&self, token: &str, event_id: i64) -> Result<Event> {
        let url = self.api_url(&format!("/events/{event_id}"));
        let item: Item<Event> = self.http.call_json(&self.get(token, url)).await?;
        Ok(item.into_inner())
    }

    pub async fn contact_admissions(&self, token: &str, contact_id: i64) -> Result<Vec<Admission>> {
        let url = self.api_url(&format!("/contacts/{contact_id}/admissions"));
        self.paginator().first_page(&self.get(token, url)).await
    }

    pub async fn contact_passes(&self, token: &str, contact_id: i64) -> Result<Vec<ContactPass>> {
        let url = self.api_url(&format!("/contacts/{contact_id}/passes"));
        self.paginator().first_page(&self.get(token, url)).await
    }
}
