// Seams between the report pipeline and the outside world.
//
// CrmGateway: every CRM read the pipeline makes. ListokClient implements it
//   for production; MockCrm (testing.rs) implements it for tests.
// TokenProvider: supplies the bearer token for a run. The pipeline never
//   refreshes on its own.
// ReportSink: persists the finished matrix.

use anyhow::Result;
use async_trait::async_trait;
use listok_client::{
    Admission, Contact, ContactPass, Event, HttpTransport, ListokClient, Listing,
    PassCatalogEntry, Source,
};

use crate::report::ReportMatrix;

type CrmResult<T> = listok_client::Result<T>;

// ---------------------------------------------------------------------------
// CrmGateway
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CrmGateway: Send + Sync {
    async fn sources(&self, token: &str) -> CrmResult<Vec<Source>>;

    /// All contacts, across every page.
    async fn contacts(&self, token: &str) -> CrmResult<Vec<Contact>>;

    /// Account-wide pass catalogue, across every page.
    async fn pass_catalog(&self, token: &str) -> CrmResult<Vec<PassCatalogEntry>>;

    async fn listings(&self, token: &str, contact_id: i64) -> CrmResult<Vec<Listing>>;

    async fn event(&self, token: &str, event_id: i64) -> CrmResult<Event>;

    async fn admissions(&self, token: &str, contact_id: i64) -> CrmResult<Vec<Admission>>;

    async fn passes(&self, token: &str, contact_id: i64) -> CrmResult<Vec<ContactPass>>;
}

#[async_trait]
impl<T: HttpTransport> CrmGateway for ListokClient<T> {
    async fn sources(&self, token: &str) -> CrmResult<Vec<Source>> {
        ListokClient::sources(self, token).await
    }

    async fn contacts(&self, token: &str) -> CrmResult<Vec<Contact>> {
        ListokClient::contacts(self, token).await
    }

    async fn pass_catalog(&self, token: &str) -> CrmResult<Vec<PassCatalogEntry>> {
        ListokClient::pass_catalog(self, token).await
    }

    async fn listings(&self, token: &str, contact_id: i64) -> CrmResult<Vec<Listing>> {
        self.contact_listings(token, contact_id).await
    }

    async fn event(&self, token: &str, event_id: i64) -> CrmResult<Event> {
        ListokClient::event(self, token, event_id).await
    }

    async fn admissions(&self, token: &str, contact_id: i64) -> CrmResult<Vec<Admission>> {
        self.contact_admissions(token, contact_id).await
    }

    async fn passes(&self, token: &str, contact_id: i64) -> CrmResult<Vec<ContactPass>> {
        self.contact_passes(token, contact_id).await
    }
}

// ---------------------------------------------------------------------------
// TokenProvider
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Bearer token valid for the duration of one run.
    async fn access_token(&self) -> Result<String>;
}

// ---------------------------------------------------------------------------
// ReportSink
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Write the matrix to `target` (a path, a spreadsheet id, ...).
    async fn write(&self, target: &str, matrix: &ReportMatrix) -> Result<()>;

    fn name(&self) -> &str;
}
