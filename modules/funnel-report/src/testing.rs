// Test mocks for the report pipeline.
//
// MockCrm (CrmGateway): HashMap-based contact → sub-resource fixtures with
// per-endpoint call counters. Unregistered listings, admissions and passes
// read as empty collections; unregistered events are NotFound.
//
// Plus helpers for constructing contacts and passes.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use listok_client::{
    Admission, Contact, ContactPass, CrmError, Event, Listing, PassCatalogEntry, Source,
};

use crate::traits::CrmGateway;

type CrmResult<T> = listok_client::Result<T>;

// ---------------------------------------------------------------------------
// Fixture helpers
// ---------------------------------------------------------------------------

/// Contact created inside a September 2025 window.
pub fn contact(id: i64, source_id: Option<i64>) -> Contact {
    Contact {
        id: Some(id),
        contact_id: None,
        source_id,
        created_at: Some("2025-09-10 12:00:00".into()),
    }
}

pub fn contact_created(id: i64, source_id: Option<i64>, created_at: &str) -> Contact {
    Contact {
        created_at: Some(created_at.into()),
        ..contact(id, source_id)
    }
}

pub fn pass(name: &str, sold_at: Option<i64>) -> ContactPass {
    ContactPass {
        pass_id: None,
        pass: Some(listok_client::types::PassRef {
            name: Some(name.into()),
        }),
        sold_at,
        created_at: None,
    }
}

// ---------------------------------------------------------------------------
// MockCrm
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockCrm {
    sources: Vec<Source>,
    contacts: Vec<Contact>,
    catalog: Vec<PassCatalogEntry>,
    listings: HashMap<i64, Vec<Listing>>,
    events: HashMap<i64, Event>,
    admissions: HashMap<i64, Vec<Admission>>,
    passes: HashMap<i64, Vec<ContactPass>>,
    failing: HashSet<(&'static str, i64)>,
    failing_collections: HashSet<&'static str>,
    unauthorized: HashSet<(&'static str, Option<i64>)>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl MockCrm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_contacts(mut self, contacts: Vec<Contact>) -> Self {
        self.contacts = contacts;
        self
    }

    pub fn with_catalog(mut self, catalog: Vec<PassCatalogEntry>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn on_listings(mut self, contact_id: i64, listings: Vec<Listing>) -> Self {
        self.listings.insert(contact_id, listings);
        self
    }

    /// One listing pointing at an event on `date`.
    pub fn on_listing_event(self, contact_id: i64, event_id: i64, date: &str) -> Self {
        self.on_listings(
            contact_id,
            vec![Listing {
                event_id: Some(event_id),
            }],
        )
        .on_event(event_id, date)
    }

    pub fn on_event(mut self, event_id: i64, date: &str) -> Self {
        self.events.insert(
            event_id,
            Event {
                id: Some(event_id),
                date: Some(date.into()),
            },
        );
        self
    }

    pub fn on_admissions(mut self, contact_id: i64, admissions: Vec<Admission>) -> Self {
        self.admissions.insert(contact_id, admissions);
        self
    }

    pub fn on_passes(mut self, contact_id: i64, passes: Vec<ContactPass>) -> Self {
        self.passes.insert(contact_id, passes);
        self
    }

    pub fn failing_listings(mut self, contact_id: i64) -> Self {
        self.failing.insert(("listings", contact_id));
        self
    }

    pub fn failing_admissions(mut self, contact_id: i64) -> Self {
        self.failing.insert(("admissions", contact_id));
        self
    }

    pub fn failing_passes(mut self, contact_id: i64) -> Self {
        self.failing.insert(("passes", contact_id));
        self
    }

    /// Make a whole-account read (`sources`, `contacts`, `pass_catalog`) fail.
    pub fn failing(mut self, endpoint: &'static str) -> Self {
        self.failing_collections.insert(endpoint);
        self
    }

    /// Answer 401 for this contact's listings, as if the token expired mid-run.
    pub fn unauthorized_listings(mut self, contact_id: i64) -> Self {
        self.unauthorized.insert(("listings", Some(contact_id)));
        self
    }

    /// Answer 401 for a whole-account read.
    pub fn unauthorized(mut self, endpoint: &'static str) -> Self {
        self.unauthorized.insert((endpoint, None));
        self
    }

    /// How many times `endpoint` was called.
    pub fn calls(&self, endpoint: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(endpoint)
            .copied()
            .unwrap_or(0)
    }

    fn hit(&self, endpoint: &'static str) {
        *self.calls.lock().unwrap().entry(endpoint).or_insert(0) += 1;
    }

    fn check(&self, endpoint: &'static str, contact_id: Option<i64>) -> CrmResult<()> {
        self.hit(endpoint);
        if self.unauthorized.contains(&(endpoint, contact_id)) {
            return Err(CrmError::Upstream {
                status: 401,
                body: r#"{"message":"Unauthenticated."}"#.into(),
            });
        }
        let failing = match contact_id {
            Some(id) => self.failing.contains(&(endpoint, id)),
            None => self.failing_collections.contains(endpoint),
        };
        if failing {
            return Err(CrmError::RateLimitExceeded { attempts: 3 });
        }
        Ok(())
    }
}

#[async_trait]
impl CrmGateway for MockCrm {
    async fn sources(&self, _token: &str) -> CrmResult<Vec<Source>> {
        self.check("sources", None)?;
        Ok(self.sources.clone())
    }

    async fn contacts(&self, _token: &str) -> CrmResult<Vec<Contact>> {
        self.check("contacts", None)?;
        Ok(self.contacts.clone())
    }

    async fn pass_catalog(&self, _token: &str) -> CrmResult<Vec<PassCatalogEntry>> {
        self.check("pass_catalog", None)?;
        Ok(self.catalog.clone())
    }

    async fn listings(&self, _token: &str, contact_id: i64) -> CrmResult<Vec<Listing>> {
        self.check("listings", Some(contact_id))?;
        Ok(self.listings.get(&contact_id).cloned().unwrap_or_default())
    }

    async fn event(&self, _token: &str, event_id: i64) -> CrmResult<Event> {
        self.hit("event");
        self.events
            .get(&event_id)
            .cloned()
            .ok_or_else(|| CrmError::NotFound {
                url: format!("MockCrm: no event registered for {event_id}"),
            })
    }

    async fn admissions(&self, _token: &str, contact_id: i64) -> CrmResult<Vec<Admission>> {
        self.check("admissions", Some(contact_id))?;
        Ok(self.admissions.get(&contact_id).cloned().unwrap_or_default())
    }

    async fn passes(&self, _token: &str, contact_id: i64) -> CrmResult<Vec<ContactPass>> {
        self.check("passes", Some(contact_id))?;
        Ok(self.passes.get(&contact_id).cloned().unwrap_or_default())
    }
}
