use std::collections::HashMap;

use futures::stream::{self, StreamExt};
use listok_client::{Contact, Source};
use serde::Serialize;
use tracing::{info, warn};

use crate::context::RunContext;
use crate::enricher::{ContactEnricher, EnrichmentReport};
use crate::outcome::SourceCounters;
use crate::traits::CrmGateway;

/// Key of the synthetic source collecting contacts without a known source.
pub const NO_SOURCE_ID: i64 = 0;

/// Counter table keyed by source id, in the order sources were seeded.
#[derive(Debug, Clone, Default)]
pub struct SourceTable {
    sources: Vec<Source>,
    counters: HashMap<i64, SourceCounters>,
}

impl SourceTable {
    /// Every known source plus the synthetic no-source entry, all zeroed.
    /// No sources at all gives an empty table.
    pub fn seeded(sources: &[Source], no_source_name: &str) -> Self {
        let mut table = Self::default();
        if sources.is_empty() {
            return table;
        }
        for source in sources {
            if table.counters.contains_key(&source.id) {
                continue;
            }
            table.counters.insert(source.id, SourceCounters::default());
            table.sources.push(source.clone());
        }
        if !table.counters.contains_key(&NO_SOURCE_ID) {
            table.counters.insert(NO_SOURCE_ID, SourceCounters::default());
            table.sources.push(Source::new(NO_SOURCE_ID, no_source_name));
        }
        table
    }

    /// Counter key for a contact's source. Missing, zero and unknown ids all
    /// land on the no-source entry.
    pub fn resolve(&self, source_id: Option<i64>) -> Option<i64> {
        if self.counters.is_empty() {
            return None;
        }
        match source_id {
            Some(id) if id != NO_SOURCE_ID && self.counters.contains_key(&id) => Some(id),
            _ => Some(NO_SOURCE_ID),
        }
    }

    pub fn counters(&self, source_id: i64) -> Option<&SourceCounters> {
        self.counters.get(&source_id)
    }

    pub(crate) fn counters_mut(&mut self, source_id: i64) -> Option<&mut SourceCounters> {
        self.counters.get_mut(&source_id)
    }

    /// Sources with their counters, in seed order.
    pub fn iter(&self) -> impl Iterator<Item = (&Source, &SourceCounters)> {
        self.sources
            .iter()
            .filter_map(|s| self.counters.get(&s.id).map(|c| (s, c)))
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn total(&self) -> SourceCounters {
        let mut total = SourceCounters::default();
        for counters in self.counters.values() {
            total.merge(counters);
        }
        total
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregationStats {
    pub contacts: usize,
    pub leads: usize,
    pub enrichment_failures: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub table: SourceTable,
    pub stats: AggregationStats,
}

/// Fans contact enrichment out under a concurrency cap and folds the
/// outcomes into per-source counters.
///
/// Enrichment tasks only return outcomes; all counter writes happen on the
/// collecting side, so no lock is needed whatever the cap.
pub struct SourceAggregator<'a, G: ?Sized> {
    gateway: &'a G,
    concurrency: usize,
}

impl<'a, G: CrmGateway + ?Sized> SourceAggregator<'a, G> {
    pub fn new(gateway: &'a G, concurrency: usize) -> Self {
        Self {
            gateway,
            concurrency: concurrency.max(1),
        }
    }

    /// Fails only when the CRM rejects the access token. Every other
    /// enrichment error is isolated to its contact.
    pub async fn aggregate(
        &self,
        contacts: &[Contact],
        sources: &[Source],
        no_source_name: &str,
        ctx: &RunContext,
    ) -> listok_client::Result<Aggregation> {
        let mut table = SourceTable::seeded(sources, no_source_name);
        let mut stats = AggregationStats {
            contacts: contacts.len(),
            ..Default::default()
        };

        if table.is_empty() {
            warn!("No sources available, report will be header-only");
            return Ok(Aggregation { table, stats });
        }

        let mut jobs = Vec::with_capacity(contacts.len());
        for contact in contacts {
            let Some(key) = table.resolve(contact.source_id) else {
                continue;
            };
            if let Some(counters) = table.counters_mut(key) {
                counters.record_lead();
                stats.leads += 1;
                jobs.push((key, contact));
            }
        }

        info!(
            leads = stats.leads,
            concurrency = self.concurrency,
            "Enriching contacts"
        );

        let enricher = ContactEnricher::new(self.gateway);
        let mut reports = stream::iter(jobs.into_iter().map(|(key, contact)| {
            let enricher = &enricher;
            async move { (key, contact.key(), enricher.enrich(contact, ctx).await) }
        }))
        .buffer_unordered(self.concurrency);

        while let Some((key, contact_id, report)) = reports.next().await {
            let EnrichmentReport { outcome, failure } = report;
            if let Some(failure) = failure {
                if failure.error.is_unauthorized() {
                    warn!(
                        contact_id,
                        step = %failure.step,
                        "CRM rejected the access token, stopping enrichment"
                    );
                    return Err(failure.error);
                }
                stats.enrichment_failures += 1;
                warn!(
                    contact_id,
                    source_id = key,
                    step = %failure.step,
                    error = %failure.error,
                    "Skipping rest of contact enrichment"
                );
            }
            if let Some(counters) = table.counters_mut(key) {
                counters.record(&outcome);
            }
        }

        info!(
            leads = stats.leads,
            failures = stats.enrichment_failures,
            "Aggregation completed"
        );
        Ok(Aggregation { table, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ExclusionList, ReportWindow};
    use crate::testing::{contact, MockCrm};

    fn ctx() -> RunContext {
        RunContext::new(
            "token",
            ReportWindow::parse("2025-09-01", "2025-09-30").unwrap(),
            ExclusionList::default(),
        )
    }

    fn sources() -> Vec<Source> {
        vec![Source::new(1, "Instagram"), Source::new(2, "VK")]
    }

    #[test]
    fn seeding_adds_no_source_entry_once() {
        let table = SourceTable::seeded(&sources(), "No source");
        let ids: Vec<i64> = table.iter().map(|(s, _)| s.id).collect();
        assert_eq!(ids, vec![1, 2, NO_SOURCE_ID]);

        let with_zero = SourceTable::seeded(&[Source::new(0, "Unknown")], "No source");
        assert_eq!(with_zero.iter().count(), 1);
    }

    #[test]
    fn unknown_and_missing_sources_resolve_to_no_source() {
        let table = SourceTable::seeded(&sources(), "No source");

        assert_eq!(table.resolve(Some(1)), Some(1));
        assert_eq!(table.resolve(None), Some(NO_SOURCE_ID));
        assert_eq!(table.resolve(Some(0)), Some(NO_SOURCE_ID));
        assert_eq!(table.resolve(Some(99)), Some(NO_SOURCE_ID));
    }

    #[tokio::test]
    async fn unrecognised_source_counts_only_no_source_lead() {
        let crm = MockCrm::new();
        let contacts = vec![contact(10, Some(99)), contact(11, None)];

        let agg = SourceAggregator::new(&crm, 1)
            .aggregate(&contacts, &sources(), "No source", &ctx())
            .await
            .unwrap();

        assert_eq!(agg.table.counters(NO_SOURCE_ID).unwrap().leads, 2);
        assert_eq!(agg.table.counters(1).unwrap().leads, 0);
        assert_eq!(agg.table.counters(2).unwrap().leads, 0);
        assert_eq!(agg.stats.leads, 2);
    }

    #[tokio::test]
    async fn no_sources_skips_enrichment() {
        let crm = MockCrm::new();

        let agg = SourceAggregator::new(&crm, 1)
            .aggregate(&[contact(1, Some(1))], &[], "No source", &ctx())
            .await
            .unwrap();

        assert!(agg.table.is_empty());
        assert_eq!(crm.calls("listings"), 0);
    }

    #[tokio::test]
    async fn failing_contact_does_not_abort_batch() {
        let crm = MockCrm::new()
            .failing_listings(1)
            .on_listing_event(2, 200, "2025-09-12");
        let contacts = vec![contact(1, Some(1)), contact(2, Some(1))];

        let agg = SourceAggregator::new(&crm, 1)
            .aggregate(&contacts, &sources(), "No source", &ctx())
            .await
            .unwrap();

        let instagram = agg.table.counters(1).unwrap();
        assert_eq!(instagram.leads, 2);
        assert_eq!(instagram.bookings, 1);
        assert_eq!(agg.stats.enrichment_failures, 1);
    }

    #[tokio::test]
    async fn rejected_token_stops_aggregation() {
        let crm = MockCrm::new()
            .on_listing_event(1, 100, "2025-09-12")
            .unauthorized_listings(2)
            .unauthorized_listings(3);
        let contacts = vec![contact(1, Some(1)), contact(2, Some(1)), contact(3, Some(1))];

        let err = SourceAggregator::new(&crm, 1)
            .aggregate(&contacts, &sources(), "No source", &ctx())
            .await
            .unwrap_err();

        assert!(err.is_unauthorized());
        // serial run stops at the first rejection
        assert_eq!(crm.calls("listings"), 2);
    }

    #[tokio::test]
    async fn concurrency_does_not_change_totals() {
        let build = || {
            let mut crm = MockCrm::new();
            for id in 1..=20 {
                crm = crm.on_listing_event(id, 1000 + id, "2025-09-20");
            }
            crm
        };
        let contacts: Vec<Contact> = (1..=20).map(|id| contact(id, Some(id % 3))).collect();

        let serial_crm = build();
        let serial = SourceAggregator::new(&serial_crm, 1)
            .aggregate(&contacts, &sources(), "No source", &ctx())
            .await
            .unwrap();
        let parallel_crm = build();
        let parallel = SourceAggregator::new(&parallel_crm, 8)
            .aggregate(&contacts, &sources(), "No source", &ctx())
            .await
            .unwrap();

        for (source, counters) in serial.table.iter() {
            assert_eq!(parallel.table.counters(source.id), Some(counters));
        }
        assert_eq!(serial.table.total().bookings, 20);
    }

    #[tokio::test]
    async fn repeated_runs_are_identical() {
        let crm = MockCrm::new()
            .on_listing_event(1, 100, "2025-09-15")
            .on_listing_event(2, 101, "2025-10-15");
        let contacts = vec![contact(1, Some(1)), contact(2, Some(2)), contact(3, None)];
        let aggregator = SourceAggregator::new(&crm, 1);

        let first = aggregator
            .aggregate(&contacts, &sources(), "No source", &ctx())
            .await
            .unwrap();
        let second = aggregator
            .aggregate(&contacts, &sources(), "No source", &ctx())
            .await
            .unwrap();

        let snapshot = |agg: &Aggregation| -> Vec<(i64, SourceCounters)> {
            agg.table.iter().map(|(s, c)| (s.id, *c)).collect()
        };
        assert_eq!(snapshot(&first), snapshot(&second));
    }
}
