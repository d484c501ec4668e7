use anyhow::{Context, Result};
use listok_client::{Contact, Source};
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregator::SourceAggregator;
use crate::context::{ExclusionList, PassCatalog, ReportWindow, RunContext};
use crate::report::{FormulaLocale, ReportBuilder, ReportMatrix};
use crate::traits::{CrmGateway, ReportSink, TokenProvider};

#[derive(Debug, Clone)]
pub struct ReportSettings {
    /// Contacts enriched at the same time. 1 keeps the CRM's rate limit happy.
    pub concurrency: usize,
    pub locale: FormulaLocale,
    /// Resolve unnamed contact passes through the account's pass catalogue.
    pub fetch_pass_catalog: bool,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            concurrency: 1,
            locale: FormulaLocale::default(),
            fetch_pass_catalog: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub contacts_fetched: usize,
    pub contacts_in_window: usize,
    pub leads_counted: usize,
    pub enrichment_failures: usize,
    /// Data rows, header excluded.
    pub rows: usize,
}

#[derive(Debug, Clone)]
pub struct GeneratedReport {
    pub matrix: ReportMatrix,
    pub summary: RunSummary,
}

/// One report run: sources → pass catalogue → contacts → per-source funnel.
///
/// Failing to read contacts or the catalogue aborts the run, as does a
/// rejected access token anywhere. An unreadable or empty source list
/// degrades to a header-only report.
pub struct ReportRun<'a, G: ?Sized> {
    gateway: &'a G,
    settings: ReportSettings,
}

impl<'a, G: CrmGateway + ?Sized> ReportRun<'a, G> {
    pub fn new(gateway: &'a G, settings: ReportSettings) -> Self {
        Self { gateway, settings }
    }

    pub async fn build_matrix(
        &self,
        token: &str,
        window: ReportWindow,
        exclusions: ExclusionList,
    ) -> Result<GeneratedReport> {
        info!(
            start = %window.start(),
            end = %window.end(),
            concurrency = self.settings.concurrency,
            "Report run starting"
        );

        let sources = self.fetch_sources(token).await?;
        if sources.is_empty() {
            return Ok(GeneratedReport {
                matrix: ReportMatrix::header_only(self.settings.locale),
                summary: RunSummary::default(),
            });
        }

        let catalog = if self.settings.fetch_pass_catalog {
            let entries = self
                .gateway
                .pass_catalog(token)
                .await
                .context("Failed to fetch pass catalogue")?;
            let catalog: PassCatalog = entries.into_iter().collect();
            info!(passes = catalog.len(), "Pass catalogue loaded");
            catalog
        } else {
            PassCatalog::default()
        };

        let contacts = self
            .gateway
            .contacts(token)
            .await
            .context("Failed to fetch contacts")?;
        let contacts_fetched = contacts.len();
        let leads = leads_in_window(contacts, &window);
        info!(
            fetched = contacts_fetched,
            in_window = leads.len(),
            "Contacts filtered to report window"
        );

        let ctx = RunContext::new(token, window, exclusions).with_pass_catalog(catalog);
        let aggregation = SourceAggregator::new(self.gateway, self.settings.concurrency)
            .aggregate(
                &leads,
                &sources,
                self.settings.locale.no_source_name(),
                &ctx,
            )
            .await
            .context("Enrichment aborted: CRM rejected the access token")?;

        let matrix = ReportBuilder::new(self.settings.locale).build(&aggregation.table);
        let summary = RunSummary {
            contacts_fetched,
            contacts_in_window: leads.len(),
            leads_counted: aggregation.stats.leads,
            enrichment_failures: aggregation.stats.enrichment_failures,
            rows: matrix.data_rows().len(),
        };
        Ok(GeneratedReport { matrix, summary })
    }

    /// Obtain a token, build the report and hand it to the sink.
    pub async fn publish(
        &self,
        tokens: &dyn TokenProvider,
        sink: &dyn ReportSink,
        target: &str,
        window: ReportWindow,
        exclusions: ExclusionList,
    ) -> Result<RunSummary> {
        let token = tokens
            .access_token()
            .await
            .context("Failed to obtain CRM access token")?;

        let report = self.build_matrix(&token, window, exclusions).await?;

        sink.write(target, &report.matrix)
            .await
            .with_context(|| format!("{} sink failed for {target}", sink.name()))?;

        info!(
            sink = sink.name(),
            contacts = report.summary.contacts_fetched,
            leads = report.summary.leads_counted,
            failures = report.summary.enrichment_failures,
            rows = report.summary.rows,
            "Report published"
        );
        Ok(report.summary)
    }

    async fn fetch_sources(&self, token: &str) -> Result<Vec<Source>> {
        match self.gateway.sources(token).await {
            Ok(sources) if sources.is_empty() => {
                warn!("CRM returned no sources, report will be header-only");
                Ok(sources)
            }
            Ok(sources) => Ok(sources),
            Err(e) if e.is_unauthorized() => {
                Err(e).context("Failed to fetch sources: CRM rejected the access token")
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch sources, report will be header-only");
                Ok(Vec::new())
            }
        }
    }
}

/// Contacts created inside the window. Contacts without a readable
/// creation time are dropped.
pub fn leads_in_window(contacts: Vec<Contact>, window: &ReportWindow) -> Vec<Contact> {
    contacts
        .into_iter()
        .filter(|c| c.created().is_some_and(|at| window.contains(at)))
        .collect()
}
