use std::fmt;

use listok_client::{Admission, Contact, ContactPass, CrmError};
use thiserror::Error;
use tracing::debug;

use crate::context::RunContext;
use crate::outcome::ContactOutcome;
use crate::traits::CrmGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentStep {
    Listings,
    Event,
    Admissions,
    Passes,
}

impl fmt::Display for EnrichmentStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnrichmentStep::Listings => "listings",
            EnrichmentStep::Event => "event",
            EnrichmentStep::Admissions => "admissions",
            EnrichmentStep::Passes => "passes",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("{step} lookup failed: {error}")]
pub struct EnrichmentFailure {
    pub step: EnrichmentStep,
    #[source]
    pub error: CrmError,
}

/// Result of walking one contact down the funnel. When a lookup fails the
/// outcome still holds whatever was established before the failing step.
#[derive(Debug)]
pub struct EnrichmentReport {
    pub outcome: ContactOutcome,
    pub failure: Option<EnrichmentFailure>,
}

impl EnrichmentReport {
    fn complete(outcome: ContactOutcome) -> Self {
        Self {
            outcome,
            failure: None,
        }
    }

    fn failed(outcome: ContactOutcome, step: EnrichmentStep, error: CrmError) -> Self {
        Self {
            outcome,
            failure: Some(EnrichmentFailure { step, error }),
        }
    }
}

/// Runs the dependent lookups for one contact:
/// listings → first listing's event → admissions → passes.
/// Each lookup only happens if the previous one found something.
pub struct ContactEnricher<'a, G: ?Sized> {
    gateway: &'a G,
}

impl<'a, G: CrmGateway + ?Sized> ContactEnricher<'a, G> {
    pub fn new(gateway: &'a G) -> Self {
        Self { gateway }
    }

    pub async fn enrich(&self, contact: &Contact, ctx: &RunContext) -> EnrichmentReport {
        use ContactOutcome::*;
        use EnrichmentStep as Step;

        let token = ctx.token();
        let window_end = ctx.window().end();

        let Some(contact_id) = contact.key() else {
            return EnrichmentReport::failed(
                NoEngagement,
                Step::Listings,
                CrmError::Validation("contact has no id".into()),
            );
        };

        let listings = match self.gateway.listings(token, contact_id).await {
            Ok(listings) => listings,
            Err(e) => return EnrichmentReport::failed(NoEngagement, Step::Listings, e),
        };
        let Some(first_listing) = listings.first() else {
            return EnrichmentReport::complete(NoEngagement);
        };

        let mut booked_in_window = false;
        let Some(event_id) = first_listing.event_id else {
            return EnrichmentReport::failed(
                Booked { booked_in_window },
                Step::Event,
                CrmError::Validation(format!("listing of contact {contact_id} has no event id")),
            );
        };
        match self.gateway.event(token, event_id).await {
            Ok(event) => {
                booked_in_window = event.starts_at().is_some_and(|at| at <= window_end);
            }
            Err(e) => {
                return EnrichmentReport::failed(Booked { booked_in_window }, Step::Event, e);
            }
        }

        let admissions = match self.gateway.admissions(token, contact_id).await {
            Ok(admissions) => admissions,
            Err(e) => {
                return EnrichmentReport::failed(Booked { booked_in_window }, Step::Admissions, e);
            }
        };
        if admissions.is_empty() {
            return EnrichmentReport::complete(Booked { booked_in_window });
        }
        let admitted_in_window =
            earliest_admission_day(&admissions).is_some_and(|day| day <= window_end);
        let admitted = Admitted {
            booked_in_window,
            admitted_in_window,
        };

        let passes = match self.gateway.passes(token, contact_id).await {
            Ok(passes) => passes,
            Err(e) => return EnrichmentReport::failed(admitted, Step::Passes, e),
        };

        let qualifying: Vec<&ContactPass> = passes
            .iter()
            .filter(|pass| {
                pass_name(pass, ctx).is_some_and(|name| !ctx.exclusions().contains(name))
            })
            .collect();
        debug!(
            contact_id,
            passes = passes.len(),
            qualifying = qualifying.len(),
            "Passes filtered"
        );

        if qualifying.is_empty() {
            return EnrichmentReport::complete(admitted);
        }
        let purchased_in_window = qualifying
            .iter()
            .any(|pass| pass.acquired_at().is_some_and(|at| at < window_end));

        EnrichmentReport::complete(Purchased {
            booked_in_window,
            admitted_in_window,
            purchased_in_window,
        })
    }
}

fn earliest_admission_day(admissions: &[Admission]) -> Option<chrono::DateTime<chrono::Utc>> {
    admissions.iter().filter_map(Admission::day).min()
}

/// Nested pass name first, catalogue lookup second.
fn pass_name<'p>(pass: &'p ContactPass, ctx: &'p RunContext) -> Option<&'p str> {
    pass.name()
        .or_else(|| pass.pass_id.and_then(|id| ctx.catalog().name_of(id)))
}
