use serde::Serialize;

/// How far a contact got down the funnel, and which steps happened by the
/// end of the report window. Each stage implies every stage before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactOutcome {
    NoEngagement,
    Booked {
        booked_in_window: bool,
    },
    Admitted {
        booked_in_window: bool,
        admitted_in_window: bool,
    },
    Purchased {
        booked_in_window: bool,
        admitted_in_window: bool,
        purchased_in_window: bool,
    },
}

impl ContactOutcome {
    /// Counter increments this outcome is worth. Leads are counted separately.
    pub fn contribution(&self) -> SourceCounters {
        let mut delta = SourceCounters::default();
        match *self {
            ContactOutcome::NoEngagement => {}
            ContactOutcome::Booked { booked_in_window } => {
                delta.bookings = 1;
                delta.bookings_in_window = booked_in_window as u64;
            }
            ContactOutcome::Admitted {
                booked_in_window,
                admitted_in_window,
            } => {
                delta.bookings = 1;
                delta.bookings_in_window = booked_in_window as u64;
                delta.admissions = 1;
                delta.admissions_in_window = admitted_in_window as u64;
            }
            ContactOutcome::Purchased {
                booked_in_window,
                admitted_in_window,
                purchased_in_window,
            } => {
                delta.bookings = 1;
                delta.bookings_in_window = booked_in_window as u64;
                delta.admissions = 1;
                delta.admissions_in_window = admitted_in_window as u64;
                delta.purchases = 1;
                delta.purchases_in_window = purchased_in_window as u64;
            }
        }
        delta
    }
}

/// Per-source accumulators for one run. Only ever incremented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceCounters {
    pub leads: u64,
    pub bookings: u64,
    pub admissions: u64,
    pub purchases: u64,
    pub bookings_in_window: u64,
    pub admissions_in_window: u64,
    pub purchases_in_window: u64,
}

impl SourceCounters {
    pub fn record_lead(&mut self) {
        self.leads += 1;
    }

    pub fn record(&mut self, outcome: &ContactOutcome) {
        self.merge(&outcome.contribution());
    }

    pub fn merge(&mut self, other: &SourceCounters) {
        self.leads += other.leads;
        self.bookings += other.bookings;
        self.admissions += other.admissions;
        self.purchases += other.purchases;
        self.bookings_in_window += other.bookings_in_window;
        self.admissions_in_window += other.admissions_in_window;
        self.purchases_in_window += other.purchases_in_window;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_engagement_adds_nothing() {
        assert_eq!(
            ContactOutcome::NoEngagement.contribution(),
            SourceCounters::default()
        );
    }

    #[test]
    fn booked_outside_window() {
        let delta = ContactOutcome::Booked {
            booked_in_window: false,
        }
        .contribution();

        assert_eq!(delta.bookings, 1);
        assert_eq!(delta.bookings_in_window, 0);
        assert_eq!(delta.admissions, 0);
    }

    #[test]
    fn purchase_implies_every_earlier_stage() {
        let delta = ContactOutcome::Purchased {
            booked_in_window: true,
            admitted_in_window: false,
            purchased_in_window: true,
        }
        .contribution();

        assert_eq!(
            delta,
            SourceCounters {
                leads: 0,
                bookings: 1,
                admissions: 1,
                purchases: 1,
                bookings_in_window: 1,
                admissions_in_window: 0,
                purchases_in_window: 1,
            }
        );
    }

    #[test]
    fn record_accumulates() {
        let mut counters = SourceCounters::default();
        counters.record_lead();
        counters.record_lead();
        counters.record(&ContactOutcome::Admitted {
            booked_in_window: true,
            admitted_in_window: true,
        });
        counters.record(&ContactOutcome::Booked {
            booked_in_window: true,
        });

        assert_eq!(counters.leads, 2);
        assert_eq!(counters.bookings, 2);
        assert_eq!(counters.bookings_in_window, 2);
        assert_eq!(counters.admissions, 1);
        assert_eq!(counters.purchases, 0);
    }
}
