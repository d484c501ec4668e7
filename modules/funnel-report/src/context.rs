use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use listok_client::{parse_timestamp, CrmError, PassCatalogEntry};

/// Pass names that mark trial or void memberships. Never a real purchase.
pub const DEFAULT_EXCLUDED_PASSES: &[&str] = &[
    "Пробный абонемент (Никитина) (восстановлен 22.09.2025 10:15)",
    "Пробный абонемент (общий)",
    "Пробная персональная тренировка (общий)",
    "Отработка",
];

/// Report period. Bounds which leads are counted and what "within month" means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl ReportWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, CrmError> {
        if start > end {
            return Err(CrmError::Validation(format!(
                "report window starts after it ends ({start} > {end})"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse CLI/API input. Both ends accept a date or a full timestamp.
    ///
    /// A date-only `end` is taken as 23:59:59 UTC on that day, so the
    /// window covers the whole final day rather than stopping at its
    /// midnight. A date-only `start` is midnight UTC. A timestamp `end`
    /// is used exactly as given.
    pub fn parse(start: &str, end: &str) -> Result<Self, CrmError> {
        let start_at = parse_timestamp(start)
            .ok_or_else(|| CrmError::Validation(format!("invalid window start: {start:?}")))?;
        let end_at = match NaiveDate::parse_from_str(end.trim(), "%Y-%m-%d") {
            Ok(day) => day
                .and_hms_opt(23, 59, 59)
                .map(|naive| Utc.from_utc_datetime(&naive)),
            Err(_) => parse_timestamp(end),
        }
        .ok_or_else(|| CrmError::Validation(format!("invalid window end: {end:?}")))?;
        Self::new(start_at, end_at)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Inclusive on both ends.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionList {
    names: HashSet<String>,
}

impl ExclusionList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for ExclusionList {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDED_PASSES.iter().copied())
    }
}

/// Pass id to name, for contact passes that arrive without a nested name.
#[derive(Debug, Clone, Default)]
pub struct PassCatalog {
    names: HashMap<i64, String>,
}

impl PassCatalog {
    pub fn name_of(&self, pass_id: i64) -> Option<&str> {
        self.names.get(&pass_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl FromIterator<PassCatalogEntry> for PassCatalog {
    fn from_iter<I: IntoIterator<Item = PassCatalogEntry>>(entries: I) -> Self {
        Self {
            names: entries
                .into_iter()
                .filter(|e| !e.name.is_empty())
                .map(|e| (e.pass_id, e.name))
                .collect(),
        }
    }
}

/// Everything one report run needs, passed explicitly to every step so
/// concurrent runs never share token or window state.
#[derive(Debug, Clone)]
pub struct RunContext {
    token: String,
    window: ReportWindow,
    exclusions: ExclusionList,
    catalog: PassCatalog,
}

impl RunContext {
    pub fn new(token: impl Into<String>, window: ReportWindow, exclusions: ExclusionList) -> Self {
        Self {
            token: token.into(),
            window,
            exclusions,
            catalog: PassCatalog::default(),
        }
    }

    pub fn with_pass_catalog(mut self, catalog: PassCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn window(&self) -> &ReportWindow {
        &self.window
    }

    pub fn exclusions(&self) -> &ExclusionList {
        &self.exclusions
    }

    pub fn catalog(&self) -> &PassCatalog {
        &self.catalog
    }
}
