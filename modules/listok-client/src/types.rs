use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// --- Envelopes ---

/// Collection body. The API wraps lists in `data`, a few endpoints answer
/// with a bare array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Collection<T> {
    Wrapped { data: Vec<T> },
    Bare(Vec<T>),
}

impl<T> Collection<T> {
    pub fn into_items(self) -> Vec<T> {
        match self {
            Collection::Wrapped { data } => data,
            Collection::Bare(items) => items,
        }
    }
}

/// Single-item body, optionally wrapped in `data`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Item<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Item<T> {
    pub fn into_inner(self) -> T {
        match self {
            Item::Wrapped { data } => data,
            Item::Bare(item) => item,
        }
    }
}

// --- Records ---

/// Marketing source a contact was acquired through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    #[serde(rename = "source_id", deserialize_with = "required_id")]
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

impl Source {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A CRM contact (lead). Older payloads carry `contact_id` instead of `id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default, deserialize_with = "optional_id")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "optional_id")]
    pub contact_id: Option<i64>,
    #[serde(default, deserialize_with = "optional_id")]
    pub source_id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Contact {
    pub fn key(&self) -> Option<i64> {
        self.id.or(self.contact_id).filter(|id| *id != 0)
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created_at.as_deref().and_then(parse_timestamp)
    }
}

/// Entry of the account-wide pass catalogue (`/passes`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassCatalogEntry {
    #[serde(deserialize_with = "required_id")]
    pub pass_id: i64,
    #[serde(default)]
    pub name: String,
}

/// A scheduled visit booked for a contact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    #[serde(default, deserialize_with = "optional_id")]
    pub event_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, deserialize_with = "optional_id")]
    pub id: Option<i64>,
    #[serde(default)]
    pub date: Option<String>,
}

impl Event {
    pub fn starts_at(&self) -> Option<DateTime<Utc>> {
        self.date.as_deref().and_then(parse_timestamp)
    }
}

/// Confirmation that a contact attended a booked visit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admission {
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Admission {
    /// Calendar day of the admission, as midnight UTC.
    pub fn day(&self) -> Option<DateTime<Utc>> {
        let at = self.created_at.as_deref().and_then(parse_timestamp)?;
        at.date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|midnight| Utc.from_utc_datetime(&midnight))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassRef {
    #[serde(default)]
    pub name: Option<String>,
}

/// A pass (membership) sold to a contact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPass {
    #[serde(default, deserialize_with = "optional_id")]
    pub pass_id: Option<i64>,
    #[serde(default)]
    pub pass: Option<PassRef>,
    /// Epoch seconds.
    #[serde(default, deserialize_with = "optional_id")]
    pub sold_at: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ContactPass {
    pub fn name(&self) -> Option<&str> {
        self.pass
            .as_ref()
            .and_then(|p| p.name.as_deref())
            .filter(|n| !n.is_empty())
    }

    /// When the pass was acquired: `sold_at` if set, else `created_at`.
    pub fn acquired_at(&self) -> Option<DateTime<Utc>> {
        match self.sold_at.filter(|s| *s != 0) {
            Some(secs) => DateTime::from_timestamp(secs, 0),
            None => self.created_at.as_deref().and_then(parse_timestamp),
        }
    }
}

// --- OAuth ---

#[derive(Debug, Clone, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

// --- Helpers ---

/// Parse the timestamp shapes the CRM emits: RFC 3339,
/// `YYYY-MM-DD HH:MM:SS` and bare `YYYY-MM-DD`. Naive values are UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

fn required_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    optional_id(deserializer)?.ok_or_else(|| serde::de::Error::custom("missing id"))
}

/// Ids show up as numbers, numeric strings, empty strings or null.
fn optional_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    match Option::<RawId>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawId::Number(n)) => Ok(Some(n)),
        Some(RawId::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(RawId::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid id: {s}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn collection_accepts_wrapped_and_bare() {
        let wrapped: Collection<Listing> =
            serde_json::from_str(r#"{"data":[{"event_id":5}]}"#).unwrap();
        let bare: Collection<Listing> = serde_json::from_str(r#"[{"event_id":"6"}]"#).unwrap();

        assert_eq!(wrapped.into_items()[0].event_id, Some(5));
        assert_eq!(bare.into_items()[0].event_id, Some(6));
    }

    #[test]
    fn event_item_unwraps_data() {
        let wrapped: Item<Event> =
            serde_json::from_str(r#"{"data":{"id":3,"date":"2025-09-10"}}"#).unwrap();
        let bare: Item<Event> = serde_json::from_str(r#"{"id":3,"date":"2025-09-10"}"#).unwrap();

        assert_eq!(wrapped.into_inner().date.as_deref(), Some("2025-09-10"));
        assert_eq!(bare.into_inner().id, Some(3));
    }

    #[test]
    fn contact_key_falls_back_to_contact_id() {
        let contact: Contact =
            serde_json::from_str(r#"{"contact_id":"42","source_id":null}"#).unwrap();

        assert_eq!(contact.key(), Some(42));
        assert_eq!(contact.source_id, None);
    }

    #[test]
    fn empty_source_id_is_none() {
        let contact: Contact = serde_json::from_str(r#"{"id":1,"source_id":""}"#).unwrap();
        assert_eq!(contact.source_id, None);
    }

    #[test]
    fn source_requires_id() {
        let err = serde_json::from_str::<Source>(r#"{"name":"Instagram"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn parses_crm_timestamp_shapes() {
        let a = parse_timestamp("2025-09-22T10:15:00+03:00").unwrap();
        let b = parse_timestamp("2025-09-22 07:15:00").unwrap();
        let c = parse_timestamp("2025-09-22").unwrap();

        assert_eq!(a, b);
        assert_eq!(c.day(), 22);
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn admission_day_truncates_time() {
        let admission = Admission {
            created_at: Some("2025-09-30 18:45:00".into()),
        };
        assert_eq!(admission.day(), parse_timestamp("2025-09-30"));
    }

    #[test]
    fn pass_acquired_prefers_sold_at() {
        let pass = ContactPass {
            sold_at: Some(1_757_000_000),
            created_at: Some("2030-01-01".into()),
            ..Default::default()
        };
        assert_eq!(pass.acquired_at(), DateTime::from_timestamp(1_757_000_000, 0));

        let unsold = ContactPass {
            sold_at: Some(0),
            created_at: Some("2030-01-01".into()),
            ..Default::default()
        };
        assert_eq!(unsold.acquired_at(), parse_timestamp("2030-01-01"));
    }
}
