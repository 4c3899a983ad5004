//! Raw and canonical event data structures.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum stored description length, in characters.
pub const DESCRIPTION_LIMIT: usize = 500;

/// A listing as reported by one platform for one (city, category) query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawEvent {
    /// Platform name (e.g., "eventbrite")
    pub platform: String,

    /// Identifier assigned by the platform
    pub source_id: String,

    /// Event title as listed
    pub title: String,

    /// Free-form description
    #[serde(default)]
    pub description: String,

    /// Start date or datetime string; only the date part is used
    pub start_date: String,

    /// City the listing belongs to
    pub city: String,

    /// Category the listing was found under
    #[serde(default)]
    pub category: String,

    /// Link to the listing
    #[serde(default)]
    pub url: String,

    /// End date or datetime string, if listed
    #[serde(default)]
    pub end_date: String,

    /// Display price (e.g., "Free", "INR 500")
    #[serde(default)]
    pub price: String,

    /// Whether the listing is free to attend
    #[serde(default = "default_is_free")]
    pub is_free: bool,

    /// Organizer name, if listed
    #[serde(default)]
    pub organizer: String,
}

fn default_is_free() -> bool {
    true
}

impl RawEvent {
    /// Exact-id key (`platform:source_id`), or `None` when the platform gave no id.
    pub fn source_key(&self) -> Option<String> {
        let id = self.source_id.trim();
        if id.is_empty() {
            None
        } else {
            Some(format!("{}:{}", self.platform, id))
        }
    }

    /// The `(platform, source_id)` pair this listing contributes.
    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            platform: self.platform.clone(),
            source_id: self.source_id.trim().to_string(),
        }
    }
}

/// One `(platform, source_id)` pair that reported a canonical event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceRef {
    pub platform: String,
    pub source_id: String,
}

impl SourceRef {
    pub fn new(platform: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            source_id: source_id.into(),
        }
    }

    /// Exact-id key used by the dedup index.
    pub fn key(&self) -> String {
        format!("{}:{}", self.platform, self.source_id)
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.source_id)
    }
}

/// Deduplicated record of one believed real-world event.
///
/// Append-or-merge only: once persisted it is never deleted, and the only
/// mutation is adding a source and bumping `last_seen`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalEvent {
    /// Canonical key; the content hash of the first report
    pub id: String,

    /// Title as first reported
    pub title: String,

    /// Normalized title used for hashing and fuzzy matching
    pub normalized_title: String,

    /// Normalized date (YYYY-MM-DD)
    pub date: String,

    /// City as first reported
    pub city: String,

    /// Normalized city used for hashing and bucketing
    pub normalized_city: String,

    /// Category as first reported
    #[serde(default)]
    pub category: String,

    /// Description as first reported, capped at [`DESCRIPTION_LIMIT`] characters
    #[serde(default)]
    pub description: String,

    /// Link as first reported
    #[serde(default)]
    pub url: String,

    /// End date as first reported
    #[serde(default)]
    pub end_date: String,

    /// Display price as first reported
    #[serde(default)]
    pub price: String,

    #[serde(default = "default_is_free")]
    pub is_free: bool,

    #[serde(default)]
    pub organizer: String,

    /// Every `(platform, source_id)` that reported this event
    pub sources: BTreeSet<SourceRef>,

    /// SHA-256 over normalized title, date, and city
    pub content_hash: String,

    pub first_seen: DateTime<Utc>,

    pub last_seen: DateTime<Utc>,
}

impl CanonicalEvent {
    /// Record another sighting of this event.
    ///
    /// Returns `true` if the source was not yet known.
    pub fn merge_source(&mut self, source: SourceRef, seen_at: DateTime<Utc>) -> bool {
        if seen_at > self.last_seen {
            self.last_seen = seen_at;
        }
        if source.source_id.is_empty() {
            return false;
        }
        self.sources.insert(source)
    }

    /// Distinct platforms among the sources.
    pub fn platforms(&self) -> BTreeSet<&str> {
        self.sources.iter().map(|s| s.platform.as_str()).collect()
    }

    /// Whether more than one platform listing points at this event.
    pub fn is_multi_source(&self) -> bool {
        self.sources.len() > 1
    }
}

/// Truncate `text` to at most `limit` characters.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_raw(source_id: &str) -> RawEvent {
        RawEvent {
            platform: "meetup".to_string(),
            source_id: source_id.to_string(),
            title: "Rust Meetup".to_string(),
            description: String::new(),
            start_date: "2024-06-01T18:00:00".to_string(),
            city: "Pune".to_string(),
            category: "technology".to_string(),
            url: String::new(),
            end_date: String::new(),
            price: String::new(),
            is_free: true,
            organizer: String::new(),
        }
    }

    #[test]
    fn test_source_key() {
        assert_eq!(sample_raw("42").source_key(), Some("meetup:42".to_string()));
        assert_eq!(sample_raw("  ").source_key(), None);
    }

    #[test]
    fn test_merge_source_bumps_last_seen() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
        let mut event = CanonicalEvent {
            id: "h".into(),
            title: "Rust Meetup".into(),
            normalized_title: "rust meetup".into(),
            date: "2024-06-01".into(),
            city: "Pune".into(),
            normalized_city: "pune".into(),
            category: String::new(),
            description: String::new(),
            url: String::new(),
            end_date: String::new(),
            price: String::new(),
            is_free: true,
            organizer: String::new(),
            sources: BTreeSet::from([SourceRef::new("meetup", "42")]),
            content_hash: "h".into(),
            first_seen: t0,
            last_seen: t0,
        };

        assert!(event.merge_source(SourceRef::new("eventbrite", "7"), t1));
        assert!(!event.merge_source(SourceRef::new("eventbrite", "7"), t0));
        assert_eq!(event.last_seen, t1);
        assert_eq!(event.sources.len(), 2);
        assert!(event.is_multi_source());
    }

    #[test]
    fn test_missing_pricing_reads_as_free() {
        let json = r#"{"platform":"meetup","source_id":"1","title":"T","start_date":"2024-06-01","city":"Pune"}"#;
        let raw: RawEvent = serde_json::from_str(json).unwrap();
        assert!(raw.is_free);
        assert!(raw.price.is_empty());
        assert!(raw.organizer.is_empty());
    }

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
