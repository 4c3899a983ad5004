// src/pipeline/dedup.rs

//! Three-layer duplicate detection.
//!
//! Each raw event is checked, in order, against:
//! 1. the exact `platform:source_id` key,
//! 2. the content hash of its normalized title, date and city,
//! 3. fuzzy title similarity within its `(date, city)` bucket.
//!
//! The first layer that matches wins and the event is merged into the
//! matched canonical record. Otherwise a new canonical record is created.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::models::{CanonicalEvent, DESCRIPTION_LIMIT, RawEvent, RunCounts, truncate_chars};
use crate::pipeline::fuzzy::token_sort_ratio;
use crate::pipeline::index::{DedupIndex, EventSlot};
use crate::pipeline::normalize::{content_hash, normalize_date, normalize_text};

/// Layer that decided an event's fate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification {
    New,
    DupExact(EventSlot),
    DupHash(EventSlot),
    DupFuzzy { slot: EventSlot, ratio: f64 },
}

/// Result of deduplicating one batch.
#[derive(Debug, Default)]
pub struct DedupOutcome {
    /// Classification counts; `upserted` is left for the writer
    pub counts: RunCounts,
    /// New and merged-into events, in index order
    pub upserts: Vec<CanonicalEvent>,
}

/// Normalized fields of a raw event.
struct Normalized {
    title: String,
    date: String,
    city: String,
    hash: String,
}

impl Normalized {
    fn of(raw: &RawEvent) -> Self {
        let title = normalize_text(&raw.title);
        let date = normalize_date(&raw.start_date);
        let city = normalize_text(&raw.city);
        let hash = content_hash(&title, &date, &city);
        Self {
            title,
            date,
            city,
            hash,
        }
    }
}

/// Classifies raw events against a [`DedupIndex`].
#[derive(Debug, Clone)]
pub struct Deduplicator {
    fuzzy_threshold: f64,
}

impl Deduplicator {
    pub fn new(fuzzy_threshold: f64) -> Self {
        Self { fuzzy_threshold }
    }

    /// Classify a raw event without touching the index.
    pub fn classify(&self, index: &DedupIndex, raw: &RawEvent) -> Classification {
        self.classify_normalized(index, raw, &Normalized::of(raw))
    }

    fn classify_normalized(
        &self,
        index: &DedupIndex,
        raw: &RawEvent,
        norm: &Normalized,
    ) -> Classification {
        if let Some(slot) = raw.source_key().and_then(|key| index.find_source(&key)) {
            return Classification::DupExact(slot);
        }

        if let Some(slot) = index.find_hash(&norm.hash) {
            return Classification::DupHash(slot);
        }

        if !norm.date.is_empty() {
            if let Some((slot, ratio)) = self.best_fuzzy(index, norm) {
                return Classification::DupFuzzy { slot, ratio };
            }
        }

        Classification::New
    }

    /// Highest-ratio candidate at or above the threshold.
    ///
    /// Ties go to the earliest `first_seen`, then the lower id.
    fn best_fuzzy(&self, index: &DedupIndex, norm: &Normalized) -> Option<(EventSlot, f64)> {
        let mut best: Option<(EventSlot, f64)> = None;

        for &slot in index.bucket(&norm.date, &norm.city) {
            let Some(candidate) = index.get(slot) else {
                continue;
            };
            let ratio = token_sort_ratio(&norm.title, &candidate.normalized_title);
            if ratio < self.fuzzy_threshold {
                continue;
            }

            let better = match best {
                None => true,
                Some((best_slot, best_ratio)) => {
                    match ratio.partial_cmp(&best_ratio).unwrap_or(Ordering::Equal) {
                        Ordering::Greater => true,
                        Ordering::Less => false,
                        Ordering::Equal => index
                            .get(best_slot)
                            .is_some_and(|current| precedes(candidate, current)),
                    }
                }
            };
            if better {
                best = Some((slot, ratio));
            }
        }

        best
    }

    /// Classify every raw event in order, updating `index` as it goes.
    pub fn process(
        &self,
        index: &mut DedupIndex,
        raws: &[RawEvent],
        now: DateTime<Utc>,
    ) -> DedupOutcome {
        let mut counts = RunCounts {
            scraped: raws.len(),
            ..RunCounts::default()
        };
        let mut touched = BTreeSet::new();

        for raw in raws {
            let norm = Normalized::of(raw);
            let slot = match self.classify_normalized(index, raw, &norm) {
                Classification::New => {
                    counts.new += 1;
                    index.insert(new_canonical(raw, &norm, now))
                }
                Classification::DupExact(slot) => {
                    counts.dup_exact += 1;
                    merge(index, slot, raw, now);
                    slot
                }
                Classification::DupHash(slot) => {
                    counts.dup_hash += 1;
                    merge(index, slot, raw, now);
                    slot
                }
                Classification::DupFuzzy { slot, ratio } => {
                    counts.dup_fuzzy += 1;
                    log::debug!(
                        "Fuzzy match ({ratio:.1}) '{}' -> {}",
                        raw.title,
                        index.get(slot).map_or("", |e| e.id.as_str())
                    );
                    merge(index, slot, raw, now);
                    slot
                }
            };
            touched.insert(slot);
        }

        let upserts = touched
            .into_iter()
            .filter_map(|slot| index.get(slot).cloned())
            .collect();

        log::info!(
            "Dedup: {} scraped, {} new, {} exact, {} hash, {} fuzzy",
            counts.scraped,
            counts.new,
            counts.dup_exact,
            counts.dup_hash,
            counts.dup_fuzzy
        );

        DedupOutcome { counts, upserts }
    }
}

/// Whether `a` wins a ratio tie against `b`.
fn precedes(a: &CanonicalEvent, b: &CanonicalEvent) -> bool {
    (a.first_seen, &a.id) < (b.first_seen, &b.id)
}

fn merge(index: &mut DedupIndex, slot: EventSlot, raw: &RawEvent, now: DateTime<Utc>) {
    if let Some(event) = index.get_mut(slot) {
        event.merge_source(raw.source_ref(), now);
    }
    if let Some(key) = raw.source_key() {
        index.register_source(key, slot);
    }
}

fn new_canonical(raw: &RawEvent, norm: &Normalized, now: DateTime<Utc>) -> CanonicalEvent {
    let mut sources = BTreeSet::new();
    if raw.source_key().is_some() {
        sources.insert(raw.source_ref());
    }

    CanonicalEvent {
        id: norm.hash.clone(),
        title: raw.title.trim().to_string(),
        normalized_title: norm.title.clone(),
        date: norm.date.clone(),
        city: raw.city.trim().to_string(),
        normalized_city: norm.city.clone(),
        category: raw.category.trim().to_string(),
        description: truncate_chars(raw.description.trim(), DESCRIPTION_LIMIT),
        url: raw.url.clone(),
        end_date: normalize_date(&raw.end_date),
        price: raw.price.trim().to_string(),
        is_free: raw.is_free,
        organizer: raw.organizer.trim().to_string(),
        sources,
        content_hash: norm.hash.clone(),
        first_seen: now,
        last_seen: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceRef;
    use chrono::{Duration, TimeZone};

    fn raw(platform: &str, id: &str, title: &str, date: &str, city: &str) -> RawEvent {
        RawEvent {
            platform: platform.into(),
            source_id: id.into(),
            title: title.into(),
            description: String::new(),
            start_date: date.into(),
            city: city.into(),
            category: "technology".into(),
            url: String::new(),
            end_date: String::new(),
            price: String::new(),
            is_free: true,
            organizer: String::new(),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_react_conf_scenario_is_fuzzy_duplicate() {
        let dedup = Deduplicator::new(85.0);
        let mut index = DedupIndex::new();
        let batch = vec![
            raw("eventbrite", "123", "React Conf Mumbai", "2024-06-01", "Mumbai"),
            raw("meetup", "999", "React Conference Mumbai", "2024-06-01", "Mumbai"),
        ];

        let outcome = dedup.process(&mut index, &batch, t0());

        assert_eq!(outcome.counts.new, 1);
        assert_eq!(outcome.counts.dup_fuzzy, 1);
        assert_eq!(outcome.upserts.len(), 1);
        assert_eq!(
            outcome.upserts[0].sources,
            BTreeSet::from([
                SourceRef::new("eventbrite", "123"),
                SourceRef::new("meetup", "999"),
            ])
        );
    }

    #[test]
    fn test_rerun_on_updated_index_creates_nothing() {
        let dedup = Deduplicator::new(85.0);
        let mut index = DedupIndex::new();
        let batch = vec![
            raw("eventbrite", "1", "Jazz Night", "2024-06-01", "Pune"),
            raw("meetup", "2", "Startup Pitch Day", "2024-06-02", "Pune"),
            raw("allevents", "", "Food Walk", "2024-06-03", "Pune"),
        ];

        let first = dedup.process(&mut index, &batch, t0());
        assert_eq!(first.counts.new, 3);

        let mut reloaded = DedupIndex::from_events(first.upserts);
        let second = dedup.process(&mut reloaded, &batch, t0() + Duration::hours(2));
        assert_eq!(second.counts.new, 0);
        assert_eq!(second.counts.dup_exact, 2);
        assert_eq!(second.counts.dup_hash, 1);
        assert_eq!(reloaded.len(), 3);
    }

    #[test]
    fn test_same_source_is_exact_even_when_content_drifts() {
        let dedup = Deduplicator::new(85.0);
        let mut index = DedupIndex::new();
        dedup.process(
            &mut index,
            &[raw("meetup", "42", "Rust Meetup", "2024-06-01", "Pune")],
            t0(),
        );

        let drifted = raw("meetup", "42", "Totally Renamed", "2024-07-15", "Goa");
        assert_eq!(dedup.classify(&index, &drifted), Classification::DupExact(0));
    }

    #[test]
    fn test_case_and_punctuation_variants_share_hash() {
        let dedup = Deduplicator::new(85.0);
        let mut index = DedupIndex::new();
        let batch = vec![
            raw("eventbrite", "1", "Jazz Night!", "2024-06-01T19:00:00", "Pune"),
            raw("meetup", "7", "  jazz   NIGHT ", "2024-06-01", "pune"),
        ];

        let outcome = dedup.process(&mut index, &batch, t0());
        assert_eq!(outcome.counts.new, 1);
        assert_eq!(outcome.counts.dup_hash, 1);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_fuzzy_never_crosses_date_or_city() {
        let dedup = Deduplicator::new(85.0);
        let mut index = DedupIndex::new();
        let batch = vec![
            raw("eventbrite", "1", "React Conf Mumbai", "2024-06-01", "Mumbai"),
            raw("meetup", "2", "React Conference Mumbai", "2024-06-02", "Mumbai"),
            raw("meetup", "3", "React Conference Mumbai", "2024-06-01", "Pune"),
        ];

        let outcome = dedup.process(&mut index, &batch, t0());
        assert_eq!(outcome.counts.new, 3);
        assert_eq!(outcome.counts.dup_fuzzy, 0);
    }

    #[test]
    fn test_below_threshold_is_new() {
        let dedup = Deduplicator::new(90.0);
        let mut index = DedupIndex::new();
        let batch = vec![
            raw("eventbrite", "123", "React Conf Mumbai", "2024-06-01", "Mumbai"),
            raw("meetup", "999", "React Conference Mumbai", "2024-06-01", "Mumbai"),
        ];

        let outcome = dedup.process(&mut index, &batch, t0());
        assert_eq!(outcome.counts.new, 2);
    }

    #[test]
    fn test_empty_date_skips_fuzzy_layer() {
        let dedup = Deduplicator::new(85.0);
        let mut index = DedupIndex::new();
        let batch = vec![
            raw("eventbrite", "1", "React Conf Mumbai", "", "Mumbai"),
            raw("meetup", "2", "React Conference Mumbai", "", "Mumbai"),
        ];

        let outcome = dedup.process(&mut index, &batch, t0());
        assert_eq!(outcome.counts.new, 2);
    }

    #[test]
    fn test_repeat_of_fuzzy_merge_is_exact() {
        let dedup = Deduplicator::new(85.0);
        let mut index = DedupIndex::new();
        let batch = vec![
            raw("eventbrite", "123", "React Conf Mumbai", "2024-06-01", "Mumbai"),
            raw("meetup", "999", "React Conference Mumbai", "2024-06-01", "Mumbai"),
            raw("meetup", "999", "React Conference Mumbai", "2024-06-01", "Mumbai"),
        ];

        let outcome = dedup.process(&mut index, &batch, t0());
        assert_eq!(outcome.counts.dup_fuzzy, 1);
        assert_eq!(outcome.counts.dup_exact, 1);
    }

    #[test]
    fn test_fuzzy_tie_prefers_earliest_first_seen() {
        let dedup = Deduplicator::new(80.0);
        let later = dedup
            .process(
                &mut DedupIndex::new(),
                &[raw("a", "1", "Conf React Mumbai", "2024-06-01", "Mumbai")],
                t0() + Duration::days(1),
            )
            .upserts;
        let earlier = dedup
            .process(
                &mut DedupIndex::new(),
                &[raw("b", "2", "Mumbai Conf React", "2024-06-01", "Mumbai")],
                t0(),
            )
            .upserts;

        // Both titles sort to the same tokens; only the hash and id differ.
        let mut events = later;
        events.extend(earlier);
        let mut index = DedupIndex::from_events(events);
        let candidate = raw("c", "3", "React Conference Mumbai", "2024-06-01", "Mumbai");

        match dedup.classify(&index, &candidate) {
            Classification::DupFuzzy { slot, .. } => {
                assert_eq!(index.get(slot).unwrap().first_seen, t0());
            }
            other => panic!("expected fuzzy match, got {other:?}"),
        }

        let outcome = dedup.process(&mut index, &[candidate], t0() + Duration::days(2));
        assert_eq!(outcome.upserts[0].first_seen, t0());
    }

    #[test]
    fn test_new_event_truncates_description() {
        let dedup = Deduplicator::new(85.0);
        let mut index = DedupIndex::new();
        let mut event = raw("meetup", "1", "Long Talk", "2024-06-01", "Pune");
        event.description = "x".repeat(DESCRIPTION_LIMIT + 50);

        let outcome = dedup.process(&mut index, &[event], t0());
        assert_eq!(outcome.upserts[0].description.chars().count(), DESCRIPTION_LIMIT);
        assert_eq!(outcome.upserts[0].id, outcome.upserts[0].content_hash);
    }
}
