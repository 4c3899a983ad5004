// src/pipeline/index.rs

//! In-memory lookup structure over the canonical event set.
//!
//! Rebuilt from the store at the start of every run and discarded after.
//! Events live in an arena; the three lookup maps hold arena positions.

use std::collections::HashMap;

use crate::models::CanonicalEvent;

/// Handle to an event inside a [`DedupIndex`].
pub type EventSlot = usize;

/// Exact-id, content-hash, and `(date, city)` bucket lookups.
#[derive(Debug, Default)]
pub struct DedupIndex {
    events: Vec<CanonicalEvent>,
    by_source: HashMap<String, EventSlot>,
    by_hash: HashMap<String, EventSlot>,
    buckets: HashMap<(String, String), Vec<EventSlot>>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index from persisted events.
    ///
    /// Later events whose hash or source key is already taken are kept but
    /// not indexed under the conflicting key.
    pub fn from_events(events: impl IntoIterator<Item = CanonicalEvent>) -> Self {
        let mut index = Self::new();
        for event in events {
            index.insert(event);
        }
        index
    }

    /// Add an event under all three lookups and return its slot.
    pub fn insert(&mut self, event: CanonicalEvent) -> EventSlot {
        let slot = self.events.len();

        for source in &event.sources {
            if source.source_id.is_empty() {
                continue;
            }
            if let Some(owner) = self.by_source.get(&source.key()) {
                log::warn!(
                    "Source {} already owned by event {}; ignoring for {}",
                    source,
                    self.events[*owner].id,
                    event.id
                );
                continue;
            }
            self.by_source.insert(source.key(), slot);
        }

        self.by_hash.entry(event.content_hash.clone()).or_insert(slot);

        if !event.date.is_empty() {
            self.buckets
                .entry((event.date.clone(), event.normalized_city.clone()))
                .or_default()
                .push(slot);
        }

        self.events.push(event);
        slot
    }

    /// Point an exact-id key at an existing event.
    pub fn register_source(&mut self, key: String, slot: EventSlot) {
        self.by_source.entry(key).or_insert(slot);
    }

    pub fn find_source(&self, key: &str) -> Option<EventSlot> {
        self.by_source.get(key).copied()
    }

    pub fn find_hash(&self, hash: &str) -> Option<EventSlot> {
        self.by_hash.get(hash).copied()
    }

    /// Fuzzy candidates sharing the date and normalized city.
    pub fn bucket(&self, date: &str, city: &str) -> &[EventSlot] {
        self.buckets
            .get(&(date.to_string(), city.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn get(&self, slot: EventSlot) -> Option<&CanonicalEvent> {
        self.events.get(slot)
    }

    pub fn get_mut(&mut self, slot: EventSlot) -> Option<&mut CanonicalEvent> {
        self.events.get_mut(slot)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[CanonicalEvent] {
        &self.events
    }
}
