// src/pipeline/stats.rs

//! Aggregate counts over the canonical event set.

use crate::models::{CanonicalEvent, StatsSnapshot};

/// Bucket for events without a date.
pub const UNDATED: &str = "undated";
/// Bucket for events without a category.
pub const UNCATEGORIZED: &str = "uncategorized";

/// Derives a [`StatsSnapshot`] from canonical events alone.
pub struct StatsAggregator;

impl StatsAggregator {
    pub fn compute<'a>(events: impl IntoIterator<Item = &'a CanonicalEvent>) -> StatsSnapshot {
        let mut snapshot = StatsSnapshot::default();

        for event in events {
            snapshot.total_events += 1;
            snapshot.total_reports += event.sources.len();
            if event.is_multi_source() {
                snapshot.multi_source_events += 1;
            }

            if event.is_free {
                snapshot.free_events += 1;
            } else {
                snapshot.paid_events += 1;
            }

            *snapshot.by_city.entry(event.city.trim().to_lowercase()).or_default() += 1;

            let category = if event.category.is_empty() {
                UNCATEGORIZED.to_string()
            } else {
                event.category.to_lowercase()
            };
            *snapshot.by_category.entry(category).or_default() += 1;

            for platform in event.platforms() {
                *snapshot.by_platform.entry(platform.to_string()).or_default() += 1;
            }

            *snapshot.by_month.entry(month_bucket(&event.date)).or_default() += 1;
        }

        snapshot
    }
}

fn month_bucket(date: &str) -> String {
    date.get(..7).unwrap_or(UNDATED).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceRef;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn event(city: &str, category: &str, date: &str, sources: &[(&str, &str)]) -> CanonicalEvent {
        CanonicalEvent {
            id: format!("{city}{date}{}", sources.len()),
            title: "t".into(),
            normalized_title: "t".into(),
            date: date.into(),
            city: city.into(),
            normalized_city: city.to_lowercase(),
            category: category.into(),
            description: String::new(),
            url: String::new(),
            end_date: String::new(),
            price: String::new(),
            is_free: true,
            organizer: String::new(),
            sources: sources.iter().map(|(p, s)| SourceRef::new(*p, *s)).collect::<BTreeSet<_>>(),
            content_hash: String::new(),
            first_seen: Utc::now(),
            last_seen: Utc::now(),
        }
    }

    #[test]
    fn test_compute_groups() {
        let events = vec![
            event("Mumbai", "Technology", "2024-06-01", &[("meetup", "1"), ("eventbrite", "2")]),
            event("Mumbai", "", "2024-07-10", &[("meetup", "3"), ("meetup", "4")]),
            event("Pune", "music", "", &[("allevents", "5")]),
            event(" mumbai", "music", "2024-06-02", &[("allevents", "6")]),
        ];

        let stats = StatsAggregator::compute(&events);

        assert_eq!(stats.total_events, 4);
        assert_eq!(stats.total_reports, 6);
        assert_eq!(stats.multi_source_events, 2);
        // display-case variants share a bucket
        assert_eq!(stats.by_city["mumbai"], 3);
        assert_eq!(stats.by_city.len(), 2);
        assert_eq!(stats.by_category["technology"], 1);
        assert_eq!(stats.by_category[UNCATEGORIZED], 1);
        // counted once per distinct platform
        assert_eq!(stats.by_platform["meetup"], 2);
        assert_eq!(stats.by_platform["eventbrite"], 1);
        assert_eq!(stats.by_month["2024-06"], 2);
        assert_eq!(stats.by_month[UNDATED], 1);
    }

    #[test]
    fn test_free_and_paid_counts() {
        let free = event("Goa", "music", "2024-06-01", &[("meetup", "1")]);
        let mut paid = event("Goa", "music", "2024-06-02", &[("meetup", "2")]);
        paid.is_free = false;
        paid.price = "INR 500".into();

        let stats = StatsAggregator::compute([&free, &paid, &paid]);

        assert_eq!(stats.free_events, 1);
        assert_eq!(stats.paid_events, 2);
        assert_eq!(stats.free_percentage(), 33);
    }

    #[test]
    fn test_compute_is_order_independent() {
        let a = event("Goa", "music", "2024-06-01", &[("meetup", "1")]);
        let b = event("Pune", "arts", "2024-08-01", &[("allevents", "2")]);

        assert_eq!(
            StatsAggregator::compute([&a, &b]),
            StatsAggregator::compute([&b, &a])
        );
    }

    #[test]
    fn test_empty_set() {
        assert_eq!(StatsAggregator::compute(&Vec::new()), StatsSnapshot::default());
    }
}
