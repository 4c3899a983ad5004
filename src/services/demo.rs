// src/services/demo.rs

//! Demo-data adapter and the fallback wrapper that uses it.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};

use crate::error::ScraperError;
use crate::models::RawEvent;
use crate::services::{EventScraper, Fetched};

const DEMO_TITLES: [&str; 4] = [
    "International Food Festival {city}",
    "{city} Cultural Carnival",
    "Live Music: Indie Artists {city}",
    "Weekend Photography Walk",
];

/// Index of the one paid demo listing.
const DEMO_PAID: usize = 2;

/// Days from today for each demo title.
const DEMO_OFFSETS: [i64; 4] = [3, 8, 14, 21];

/// Produces a fixed set of plausible events for any city and category.
///
/// Output depends only on the inputs and the current date, so repeated runs
/// on the same day deduplicate by exact id.
pub struct DemoScraper {
    platform: String,
}

impl DemoScraper {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
        }
    }

    /// Demo events anchored at `today`.
    pub fn events_for(&self, city: &str, category: &str, today: NaiveDate) -> Vec<RawEvent> {
        let slug = |s: &str| s.to_lowercase().split_whitespace().collect::<Vec<_>>().join("-");
        let city_slug = slug(city);
        let category_slug = slug(category);

        DEMO_TITLES
            .iter()
            .zip(DEMO_OFFSETS)
            .enumerate()
            .map(|(i, (title, offset))| {
                let date = (today + Duration::days(offset)).format("%Y-%m-%d").to_string();
                let is_free = i != DEMO_PAID;
                RawEvent {
                    platform: self.platform.clone(),
                    source_id: format!("demo-{city_slug}-{category_slug}-{i}"),
                    title: title.replace("{city}", city),
                    description: format!("An event happening in {city}. Demo listing."),
                    start_date: date.clone(),
                    city: city.to_string(),
                    category: category.to_string(),
                    url: format!("https://example.com/{city_slug}/demo-event-{i}"),
                    end_date: date,
                    price: if is_free { "Free".into() } else { "INR 500".into() },
                    is_free,
                    organizer: format!("{city} Events Co."),
                }
            })
            .collect()
    }
}

#[async_trait]
impl EventScraper for DemoScraper {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn fetch_events(
        &self,
        city: &str,
        category: &str,
    ) -> Result<Vec<RawEvent>, ScraperError> {
        Ok(self.events_for(city, category, Utc::now().date_naive()))
    }
}

/// Serves demo data when the wrapped scraper is blocked or unreachable.
///
/// Timeouts and parse failures are passed through unchanged. Substituted
/// calls are marked through [`EventScraper::fetch`] so runs can report them.
pub struct WithFallback<S> {
    inner: S,
    demo: DemoScraper,
}

impl<S: EventScraper> WithFallback<S> {
    pub fn new(inner: S) -> Self {
        let demo = DemoScraper::new(inner.platform());
        Self { inner, demo }
    }
}

#[async_trait]
impl<S: EventScraper> EventScraper for WithFallback<S> {
    fn platform(&self) -> &str {
        self.inner.platform()
    }

    async fn fetch_events(
        &self,
        city: &str,
        category: &str,
    ) -> Result<Vec<RawEvent>, ScraperError> {
        self.fetch(city, category).await.map(|fetched| fetched.events)
    }

    async fn fetch(&self, city: &str, category: &str) -> Result<Fetched, ScraperError> {
        match self.inner.fetch(city, category).await {
            Err(e) if e.allows_fallback() => {
                log::warn!(
                    "{}: {} for {}/{}; serving demo events",
                    self.platform(),
                    e,
                    city,
                    category
                );
                let events = self.demo.fetch_events(city, category).await?;
                Ok(Fetched::fallback(events, e))
            }
            other => other,
        }
    }
}
