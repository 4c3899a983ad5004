//! Service layer for the crawler application.
//!
//! This module contains:
//! - The scraper capability (`EventScraper`) and its adapters
//!   (`ListingScraper`, `DemoScraper`, `WithFallback`)
//! - The startup-time scraper registry (`ScraperRegistry`)
//! - Concurrent collection across sources (`SourceCollector`)
//! - Per-platform politeness delays (`PlatformRateLimiter`)

mod collector;
mod demo;
mod listing;
mod rate_limiter;
mod registry;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

use crate::error::ScraperError;
use crate::models::RawEvent;

pub use collector::{CollectOutcome, SourceCollector};
pub use demo::{DemoScraper, WithFallback};
pub use listing::ListingScraper;
pub use rate_limiter::PlatformRateLimiter;
pub use registry::ScraperRegistry;

/// Listings from one call, and the failure demo data stood in for, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub events: Vec<RawEvent>,
    pub fallback_for: Option<ScraperError>,
}

impl Fetched {
    pub fn live(events: Vec<RawEvent>) -> Self {
        Self {
            events,
            fallback_for: None,
        }
    }

    pub fn fallback(events: Vec<RawEvent>, cause: ScraperError) -> Self {
        Self {
            events,
            fallback_for: Some(cause),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback_for.is_some()
    }
}

/// A source of raw event listings.
#[async_trait]
pub trait EventScraper: Send + Sync {
    /// Platform name stamped on every event this scraper returns.
    fn platform(&self) -> &str;

    /// Fetch listings for one city and category.
    async fn fetch_events(&self, city: &str, category: &str)
    -> Result<Vec<RawEvent>, ScraperError>;

    /// Like [`fetch_events`](Self::fetch_events), but reports when the
    /// listings are substitute data.
    async fn fetch(&self, city: &str, category: &str) -> Result<Fetched, ScraperError> {
        self.fetch_events(city, category).await.map(Fetched::live)
    }
}
