//! Scraper doubles for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::ScraperError;
use crate::models::RawEvent;
use crate::services::EventScraper;

pub fn raw_event(platform: &str, source_id: &str, title: &str, date: &str, city: &str) -> RawEvent {
    RawEvent {
        platform: platform.into(),
        source_id: source_id.into(),
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

fn echo_event(platform: &str, city: &str, category: &str) -> RawEvent {
    RawEvent {
        category: category.into(),
        ..raw_event(
            platform,
            &format!("{city}-{category}"),
            &format!("{platform} {category} night"),
            "2024-06-01",
            city,
        )
    }
}

/// Returns fixed events, or one echo event per call.
pub struct StaticScraper {
    platform: String,
    events: Option<Vec<RawEvent>>,
}

impl StaticScraper {
    pub fn new(platform: &str, events: Vec<RawEvent>) -> Self {
        Self {
            platform: platform.into(),
            events: Some(events),
        }
    }

    pub fn echo(platform: &str) -> Self {
        Self {
            platform: platform.into(),
            events: None,
        }
    }
}

#[async_trait]
impl EventScraper for StaticScraper {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn fetch_events(
        &self,
        city: &str,
        category: &str,
    ) -> Result<Vec<RawEvent>, ScraperError> {
        Ok(match &self.events {
            Some(events) => events.clone(),
            None => vec![echo_event(&self.platform, city, category)],
        })
    }
}

/// Always fails with the given error.
pub struct FailingScraper {
    platform: String,
    error: ScraperError,
}

impl FailingScraper {
    pub fn blocked(platform: &str) -> Self {
        Self {
            platform: platform.into(),
            error: ScraperError::Blocked { status: 403 },
        }
    }

    pub fn network(platform: &str) -> Self {
        Self {
            platform: platform.into(),
            error: ScraperError::Network("connection reset".into()),
        }
    }

    pub fn parse(platform: &str) -> Self {
        Self {
            platform: platform.into(),
            error: ScraperError::Parse("no event cards".into()),
        }
    }
}

#[async_trait]
impl EventScraper for FailingScraper {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn fetch_events(&self, _: &str, _: &str) -> Result<Vec<RawEvent>, ScraperError> {
        Err(self.error.clone())
    }
}

/// Echoes after a fixed delay.
pub struct SlowScraper {
    platform: String,
    delay: Duration,
}

impl SlowScraper {
    pub fn new(platform: &str, delay: Duration) -> Self {
        Self {
            platform: platform.into(),
            delay,
        }
    }
}

#[async_trait]
impl EventScraper for SlowScraper {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn fetch_events(
        &self,
        city: &str,
        category: &str,
    ) -> Result<Vec<RawEvent>, ScraperError> {
        tokio::time::sleep(self.delay).await;
        Ok(vec![echo_event(&self.platform, city, category)])
    }
}

/// Concurrent call counter shared between scrapers.
#[derive(Debug, Default)]
pub struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Echoes after a delay while recording how many calls overlap.
pub struct TrackedScraper {
    platform: String,
    delay: Duration,
    in_flight: Arc<InFlight>,
}

impl TrackedScraper {
    pub fn new(platform: &str, delay: Duration, in_flight: Arc<InFlight>) -> Self {
        Self {
            platform: platform.into(),
            delay,
            in_flight,
        }
    }
}

#[async_trait]
impl EventScraper for TrackedScraper {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn fetch_events(
        &self,
        city: &str,
        category: &str,
    ) -> Result<Vec<RawEvent>, ScraperError> {
        self.in_flight.enter();
        tokio::time::sleep(self.delay).await;
        self.in_flight.exit();
        Ok(vec![echo_event(&self.platform, city, category)])
    }
}

/// Parks every call until released, announcing when a call has started.
pub struct GatedScraper {
    platform: String,
    pub started: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl GatedScraper {
    pub fn new(platform: &str) -> Self {
        Self {
            platform: platform.into(),
            started: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl EventScraper for GatedScraper {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn fetch_events(
        &self,
        city: &str,
        category: &str,
    ) -> Result<Vec<RawEvent>, ScraperError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(vec![echo_event(&self.platform, city, category)])
    }
}
