// src/services/collector.rs

//! Concurrent fan-out of scraper calls.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::stream::{self, StreamExt};

use crate::error::ScraperError;
use crate::models::{CollectorConfig, RawEvent, ScraperTally};
use crate::services::{EventScraper, Fetched, PlatformRateLimiter};

/// Result of one collection pass.
#[derive(Debug, Default)]
pub struct CollectOutcome {
    /// Raw events in job order (scraper, then city, then category)
    pub events: Vec<RawEvent>,
    /// Per-platform call results
    pub tally: BTreeMap<String, ScraperTally>,
    /// Number of scraper calls attempted
    pub calls: usize,
}

impl CollectOutcome {
    pub fn successes(&self) -> usize {
        self.tally.values().map(|t| t.successes).sum()
    }

    pub fn failures(&self) -> usize {
        self.tally.values().map(|t| t.failures).sum()
    }

    pub fn fallbacks(&self) -> usize {
        self.tally.values().map(|t| t.fallbacks).sum()
    }

    /// No call produced listings, including the case of no calls at all.
    pub fn all_failed(&self) -> bool {
        self.successes() + self.fallbacks() == 0
    }

    /// Some call failed or was answered with demo data.
    pub fn is_degraded(&self) -> bool {
        self.failures() + self.fallbacks() > 0
    }
}

/// Runs every scraper for every (city, category) pair.
///
/// Calls run concurrently up to a cap. A failed or timed-out call is
/// tallied and skipped; it never affects sibling calls. Calls answered with
/// demo data are tallied as fallbacks, not successes.
pub struct SourceCollector {
    limiter: PlatformRateLimiter,
    max_concurrent: usize,
    timeout: Duration,
}

impl SourceCollector {
    pub fn new(limiter: PlatformRateLimiter, max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            limiter,
            max_concurrent: max_concurrent.max(1),
            timeout,
        }
    }

    pub fn from_config(config: &CollectorConfig) -> Self {
        let limiter = PlatformRateLimiter::new(Duration::from_millis(config.platform_delay_ms))
            .with_overrides(&config.platform_delays);
        Self::new(limiter, config.max_concurrent, config.timeout())
    }

    /// Collect listings from all scrapers for all targets.
    pub async fn collect(
        &self,
        scrapers: &[Arc<dyn EventScraper>],
        targets: &[(String, String)],
    ) -> CollectOutcome {
        let jobs: Vec<_> = scrapers
            .iter()
            .flat_map(|scraper| {
                targets
                    .iter()
                    .map(move |(city, category)| (Arc::clone(scraper), city, category))
            })
            .enumerate()
            .collect();

        let mut outcome = CollectOutcome {
            calls: jobs.len(),
            ..CollectOutcome::default()
        };
        for scraper in scrapers {
            outcome
                .tally
                .entry(scraper.platform().to_string())
                .or_default();
        }

        log::info!(
            "Collecting from {} scraper(s) across {} target(s): {} calls, {} at a time",
            scrapers.len(),
            targets.len(),
            jobs.len(),
            self.max_concurrent
        );

        let mut results: Vec<(usize, String, Result<Fetched, ScraperError>)> =
            stream::iter(jobs)
                .map(|(i, (scraper, city, category))| async move {
                    let result = self.call(scraper.as_ref(), city, category).await;
                    (i, scraper.platform().to_string(), result)
                })
                .buffer_unordered(self.max_concurrent)
                .collect::<Vec<_>>()
                .boxed()
                .await;

        results.sort_by_key(|(i, _, _)| *i);

        for (_, platform, result) in results {
            let tally = outcome.tally.entry(platform.clone()).or_default();
            match result {
                Ok(Fetched {
                    mut events,
                    fallback_for,
                }) => {
                    if fallback_for.is_some() {
                        tally.fallbacks += 1;
                    } else {
                        tally.successes += 1;
                    }
                    for event in &mut events {
                        event.platform.clone_from(&platform);
                    }
                    outcome.events.extend(events);
                }
                Err(_) => tally.failures += 1,
            }
        }

        log::info!(
            "Collected {} raw events ({} ok, {} failed, {} demo fallback calls)",
            outcome.events.len(),
            outcome.successes(),
            outcome.failures(),
            outcome.fallbacks()
        );
        outcome
    }

    async fn call(
        &self,
        scraper: &dyn EventScraper,
        city: &str,
        category: &str,
    ) -> Result<Fetched, ScraperError> {
        let platform = scraper.platform();
        self.limiter.acquire(platform).await;

        let result = match tokio::time::timeout(self.timeout, scraper.fetch(city, category)).await {
            Ok(result) => result,
            Err(_) => Err(ScraperError::Timeout(self.timeout)),
        };

        match &result {
            Ok(fetched) => log::debug!(
                "{platform}: {} events for {city}/{category}{}",
                fetched.events.len(),
                if fetched.is_fallback() { " (demo)" } else { "" }
            ),
            Err(e) => log::warn!("{platform}: {city}/{category} failed: {e}"),
        }
        result
    }
}
