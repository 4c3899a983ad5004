// src/services/registry.rs

//! Startup-time registry of scraper adapters.

use std::sync::Arc;

use reqwest::Client;

use crate::error::Result;
use crate::models::{Config, DEMO_ADAPTER, LISTING_ADAPTER, SourceConfig};
use crate::services::{DemoScraper, EventScraper, ListingScraper, WithFallback};
use crate::utils::http::create_async_client;

/// The scrapers a pipeline runs, in registration order.
#[derive(Default, Clone)]
pub struct ScraperRegistry {
    scrapers: Vec<Arc<dyn EventScraper>>,
}

impl ScraperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a scraper for every enabled source.
    ///
    /// Sources naming an unknown adapter are skipped with a warning.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = create_async_client(&config.collector)?;
        let mut registry = Self::new();

        for source in config.sources.iter().filter(|s| s.enabled) {
            match build_scraper(source, &client)? {
                Some(scraper) => registry.register(scraper),
                None => log::warn!(
                    "Skipping source '{}': unknown adapter '{}'",
                    source.platform,
                    source.adapter
                ),
            }
        }

        log::info!(
            "Registered {} scraper(s): {}",
            registry.len(),
            registry.platforms().join(", ")
        );
        Ok(registry)
    }

    /// Add a scraper. A scraper for an already registered platform replaces it.
    pub fn register(&mut self, scraper: Arc<dyn EventScraper>) {
        match self
            .scrapers
            .iter()
            .position(|s| s.platform() == scraper.platform())
        {
            Some(i) => {
                log::warn!("Replacing scraper for platform '{}'", scraper.platform());
                self.scrapers[i] = scraper;
            }
            None => self.scrapers.push(scraper),
        }
    }

    pub fn with(mut self, scraper: impl EventScraper + 'static) -> Self {
        self.register(Arc::new(scraper));
        self
    }

    pub fn scrapers(&self) -> &[Arc<dyn EventScraper>] {
        &self.scrapers
    }

    pub fn platforms(&self) -> Vec<&str> {
        self.scrapers.iter().map(|s| s.platform()).collect()
    }

    pub fn len(&self) -> usize {
        self.scrapers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scrapers.is_empty()
    }
}

fn build_scraper(source: &SourceConfig, client: &Client) -> Result<Option<Arc<dyn EventScraper>>> {
    let scraper: Arc<dyn EventScraper> = match source.adapter.as_str() {
        LISTING_ADAPTER => {
            let listing = ListingScraper::new(source.clone(), client.clone())?;
            if source.demo_fallback {
                Arc::new(WithFallback::new(listing))
            } else {
                Arc::new(listing)
            }
        }
        DEMO_ADAPTER => Arc::new(DemoScraper::new(source.platform.clone())),
        _ => return Ok(None),
    };
    Ok(Some(scraper))
}
