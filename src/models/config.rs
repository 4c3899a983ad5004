//! Application configuration structures.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::ListingSelectors;

/// Adapter name for the HTML listing scraper.
pub const LISTING_ADAPTER: &str = "listing";
/// Adapter name for the demo-data scraper.
pub const DEMO_ADAPTER: &str = "demo";
/// Longest accepted schedule interval (one year).
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// What to collect and how often
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Duplicate detection tuning
    #[serde(default)]
    pub dedup: DedupConfig,

    /// HTTP and fan-out behavior
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Event store location and write ceiling
    #[serde(default)]
    pub storage: StorageConfig,

    /// Registered sources, one per platform
    #[serde(default = "defaults::sources")]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Serialize the effective configuration back to TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Override selected values from the environment.
    ///
    /// Recognized variables: `SCRAPER_CITIES`, `SCRAPER_CATEGORIES` (comma
    /// separated), `SCRAPE_INTERVAL_HOURS`, `FUZZY_THRESHOLD`,
    /// `MAX_CONCURRENT`, `CRAWL_TIMEOUT_SECS`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(cities) = lookup("SCRAPER_CITIES") {
            self.pipeline.cities = split_list(&cities);
        }
        if let Some(categories) = lookup("SCRAPER_CATEGORIES") {
            self.pipeline.categories = split_list(&categories);
        }
        if let Some(hours) = lookup("SCRAPE_INTERVAL_HOURS").and_then(|v| v.trim().parse::<u64>().ok())
        {
            match hours.checked_mul(3600) {
            Some(secs) => self.pipeline.interval_secs = secs,
            None => log::warn!("Ignoring SCRAPE_INTERVAL_HOURS={hours}: interval overflows"),
        }
        }
        if let Some(threshold) = lookup("FUZZY_THRESHOLD").and_then(|v| v.trim().parse().ok()) {
            self.dedup.fuzzy_threshold = threshold;
        }
        if let Some(n) = lookup("MAX_CONCURRENT").and_then(|v| v.trim().parse().ok()) {
            self.collector.max_concurrent = n;
        }
        if let Some(secs) = lookup("CRAWL_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok()) {
            self.collector.timeout_secs = secs;
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.cities.is_empty() {
            return Err(AppError::validation("pipeline.cities is empty"));
        }
        if self.pipeline.categories.is_empty() {
            return Err(AppError::validation("pipeline.categories is empty"));
        }
        if self.pipeline.interval_secs == 0 {
            return Err(AppError::validation("pipeline.interval_secs must be > 0"));
        }
        if self.pipeline.interval_secs > MAX_INTERVAL_SECS {
            return Err(AppError::validation(format!(
                "pipeline.interval_secs must be <= {MAX_INTERVAL_SECS}"
            )));
        }
        if !(self.dedup.fuzzy_threshold > 0.0 && self.dedup.fuzzy_threshold <= 100.0) {
            return Err(AppError::validation(
                "dedup.fuzzy_threshold must be in (0, 100]",
            ));
        }
        if self.collector.user_agent.trim().is_empty() {
            return Err(AppError::validation("collector.user_agent is empty"));
        }
        if self.collector.timeout_secs == 0 {
            return Err(AppError::validation("collector.timeout_secs must be > 0"));
        }
        if self.collector.max_concurrent == 0 {
            return Err(AppError::validation("collector.max_concurrent must be > 0"));
        }
        if self.storage.writes_per_minute == 0 {
            return Err(AppError::validation(
                "storage.writes_per_minute must be > 0",
            ));
        }
        if self.storage.batch_size == 0 {
            return Err(AppError::validation("storage.batch_size must be > 0"));
        }
        for source in &self.sources {
            source.validate()?;
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            dedup: DedupConfig::default(),
            collector: CollectorConfig::default(),
            storage: StorageConfig::default(),
            sources: defaults::sources(),
        }
    }
}

/// Collection targets and schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "defaults::cities")]
    pub cities: Vec<String>,

    #[serde(default = "defaults::categories")]
    pub categories: Vec<String>,

    /// Seconds between scheduled runs
    #[serde(default = "defaults::interval_secs")]
    pub interval_secs: u64,

    /// Fire one scheduled run as soon as the scheduler starts
    #[serde(default)]
    pub run_on_start: bool,
}

impl PipelineConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Every (city, category) pair, city-major.
    pub fn targets(&self) -> Vec<(String, String)> {
        self.cities
            .iter()
            .flat_map(|city| {
                self.categories
                    .iter()
                    .map(move |category| (city.clone(), category.clone()))
            })
            .collect()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cities: defaults::cities(),
            categories: defaults::categories(),
            interval_secs: defaults::interval_secs(),
            run_on_start: false,
        }
    }
}

/// Duplicate detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Minimum token-sort ratio (0-100) for a fuzzy match
    #[serde(default = "defaults::fuzzy_threshold")]
    pub fuzzy_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: defaults::fuzzy_threshold(),
        }
    }
}

/// HTTP client and fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-call timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Maximum concurrent scraper calls
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Default minimum delay between two calls to the same platform
    #[serde(default = "defaults::platform_delay")]
    pub platform_delay_ms: u64,

    /// Per-platform overrides of `platform_delay_ms`
    #[serde(default)]
    pub platform_delays: BTreeMap<String, u64>,
}

impl CollectorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_concurrent: defaults::max_concurrent(),
            platform_delay_ms: defaults::platform_delay(),
            platform_delays: BTreeMap::new(),
        }
    }
}

/// Event store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory of the local JSON store
    #[serde(default = "defaults::storage_dir")]
    pub dir: PathBuf,

    /// Write-request ceiling imposed by the store
    #[serde(default = "defaults::writes_per_minute")]
    pub writes_per_minute: u32,

    /// Events per upsert request
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,

    /// Retries after a rate-limited or unavailable response
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    #[serde(default = "defaults::backoff_base")]
    pub backoff_base_ms: u64,

    #[serde(default = "defaults::backoff_max")]
    pub backoff_max_ms: u64,
}

impl StorageConfig {
    /// Spacing between write requests that keeps us under the ceiling.
    pub fn write_interval(&self) -> Duration {
        Duration::from_millis(60_000 / u64::from(self.writes_per_minute.max(1)))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: defaults::storage_dir(),
            writes_per_minute: defaults::writes_per_minute(),
            batch_size: defaults::batch_size(),
            max_retries: defaults::max_retries(),
            backoff_base_ms: defaults::backoff_base(),
            backoff_max_ms: defaults::backoff_max(),
        }
    }
}

/// One registered source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Platform name stamped on every event from this source
    pub platform: String,

    /// Adapter implementing the source (`listing` or `demo`)
    #[serde(default = "defaults::adapter")]
    pub adapter: String,

    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Listing URL with `{city}` and `{category}` placeholders
    #[serde(default)]
    pub url_template: Option<String>,

    /// City name to URL slug overrides
    #[serde(default)]
    pub city_slugs: BTreeMap<String, String>,

    /// Category name to URL slug overrides
    #[serde(default)]
    pub category_slugs: BTreeMap<String, String>,

    /// Card selectors used when the page has no JSON-LD
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectors: Option<ListingSelectors>,

    /// Serve demo events when the platform blocks us or is unreachable
    #[serde(default)]
    pub demo_fallback: bool,
}

impl SourceConfig {
    fn validate(&self) -> Result<()> {
        if self.platform.trim().is_empty() {
            return Err(AppError::validation("sources.platform is empty"));
        }
        if self.adapter == LISTING_ADAPTER {
            let template = self.url_template.as_deref().unwrap_or("").trim();
            if template.is_empty() {
                return Err(AppError::validation(format!(
                    "source '{}' uses the listing adapter but has no url_template",
                    self.platform
                )));
            }
            url::Url::parse(&self.listing_url("city", "category")).map_err(|e| {
                AppError::validation(format!(
                    "source '{}' has an invalid url_template: {e}",
                    self.platform
                ))
            })?;
        }
        if let Some(selectors) = &self.selectors {
            selectors.compile()?;
        }
        Ok(())
    }

    /// Listing URL for a (city, category) pair.
    pub fn listing_url(&self, city: &str, category: &str) -> String {
        let city_slug = self
            .city_slugs
            .get(city)
            .cloned()
            .unwrap_or_else(|| slugify(city));
        let category_slug = self
            .category_slugs
            .get(category)
            .cloned()
            .unwrap_or_else(|| slugify(category));

        self.url_template
            .as_deref()
            .unwrap_or("")
            .replace("{city}", &city_slug)
            .replace("{category}", &category_slug)
    }
}

/// Lowercase and hyphenate a display name for use in a URL path.
fn slugify(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

mod defaults {
    use std::path::PathBuf;

    use super::SourceConfig;
    use crate::models::ListingSelectors;

    // Pipeline defaults
    pub fn cities() -> Vec<String> {
        vec![
            "Mumbai".into(),
            "Delhi".into(),
            "Bangalore".into(),
            "Pune".into(),
        ]
    }
    pub fn categories() -> Vec<String> {
        vec!["technology".into(), "music".into(), "business".into()]
    }
    pub fn interval_secs() -> u64 {
        2 * 60 * 60
    }

    // Dedup defaults
    pub fn fuzzy_threshold() -> f64 {
        85.0
    }

    // Collector defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; event-crawler/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_concurrent() -> usize {
        5
    }
    pub fn platform_delay() -> u64 {
        1500
    }

    // Storage defaults
    pub fn storage_dir() -> PathBuf {
        PathBuf::from("storage")
    }
    pub fn writes_per_minute() -> u32 {
        300
    }
    pub fn batch_size() -> usize {
        100
    }
    pub fn max_retries() -> u32 {
        5
    }
    pub fn backoff_base() -> u64 {
        500
    }
    pub fn backoff_max() -> u64 {
        30_000
    }

    // Source defaults
    pub fn adapter() -> String {
        super::LISTING_ADAPTER.into()
    }
    pub fn enabled() -> bool {
        true
    }
    pub fn sources() -> Vec<SourceConfig> {
        vec![SourceConfig {
            platform: "allevents".into(),
            adapter: super::LISTING_ADAPTER.into(),
            enabled: true,
            url_template: Some("https://allevents.in/{city}/{category}/".into()),
            city_slugs: Default::default(),
            category_slugs: [
                ("technology".to_string(), "tech".to_string()),
                ("business".to_string(), "professional".to_string()),
            ]
            .into_iter()
            .collect(),
            selectors: Some(ListingSelectors::default()),
            demo_fallback: false,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.collector.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_threshold() {
        let mut config = Config::default();
        config.dedup.fuzzy_threshold = 0.0;
        assert!(config.validate().is_err());
        config.dedup.fuzzy_threshold = 101.0;
        assert!(config.validate().is_err());
        config.dedup.fuzzy_threshold = 100.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_listing_without_template() {
        let mut config = Config::default();
        config.sources[0].url_template = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parse_minimal_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [pipeline]
            cities = ["Chennai"]

            [collector.platform_delays]
            meetup = 3000

            [[sources]]
            platform = "demo"
            adapter = "demo"
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.cities, vec!["Chennai"]);
        assert_eq!(config.pipeline.categories.len(), 3);
        assert_eq!(config.dedup.fuzzy_threshold, 85.0);
        assert_eq!(config.collector.platform_delays["meetup"], 3000);
        assert_eq!(config.collector.platform_delay_ms, 1500);
        assert_eq!(config.sources.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn listing_url_uses_slugs() {
        let source = &Config::default().sources[0];
        assert_eq!(
            source.listing_url("Mumbai", "technology"),
            "https://allevents.in/mumbai/tech/"
        );
        assert_eq!(
            source.listing_url("New Delhi", "music"),
            "https://allevents.in/new-delhi/music/"
        );
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("SCRAPER_CITIES", "Goa, Jaipur ,"),
            ("SCRAPE_INTERVAL_HOURS", "6"),
            ("FUZZY_THRESHOLD", "90"),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.pipeline.cities, vec!["Goa", "Jaipur"]);
        assert_eq!(config.pipeline.interval_secs, 6 * 3600);
        assert_eq!(config.dedup.fuzzy_threshold, 90.0);
        assert_eq!(config.collector.max_concurrent, 5);
    }

    #[test]
    fn oversized_interval_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|key| {
            (key == "SCRAPE_INTERVAL_HOURS").then(|| u64::MAX.to_string())
        });
        assert_eq!(config.pipeline.interval_secs, 2 * 3600);
        assert!(config.validate().is_ok());

        config.apply_overrides(|key| {
            (key == "SCRAPE_INTERVAL_HOURS").then(|| (u64::MAX / 3600).to_string())
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_source_has_no_demo_fallback() {
        let config = Config::default();
        assert!(config.sources.iter().all(|s| !s.demo_fallback));
    }

    #[test]
    fn write_interval_follows_ceiling() {
        let storage = StorageConfig::default();
        assert_eq!(storage.write_interval(), Duration::from_millis(200));
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config::default();
        let text = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.pipeline.cities, config.pipeline.cities);
        assert_eq!(parsed.sources[0].platform, "allevents");
    }

    #[test]
    fn targets_are_city_major() {
        let mut pipeline = PipelineConfig::default();
        pipeline.cities = vec!["A".into(), "B".into()];
        pipeline.categories = vec!["x".into(), "y".into()];
        assert_eq!(
            pipeline.targets(),
            vec![
                ("A".to_string(), "x".to_string()),
                ("A".to_string(), "y".to_string()),
                ("B".to_string(), "x".to_string()),
                ("B".to_string(), "y".to_string()),
            ]
        );
    }
}
