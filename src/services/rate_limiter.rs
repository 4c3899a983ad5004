// src/services/rate_limiter.rs

//! Per-platform minimum spacing between scraper calls.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Spaces calls to the same platform by a minimum delay.
///
/// Each caller reserves the next free slot for its platform and sleeps until
/// it arrives, so concurrent callers queue up instead of bursting. Platforms
/// never wait on each other.
#[derive(Debug)]
pub struct PlatformRateLimiter {
    default_delay: Duration,
    overrides: HashMap<String, Duration>,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl PlatformRateLimiter {
    pub fn new(default_delay: Duration) -> Self {
        Self {
            default_delay,
            overrides: HashMap::new(),
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    /// Per-platform delays in milliseconds, as found in configuration.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, u64>) -> Self {
        self.overrides = overrides
            .iter()
            .map(|(platform, ms)| (platform.clone(), Duration::from_millis(*ms)))
            .collect();
        self
    }

    pub fn delay_for(&self, platform: &str) -> Duration {
        self.overrides
            .get(platform)
            .copied()
            .unwrap_or(self.default_delay)
    }

    /// Wait until `platform` may be called again, then claim the slot.
    pub async fn acquire(&self, platform: &str) {
        let delay = self.delay_for(platform);
        if delay.is_zero() {
            return;
        }

        let slot = {
            let mut slots = self.next_slot.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            let slot = slots.get(platform).copied().unwrap_or(now).max(now);
            slots.insert(platform.to_string(), slot + delay);
            slot
        };

        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            log::debug!("Rate limiting {}: waiting {:?}", platform, wait);
            tokio::time::sleep_until(slot).await;
        }
    }
}
