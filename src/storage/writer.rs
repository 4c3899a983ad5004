//! Rate-aware, retrying writes in front of an [`EventStore`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{StoreError, StoreResult};
use crate::models::{CanonicalEvent, StorageConfig};
use crate::storage::EventStore;

/// Bounded exponential backoff for retryable store errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base: Duration::from_millis(config.backoff_base_ms),
            max: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Wait before retry number `attempt` (0-based) after `err`.
    ///
    /// `max(retry_after, base * 2^attempt)`, capped at `max`.
    pub fn delay(&self, attempt: u32, err: &StoreError) -> Duration {
        let backoff = self.base.saturating_mul(2u32.saturating_pow(attempt));
        let wait = match err {
            StoreError::RateLimited { retry_after } => backoff.max(*retry_after),
            _ => backoff,
        };
        wait.min(self.max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&StorageConfig::default())
    }
}

/// Run `op` until it succeeds, fails permanently, or retries run out.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                let wait = policy.delay(attempt, &err);
                log::warn!(
                    "{what} failed ({err}); retry {}/{} in {wait:?}",
                    attempt + 1,
                    policy.max_retries
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(err) => {
                log::error!("{what} failed after {attempt} retries: {err}");
                return Err(err);
            }
        }
    }
}

/// Chunked upserts spaced to stay under the store's write ceiling.
#[derive(Clone)]
pub struct BatchWriter {
    store: Arc<dyn EventStore>,
    batch_size: usize,
    interval: Duration,
    policy: RetryPolicy,
}

impl BatchWriter {
    pub fn new(
        store: Arc<dyn EventStore>,
        batch_size: usize,
        interval: Duration,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            interval,
            policy,
        }
    }

    pub fn from_config(store: Arc<dyn EventStore>, config: &StorageConfig) -> Self {
        Self::new(
            store,
            config.batch_size,
            config.write_interval(),
            RetryPolicy::from_config(config),
        )
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Upsert all events chunk by chunk. Returns the total applied.
    ///
    /// Stops at the first chunk that fails after retries; earlier chunks stay
    /// applied.
    pub async fn upsert_all(&self, events: &[CanonicalEvent]) -> StoreResult<usize> {
        let mut applied = 0;
        for (i, chunk) in events.chunks(self.batch_size).enumerate() {
            if i > 0 && !self.interval.is_zero() {
                tokio::time::sleep(self.interval).await;
            }
            let what = format!("upsert chunk {} ({} events)", i + 1, chunk.len());
            applied += with_retry(&self.policy, &what, || self.store.upsert_batch(chunk)).await?;
        }
        Ok(applied)
    }
}
