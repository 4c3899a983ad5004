// src/models/mod.rs

//! Domain models for the event crawler.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod event;
mod run;
mod selectors;
mod stats;

// Re-export all public types
pub use config::{
    CollectorConfig, Config, DEMO_ADAPTER, DedupConfig, LISTING_ADAPTER, PipelineConfig,
    SourceConfig, StorageConfig,
};
pub use event::{CanonicalEvent, DESCRIPTION_LIMIT, RawEvent, SourceRef, truncate_chars};
pub use run::{PipelineRun, RunCounts, RunStatus, ScraperTally, TriggerKind};
pub use selectors::{CompiledSelectors, ListingSelectors};
pub use stats::{StatsSnapshot, StoredStats};
