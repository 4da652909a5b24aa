//! Pipeline counters.
//!
//! Lock-free counters updated by the driver loop and the notification tasks
//! it spawns, summarised when the pipeline stops.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for one pipeline run.
#[derive(Debug)]
pub struct PipelineStats {
    /// Poll cycles started
    cycles: AtomicU64,
    /// Windows skipped for having too few samples
    incomplete_windows: AtomicU64,
    /// Failed window source queries
    source_errors: AtomicU64,
    /// Windows the model could not score
    unusable_windows: AtomicU64,
    /// Windows classified
    classifications: AtomicU64,
    /// Detections that passed the debouncer
    fires: AtomicU64,
    notifications_delivered: AtomicU64,
    notifications_failed: AtomicU64,
    /// Run start time
    started_at: DateTime<Utc>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            cycles: AtomicU64::new(0),
            incomplete_windows: AtomicU64::new(0),
            source_errors: AtomicU64::new(0),
            unusable_windows: AtomicU64::new(0),
            classifications: AtomicU64::new(0),
            fires: AtomicU64::new(0),
            notifications_delivered: AtomicU64::new(0),
            notifications_failed: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_incomplete(&self) {
        self.incomplete_windows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_source_error(&self) {
        self.source_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unusable(&self) {
        self.unusable_windows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classification(&self) {
        self.classifications.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fire(&self) {
        self.fires.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.notifications_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.notifications_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            incomplete_windows: self.incomplete_windows.load(Ordering::Relaxed),
            source_errors: self.source_errors.load(Ordering::Relaxed),
            unusable_windows: self.unusable_windows.load(Ordering::Relaxed),
            classifications: self.classifications.load(Ordering::Relaxed),
            fires: self.fires.load(Ordering::Relaxed),
            notifications_delivered: self.notifications_delivered.load(Ordering::Relaxed),
            notifications_failed: self.notifications_failed.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Pipeline Statistics:\n\
             - Poll cycles: {}\n\
             - Incomplete windows: {}\n\
             - Window source errors: {}\n\
             - Unusable windows: {}\n\
             - Windows classified: {}\n\
             - Detections fired: {}\n\
             - Notifications delivered: {}\n\
             - Notifications dropped: {}\n\
             - Uptime: {} seconds",
            stats.cycles,
            stats.incomplete_windows,
            stats.source_errors,
            stats.unusable_windows,
            stats.classifications,
            stats.fires,
            stats.notifications_delivered,
            stats.notifications_failed,
            stats.uptime_secs
        )
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of pipeline statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub incomplete_windows: u64,
    pub source_errors: u64,
    pub unusable_windows: u64,
    pub classifications: u64,
    pub fires: u64,
    pub notifications_delivered: u64,
    pub notifications_failed: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Thread-safe shared counters.
pub type SharedStats = Arc<PipelineStats>;
