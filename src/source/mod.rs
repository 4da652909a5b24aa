//! Window sources for the inference pipeline.
//!
//! A window source answers one question: "what are the most recent samples?".
//! The production implementation queries InfluxDB over HTTP; tests plug in
//! their own in-memory sources.

pub mod influx;
pub mod types;

use std::future::Future;
use std::time::Duration;

pub use influx::InfluxWindowSource;
pub use types::{Sample, SourceError};

/// Something that can hand out the most recent samples, oldest first.
pub trait WindowSource {
    /// Fetch at most `max_samples` samples from the last `recency`.
    ///
    /// Returns an empty vector rather than an error when no data exists yet.
    fn fetch_recent_window(
        &self,
        recency: Duration,
        max_samples: usize,
    ) -> impl Future<Output = Result<Vec<Sample>, SourceError>> + Send;
}
