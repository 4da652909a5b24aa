//! Fixed-capacity sample windows.
//!
//! A window is the unit the model classifies: the most recent `capacity`
//! samples, oldest first. Only a full window can be classified.

use crate::source::types::Sample;
use chrono::{DateTime, Utc};

/// An ordered, fixed-capacity slice of recent samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    samples: Vec<Sample>,
    capacity: usize,
}

impl Window {
    /// Build a window from samples already ordered oldest first.
    ///
    /// Samples beyond `capacity` are dropped from the newest end, which
    /// matches how a `LIMIT`ed range query trims its result.
    pub fn from_samples(mut samples: Vec<Sample>, capacity: usize) -> Self {
        samples.truncate(capacity);
        Self { samples, capacity }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// A window is complete only when it holds exactly `capacity` samples.
    pub fn is_complete(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// Timestamp of the oldest sample.
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.samples.first().map(|s| s.timestamp)
    }

    /// Timestamp of the newest sample.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.samples.last().map(|s| s.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_complete_at_capacity() {
        let window = Window::from_samples(Vec::new(), 3);
        assert!(window.is_empty());
        assert!(!window.is_complete());

        let samples: Vec<Sample> = (0..3).map(|i| Sample::now(i as f32, 0.0, 0.0)).collect();
        let window = Window::from_samples(samples, 3);
        assert!(window.is_complete());
        assert_eq!(window.len(), 3);
        assert_eq!(window.samples()[2].x, 2.0);
    }

    #[test]
    fn test_from_samples_truncates() {
        let samples: Vec<Sample> = (0..5).map(|i| Sample::now(i as f32, 0.0, 0.0)).collect();
        let window = Window::from_samples(samples, 4);

        assert!(window.is_complete());
        assert_eq!(window.samples()[0].x, 0.0);
        assert_eq!(window.samples()[3].x, 3.0);
    }

    #[test]
    fn test_bounds() {
        let window = Window::from_samples(Vec::new(), 10);
        assert!(window.start().is_none());

        let first = Sample::now(0.0, 0.0, 0.0);
        let window = Window::from_samples(vec![first, Sample::now(1.0, 1.0, 1.0)], 10);
        assert_eq!(window.start(), Some(first.timestamp));
        assert!(!window.is_complete());
    }
}
