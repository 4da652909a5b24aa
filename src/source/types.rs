//! Sample types read from the time-series store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single accelerometer reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// When the sensor produced the reading
    pub timestamp: DateTime<Utc>,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, x: f32, y: f32, z: f32) -> Self {
        Self { timestamp, x, y, z }
    }

    /// Create a sample stamped with the current time.
    pub fn now(x: f32, y: f32, z: f32) -> Self {
        Self::new(Utc::now(), x, y, z)
    }

    /// Axes in canonical order.
    pub fn axes(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

/// Errors raised by a window source.
#[derive(Debug)]
pub enum SourceError {
    /// The store could not be reached or refused the query
    Unavailable(String),
    /// The store answered with something we could not read
    Malformed(String),
    /// The client could not be constructed
    Config(String),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Unavailable(msg) => write!(f, "Window source unavailable: {msg}"),
            SourceError::Malformed(msg) => write!(f, "Malformed window source response: {msg}"),
            SourceError::Config(msg) => write!(f, "Window source config error: {msg}"),
        }
    }
}

impl std::error::Error for SourceError {}
