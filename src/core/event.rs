//! Notification events pushed to subscribers.
//!
//! On the wire an event is just UTF-8 text. Events produced by the pipeline
//! carry a small JSON document describing the detection; events arriving at
//! the hub from elsewhere are forwarded untouched.

use crate::core::classifier::ClassificationResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// The name of this producer.
pub const PRODUCER_NAME: &str = "motion-notify";

/// An immutable text payload, cheap to clone for fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    payload: Arc<str>,
}

impl NotificationEvent {
    /// Wrap an opaque payload.
    pub fn new(payload: impl Into<Arc<str>>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
}

impl std::fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.payload)
    }
}

/// Producer metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
    /// Unique instance identifier (UUID)
    pub instance_id: String,
}

/// JSON body of a detection event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionPayload {
    /// Always "detection"
    pub event: String,
    /// Action text for the subscriber
    pub message: String,
    pub label: String,
    pub label_index: usize,
    pub confidence: f32,
    /// RFC3339
    pub detected_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_end: Option<String>,
    pub producer: Producer,
}

/// Builds detection events for one pipeline instance.
pub struct EventBuilder {
    instance_id: Uuid,
    message: String,
}

impl EventBuilder {
    /// Create a builder with a fresh instance id.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            message: message.into(),
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Describe a detection.
    pub fn payload(
        &self,
        result: &ClassificationResult,
        detected_at: DateTime<Utc>,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> DetectionPayload {
        DetectionPayload {
            event: "detection".to_string(),
            message: self.message.clone(),
            label: result.label.clone(),
            label_index: result.label_index,
            confidence: result.confidence,
            detected_at: detected_at.to_rfc3339(),
            window_start: window.map(|(start, _)| start.to_rfc3339()),
            window_end: window.map(|(_, end)| end.to_rfc3339()),
            producer: Producer {
                name: PRODUCER_NAME.to_string(),
                version: crate::VERSION.to_string(),
                instance_id: self.instance_id.to_string(),
            },
        }
    }

    /// Build the event for a detection.
    pub fn build(
        &self,
        result: &ClassificationResult,
        detected_at: DateTime<Utc>,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> NotificationEvent {
        let payload = self.payload(result, detected_at, window);
        // Serializing plain strings and numbers cannot fail; keep the
        // message alone if it ever does.
        let json = serde_json::to_string(&payload).unwrap_or_else(|_| self.message.clone());
        NotificationEvent::new(json)
    }
}
