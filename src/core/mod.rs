//! Core inference functionality.
//!
//! This module contains:
//! - Fixed-capacity sample windows
//! - Feature assembly from complete windows
//! - Classification over an opaque model
//! - Threshold and cooldown gating of detections
//! - Notification events for subscribers

pub mod classifier;
pub mod debounce;
pub mod event;
pub mod features;
pub mod window;

/// Axes per sample (x, y, z).
pub const AXES: usize = 3;

// Re-export commonly used types
pub use classifier::{
    ClassificationResult, Classifier, ClassifierError, DenseModel, Model, ModelError,
};
pub use debounce::{DebounceState, Debouncer, Decision};
pub use event::{DetectionPayload, EventBuilder, NotificationEvent, PRODUCER_NAME};
pub use features::{FeatureAssembler, FeatureVector, Incomplete};
pub use window::Window;
