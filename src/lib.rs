//! Motion Notify - windowed motion classification with debounced notifications.
//!
//! This library polls recent accelerometer samples from a time-series store,
//! classifies each full window with a fixed-shape model, and pushes a
//! notification to every connected subscriber when the target gesture is
//! detected.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Motion Notify                            │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐             │
//! │  │   Window    │──▶│  Features   │──▶│ Classifier  │             │
//! │  │  (Influx)   │   │  (flatten)  │   │  (argmax)   │             │
//! │  └─────────────┘   └─────────────┘   └─────────────┘             │
//! │                                             │                     │
//! │                                             ▼                     │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐             │
//! │  │ Subscribers │◀──│  Broadcast  │◀──│  Debouncer  │             │
//! │  │    (/ws)    │   │     Hub     │   │ (cooldown)  │             │
//! │  └─────────────┘   └─────────────┘   └─────────────┘             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use motion_notify::{config::Config, core::DenseModel, source::InfluxWindowSource};
//! use motion_notify::{notifier::HttpDispatcher, pipeline::Pipeline};
//! use std::sync::Arc;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let model = DenseModel::load(&config.model.path)?;
//! let source = InfluxWindowSource::new(config.source.clone())?;
//! let dispatcher = Arc::new(HttpDispatcher::new(&config.notifier)?);
//!
//! let (_stop, shutdown) = tokio::sync::watch::channel(false);
//! Pipeline::new(source, model, dispatcher, &config)?.run(shutdown).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod hub;
pub mod notifier;
pub mod pipeline;
pub mod server;
pub mod source;
pub mod stats;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use crate::core::{
    ClassificationResult, Classifier, DebounceState, Debouncer, Decision, DenseModel,
    FeatureAssembler, FeatureVector, Model, NotificationEvent, Window,
};
pub use hub::{BroadcastHub, BroadcastReport, HubError, Subscriber, SubscriberId};
pub use notifier::{Delivery, Dispatcher, HttpDispatcher, LocalDispatcher};
pub use pipeline::{CycleOutcome, Pipeline, PipelineError};
pub use source::{InfluxWindowSource, Sample, SourceError, WindowSource};
pub use stats::{PipelineStats, SharedStats, StatsSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
