//! The driver loop: fetch, assemble, classify, debounce, notify.
//!
//! One `Pipeline` owns one window source connection and one model. Cycles
//! run strictly one after another, so results reach the debouncer in fetch
//! order. Notifications are spawned and never hold up the next poll.

use crate::config::{Config, PipelineConfig};
use crate::core::{
    ClassificationResult, Classifier, ClassifierError, Debouncer, Decision, EventBuilder,
    FeatureAssembler, Model, Window,
};
use crate::notifier::{Delivery, Dispatcher};
use crate::source::WindowSource;
use crate::stats::{PipelineStats, SharedStats, StatsSnapshot};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;

/// What a single cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The window source could not be queried
    Unavailable,
    /// Not enough samples yet
    Incomplete { have: usize, need: usize },
    /// The model could not score this window
    Unusable,
    /// Classified, but the debouncer held it back
    Suppressed(ClassificationResult),
    /// Classified and a notification was sent off
    Fired(ClassificationResult),
}

/// Fatal pipeline errors.
#[derive(Debug)]
pub enum PipelineError {
    /// Model and configuration disagree; detected at startup
    Contract(String),
    /// The classifier and model disagree on shape during a cycle
    Classifier(ClassifierError),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Contract(msg) => write!(f, "Model/config mismatch: {msg}"),
            PipelineError::Classifier(e) => write!(f, "Classifier error: {e}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<ClassifierError> for PipelineError {
    fn from(e: ClassifierError) -> Self {
        PipelineError::Classifier(e)
    }
}

/// Windowed inference-and-notification pipeline.
pub struct Pipeline<S, M, D> {
    source: S,
    assembler: FeatureAssembler,
    classifier: Classifier<M>,
    debouncer: Debouncer,
    dispatcher: Arc<D>,
    events: EventBuilder,
    recency: Duration,
    pacing: PipelineConfig,
    stats: SharedStats,
    in_flight: JoinSet<()>,
}

impl<S, M, D> Pipeline<S, M, D>
where
    S: WindowSource,
    M: Model,
    D: Dispatcher,
{
    /// Wire up a pipeline, checking that the model fits the configuration.
    pub fn new(
        source: S,
        model: M,
        dispatcher: Arc<D>,
        config: &Config,
    ) -> Result<Self, PipelineError> {
        let assembler = FeatureAssembler::new(config.model.window_samples);

        if model.input_len() != assembler.output_len() {
            return Err(PipelineError::Contract(format!(
                "model expects {} inputs but windows of {} samples produce {}",
                model.input_len(),
                assembler.capacity(),
                assembler.output_len()
            )));
        }
        if model.labels().len() != config.model.labels.len() {
            return Err(PipelineError::Contract(format!(
                "model has {} labels, configuration lists {}",
                model.labels().len(),
                config.model.labels.len()
            )));
        }
        if model.labels() != config.model.labels.as_slice() {
            tracing::warn!(
                "Model labels {:?} differ from configured labels {:?}; using the model's",
                model.labels(),
                config.model.labels
            );
        }

        Ok(Self {
            source,
            assembler,
            classifier: Classifier::new(model),
            debouncer: Debouncer::from_config(config.model.target_label, &config.debounce),
            dispatcher,
            events: EventBuilder::new(config.notifier.message.clone()),
            recency: config.source.recency,
            pacing: config.pipeline.clone(),
            stats: Arc::new(PipelineStats::new()),
            in_flight: JoinSet::new(),
        })
    }

    pub fn stats(&self) -> SharedStats {
        self.stats.clone()
    }

    pub fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    pub fn labels(&self) -> &[String] {
        self.classifier.labels()
    }

    /// Run one cycle using the current time.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, PipelineError> {
        self.run_cycle_at(Instant::now()).await
    }

    /// Run one cycle, evaluating the debouncer at `now`.
    pub async fn run_cycle_at(&mut self, now: Instant) -> Result<CycleOutcome, PipelineError> {
        self.stats.record_cycle();

        let samples = match self
            .source
            .fetch_recent_window(self.recency, self.assembler.capacity())
            .await
        {
            Ok(samples) => samples,
            Err(e) => {
                self.stats.record_source_error();
                tracing::warn!("{}", e);
                return Ok(CycleOutcome::Unavailable);
            }
        };

        let window = Window::from_samples(samples, self.assembler.capacity());
        let features = match self.assembler.assemble(&window) {
            Ok(features) => features,
            Err(incomplete) => {
                self.stats.record_incomplete();
                tracing::debug!("{}", incomplete);
                return Ok(CycleOutcome::Incomplete {
                    have: incomplete.have,
                    need: incomplete.need,
                });
            }
        };

        let result = match self.classifier.classify(&features) {
            Ok(result) => result,
            Err(e) if e.is_contract() => return Err(e.into()),
            Err(e) => {
                self.stats.record_unusable();
                tracing::warn!("Skipping window: {}", e);
                return Ok(CycleOutcome::Unusable);
            }
        };
        self.stats.record_classification();
        tracing::debug!(
            "Classified window as {} ({:.1}%)",
            result.label,
            result.confidence * 100.0
        );

        match self.debouncer.evaluate(&result, now) {
            Decision::Suppress => Ok(CycleOutcome::Suppressed(result)),
            Decision::Fire => {
                self.stats.record_fire();
                tracing::info!(
                    "Inferred {} ({:.1}%)",
                    result.label,
                    result.confidence * 100.0
                );

                let bounds = window.start().zip(window.end());
                let event = self.events.build(&result, Utc::now(), bounds);
                self.spawn_notification(event);

                Ok(CycleOutcome::Fired(result))
            }
        }
    }

    fn spawn_notification(&mut self, event: crate::core::NotificationEvent) {
        let dispatcher = self.dispatcher.clone();
        let stats = self.stats.clone();
        self.in_flight.spawn(async move {
            match dispatcher.dispatch(event).await {
                Delivery::Delivered => stats.record_delivered(),
                Delivery::Unreachable => stats.record_failed(),
            }
        });
    }

    /// Forget notification tasks that have already finished.
    fn reap_notifications(&mut self) {
        while self.in_flight.try_join_next().is_some() {}
    }

    /// Wait for every in-flight notification to settle.
    pub async fn flush(&mut self) {
        while self.in_flight.join_next().await.is_some() {}
    }

    /// Poll until `shutdown` flips to true (or its sender goes away).
    ///
    /// A cycle that has started always runs to completion; only the pauses
    /// between cycles are cut short by shutdown.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<StatsSnapshot, PipelineError> {
        tracing::info!(
            "Starting inference: {} samples per window, labels {:?}, target {}",
            self.assembler.capacity(),
            self.classifier.labels(),
            self.debouncer.target_label()
        );

        let result = self.poll(&mut shutdown).await;

        tracing::info!("Shutting down pipeline...");
        self.flush().await;
        let snapshot = self.stats.snapshot();
        tracing::info!("{}", self.stats.summary());
        // Dropping self releases the window source connection.
        drop(self);

        result.map(|_| snapshot)
    }

    async fn poll(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<(), PipelineError> {
        while !stop_requested(shutdown) {
            let pause = match self.run_cycle().await? {
                CycleOutcome::Unavailable
                | CycleOutcome::Incomplete { .. }
                | CycleOutcome::Unusable => self.pacing.idle_backoff,
                CycleOutcome::Suppressed(_) | CycleOutcome::Fired(_) => self.pacing.poll_interval,
            };

            self.reap_notifications();

            if !pause.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
        Ok(())
    }
}

fn stop_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}
