//! End-to-end behaviour of the inference pipeline

use motion_notify::config::Config;
use motion_notify::core::{ClassifierError, DenseModel, Model};
use motion_notify::hub::{BroadcastHub, Subscriber};
use motion_notify::notifier::{Delivery, Dispatcher, LocalDispatcher};
use motion_notify::pipeline::{CycleOutcome, Pipeline, PipelineError};
use motion_notify::source::{Sample, SourceError, WindowSource};
use motion_notify::NotificationEvent;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const SAMPLES: usize = 125;

/// Always returns the same samples.
struct FixedSource {
    samples: Vec<Sample>,
}

impl FixedSource {
    fn zeros(n: usize) -> Self {
        Self {
            samples: (0..n).map(|_| Sample::now(0.0, 0.0, 0.0)).collect(),
        }
    }
}

impl WindowSource for FixedSource {
    async fn fetch_recent_window(
        &self,
        _recency: Duration,
        max_samples: usize,
    ) -> Result<Vec<Sample>, SourceError> {
        Ok(self.samples.iter().take(max_samples).copied().collect())
    }
}

/// Fails a set number of times, then serves a full window.
struct FlakySource {
    failures_left: AtomicUsize,
    inner: FixedSource,
}

impl WindowSource for FlakySource {
    async fn fetch_recent_window(
        &self,
        recency: Duration,
        max_samples: usize,
    ) -> Result<Vec<Sample>, SourceError> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(SourceError::Unavailable("connection refused".to_string()));
        }
        self.inner.fetch_recent_window(recency, max_samples).await
    }
}

/// Serves samples whose x axis is infinite.
struct NonFiniteSource;

impl WindowSource for NonFiniteSource {
    async fn fetch_recent_window(
        &self,
        _recency: Duration,
        max_samples: usize,
    ) -> Result<Vec<Sample>, SourceError> {
        Ok((0..max_samples)
            .map(|_| Sample::now(f32::INFINITY, 0.0, 0.0))
            .collect())
    }
}

/// Scores NaN for any non-finite input, like an unguarded network would.
struct FragileModel {
    inner: FixedModel,
}

impl Model for FragileModel {
    fn input_len(&self) -> usize {
        self.inner.input_len()
    }
    fn labels(&self) -> &[String] {
        self.inner.labels()
    }
    fn predict(&self, input: &[f32]) -> Vec<f32> {
        if input.iter().all(|v| v.is_finite()) {
            self.inner.predict(input)
        } else {
            vec![f32::NAN; self.inner.labels.len()]
        }
    }
}

/// Returns the same distribution for any input.
struct FixedModel {
    labels: Vec<String>,
    scores: Vec<f32>,
}

impl Model for FixedModel {
    fn input_len(&self) -> usize {
        SAMPLES * 3
    }
    fn labels(&self) -> &[String] {
        &self.labels
    }
    fn predict(&self, _input: &[f32]) -> Vec<f32> {
        self.scores.clone()
    }
}

/// Records payloads and answers with a fixed outcome.
struct RecordingDispatcher {
    outcome: Delivery,
    sent: Mutex<Vec<String>>,
}

impl RecordingDispatcher {
    fn new(outcome: Delivery) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            sent: Mutex::new(Vec::new()),
        })
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, event: NotificationEvent) -> Delivery {
        self.sent.lock().unwrap().push(event.payload().to_string());
        self.outcome
    }
}

fn labels() -> Vec<String> {
    Config::default().model.labels
}

fn up_down_model() -> FixedModel {
    FixedModel {
        labels: labels(),
        scores: vec![0.05, 0.05, 0.05, 0.85],
    }
}

fn config() -> Config {
    let mut config = Config::default();
    config.debounce.threshold = 0.7;
    config.debounce.cooldown = Duration::from_secs(5);
    config.model.target_label = 3;
    config
}

async fn hub_with_subscriber() -> (
    Arc<LocalDispatcher>,
    Arc<BroadcastHub>,
    mpsc::Receiver<NotificationEvent>,
) {
    let hub = Arc::new(BroadcastHub::new(Duration::from_millis(200)));
    let (subscriber, rx) = Subscriber::channel(8);
    hub.register(subscriber).await.unwrap();
    let dispatcher = Arc::new(LocalDispatcher::new(hub.clone(), Duration::from_secs(1)));
    (dispatcher, hub, rx)
}

#[tokio::test]
async fn test_zero_window_not_target_sends_nothing() {
    // Zero weights with a bias towards "idle": all-zero input lands on label 1
    let input_len = SAMPLES * 3;
    let model = DenseModel::new(
        labels(),
        input_len,
        vec![vec![0.0; input_len]; 4],
        vec![0.0, 2.0, 0.0, 0.0],
    )
    .unwrap();

    let (dispatcher, _hub, mut rx) = hub_with_subscriber().await;
    let mut pipeline =
        Pipeline::new(FixedSource::zeros(SAMPLES), model, dispatcher, &config()).unwrap();

    let outcome = pipeline.run_cycle().await.unwrap();
    match outcome {
        CycleOutcome::Suppressed(result) => assert_eq!(result.label, "idle"),
        other => panic!("unexpected outcome: {other:?}"),
    }

    pipeline.flush().await;
    assert!(rx.try_recv().is_err());
    assert_eq!(pipeline.stats().snapshot().fires, 0);
}

#[tokio::test]
async fn test_qualifying_window_fires_once_and_broadcasts() {
    let (dispatcher, _hub, mut rx) = hub_with_subscriber().await;
    let mut pipeline =
        Pipeline::new(FixedSource::zeros(SAMPLES), up_down_model(), dispatcher, &config()).unwrap();

    let outcome = pipeline.run_cycle().await.unwrap();
    match outcome {
        CycleOutcome::Fired(result) => {
            assert_eq!(result.label_index, 3);
            assert!((result.confidence - 0.85).abs() < 1e-6);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    pipeline.flush().await;

    let event = rx.try_recv().expect("one broadcast event");
    let json: serde_json::Value = serde_json::from_str(event.payload()).unwrap();
    assert_eq!(json["label"], "up-down");
    assert_eq!(json["message"], "Move!");
    assert!(rx.try_recv().is_err());

    let stats = pipeline.stats().snapshot();
    assert_eq!(stats.fires, 1);
    assert_eq!(stats.notifications_delivered, 1);
}

#[tokio::test]
async fn test_repeat_within_cooldown_fires_once() {
    let dispatcher = RecordingDispatcher::new(Delivery::Delivered);
    let mut pipeline = Pipeline::new(
        FixedSource::zeros(SAMPLES),
        up_down_model(),
        dispatcher.clone(),
        &config(),
    )
    .unwrap();

    let t0 = Instant::now();
    let first = pipeline.run_cycle_at(t0).await.unwrap();
    let second = pipeline
        .run_cycle_at(t0 + Duration::from_secs(1))
        .await
        .unwrap();

    assert!(matches!(first, CycleOutcome::Fired(_)));
    assert!(matches!(second, CycleOutcome::Suppressed(_)));

    pipeline.flush().await;
    assert_eq!(dispatcher.sent().len(), 1);

    // Past the cooldown the same gesture fires again
    let third = pipeline
        .run_cycle_at(t0 + Duration::from_secs(6))
        .await
        .unwrap();
    assert!(matches!(third, CycleOutcome::Fired(_)));
    pipeline.flush().await;
    assert_eq!(dispatcher.sent().len(), 2);
}

#[tokio::test]
async fn test_failed_subscriber_does_not_block_healthy_one() {
    let hub = Arc::new(BroadcastHub::new(Duration::from_millis(200)));
    let (healthy, mut healthy_rx) = Subscriber::channel(8);
    let (broken, broken_rx) = Subscriber::channel(8);
    hub.register(healthy).await.unwrap();
    hub.register(broken).await.unwrap();
    drop(broken_rx);

    let dispatcher = Arc::new(LocalDispatcher::new(hub.clone(), Duration::from_secs(1)));
    let mut pipeline =
        Pipeline::new(FixedSource::zeros(SAMPLES), up_down_model(), dispatcher, &config()).unwrap();

    pipeline.run_cycle().await.unwrap();
    pipeline.flush().await;

    assert!(healthy_rx.try_recv().is_ok());
    assert_eq!(hub.subscriber_count().await, 1);
}

#[tokio::test]
async fn test_short_window_is_skipped() {
    let dispatcher = RecordingDispatcher::new(Delivery::Delivered);
    let mut pipeline = Pipeline::new(
        FixedSource::zeros(SAMPLES - 1),
        up_down_model(),
        dispatcher.clone(),
        &config(),
    )
    .unwrap();

    let outcome = pipeline.run_cycle().await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Incomplete {
            have: SAMPLES - 1,
            need: SAMPLES
        }
    );
    assert_eq!(pipeline.stats().snapshot().classifications, 0);
    assert!(dispatcher.sent().is_empty());
}

#[tokio::test]
async fn test_unavailable_source_is_transient() {
    let source = FlakySource {
        failures_left: AtomicUsize::new(2),
        inner: FixedSource::zeros(SAMPLES),
    };
    let dispatcher = RecordingDispatcher::new(Delivery::Delivered);
    let mut pipeline = Pipeline::new(source, up_down_model(), dispatcher, &config()).unwrap();

    assert_eq!(pipeline.run_cycle().await.unwrap(), CycleOutcome::Unavailable);
    assert_eq!(pipeline.run_cycle().await.unwrap(), CycleOutcome::Unavailable);
    assert!(matches!(
        pipeline.run_cycle().await.unwrap(),
        CycleOutcome::Fired(_)
    ));
    assert_eq!(pipeline.stats().snapshot().source_errors, 2);
}

#[tokio::test]
async fn test_unreachable_hub_does_not_stop_pipeline() {
    let dispatcher = RecordingDispatcher::new(Delivery::Unreachable);
    let mut pipeline = Pipeline::new(
        FixedSource::zeros(SAMPLES),
        up_down_model(),
        dispatcher.clone(),
        &config(),
    )
    .unwrap();

    let t0 = Instant::now();
    assert!(matches!(
        pipeline.run_cycle_at(t0).await.unwrap(),
        CycleOutcome::Fired(_)
    ));
    assert!(matches!(
        pipeline.run_cycle_at(t0 + Duration::from_secs(10)).await.unwrap(),
        CycleOutcome::Fired(_)
    ));

    pipeline.flush().await;
    let stats = pipeline.stats().snapshot();
    assert_eq!(stats.notifications_failed, 2);
    assert_eq!(stats.notifications_delivered, 0);
}

#[tokio::test]
async fn test_low_confidence_target_is_suppressed() {
    let model = FixedModel {
        labels: labels(),
        scores: vec![0.1, 0.1, 0.1, 0.7],
    };
    let dispatcher = RecordingDispatcher::new(Delivery::Delivered);
    let mut pipeline =
        Pipeline::new(FixedSource::zeros(SAMPLES), model, dispatcher.clone(), &config()).unwrap();

    assert!(matches!(
        pipeline.run_cycle().await.unwrap(),
        CycleOutcome::Suppressed(_)
    ));
    assert_eq!(pipeline.debouncer().state().last_fired_at, None);
    assert!(dispatcher.sent().is_empty());
}

#[tokio::test]
async fn test_unscorable_window_is_skipped() {
    let model = FragileModel {
        inner: up_down_model(),
    };
    let dispatcher = RecordingDispatcher::new(Delivery::Delivered);
    let mut pipeline =
        Pipeline::new(NonFiniteSource, model, dispatcher.clone(), &config()).unwrap();

    assert_eq!(pipeline.run_cycle().await.unwrap(), CycleOutcome::Unusable);
    assert_eq!(pipeline.run_cycle().await.unwrap(), CycleOutcome::Unusable);

    let stats = pipeline.stats().snapshot();
    assert_eq!(stats.unusable_windows, 2);
    assert_eq!(stats.classifications, 0);
    assert!(dispatcher.sent().is_empty());
}

#[tokio::test]
async fn test_run_survives_unscorable_windows() {
    let model = FragileModel {
        inner: up_down_model(),
    };
    let mut config = config();
    config.pipeline.idle_backoff = Duration::from_millis(10);
    let dispatcher = RecordingDispatcher::new(Delivery::Delivered);
    let pipeline = Pipeline::new(NonFiniteSource, model, dispatcher, &config).unwrap();

    let (tx, rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(pipeline.run(rx));
    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(true).unwrap();

    let snapshot = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("pipeline did not stop")
        .unwrap()
        .expect("unscorable windows must not stop the pipeline");
    assert!(snapshot.unusable_windows >= 2);
    assert_eq!(snapshot.fires, 0);
}

#[tokio::test]
async fn test_model_scoring_wrong_label_count_is_fatal() {
    let model = FixedModel {
        labels: labels(),
        scores: vec![0.1, 0.1, 0.1, 0.1, 0.6],
    };
    let dispatcher = RecordingDispatcher::new(Delivery::Delivered);
    let mut pipeline =
        Pipeline::new(FixedSource::zeros(SAMPLES), model, dispatcher, &config()).unwrap();

    assert!(matches!(
        pipeline.run_cycle().await,
        Err(PipelineError::Classifier(ClassifierError::OutputLength {
            expected: 4,
            actual: 5
        }))
    ));
}
