//! Threshold and cooldown gating for detections.
//!
//! Sensor noise produces bursts of qualifying frames for a single physical
//! gesture. The debouncer lets the first one through and suppresses the rest
//! until `cooldown` has passed since the last firing.

use crate::config::DebounceConfig;
use crate::core::classifier::ClassificationResult;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Outcome of evaluating one classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Fire,
    Suppress,
}

/// What the debouncer remembers between evaluations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebounceState {
    pub last_fired_label: Option<usize>,
    pub last_fired_at: Option<Instant>,
}

/// Detection gate: Idle until a qualifying result fires, then Cooldown.
#[derive(Debug)]
pub struct Debouncer {
    target_label: usize,
    threshold: f32,
    cooldown: Duration,
    state: Mutex<DebounceState>,
}

impl Debouncer {
    pub fn new(target_label: usize, threshold: f32, cooldown: Duration) -> Self {
        Self {
            target_label,
            threshold,
            cooldown,
            state: Mutex::new(DebounceState::default()),
        }
    }

    pub fn from_config(target_label: usize, config: &DebounceConfig) -> Self {
        Self::new(target_label, config.threshold, config.cooldown)
    }

    pub fn target_label(&self) -> usize {
        self.target_label
    }

    /// Decide whether `result` observed at `now` should fire.
    ///
    /// The check and the state update happen under one lock, so concurrent
    /// callers can never both fire inside the same cooldown.
    pub fn evaluate(&self, result: &ClassificationResult, now: Instant) -> Decision {
        if result.label_index != self.target_label || result.confidence <= self.threshold {
            return Decision::Suppress;
        }

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let cooled_down = match state.last_fired_at {
            Some(last) => now.saturating_duration_since(last) > self.cooldown,
            None => true,
        };
        if !cooled_down {
            return Decision::Suppress;
        }

        state.last_fired_label = Some(result.label_index);
        state.last_fired_at = Some(now);
        Decision::Fire
    }

    /// Current state, mostly for inspection in logs and tests.
    pub fn state(&self) -> DebounceState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn result(label_index: usize, confidence: f32) -> ClassificationResult {
        ClassificationResult {
            label_index,
            label: format!("l{label_index}"),
            confidence,
        }
    }

    fn debouncer() -> Debouncer {
        Debouncer::new(3, 0.7, Duration::from_secs(5))
    }

    #[test]
    fn test_non_qualifying_results_leave_state_alone() {
        let debouncer = debouncer();
        let now = Instant::now();

        assert_eq!(debouncer.evaluate(&result(1, 0.99), now), Decision::Suppress);
        assert_eq!(debouncer.evaluate(&result(3, 0.7), now), Decision::Suppress);
        assert_eq!(debouncer.evaluate(&result(3, 0.2), now), Decision::Suppress);
        assert_eq!(debouncer.state(), DebounceState::default());
    }

    #[test]
    fn test_first_qualifying_result_fires() {
        let debouncer = debouncer();
        let now = Instant::now();

        assert_eq!(debouncer.evaluate(&result(3, 0.85), now), Decision::Fire);
        let state = debouncer.state();
        assert_eq!(state.last_fired_label, Some(3));
        assert_eq!(state.last_fired_at, Some(now));
    }

    #[test]
    fn test_cooldown_boundary() {
        let debouncer = debouncer();
        let t0 = Instant::now();

        assert_eq!(debouncer.evaluate(&result(3, 0.9), t0), Decision::Fire);
        assert_eq!(
            debouncer.evaluate(&result(3, 0.9), t0 + Duration::from_secs(1)),
            Decision::Suppress
        );
        // Exactly at the cooldown is still suppressed
        assert_eq!(
            debouncer.evaluate(&result(3, 0.9), t0 + Duration::from_secs(5)),
            Decision::Suppress
        );
        let t1 = t0 + Duration::from_secs(5) + Duration::from_millis(1);
        assert_eq!(debouncer.evaluate(&result(3, 0.9), t1), Decision::Fire);
        assert_eq!(debouncer.state().last_fired_at, Some(t1));
    }

    #[test]
    fn test_suppressed_results_do_not_extend_cooldown() {
        let debouncer = debouncer();
        let t0 = Instant::now();

        debouncer.evaluate(&result(3, 0.9), t0);
        debouncer.evaluate(&result(3, 0.9), t0 + Duration::from_secs(4));
        assert_eq!(
            debouncer.evaluate(&result(3, 0.9), t0 + Duration::from_secs(6)),
            Decision::Fire
        );
    }

    #[test]
    fn test_concurrent_evaluations_fire_once() {
        let debouncer = debouncer();
        let now = Instant::now();
        let fires = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..16 {
                scope.spawn(|| {
                    if debouncer.evaluate(&result(3, 0.95), now) == Decision::Fire {
                        fires.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(fires.load(Ordering::SeqCst), 1);
    }
}
