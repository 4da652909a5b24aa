//! Delivery of detection events to the broadcast hub.
//!
//! Delivery is best effort: one attempt per detection, bounded by a timeout,
//! failures logged and dropped. The next detection after cooldown is the
//! natural retry.

use crate::config::NotifierConfig;
use crate::core::event::NotificationEvent;
use crate::hub::BroadcastHub;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Unreachable,
}

/// Something that can hand an event to the hub.
pub trait Dispatcher: Send + Sync + 'static {
    /// Make a single delivery attempt. Never fails loudly.
    fn dispatch(&self, event: NotificationEvent) -> impl Future<Output = Delivery> + Send;
}

/// Notifier client errors.
#[derive(Debug)]
pub enum NotifierError {
    /// Configuration error
    Config(String),
    /// Network/HTTP error
    Network(String),
    /// Hub returned an error response
    Server { status: u16, message: String },
    /// No response within the configured timeout
    Timeout,
}

impl std::fmt::Display for NotifierError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifierError::Config(msg) => write!(f, "Notifier config error: {msg}"),
            NotifierError::Network(msg) => write!(f, "Notifier network error: {msg}"),
            NotifierError::Server { status, message } => {
                write!(f, "Hub returned error ({status}): {message}")
            }
            NotifierError::Timeout => write!(f, "Hub did not answer in time"),
        }
    }
}

impl std::error::Error for NotifierError {}

/// Posts events to a hub's `/notify` ingress over HTTP.
pub struct HttpDispatcher {
    hub_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpDispatcher {
    /// Create a new dispatcher.
    pub fn new(config: &NotifierConfig) -> Result<Self, NotifierError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NotifierError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            hub_url: config.hub_url.trim_end_matches('/').to_string(),
            client,
            timeout: config.timeout,
        })
    }

    /// Get the ingress endpoint URL.
    pub fn notify_url(&self) -> String {
        format!("{}/notify", self.hub_url)
    }

    /// Get the health check endpoint URL.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.hub_url)
    }

    /// Test connection to the hub.
    pub async fn test_connection(&self) -> Result<bool, NotifierError> {
        let response = self
            .client
            .get(self.health_url())
            .send()
            .await
            .map_err(|e| NotifierError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    /// Send one event, reporting why it failed.
    pub async fn send(&self, event: &NotificationEvent) -> Result<(), NotifierError> {
        let request = self
            .client
            .post(self.notify_url())
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(event.payload().to_string())
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| NotifierError::Timeout)?
            .map_err(|e| {
                if e.is_timeout() {
                    NotifierError::Timeout
                } else {
                    NotifierError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(NotifierError::Server {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, event: NotificationEvent) -> Delivery {
        match self.send(&event).await {
            Ok(()) => {
                tracing::debug!("Notification delivered to {}", self.hub_url);
                Delivery::Delivered
            }
            Err(e) => {
                tracing::warn!("Notification dropped: {}", e);
                Delivery::Unreachable
            }
        }
    }
}

/// Hands events straight to an in-process hub.
pub struct LocalDispatcher {
    hub: Arc<BroadcastHub>,
    timeout: Duration,
}

impl LocalDispatcher {
    pub fn new(hub: Arc<BroadcastHub>, timeout: Duration) -> Self {
        Self { hub, timeout }
    }
}

impl Dispatcher for LocalDispatcher {
    async fn dispatch(&self, event: NotificationEvent) -> Delivery {
        match tokio::time::timeout(self.timeout, self.hub.broadcast(&event)).await {
            Ok(report) => {
                tracing::debug!(
                    "Notification fanned out to {} subscriber(s), {} dropped",
                    report.delivered,
                    report.removed
                );
                Delivery::Delivered
            }
            Err(_) => {
                tracing::warn!("Notification dropped: local broadcast timed out");
                Delivery::Unreachable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::Subscriber;

    #[test]
    fn test_notifier_urls() {
        let config = NotifierConfig {
            hub_url: "http://127.0.0.1:8765/".to_string(),
            ..NotifierConfig::default()
        };
        let dispatcher = HttpDispatcher::new(&config).unwrap();
        assert_eq!(dispatcher.notify_url(), "http://127.0.0.1:8765/notify");
        assert_eq!(dispatcher.health_url(), "http://127.0.0.1:8765/health");
    }

    #[tokio::test]
    async fn test_unreachable_hub_is_swallowed() {
        // Port 9 (discard) is not expected to run an HTTP server
        let config = NotifierConfig {
            hub_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_millis(500),
            ..NotifierConfig::default()
        };
        let dispatcher = HttpDispatcher::new(&config).unwrap();
        let delivery = dispatcher.dispatch(NotificationEvent::new("Move!")).await;
        assert_eq!(delivery, Delivery::Unreachable);
    }

    #[tokio::test]
    async fn test_local_dispatch_reaches_subscribers() {
        let hub = Arc::new(BroadcastHub::new(Duration::from_millis(100)));
        let (subscriber, mut rx) = Subscriber::channel(4);
        hub.register(subscriber).await.unwrap();

        let dispatcher = LocalDispatcher::new(hub, Duration::from_secs(1));
        let delivery = dispatcher.dispatch(NotificationEvent::new("Move!")).await;

        assert_eq!(delivery, Delivery::Delivered);
        assert_eq!(rx.recv().await.unwrap().payload(), "Move!");
    }
}
