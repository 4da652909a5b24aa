//! Subscriber registry and fan-out.
//!
//! The hub owns the set of live subscribers. Each subscriber is a bounded
//! queue drained by its connection task; the hub never touches sockets
//! directly. Structural changes to the set take the write lock. A broadcast
//! snapshots the set under the read lock, releases it, then sends to every
//! subscriber concurrently.

use crate::core::event::NotificationEvent;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use uuid::Uuid;

/// Identity of one subscriber connection.
pub type SubscriberId = Uuid;

/// Handle the hub holds for one connected subscriber.
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: SubscriberId,
    sender: mpsc::Sender<NotificationEvent>,
}

impl Subscriber {
    /// Create a subscriber and the queue its connection task drains.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<NotificationEvent>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (
            Self {
                id: Uuid::new_v4(),
                sender,
            },
            receiver,
        )
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }
}

/// Hub errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    /// The hub is shutting down and accepts no new subscribers
    Closed,
}

impl std::fmt::Display for HubError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HubError::Closed => write!(f, "Broadcast hub is closed"),
        }
    }
}

impl std::error::Error for HubError {}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers that accepted the event
    pub delivered: usize,
    /// Subscribers dropped because the send failed or timed out
    pub removed: usize,
}

#[derive(Default)]
struct HubState {
    subscribers: HashMap<SubscriberId, Subscriber>,
    closed: bool,
}

/// Registry of live subscribers.
pub struct BroadcastHub {
    state: RwLock<HubState>,
    send_timeout: Duration,
}

impl BroadcastHub {
    /// Create a hub. A send that takes longer than `send_timeout` drops
    /// that subscriber.
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            state: RwLock::new(HubState::default()),
            send_timeout,
        }
    }

    /// Add a subscriber. Returns false if it was already registered.
    pub async fn register(&self, subscriber: Subscriber) -> Result<bool, HubError> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(HubError::Closed);
        }
        if state.subscribers.contains_key(&subscriber.id) {
            return Ok(false);
        }

        tracing::debug!(subscriber = %subscriber.id, "Subscriber registered");
        state.subscribers.insert(subscriber.id, subscriber);
        Ok(true)
    }

    /// Remove a subscriber. Returns false if it was not registered.
    pub async fn unregister(&self, id: SubscriberId) -> bool {
        let removed = self.state.write().await.subscribers.remove(&id).is_some();
        if removed {
            tracing::debug!(subscriber = %id, "Subscriber unregistered");
        }
        removed
    }

    /// Send `event` to every subscriber registered when the call starts.
    ///
    /// One subscriber failing never blocks the others; failed subscribers
    /// are removed once all sends have settled.
    pub async fn broadcast(&self, event: &NotificationEvent) -> BroadcastReport {
        let snapshot: Vec<Subscriber> = {
            let state = self.state.read().await;
            state.subscribers.values().cloned().collect()
        };

        if snapshot.is_empty() {
            return BroadcastReport::default();
        }

        let mut sends = JoinSet::new();
        for subscriber in snapshot {
            let event = event.clone();
            let send_timeout = self.send_timeout;
            sends.spawn(async move {
                let ok = matches!(
                    tokio::time::timeout(send_timeout, subscriber.sender.send(event)).await,
                    Ok(Ok(()))
                );
                (subscriber.id, ok)
            });
        }

        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();
        while let Some(joined) = sends.join_next().await {
            match joined {
                Ok((_, true)) => report.delivered += 1,
                Ok((id, false)) => failed.push(id),
                Err(e) => tracing::warn!("Broadcast send task failed: {}", e),
            }
        }

        if !failed.is_empty() {
            let mut state = self.state.write().await;
            for id in failed {
                if state.subscribers.remove(&id).is_some() {
                    tracing::info!(subscriber = %id, "Dropping unresponsive subscriber");
                    report.removed += 1;
                }
            }
        }

        report
    }

    /// Stop accepting registrations. Existing subscribers stay until they
    /// disconnect.
    pub async fn close(&self) {
        self.state.write().await.closed = true;
    }

    pub async fn is_closed(&self) -> bool {
        self.state.read().await.closed
    }

    pub async fn subscriber_count(&self) -> usize {
        self.state.read().await.subscribers.len()
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }
}
