//! HTTP and WebSocket front of the broadcast hub.
//!
//! This module provides a server that:
//! - Accepts events from notifiers via POST /notify
//! - Accepts subscribers via GET /ws (WebSocket)
//! - Fans every accepted event out to all connected subscribers
//!
//! # Architecture
//!
//! ```text
//! pipeline ──→ POST /notify ──→ BroadcastHub ──→ /ws subscriber 1
//!                                    │      └──→ /ws subscriber 2
//!                                    └─────────→ ...
//! ```

use crate::config::HubConfig;
use crate::core::event::NotificationEvent;
use crate::hub::{BroadcastHub, Subscriber};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared server state
pub struct ServerState {
    /// Subscriber registry
    hub: Arc<BroadcastHub>,
    /// Events queued per subscriber connection
    subscriber_buffer: usize,
}

/// Response from the notify endpoint
#[derive(Debug, Clone, Serialize)]
pub struct NotifyResponse {
    pub status: String,
    pub delivered: usize,
    pub removed: usize,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub subscribers: usize,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// GET /health
async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        subscribers: state.hub.subscriber_count().await,
    })
}

/// POST /notify
///
/// The request body is taken as an opaque text event and broadcast to every
/// current subscriber.
async fn notify(
    State(state): State<Arc<ServerState>>,
    body: String,
) -> Result<Json<NotifyResponse>, (StatusCode, Json<ErrorResponse>)> {
    if body.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Event payload must not be empty".to_string(),
                code: "EMPTY_EVENT".to_string(),
            }),
        ));
    }

    let report = state.hub.broadcast(&NotificationEvent::new(body)).await;
    tracing::info!(
        "Event broadcast to {} subscriber(s), {} dropped",
        report.delivered,
        report.removed
    );

    Ok(Json(NotifyResponse {
        status: "ok".to_string(),
        delivered: report.delivered,
        removed: report.removed,
    }))
}

/// GET /ws
///
/// Subscribers only receive. Text they send is logged and discarded, so a
/// publisher must use POST /notify rather than writing to this socket.
async fn subscribe(ws: WebSocketUpgrade, State(state): State<Arc<ServerState>>) -> Response {
    ws.on_upgrade(move |socket| serve_subscriber(socket, state))
}

/// Push events to one subscriber until it goes away.
///
/// Inbound frames are drained so a disconnect is noticed promptly even when
/// no events are flowing.
async fn serve_subscriber(mut socket: WebSocket, state: Arc<ServerState>) {
    let (subscriber, mut events) = Subscriber::channel(state.subscriber_buffer);
    let id = subscriber.id();

    if let Err(e) = state.hub.register(subscriber).await {
        tracing::info!("Refusing subscriber: {}", e);
        let _ = socket.send(Message::Close(None)).await;
        return;
    }
    tracing::info!(subscriber = %id, "Subscriber connected");

    let send_timeout = state.hub.send_timeout();

    loop {
        tokio::select! {
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    tracing::info!(subscriber = %id, "Ignoring inbound message: {}", text);
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(subscriber = %id, "Socket error: {}", e);
                    break;
                }
            },
            event = events.recv() => match event {
                Some(event) => {
                    let send = socket.send(Message::Text(event.payload().to_string()));
                    match tokio::time::timeout(send_timeout, send).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::debug!(subscriber = %id, "Send failed: {}", e);
                            break;
                        }
                        Err(_) => {
                            tracing::info!(subscriber = %id, "Send timed out");
                            break;
                        }
                    }
                }
                // The hub dropped this subscriber
                None => break,
            },
        }
    }

    state.hub.unregister(id).await;
    tracing::info!(subscriber = %id, "Subscriber disconnected");
}

/// Build the router for a hub.
pub fn router(hub: Arc<BroadcastHub>, subscriber_buffer: usize) -> Router {
    let state = Arc::new(ServerState {
        hub,
        subscriber_buffer,
    });

    Router::new()
        .route("/health", get(health))
        .route("/notify", post(notify))
        .route("/ws", get(subscribe))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A running hub server.
pub struct ServerHandle {
    /// Address the listener is bound to
    pub addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting subscribers and wait for the server to wind down.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if tokio::time::timeout(SHUTDOWN_GRACE, self.task).await.is_err() {
            tracing::warn!("Hub server did not stop within {:?}", SHUTDOWN_GRACE);
        }
    }
}

/// How long open HTTP connections get to finish on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Run the hub server.
///
/// Binding happens before this returns, so a bad listen address is reported
/// to the caller. Once shutdown starts the hub stops accepting new
/// subscribers.
pub async fn run(config: &HubConfig, hub: Arc<BroadcastHub>) -> anyhow::Result<ServerHandle> {
    let app = router(hub.clone(), config.subscriber_buffer);

    let listener = TcpListener::bind(config.listen_addr.as_str()).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Broadcast hub listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
                tracing::info!("Hub shutdown signal received");
                hub.close().await;
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(ServerHandle {
        addr: actual_addr,
        shutdown_tx,
        task,
    })
}
