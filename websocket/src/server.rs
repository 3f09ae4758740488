//! WebSocket server implementation.
//!
//! Accepts WebSocket connections at `/ws` and allows clients to subscribe
//! to real-time event topics (recovery, fraud, admission). Events are
//! delivered via broadcast channels and filtered per-client based on
//! subscription filters.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::WsError;
use crate::subscriptions::{
    ClientMessage, ClientSubscriptions, ServerMessage, SubscriptionEvent, SubscriptionFilter,
    SubscriptionTopic,
};

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Shared state for the WebSocket server, holding broadcast channels
/// for each event topic.
pub struct WsState {
    pub recovery_tx: broadcast::Sender<String>,
    pub fraud_tx: broadcast::Sender<String>,
    pub admission_tx: broadcast::Sender<String>,
}

impl WsState {
    /// Create a new `WsState` with the given channel capacity for each topic.
    pub fn new(channel_capacity: usize) -> Self {
        let (recovery_tx, _) = broadcast::channel(channel_capacity);
        let (fraud_tx, _) = broadcast::channel(channel_capacity);
        let (admission_tx, _) = broadcast::channel(channel_capacity);
        Self {
            recovery_tx,
            fraud_tx,
            admission_tx,
        }
    }

    /// Get the broadcast sender for a given topic.
    pub fn sender_for(&self, topic: &SubscriptionTopic) -> &broadcast::Sender<String> {
        match topic {
            SubscriptionTopic::Recovery => &self.recovery_tx,
            SubscriptionTopic::Fraud => &self.fraud_tx,
            SubscriptionTopic::Admission => &self.admission_tx,
        }
    }

    /// Publish arbitrary event data on a topic. Returns the number of
    /// connected receivers.
    pub fn publish(&self, topic: SubscriptionTopic, data: serde_json::Value) -> usize {
        let event = SubscriptionEvent {
            topic: topic.as_str().to_owned(),
            data,
            timestamp: unix_timestamp_millis(),
        };
        match serde_json::to_string(&event) {
            Ok(text) => self.sender_for(&topic).send(text).unwrap_or(0),
            Err(e) => {
                warn!("failed to encode {} event: {}", topic, e);
                0
            }
        }
    }

    /// Publish a recovery progress snapshot. The value must carry a
    /// `request_id` field for filtering.
    pub fn publish_recovery<T: Serialize>(&self, progress: &T) -> usize {
        match serde_json::to_value(progress) {
            Ok(data) => self.publish(SubscriptionTopic::Recovery, data),
            Err(e) => {
                warn!("failed to encode recovery progress: {}", e);
                0
            }
        }
    }

    /// Publish a fraud block.
    pub fn publish_fraud(&self, source: &str, reason: &str, newly_blocked: bool) -> usize {
        self.publish(
            SubscriptionTopic::Fraud,
            serde_json::json!({
                "event_type": "blocked",
                "source": source,
                "reason": reason,
                "newly_blocked": newly_blocked,
            }),
        )
    }

    /// Publish an operator unblock.
    pub fn publish_unblock(&self, source: &str, operator: &str) -> usize {
        self.publish(
            SubscriptionTopic::Fraud,
            serde_json::json!({
                "event_type": "unblocked",
                "source": source,
                "operator": operator,
            }),
        )
    }

    /// Publish an admitted presence.
    pub fn publish_admission(&self, source: &str, handshake_id: &str) -> usize {
        self.publish(
            SubscriptionTopic::Admission,
            serde_json::json!({
                "source": source,
                "handshake_id": handshake_id,
            }),
        )
    }
}

impl Default for WsState {
    fn default() -> Self {
        Self::new(256)
    }
}

/// The WebSocket server, configured with a port and shared state.
pub struct WebSocketServer {
    pub port: u16,
    pub state: Arc<WsState>,
}

impl WebSocketServer {
    /// Create a new server with a default channel capacity of 256.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            state: Arc::new(WsState::default()),
        }
    }

    /// Create a new server with the provided shared state.
    pub fn with_state(port: u16, state: Arc<WsState>) -> Self {
        Self { port, state }
    }

    /// Bind and serve until `shutdown` fires.
    pub async fn start(&self, shutdown: broadcast::Receiver<()>) -> Result<(), WsError> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| WsError::Bind { addr: addr.clone(), source })?;
        info!("WebSocket server listening on {}", addr);
        serve(listener, self.state.clone(), shutdown).await
    }
}

/// Router exposing `/ws`.
pub fn router(state: Arc<WsState>) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(state)
}

/// Serve on an already-bound listener until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    state: Arc<WsState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), WsError> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;
    Ok(())
}

/// Axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<WsState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a single WebSocket connection.
///
/// Each subscribed topic gets its own forwarder task reading the topic's
/// broadcast channel; all forwarders are aborted when the client leaves.
async fn handle_socket(socket: WebSocket, state: Arc<WsState>) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let ws_sender: WsSender = Arc::new(Mutex::new(ws_sender));

    let mut client_subs = ClientSubscriptions::new();
    let mut forwarders: HashMap<SubscriptionTopic, JoinHandle<()>> = HashMap::new();

    debug!("New WebSocket client connected");

    while let Some(msg_result) = ws_receiver.next().await {
        let msg = match msg_result {
            Ok(msg) => msg,
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                handle_text_message(&text, &state, &mut client_subs, &mut forwarders, &ws_sender)
                    .await;
            }
            Message::Close(_) => {
                debug!("Client sent close frame");
                break;
            }
            Message::Ping(data) => {
                let mut sender = ws_sender.lock().await;
                let _ = sender.send(Message::Pong(data)).await;
            }
            _ => {}
        }
    }

    for (topic, handle) in forwarders.drain() {
        debug!("Aborting forwarder for topic: {}", topic);
        handle.abort();
    }
    debug!("WebSocket client disconnected");
}

async fn reply(ws_sender: &WsSender, message: &ServerMessage) {
    let mut sender = ws_sender.lock().await;
    let _ = sender.send(Message::Text(message.to_json())).await;
}

/// Process a text message from the client.
async fn handle_text_message(
    text: &str,
    state: &Arc<WsState>,
    client_subs: &mut ClientSubscriptions,
    forwarders: &mut HashMap<SubscriptionTopic, JoinHandle<()>>,
    ws_sender: &WsSender,
) {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            let error = ServerMessage::Error {
                message: format!("Invalid message: {}", e),
            };
            reply(ws_sender, &error).await;
            return;
        }
    };

    match client_msg {
        ClientMessage::Subscribe { topic, filter } => {
            if let Some(handle) = forwarders.remove(&topic) {
                handle.abort();
            }
            client_subs.subscribe(topic.clone(), filter.clone());

            let rx = state.sender_for(&topic).subscribe();
            let handle = tokio::spawn(forward_events(rx, ws_sender.clone(), topic.clone(), filter));
            forwarders.insert(topic.clone(), handle);

            reply(
                ws_sender,
                &ServerMessage::Ack {
                    action: "subscribe".to_owned(),
                    topic: topic.clone(),
                },
            )
            .await;
            debug!("Client subscribed to {}", topic);
        }
        ClientMessage::Unsubscribe { topic } => {
            let was_subscribed = client_subs.unsubscribe(&topic);
            if let Some(handle) = forwarders.remove(&topic) {
                handle.abort();
            }
            let response = if was_subscribed {
                ServerMessage::Ack {
                    action: "unsubscribe".to_owned(),
                    topic: topic.clone(),
                }
            } else {
                ServerMessage::Error {
                    message: format!("Not subscribed to {}", topic),
                }
            };
            reply(ws_sender, &response).await;
            debug!("Client unsubscribed from {}", topic);
        }
        ClientMessage::Ping => reply(ws_sender, &ServerMessage::Pong).await,
    }
}

/// Forwarder task: reads events from a broadcast receiver and sends matching
/// ones to the WebSocket client.
async fn forward_events(
    mut rx: broadcast::Receiver<String>,
    ws_sender: WsSender,
    topic: SubscriptionTopic,
    filter: Option<SubscriptionFilter>,
) {
    let mut matcher = ClientSubscriptions::new();
    matcher.subscribe(topic.clone(), filter);

    loop {
        match rx.recv().await {
            Ok(event_str) => {
                let should_send = match serde_json::from_str::<SubscriptionEvent>(&event_str) {
                    Ok(event) => matcher.matches_filter(&topic, &event),
                    Err(_) => false,
                };
                if should_send {
                    let mut sender = ws_sender.lock().await;
                    if sender.send(Message::Text(event_str)).await.is_err() {
                        break;
                    }
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Client lagged behind by {} events on topic {}", n, topic);
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("Broadcast channel closed for topic {}", topic);
                break;
            }
        }
    }
}

fn unix_timestamp_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
