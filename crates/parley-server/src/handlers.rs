//! Connection handlers for the Parley server.
//!
//! This module owns the connection lifecycle: WebSocket upgrade, the
//! authentication handshake, the per-session event loop, and disconnect
//! cleanup. Event semantics live in [`crate::events`].

use crate::config::Config;
use crate::events::{self, ReplySender};
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router as HttpRouter,
};
use bytes::BytesMut;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parley_core::{
    Authenticator, ConversationStore, OnlineRegistry, Router, RouterConfig, UserDirectory,
};
use parley_protocol::{codec, Frame, UserId, PROTOCOL_VERSION};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Personal-channel fan-out router.
    pub router: Router,
    /// Online-user registry.
    pub registry: OnlineRegistry,
    /// Authentication collaborator.
    pub auth: Arc<dyn Authenticator>,
    /// User directory collaborator.
    pub directory: Arc<dyn UserDirectory>,
    /// Conversation storage collaborator.
    pub store: Arc<dyn ConversationStore>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(
        config: Config,
        auth: Arc<dyn Authenticator>,
        directory: Arc<dyn UserDirectory>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        let router_config = RouterConfig {
            channel_capacity: config.limits.channel_capacity,
            ..RouterConfig::default()
        };

        Self {
            router: Router::with_config(router_config),
            registry: OnlineRegistry::new(),
            auth,
            directory,
            store,
            config,
        }
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(state: Arc<AppState>) -> Result<()> {
    // Start metrics server if enabled
    if state.config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(state.config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let app = HttpRouter::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state.clone());

    let addr = state.config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Parley server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, state.config.transport.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection from handshake to disconnect.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    // Generate connection ID
    let connection_id = format!(
        "conn_{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    );

    debug!(connection = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    // Read buffer for partial frames
    let mut read_buffer = BytesMut::with_capacity(4096);

    // Authentication gate: a connection that cannot prove an identity
    // within the handshake window never reaches the event loop.
    let handshake = tokio::time::timeout(
        Duration::from_millis(state.config.transport.handshake_timeout_ms),
        authenticate(&mut receiver, &mut read_buffer, &state, &connection_id),
    )
    .await;

    let user_id = match handshake {
        Ok(Some(user_id)) => user_id,
        Ok(None) => {
            metrics::record_auth_failure();
            let _ = sender.close().await;
            return;
        }
        Err(_) => {
            warn!(connection = %connection_id, "Handshake timed out");
            metrics::record_auth_failure();
            let _ = sender.close().await;
            return;
        }
    };

    // Send Connected frame
    let connected = Frame::connected(
        &connection_id,
        PROTOCOL_VERSION.major,
        state.config.heartbeat.interval_ms as u32,
    );
    if send_frame(&mut sender, &connected).await.is_err() {
        error!(connection = %connection_id, "Failed to send Connected frame");
        return;
    }

    // Join the personal channel and the presence broadcast
    let personal_rx = match state.router.subscribe(&connection_id, &user_id) {
        Ok(rx) => rx,
        Err(e) => {
            error!(connection = %connection_id, user = %user_id, error = %e, "Channel join failed");
            let _ = sender.close().await;
            return;
        }
    };
    let broadcast_rx = state.router.subscribe_broadcast();

    // Session outbound queue, fed by channel forwarders and direct replies
    let (session_tx, mut session_rx) = mpsc::unbounded_channel::<Arc<Frame>>();
    let forward_tasks = vec![
        spawn_forward(personal_rx, session_tx.clone()),
        spawn_forward(broadcast_rx, session_tx.clone()),
    ];

    state.registry.connect(&user_id);
    events::broadcast_presence(&state);

    debug!(connection = %connection_id, user = %user_id, "Session authenticated");

    // Event loop
    loop {
        tokio::select! {
            biased;

            // Deliver queued outbound frames
            Some(frame) = session_rx.recv() => {
                if send_frame(&mut sender, &frame).await.is_err() {
                    break;
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        if data.len() > state.config.limits.max_message_size {
                            warn!(connection = %connection_id, bytes = data.len(), "Oversized message dropped");
                            continue;
                        }

                        let start = Instant::now();
                        metrics::record_message(data.len(), "inbound");
                        read_buffer.extend_from_slice(&data);

                        if !drain_frames(&state, &user_id, &connection_id, &mut read_buffer, &session_tx).await {
                            break;
                        }

                        metrics::record_latency(start.elapsed().as_secs_f64());
                    }
                    Some(Ok(Message::Text(text))) => {
                        // Treat text as binary
                        read_buffer.extend_from_slice(text.as_bytes());
                        if !drain_frames(&state, &user_id, &connection_id, &mut read_buffer, &session_tx).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Cleanup: stop channel forwarders, leave all channels
    for task in forward_tasks {
        task.abort();
    }
    state.router.unsubscribe_all(&connection_id);

    // Presence only changes when the last session goes away
    if state.registry.disconnect(&user_id) {
        events::broadcast_presence(&state);
    }

    debug!(connection = %connection_id, user = %user_id, "WebSocket disconnected");
}

/// Run the authentication handshake.
///
/// The first decodable frame must be `connect`; its token is resolved by
/// the authentication collaborator. Any failure is fatal for the
/// connection and yields `None`.
async fn authenticate(
    receiver: &mut SplitStream<WebSocket>,
    read_buffer: &mut BytesMut,
    state: &Arc<AppState>,
    connection_id: &str,
) -> Option<UserId> {
    let frame = read_handshake_frame(receiver, read_buffer, connection_id).await?;

    let (version, token) = match frame {
        Frame::Connect { version, token } => (version, token),
        other => {
            warn!(
                connection = %connection_id,
                frame_type = other.frame_type().name(),
                "Expected connect frame"
            );
            return None;
        }
    };

    if !PROTOCOL_VERSION.accepts_major(version) {
        warn!(connection = %connection_id, version, "Incompatible protocol version");
        return None;
    }

    match state.auth.resolve_user(&token).await {
        Ok(user_id) => Some(user_id),
        Err(e) => {
            warn!(connection = %connection_id, error = %e, "Authentication failed");
            None
        }
    }
}

/// Read the first complete frame during the handshake.
async fn read_handshake_frame(
    receiver: &mut SplitStream<WebSocket>,
    read_buffer: &mut BytesMut,
    connection_id: &str,
) -> Option<Frame> {
    loop {
        match codec::decode_from(read_buffer) {
            Ok(Some(frame)) => return Some(frame),
            Ok(None) => {}
            Err(e) => {
                warn!(connection = %connection_id, error = %e, "Malformed handshake frame");
                return None;
            }
        }

        match receiver.next().await {
            Some(Ok(Message::Binary(data))) => read_buffer.extend_from_slice(&data),
            Some(Ok(Message::Text(text))) => read_buffer.extend_from_slice(text.as_bytes()),
            Some(Ok(Message::Ping(_)) | Ok(Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) | None => return None,
            Some(Err(e)) => {
                warn!(connection = %connection_id, error = %e, "WebSocket error during handshake");
                return None;
            }
        }
    }
}

/// Decode and dispatch every complete frame in the read buffer.
///
/// Handler-local failures are logged and counted; only a protocol-level
/// decode error tears the connection down. Returns `false` when the
/// connection should close.
async fn drain_frames(
    state: &Arc<AppState>,
    user_id: &UserId,
    connection_id: &str,
    read_buffer: &mut BytesMut,
    session_tx: &ReplySender,
) -> bool {
    loop {
        match codec::decode_from(read_buffer) {
            Ok(Some(frame)) => {
                let event = frame.frame_type();
                metrics::record_event(event.name());

                if let Err(e) = events::handle_event(state, user_id, frame, session_tx).await {
                    metrics::record_handler_error(event.name());
                    error!(
                        connection = %connection_id,
                        user = %user_id,
                        event = event.name(),
                        error = %e,
                        "Event handler failed"
                    );
                }
            }
            Ok(None) => return true,
            Err(e) => {
                warn!(connection = %connection_id, error = %e, "Protocol error");
                return false;
            }
        }
    }
}

/// Forward frames from a broadcast receiver into the session queue.
fn spawn_forward(
    mut rx: broadcast::Receiver<Arc<Frame>>,
    tx: mpsc::UnboundedSender<Arc<Frame>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(frame) => {
                    if tx.send(frame).is_err() {
                        break; // Receiver dropped
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Session lagging behind channel");
                    continue;
                }
            }
        }
    })
}

/// Send a frame to the WebSocket.
async fn send_frame(sender: &mut SplitSink<WebSocket, Message>, frame: &Frame) -> Result<()> {
    let data = codec::encode(frame)?;
    metrics::record_message(data.len(), "outbound");
    sender.send(Message::Binary(data.to_vec())).await?;
    Ok(())
}
