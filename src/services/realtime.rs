//! Realtime WebSocket channel to the vote backend.
//!
//! One supervisor task owns the connection lifecycle: it dials the
//! authenticated endpoint, pumps frames into the event queue, and reconnects
//! with exponential backoff when the session drops. Outbound frames go
//! through a dedicated writer task so replies never block the read loop.
//! Pairing uses a separate one-shot connection that carries no credentials
//! and never reconnects.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::{SinkExt, StreamExt, stream::SplitSink};
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch},
    time::sleep,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        self,
        client::IntoClientRequest,
        handshake::client::Request,
        http::{HeaderValue, header},
        protocol::Message,
    },
};
use tracing::{debug, error, info, warn};

use crate::{
    config::AppConfig,
    dto::ws::{ClientMessage, ServerMessage},
    services::events::ChannelEvent,
    state::{
        ConnectionCredentials, ConnectionState, SharedState,
        connection::{Backoff, MAX_RECONNECT_ATTEMPTS},
    },
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long the supervisor waits before re-checking the link state when the
/// server holds no credentials yet.
const LINK_RECHECK_SECS: u64 = 5;

/// A session with no traffic for this long gets probed with a ping; a second
/// silent window closes it so the supervisor can redial.
const IDLE_TIMEOUT_SECS: u64 = 30;

/// Why a driven session ended.
enum SessionEnd {
    /// The local side asked for shutdown.
    Shutdown,
    /// The remote closed or the transport failed.
    Remote,
}

/// Handle to the realtime channel.
///
/// Cloneable; all clones steer the same supervisor through the shared
/// shutdown signal.
#[derive(Clone)]
pub struct RealtimeChannel {
    state: SharedState,
    events: mpsc::UnboundedSender<ChannelEvent>,
    shutdown: Arc<Mutex<watch::Sender<bool>>>,
}

impl RealtimeChannel {
    /// Create a channel handle feeding the given event queue.
    pub fn new(state: SharedState, events: mpsc::UnboundedSender<ChannelEvent>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            state,
            events,
            shutdown: Arc::new(Mutex::new(shutdown)),
        }
    }

    /// Spawn the connection supervisor.
    ///
    /// The supervisor waits until credentials exist, then keeps an
    /// authenticated session open, reconnecting with capped exponential
    /// backoff. It stops when [`Self::disconnect`] is called or the
    /// reconnect attempts are exhausted; calling `connect` again after
    /// either starts over with a reset attempt count. Each call installs a
    /// fresh shutdown signal, which reads as shutdown to any supervisor
    /// still running on the previous one, so calls never stack sessions.
    pub fn connect(&self) {
        let (sender, receiver) = watch::channel(false);
        *self.shutdown_sender() = sender;

        let state = self.state.clone();
        let events = self.events.clone();
        tokio::spawn(run_supervisor(state, events, receiver));
    }

    /// Spawn a one-shot unauthenticated connection for a pairing attempt.
    ///
    /// The connection lives until the backend confirms the pairing or closes
    /// it; there is no reconnect, a stale pairing simply times out with its
    /// session.
    pub fn connect_for_pairing(&self, code: &str, validation_token: &str) {
        let state = self.state.clone();
        let events = self.events.clone();
        let shutdown = self.shutdown_sender().subscribe();
        let code = code.to_string();
        let token = validation_token.to_string();
        tokio::spawn(async move {
            match connect(pairing_request(state.config(), &code, &token)).await {
                Ok(stream) => {
                    info!(code = %code, "pairing channel connected, waiting for confirmation");
                    drive_session(stream, &events, shutdown, true).await;
                    info!(code = %code, "pairing channel closed");
                }
                Err(err) => {
                    warn!(code = %code, error = %err, "failed to open the pairing channel");
                }
            }
        });
    }

    /// Tear the channel down and stop reconnecting.
    pub fn disconnect(&self) {
        self.shutdown_sender().send_replace(true);
    }

    /// Whether an authenticated session is established right now.
    pub fn is_connected(&self) -> bool {
        self.state.connection_state() == ConnectionState::Connected
    }

    fn shutdown_sender(&self) -> MutexGuard<'_, watch::Sender<bool>> {
        self.shutdown.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn run_supervisor(
    state: SharedState,
    events: mpsc::UnboundedSender<ChannelEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = Backoff::new(MAX_RECONNECT_ATTEMPTS);

    loop {
        if *shutdown.borrow() {
            break;
        }

        let Some(credentials) = state.credentials().await else {
            debug!("server not linked, realtime channel waiting");
            tokio::select! {
                _ = sleep(std::time::Duration::from_secs(LINK_RECHECK_SECS)) => continue,
                result = shutdown.changed() => {
                    // A dropped sender means nobody can steer this
                    // supervisor anymore; stop instead of spinning.
                    if result.is_err() {
                        break;
                    }
                    continue;
                }
            }
        };

        state.set_connection_state(ConnectionState::Connecting);
        let request = authenticated_request(state.config(), &credentials);
        match connect(request).await {
            Ok(stream) => {
                backoff.reset();
                state.set_connection_state(ConnectionState::Connected);
                info!("realtime channel connected");
                let _ = events.send(ChannelEvent::Connected);

                let end = drive_session(stream, &events, shutdown.clone(), false).await;
                state.set_connection_state(ConnectionState::Disconnected);
                if matches!(end, SessionEnd::Shutdown) {
                    break;
                }
                let _ = events.send(ChannelEvent::Disconnected {
                    reason: "connection lost".to_string(),
                });
            }
            Err(err) => {
                state.set_connection_state(ConnectionState::Disconnected);
                warn!(error = %err, "realtime connection attempt failed");
            }
        }

        match backoff.next_delay() {
            Some(delay) => {
                info!(
                    attempt = backoff.attempts(),
                    delay_secs = delay.as_secs(),
                    "reconnecting to the realtime channel"
                );
                tokio::select! {
                    _ = sleep(delay) => {}
                    result = shutdown.changed() => {
                        if result.is_err() {
                            break;
                        }
                    }
                }
            }
            None => {
                error!("reconnect attempts exhausted, realtime channel abandoned");
                let _ = events.send(ChannelEvent::Disconnected {
                    reason: "max attempts".to_string(),
                });
                break;
            }
        }
    }

    state.set_connection_state(ConnectionState::Disconnected);
}

async fn connect(
    request: Result<Request, tungstenite::Error>,
) -> Result<WsStream, tungstenite::Error> {
    let (stream, _response) = connect_async(request?).await?;
    Ok(stream)
}

/// Pump one established session into the event queue.
///
/// Replies to keepalives through the writer task; typed frames are
/// forwarded, unknown frame types are logged and dropped without closing the
/// connection. With `stop_on_pairing` set the session ends as soon as a
/// pairing confirmation arrives.
async fn drive_session(
    stream: WsStream,
    events: &mpsc::UnboundedSender<ChannelEvent>,
    mut shutdown: watch::Receiver<bool>,
    stop_on_pairing: bool,
) -> SessionEnd {
    let (sink, mut reader) = stream.split();
    let (frames, frames_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(run_writer(sink, frames_rx));
    let idle_window = std::time::Duration::from_secs(IDLE_TIMEOUT_SECS);
    let mut probed = false;

    let end = loop {
        let message = tokio::select! {
            message = reader.next() => message,
            _ = sleep(idle_window) => {
                // Silent connection: probe once, give up on the second
                // silent window.
                if probed {
                    warn!("realtime channel silent too long, closing");
                    let _ = frames.send(Message::Close(None));
                    break SessionEnd::Remote;
                }
                probed = true;
                if frames.send(Message::Ping(Vec::new().into())).is_err() {
                    break SessionEnd::Remote;
                }
                continue;
            }
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    let _ = frames.send(Message::Close(None));
                    break SessionEnd::Shutdown;
                }
                continue;
            }
        };
        probed = false;

        match message {
            Some(Ok(Message::Text(frame))) => {
                match serde_json::from_str::<ServerMessage>(frame.as_str()) {
                    Ok(ServerMessage::Ping) => {
                        if let Ok(pong) = serde_json::to_string(&ClientMessage::Pong) {
                            if frames.send(Message::Text(pong.into())).is_err() {
                                break SessionEnd::Remote;
                            }
                        }
                    }
                    Ok(ServerMessage::VoteReceived(vote)) => {
                        let _ = events.send(ChannelEvent::VoteReceived(vote));
                    }
                    Ok(ServerMessage::PairingConfirmed(response)) => {
                        let _ = events.send(ChannelEvent::PairingConfirmed(response));
                        if stop_on_pairing {
                            let _ = frames.send(Message::Close(None));
                            break SessionEnd::Remote;
                        }
                    }
                    Ok(ServerMessage::Error(data)) => {
                        let message = data
                            .message
                            .unwrap_or_else(|| "unknown channel error".to_string());
                        let _ = events.send(ChannelEvent::ChannelError(message));
                    }
                    Ok(ServerMessage::Unknown) => {
                        debug!(frame = %frame.as_str(), "ignoring unknown realtime frame");
                    }
                    Err(err) => {
                        warn!(error = %err, "discarding malformed realtime frame");
                    }
                }
            }
            Some(Ok(Message::Ping(payload))) => {
                if frames.send(Message::Pong(payload)).is_err() {
                    break SessionEnd::Remote;
                }
            }
            Some(Ok(Message::Close(_))) | None => break SessionEnd::Remote,
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                warn!(error = %err, "realtime transport error");
                break SessionEnd::Remote;
            }
        }
    };

    // Closing the frame queue lets the writer flush and exit.
    drop(frames);
    let _ = writer.await;
    end
}

/// Drain queued outbound frames onto the socket until the queue closes or a
/// write fails.
async fn run_writer(
    mut sink: SplitSink<WsStream, Message>,
    mut frames: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(frame) = frames.recv().await {
        if sink.send(frame).await.is_err() {
            break;
        }
    }
    let _ = sink.close().await;
}

fn endpoint(config: &AppConfig, path: &str) -> String {
    format!("{}{}", config.websocket_url.trim_end_matches('/'), path)
}

/// Build the handshake request for the authenticated server channel.
fn authenticated_request(
    config: &AppConfig,
    credentials: &ConnectionCredentials,
) -> Result<Request, tungstenite::Error> {
    let mut request = endpoint(config, "/server").into_client_request()?;
    let headers = request.headers_mut();
    headers.insert(
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", credentials.server_token()))
            .map_err(tungstenite::http::Error::from)?,
    );
    headers.insert(
        "X-Server-Id",
        HeaderValue::from_str(credentials.server_id())
            .map_err(tungstenite::http::Error::from)?,
    );
    Ok(request)
}

/// Build the handshake request for the unauthenticated pairing channel.
fn pairing_request(
    config: &AppConfig,
    code: &str,
    validation_token: &str,
) -> Result<Request, tungstenite::Error> {
    endpoint(
        config,
        &format!("/pairing?code={code}&token={validation_token}"),
    )
    .into_client_request()
}
