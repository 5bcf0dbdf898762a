//! Stream Connection
//!
//! Owns one WebSocket connection to a Polygon cluster: the lifecycle state
//! machine, the authentication handshake, subscription dispatch, inbound
//! decoding, and the handler fan-out.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected -> Connecting -> Authenticating -> Subscribed -> Streaming
//!       ^                                                          |
//!       +---------------------- Closing <--------------------------+
//! ```
//!
//! A connection runs exactly once: on transport close or fatal error it
//! settles in `Disconnected` and returns. It never reconnects on its own —
//! restart policy lives in the supervisor, which keeps reconnection
//! behavior in one place and this state machine testable in isolation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::application::dispatch::Dispatcher;
use crate::domain::market::AssetClass;

use super::codec::{FeedMessage, JsonCodec};
use super::messages::FeedRequest;

// =============================================================================
// Errors
// =============================================================================

/// Connection failures.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Network-level WebSocket error; the supervisor restarts on these.
    #[error("WebSocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// The transport did not come up within the connect timeout.
    #[error("connection attempt timed out")]
    ConnectTimeout,

    /// The upstream rejected or never acknowledged authentication.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// An outbound request could not be encoded.
    #[error("failed to encode outbound request: {0}")]
    Encode(#[from] serde_json::Error),

    /// The upstream closed the connection.
    #[error("connection closed by upstream")]
    Closed,
}

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of a stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No transport.
    Disconnected = 0,
    /// Transport handshake in flight.
    Connecting = 1,
    /// Waiting for the authentication acknowledgment.
    Authenticating = 2,
    /// Authenticated; subscription request issued.
    Subscribed = 3,
    /// Receiving data.
    Streaming = 4,
    /// Shutting the transport down.
    Closing = 5,
}

impl ConnectionState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Authenticating,
            3 => Self::Subscribed,
            4 => Self::Streaming,
            5 => Self::Closing,
            _ => Self::Disconnected,
        }
    }

    /// Name used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Subscribed => "subscribed",
            Self::Streaming => "streaming",
            Self::Closing => "closing",
        }
    }
}

/// Shared, lock-free view of a connection's state.
///
/// The connection task writes it; the supervisor's health loop reads it.
#[derive(Debug, Default)]
pub struct ConnectionStatus(AtomicU8);

impl ConnectionStatus {
    /// New status cell, starting `Disconnected`.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU8::new(ConnectionState::Disconnected as u8))
    }

    /// Current state.
    #[must_use]
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Whether the connection is healthy (subscribed or streaming).
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(
            self.get(),
            ConnectionState::Subscribed | ConnectionState::Streaming
        )
    }

    fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Everything a connection needs to come up.
#[derive(Clone)]
pub struct StreamConnectionConfig {
    /// Asset class this connection serves.
    pub asset_class: AssetClass,
    /// Resolved WebSocket endpoint.
    pub endpoint: String,
    /// Upstream credential.
    pub api_key: String,
    /// Subscription tokens, already validated by the channel builder.
    pub tokens: Vec<String>,
    /// Budget for transport handshake and for the authentication
    /// acknowledgment. Silence past this bound is an auth failure; once
    /// streaming, the receive loop blocks without a deadline.
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for StreamConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConnectionConfig")
            .field("asset_class", &self.asset_class)
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field("tokens", &self.tokens.len())
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

// =============================================================================
// Stream Connection
// =============================================================================

/// One WebSocket connection to a Polygon cluster, parametrized by asset
/// class and resolved entitlement rather than subclassed per class.
pub struct StreamConnection {
    config: StreamConnectionConfig,
    codec: JsonCodec,
    dispatcher: Dispatcher,
    status: Arc<ConnectionStatus>,
    cancel: CancellationToken,
}

impl StreamConnection {
    /// Create a connection; nothing happens until [`StreamConnection::run`].
    #[must_use]
    pub fn new(
        config: StreamConnectionConfig,
        dispatcher: Dispatcher,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            codec: JsonCodec::new(),
            dispatcher,
            status: Arc::new(ConnectionStatus::new()),
            cancel,
        }
    }

    /// Shared handle to this connection's state, for the supervisor.
    #[must_use]
    pub fn status(&self) -> Arc<ConnectionStatus> {
        Arc::clone(&self.status)
    }

    /// Connect, authenticate, subscribe, and stream until the transport
    /// closes or the cancellation token fires.
    ///
    /// Always settles the shared status in `Disconnected` before returning.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] for transport, timeout, and
    /// authentication failures. Cancellation is a clean `Ok`.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        let result = self.connect_and_stream().await;
        self.status.set(ConnectionState::Disconnected);
        if let Err(error) = &result {
            tracing::warn!(
                asset_class = %self.config.asset_class,
                %error,
                "stream connection ended"
            );
        }
        result
    }

    async fn connect_and_stream(&mut self) -> Result<(), ConnectionError> {
        self.status.set(ConnectionState::Connecting);
        tracing::info!(
            asset_class = %self.config.asset_class,
            endpoint = %self.config.endpoint,
            "connecting to upstream cluster"
        );

        let (stream, _response) = tokio::time::timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async(&self.config.endpoint),
        )
        .await
        .map_err(|_| ConnectionError::ConnectTimeout)??;

        let (mut write, mut read) = stream.split();

        // Transport is open: authenticate immediately.
        self.status.set(ConnectionState::Authenticating);
        let auth = serde_json::to_string(&FeedRequest::auth(&self.config.api_key))?;
        write.send(Message::Text(auth.into())).await?;

        tokio::time::timeout(self.config.connect_timeout, self.await_auth_ack(&mut read))
            .await
            .map_err(|_| {
                ConnectionError::AuthenticationFailed(
                    "no acknowledgment within the connect timeout".to_string(),
                )
            })??;

        // Authenticated: issue the whole token list as one request.
        self.status.set(ConnectionState::Subscribed);
        let subscribe = serde_json::to_string(&FeedRequest::subscribe(&self.config.tokens))?;
        write.send(Message::Text(subscribe.into())).await?;

        self.status.set(ConnectionState::Streaming);
        tracing::info!(
            asset_class = %self.config.asset_class,
            channels = self.config.tokens.len(),
            "streaming"
        );

        let cancel = self.cancel.clone();
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    self.status.set(ConnectionState::Closing);
                    tracing::info!(asset_class = %self.config.asset_class, "closing stream");
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_frame(&text),
                    Some(Ok(Message::Ping(payload))) => {
                        write.send(Message::Pong(payload)).await?;
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!(
                            asset_class = %self.config.asset_class,
                            "upstream sent close frame"
                        );
                        return Err(ConnectionError::Closed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(ConnectionError::Closed),
                }
            }
        }
    }

    /// Wait for the explicit authentication acknowledgment.
    ///
    /// Only `auth_success` moves the handshake forward; `connected` is the
    /// open-echo and is logged, and anything else fails authentication.
    async fn await_auth_ack<S>(&self, read: &mut S) -> Result<(), ConnectionError>
    where
        S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        while let Some(frame) = read.next().await {
            let message = frame?;
            let Message::Text(text) = message else {
                continue;
            };

            let items = match self.codec.decode(&text) {
                Ok(items) => items,
                Err(error) => {
                    tracing::warn!(%error, "discarding undecodable frame during handshake");
                    continue;
                }
            };

            for item in items {
                match item {
                    Ok(FeedMessage::Status(status)) => match status.status.as_str() {
                        "connected" => {
                            tracing::debug!(message = %status.message, "upstream accepted connection");
                        }
                        "auth_success" => {
                            tracing::info!(
                                asset_class = %self.config.asset_class,
                                "authenticated"
                            );
                            return Ok(());
                        }
                        other => {
                            return Err(ConnectionError::AuthenticationFailed(format!(
                                "{other}: {}",
                                status.message
                            )));
                        }
                    },
                    Ok(_) => {
                        tracing::debug!("ignoring data message during handshake");
                    }
                    Err(error) => {
                        tracing::warn!(%error, "skipping malformed message during handshake");
                    }
                }
            }
        }

        Err(ConnectionError::Closed)
    }

    /// Decode one inbound frame and fan data messages out to the handlers.
    ///
    /// Decode failures are logged and never terminate the connection.
    fn handle_frame(&mut self, text: &str) {
        let items = match self.codec.decode(text) {
            Ok(items) => items,
            Err(error) => {
                tracing::warn!(
                    asset_class = %self.config.asset_class,
                    %error,
                    "discarding undecodable frame"
                );
                return;
            }
        };

        for item in items {
            match item {
                Ok(FeedMessage::Status(status)) => {
                    tracing::info!(
                        asset_class = %self.config.asset_class,
                        status = %status.status,
                        message = %status.message,
                        "stream status"
                    );
                }
                Ok(FeedMessage::Aggregate(msg)) => {
                    self.dispatcher
                        .dispatch(&msg.to_tick(self.config.asset_class));
                }
                Ok(FeedMessage::Trade(msg)) => {
                    self.dispatcher
                        .dispatch(&msg.to_tick(self.config.asset_class));
                }
                Ok(FeedMessage::Quote(msg)) => {
                    self.dispatcher
                        .dispatch(&msg.to_tick(self.config.asset_class));
                }
                Ok(FeedMessage::Unknown { event }) => {
                    tracing::debug!(event = %event, "unhandled message type");
                }
                Err(error) => {
                    tracing::warn!(
                        asset_class = %self.config.asset_class,
                        %error,
                        "skipping malformed feed message"
                    );
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
