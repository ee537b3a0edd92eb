//! Price Stream Client
//!
//! Connects to the engine's `/ws` endpoint and forwards `INITIAL_PRICES` and
//! `PRICE_UPDATE` messages as [`StreamEvent`]s.
//!
//! # Connection states
//!
//! `Connecting → Open → Closed`. A clean close ends the stream; any other
//! close schedules a reconnect on the [`BackoffPolicy`]. Reaching `Open`
//! resets the retry counter.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use market_data_engine::PriceMessage;
use reqwest::Url;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{PriceStream, StreamError, StreamEvent};
use crate::domain::backoff::{BackoffConfig, BackoffPolicy};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the stream client.
#[derive(Debug, Clone)]
pub struct StreamClientConfig {
    /// WebSocket URL of the engine's price stream.
    pub url: String,
    /// Hosts the client may connect to; empty allows any host.
    pub allowed_hosts: Vec<String>,
    /// Reconnect schedule.
    pub reconnect: BackoffConfig,
    /// Deadline for the TCP connect plus WebSocket handshake.
    pub connect_timeout: Duration,
}

/// Default handshake deadline.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

impl StreamClientConfig {
    /// Create a configuration with the default reconnect schedule.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            allowed_hosts: Vec::new(),
            reconnect: BackoffConfig::reconnect(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Validate the URL scheme and host.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::InvalidUrl` for an unparseable or non-WebSocket
    /// URL, and `StreamError::DisallowedHost` when an allow list is set and
    /// the host is not on it.
    pub fn validated_url(&self) -> Result<Url, StreamError> {
        let url = Url::parse(&self.url).map_err(|e| StreamError::InvalidUrl(e.to_string()))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(StreamError::InvalidUrl(format!(
                "unsupported scheme {:?}",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| StreamError::InvalidUrl("missing host".to_string()))?;

        if !self.allowed_hosts.is_empty()
            && !self.allowed_hosts.iter().any(|h| h.eq_ignore_ascii_case(host))
        {
            return Err(StreamError::DisallowedHost(host.to_string()));
        }

        Ok(url)
    }
}

// =============================================================================
// Client
// =============================================================================

/// How one connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionEnd {
    /// Cancelled locally.
    Cancelled,
    /// The server closed with a normal close code.
    ClosedClean,
}

/// Tier 1: the engine's WebSocket price stream.
pub struct StreamClient {
    config: StreamClientConfig,
}

impl StreamClient {
    /// Create a stream client.
    #[must_use]
    pub const fn new(config: StreamClientConfig) -> Self {
        Self { config }
    }

    /// Connect and forward messages until the connection ends.
    async fn connect_and_run(
        &self,
        url: &Url,
        events: &mpsc::Sender<StreamEvent>,
        cancel: &CancellationToken,
        policy: &mut BackoffPolicy,
    ) -> Result<SessionEnd, StreamError> {
        tracing::info!(url = %url, "Connecting to price stream");

        let deadline = self.config.connect_timeout;
        let handshake =
            tokio::time::timeout(deadline, tokio_tungstenite::connect_async(url.as_str()));
        let (ws_stream, _response) = tokio::select! {
            () = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
            result = handshake => {
                result
                    .map_err(|_| StreamError::ConnectTimeout(deadline))?
                    .map_err(|e| StreamError::WebSocket(e.to_string()))?
            }
        };

        policy.reset();
        let _ = events.send(StreamEvent::Connected).await;

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Cancelled);
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<PriceMessage>(text.as_str()) {
                            Ok(message) => {
                                let _ = events.send(StreamEvent::Message(message)).await;
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Ignoring undecodable stream message");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write
                            .send(Message::Pong(data))
                            .await
                            .map_err(|e| StreamError::WebSocket(e.to_string()))?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return if is_clean_close(frame.as_ref()) {
                            tracing::info!("Server closed price stream");
                            Ok(SessionEnd::ClosedClean)
                        } else {
                            Err(StreamError::ClosedAbnormally)
                        };
                    }
                    Some(Ok(_)) => {
                        // Ignore other message types
                    }
                    Some(Err(e)) => return Err(StreamError::WebSocket(e.to_string())),
                    None => return Err(StreamError::ClosedAbnormally),
                },
            }
        }
    }
}

/// A close without a frame or with code 1000 is clean.
fn is_clean_close(frame: Option<&CloseFrame>) -> bool {
    frame.is_none_or(|f| f.code == CloseCode::Normal)
}

#[async_trait]
impl PriceStream for StreamClient {
    async fn run(
        &self,
        events: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Result<(), StreamError> {
        let url = self.config.validated_url()?;
        let mut policy = BackoffPolicy::new(self.config.reconnect);

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            match self
                .connect_and_run(&url, &events, &cancel, &mut policy)
                .await
            {
                Ok(SessionEnd::Cancelled) => {
                    tracing::info!("Price stream cancelled");
                    return Ok(());
                }
                Ok(SessionEnd::ClosedClean) => {
                    let _ = events.send(StreamEvent::Disconnected).await;
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Price stream error");
                    let _ = events.send(StreamEvent::Disconnected).await;

                    let Some(delay) = policy.next_delay() else {
                        return Err(StreamError::RetriesExhausted(policy.attempt_count()));
                    };
                    let attempt = policy.attempt_count();
                    tracing::info!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        "Reconnecting to price stream"
                    );
                    let _ = events.send(StreamEvent::Reconnecting { attempt, delay }).await;

                    if !sleep_or_cancel(delay, &cancel).await {
                        tracing::info!("Price stream cancelled during reconnect delay");
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Sleep for `delay`; `false` if cancelled first.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}
