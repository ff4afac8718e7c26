//! REST + WebSocket signaling backend.
//!
//! Endpoints, relative to the configured bases:
//!
//! - `GET  {http}/sessions/{id}/messages?since=<ms>` - JSON array of wire messages
//! - `POST {http}/sessions/{id}/messages` - one wire message
//! - `{ws}/sessions/{id}?token=<token>` - text frames carry wire messages
//!
//! HTTP calls authenticate with a bearer token. The socket URL carries the
//! token as a query parameter, so the socket URL is never logged.

use super::backend::{PollBatch, SignalingBackend, SocketChannel, SocketEvent, TransportError};
use crate::config::{Config, ConfigError};

use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use common::types::SessionId;
use futures_util::{SinkExt, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use serde_json::Value;
use signal_protocol::{decode_message, encode_message, CodecError, SignalMessage, WireMessage};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

/// Connect timeout for HTTP requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Signaling backend over HTTP polling and a WebSocket.
#[derive(Debug, Clone)]
pub struct HttpSignalingBackend {
    client: Client,
    http_base: String,
    ws_base: Option<String>,
}

impl HttpSignalingBackend {
    /// Create a backend.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Connect` if the HTTP client cannot be built.
    pub fn new(
        http_base: impl Into<String>,
        ws_base: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Connect(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            http_base: http_base.into().trim_end_matches('/').to_string(),
            ws_base: ws_base.map(|s| s.trim_end_matches('/').to_string()),
        })
    }

    /// Create a backend from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `SC_SIGNALING_HTTP_URL` is unset.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let http_base = config
            .signaling_http_url
            .clone()
            .ok_or_else(|| ConfigError::MissingEnvVar("SC_SIGNALING_HTTP_URL".to_string()))?;

        Self::new(
            http_base,
            config.signaling_ws_url.clone(),
            config.http_timeout,
        )
        .map_err(|e| ConfigError::InvalidValue(e.to_string()))
    }

    fn messages_url(&self, session_id: &SessionId) -> String {
        format!("{}/sessions/{}/messages", self.http_base, session_id)
    }
}

#[async_trait]
impl SignalingBackend for HttpSignalingBackend {
    async fn open_socket(
        &self,
        session_id: &SessionId,
        token: &SecretString,
    ) -> Result<SocketChannel, TransportError> {
        let ws_base = self
            .ws_base
            .as_ref()
            .ok_or_else(|| TransportError::Connect("no socket endpoint configured".to_string()))?;

        let url = Url::parse_with_params(
            &format!("{ws_base}/sessions/{session_id}"),
            &[("token", token.expose_secret())],
        )
        .map_err(|e| TransportError::Connect(format!("invalid socket URL: {e}")))?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        debug!(
            target: "sc.transport.http",
            session_id = %session_id,
            "Opening signaling socket"
        );
        tokio::spawn(run_socket(url, outbound_rx, events_tx));

        Ok(SocketChannel {
            outbound: outbound_tx,
            events: events_rx,
        })
    }

    async fn poll(
        &self,
        session_id: &SessionId,
        token: &SecretString,
        since: Option<i64>,
    ) -> Result<PollBatch, TransportError> {
        let mut request = self
            .client
            .get(self.messages_url(session_id))
            .bearer_auth(token.expose_secret());
        if let Some(since) = since {
            request = request.query(&[("since", since)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let entries: Vec<Value> = response
            .json()
            .await
            .map_err(|e| TransportError::Http(format!("invalid poll response: {e}")))?;

        // One malformed entry must not starve the rest of the batch, and its
        // timestamp still moves the cursor so it is not fetched again.
        let mut batch = PollBatch::default();
        for entry in entries {
            let timestamp = entry.get("timestamp").and_then(Value::as_i64);
            let decoded = serde_json::from_value::<WireMessage>(entry)
                .map_err(CodecError::from)
                .and_then(SignalMessage::try_from);
            match decoded {
                Ok(message) => batch.messages.push(message),
                Err(e) => {
                    warn!(
                        target: "sc.transport.http",
                        session_id = %session_id,
                        error = %e,
                        "Skipping malformed polled message"
                    );
                }
            }
            if let Some(timestamp) = timestamp {
                batch.advance_cursor(timestamp);
            }
        }

        Ok(batch)
    }

    async fn post(
        &self,
        session_id: &SessionId,
        token: &SecretString,
        message: &SignalMessage,
    ) -> Result<(), TransportError> {
        let body = encode_message(message)?;
        let response = self
            .client
            .post(self.messages_url(session_id))
            .bearer_auth(token.expose_secret())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        Ok(())
    }
}

/// Drive one WebSocket until either side closes it.
async fn run_socket(
    url: Url,
    mut outbound: mpsc::UnboundedReceiver<SignalMessage>,
    events: mpsc::UnboundedSender<SocketEvent>,
) {
    let connected = tokio::select! {
        result = connect_async(url.as_str()) => result,
        // Router gave up on us before the handshake finished.
        () = events.closed() => return,
    };

    let ws_stream = match connected {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            let _ = events.send(SocketEvent::Error(format!("connect failed: {e}")));
            return;
        }
    };

    if events.send(SocketEvent::Opened).is_err() {
        return;
    }
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = outbound.recv() => {
                let Some(message) = msg else {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                };
                match encode_message(&message) {
                    Ok(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            let _ = events.send(SocketEvent::Error(format!("send failed: {e}")));
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(
                            target: "sc.transport.http",
                            error = %e,
                            "Dropping unencodable outbound message"
                        );
                    }
                }
            }

            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match decode_message(&text) {
                        Ok(message) => {
                            if events.send(SocketEvent::Message(message)).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(
                                target: "sc.transport.http",
                                error = %e,
                                "Skipping malformed socket message"
                            );
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        let _ = events.send(SocketEvent::Closed);
                        break;
                    }
                    // Ping/pong are answered by tungstenite; binary is not part of the protocol.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let _ = events.send(SocketEvent::Error(format!("receive failed: {e}")));
                        break;
                    }
                }
            }
        }
    }

    debug!(target: "sc.transport.http", "Signaling socket closed");
}
