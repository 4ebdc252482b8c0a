//! Slack channel adapter over Socket Mode
//!
//! The listener asks `apps.connections.open` for a websocket URL, acknowledges
//! every envelope before classifying it, and forwards the resulting events to
//! the bus without waiting; when the bus is full the event is dropped with a
//! warning. A dropped or refreshed connection is re-opened after
//! `reconnect_delay`.

pub mod api;
pub mod blocks;
pub mod envelope;

pub use api::SlackApiClient;

use crate::bus::EventSource;
use anybot_core::types::InboundEvent;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use envelope::{SocketMessage, classify, parse_socket_message};

/// Slack channel adapter
pub struct SlackChannel {
    api: SlackApiClient,
    reconnect_delay: Duration,
}

impl SlackChannel {
    pub fn new(api: SlackApiClient, reconnect_delay: Duration) -> Self {
        Self {
            api,
            reconnect_delay,
        }
    }
}

#[async_trait]
impl EventSource for SlackChannel {
    async fn start(&self, tx: mpsc::Sender<InboundEvent>, cancel: CancellationToken) -> Result<()> {
        let api = self.api.clone();
        let delay = self.reconnect_delay;
        tokio::spawn(async move {
            listen(api, tx, cancel, delay).await;
            info!("Slack listener stopped");
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "slack"
    }
}

async fn listen(
    api: SlackApiClient,
    tx: mpsc::Sender<InboundEvent>,
    cancel: CancellationToken,
    reconnect_delay: Duration,
) {
    loop {
        if cancel.is_cancelled() || tx.is_closed() {
            return;
        }

        match api.open_socket_connection().await {
            Ok(socket_url) => {
                info!("Slack socket connecting");
                if let Err(e) = run_socket_session(&socket_url, &tx, &cancel).await {
                    warn!("Slack socket session error: {:#}", e);
                }
            }
            Err(e) => error!("Failed to open slack socket connection: {:#}", e),
        }

        if cancel.is_cancelled() || tx.is_closed() {
            return;
        }
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }
}

async fn run_socket_session(
    socket_url: &str,
    tx: &mpsc::Sender<InboundEvent>,
    cancel: &CancellationToken,
) -> Result<()> {
    let (stream, _response) = connect_async(socket_url)
        .await
        .context("failed to connect slack socket mode websocket")?;
    let (mut sink, mut source) = stream.split();

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(WsMessage::Close(None)).await;
                return Ok(());
            }
            next = source.next() => match next {
                Some(message) => message.context("failed reading slack websocket message")?,
                None => return Ok(()),
            },
        };

        let text = match message {
            WsMessage::Text(text) => text.as_str().to_string(),
            WsMessage::Binary(bytes) => {
                String::from_utf8(bytes.to_vec()).context("invalid utf-8 slack socket payload")?
            }
            WsMessage::Close(frame) => {
                debug!("Slack closed the socket: {:?}", frame);
                return Ok(());
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
        };

        let parsed = match parse_socket_message(&text) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("{:#}", e);
                continue;
            }
        };

        match parsed {
            None => {}
            Some(SocketMessage::Hello) => info!("Slack socket connected"),
            Some(SocketMessage::Disconnect { reason }) => {
                info!(
                    "Slack requested disconnect ({}), reconnecting",
                    reason.as_deref().unwrap_or("no reason")
                );
                return Ok(());
            }
            Some(SocketMessage::Envelope(envelope)) => {
                ack_envelope(&mut sink, &envelope.envelope_id).await?;
                let event = classify(&envelope);
                // never block the reader, later envelopes still need their ack
                match tx.try_send(event) {
                    Ok(()) => {}
                    Err(TrySendError::Full(event)) => {
                        warn!(
                            "Event buffer full, dropping {} from envelope {}",
                            event.kind(),
                            envelope.envelope_id
                        );
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!("Event receiver dropped, closing socket");
                        let _ = sink.send(WsMessage::Close(None)).await;
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn ack_envelope<S>(sink: &mut S, envelope_id: &str) -> Result<()>
where
    S: futures_util::Sink<WsMessage> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let ack = json!({ "envelope_id": envelope_id }).to_string();
    sink.send(WsMessage::Text(ack.into()))
        .await
        .context("failed to send slack socket ack")
}
