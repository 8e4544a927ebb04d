//! Persistent WebSocket link to the remote collaborator.
//!
//! [`RealtimeChannel::spawn`] starts a connection task (connect -> session
//! -> reconnect with backoff) and returns:
//!
//! - a cloneable [`RealtimeHandle`] for non-blocking snapshot mirroring and
//!   connection-state reads,
//! - an `mpsc::Receiver<ChannelEvent>` carrying state changes and inbound
//!   delivery confirmations, consumed explicitly by the monitor loop,
//! - the task's `JoinHandle`.
//!
//! Mirroring is fire-and-forget. Frames queued while a session is up are
//! sent in order; whatever is still queued when a session drops is
//! discarded rather than replayed after reconnect.

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use damwatch_core::snapshot::SensorSnapshot;

use crate::events::{ChannelEvent, ConnectionState};
use crate::messages::{encode_sensor_report, InboundMessage};
use crate::reconnect::{next_delay, ReconnectConfig};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Outbound frames buffered while connected.
const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Channel events buffered for the consumer.
const DEFAULT_EVENT_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChannelError {
    #[error("Real-time channel is disabled")]
    Disabled,

    #[error("Real-time channel is not connected")]
    NotConnected,

    #[error("Outbound queue is full")]
    QueueFull,

    #[error("Real-time channel task has stopped")]
    Closed,

    #[error("Failed to encode frame: {0}")]
    Encode(String),
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub url: String,
    pub reconnect: ReconnectConfig,
    pub outbound_capacity: usize,
    pub event_capacity: usize,
}

impl ChannelConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig::default(),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Producer-side handle. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RealtimeHandle {
    outbound: Option<mpsc::Sender<String>>,
    state: watch::Receiver<ConnectionState>,
}

impl RealtimeHandle {
    /// A handle for a channel that was never configured. Always
    /// `Disconnected`; mirroring returns [`ChannelError::Disabled`].
    pub fn disabled() -> Self {
        let (_tx, state) = watch::channel(ConnectionState::Disconnected);
        Self {
            outbound: None,
            state,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.outbound.is_some()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch the connection state.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Queue a `sensor-report` frame. Never blocks; fails fast unless connected.
    pub fn mirror(&self, snapshot: &SensorSnapshot) -> Result<(), ChannelError> {
        let outbound = self.outbound.as_ref().ok_or(ChannelError::Disabled)?;
        if self.state() != ConnectionState::Connected {
            return Err(ChannelError::NotConnected);
        }
        let frame = encode_sensor_report(snapshot).map_err(|e| ChannelError::Encode(e.to_string()))?;
        outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ChannelError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ChannelError::Closed,
        })
    }
}

// ---------------------------------------------------------------------------
// RealtimeChannel
// ---------------------------------------------------------------------------

pub struct RealtimeChannel;

impl RealtimeChannel {
    /// Start the connection task. It runs until `cancel` fires or every
    /// handle has been dropped.
    pub fn spawn(
        config: ChannelConfig,
        cancel: CancellationToken,
    ) -> (RealtimeHandle, mpsc::Receiver<ChannelEvent>, JoinHandle<()>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let task = tokio::spawn(async move {
            let mut link = Link {
                state: state_tx,
                events: event_tx,
                outbound: outbound_rx,
            };
            run_connection_loop(&config, &mut link, &cancel).await;
            link.set_state(ConnectionState::Disconnected);
            tracing::info!(url = %config.url, "Real-time channel stopped");
        });

        let handle = RealtimeHandle {
            outbound: Some(outbound_tx),
            state: state_rx,
        };
        (handle, event_rx, task)
    }
}

/// Task-side ends of the channel's queues.
struct Link {
    state: watch::Sender<ConnectionState>,
    events: mpsc::Sender<ChannelEvent>,
    outbound: mpsc::Receiver<String>,
}

impl Link {
    fn set_state(&self, next: ConnectionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            tracing::debug!(from = %prev, to = %next, "Real-time channel state changed");
            self.emit(ChannelEvent::StateChanged(next));
        }
    }

    fn emit(&self, event: ChannelEvent) {
        if let Err(e) = self.events.try_send(event) {
            tracing::warn!(error = %e, "Dropping real-time channel event");
        }
    }

    /// Discard frames queued for a session that no longer exists.
    fn drain_outbound(&mut self) {
        let mut dropped = 0usize;
        while self.outbound.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            tracing::debug!(dropped, "Discarded unsent sensor reports");
        }
    }
}

/// Why a session ended.
enum SessionEnd {
    Dropped,
    Cancelled,
    /// Every [`RealtimeHandle`] is gone; nothing will ever be mirrored again.
    ProducersGone,
}

async fn run_connection_loop(config: &ChannelConfig, link: &mut Link, cancel: &CancellationToken) {
    let mut delay = config.reconnect.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        link.set_state(ConnectionState::Connecting);
        tracing::info!(url = %config.url, attempt, "Connecting real-time channel");

        tokio::select! {
            _ = cancel.cancelled() => return,
            result = connect_async(config.url.as_str()) => match result {
                Ok((ws, _response)) => {
                    attempt = 0;
                    delay = config.reconnect.initial_delay;
                    link.set_state(ConnectionState::Connected);

                    let end = run_session(ws, link, cancel).await;
                    link.set_state(ConnectionState::Disconnected);
                    link.drain_outbound();

                    match end {
                        SessionEnd::Cancelled | SessionEnd::ProducersGone => return,
                        SessionEnd::Dropped => {
                            tracing::warn!(url = %config.url, "Real-time channel dropped, reconnecting");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %config.url, attempt, error = %e, "Real-time channel connect failed");
                    link.set_state(ConnectionState::Disconnected);
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
        delay = next_delay(delay, &config.reconnect);
    }
}

async fn run_session(ws: WsStream, link: &mut Link, cancel: &CancellationToken) -> SessionEnd {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return SessionEnd::Cancelled;
            }
            frame = link.outbound.recv() => {
                let Some(frame) = frame else {
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::ProducersGone;
                };
                if let Err(e) = sink.send(Message::Text(frame)).await {
                    tracing::warn!(error = %e, "Failed to mirror sensor report");
                    return SessionEnd::Dropped;
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => handle_incoming(link, &text),
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Remote closed real-time channel");
                        return SessionEnd::Dropped;
                    }
                    Some(Ok(_)) => {
                        // Ping/pong are answered by tungstenite; binary frames are ignored.
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Real-time channel receive error");
                        return SessionEnd::Dropped;
                    }
                    None => return SessionEnd::Dropped,
                }
            }
        }
    }
}

fn handle_incoming(link: &Link, text: &str) {
    match serde_json::from_str::<InboundMessage>(text) {
        Ok(InboundMessage::AlertSent(sent)) => link.emit(ChannelEvent::RemoteAlertSent(sent)),
        Ok(InboundMessage::AlertError(err)) => link.emit(ChannelEvent::RemoteAlertError(err)),
        Err(e) => {
            tracing::debug!(error = %e, raw = %text, "Ignoring unknown real-time frame");
        }
    }
}
