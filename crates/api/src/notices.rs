//! Operator notice forwarding.
//!
//! [`NoticeForwarder`] subscribes to the [`NoticeBus`](damwatch_events::NoticeBus)
//! and pushes every notice as a JSON text frame to all operator WebSocket
//! connections.

use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::broadcast;

use damwatch_events::OperatorNotice;

use crate::ws::WsManager;

pub struct NoticeForwarder {
    ws_manager: Arc<WsManager>,
}

impl NoticeForwarder {
    pub fn new(ws_manager: Arc<WsManager>) -> Self {
        Self { ws_manager }
    }

    /// Forward notices until the bus is dropped.
    pub async fn run(self, mut receiver: broadcast::Receiver<OperatorNotice>) {
        loop {
            match receiver.recv().await {
                Ok(notice) => self.forward(&notice).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Notice forwarder lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Notice bus closed, forwarder shutting down");
                    break;
                }
            }
        }
    }

    async fn forward(&self, notice: &OperatorNotice) {
        if let Some(frame) = notice_frame(notice) {
            let delivered = self.ws_manager.broadcast(frame).await;
            tracing::trace!(kind = ?notice.kind, delivered, "Notice forwarded");
        }
    }
}

/// JSON text frame for `notice`, or `None` (logged) if it cannot be
/// serialized.
pub fn notice_frame(notice: &OperatorNotice) -> Option<Message> {
    match serde_json::to_string(notice) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!(error = %e, kind = ?notice.kind, "Failed to serialize notice");
            None
        }
    }
}
