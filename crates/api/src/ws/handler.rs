use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use damwatch_pipeline::monitor::channel_notice;
use damwatch_realtime::ChannelEvent;

use crate::notices::notice_frame;
use crate::state::AppState;

/// GET /api/v1/ws -- upgrade to the operator notice stream.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Register the operator, greet them with the current real-time channel
/// state, then pump outbound notices until either side closes.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let ws_manager = state.ws_manager;
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "Operator WebSocket connected");

    let mut rx = ws_manager.add(conn_id.clone()).await;

    // Connectivity is otherwise only reported on transitions.
    if state.channel.is_enabled() {
        let greeting = channel_notice(ChannelEvent::StateChanged(state.channel.state()));
        if let Some(frame) = notice_frame(&greeting) {
            ws_manager.send_to(&conn_id, frame).await;
        }
    }

    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "Operator sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    // One-way stream: anything but close or an error is dropped.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "Operator receive error");
                break;
            }
        }
    }

    ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "Operator WebSocket disconnected");
}
