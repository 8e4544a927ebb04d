//! Integration tests for the real-time channel against an in-process
//! WebSocket server built on `tokio_tungstenite::accept_async`.

use std::time::Duration;

use chrono::TimeZone;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use damwatch_core::snapshot::SensorSnapshot;
use damwatch_realtime::{ChannelConfig, ChannelEvent, ConnectionState, RealtimeChannel};

const WAIT: Duration = Duration::from_secs(5);

fn snapshot() -> SensorSnapshot {
    SensorSnapshot::new(chrono::Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap())
        .with_reading("waterLevel", 96.0)
        .with_reading("seismic", 0.4)
}

fn config(addr: std::net::SocketAddr) -> ChannelConfig {
    let mut config = ChannelConfig::new(format!("ws://{addr}"));
    config.reconnect.initial_delay = Duration::from_millis(20);
    config.reconnect.max_delay = Duration::from_millis(100);
    config
}

/// Read events until `state` is observed.
async fn wait_for_state(events: &mut mpsc::Receiver<ChannelEvent>, state: ConnectionState) {
    tokio::time::timeout(WAIT, async {
        while let Some(event) = events.recv().await {
            if event == ChannelEvent::StateChanged(state) {
                return;
            }
        }
        panic!("event stream ended before {state}");
    })
    .await
    .expect("timed out waiting for state");
}

// ---------------------------------------------------------------------------
// Test: snapshots are mirrored and inbound confirmations become events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mirrors_snapshots_and_surfaces_remote_confirmations() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (received_tx, mut received_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                received_tx.send(text).unwrap();
                ws.send(Message::Text(
                    r#"{"type":"alert-sent","subject":"CRITICAL: Water level 96.0%","recipients":2,"successful":2,"failed":0}"#
                        .to_string(),
                ))
                .await
                .unwrap();
                ws.send(Message::Text(r#"{"type":"something-else"}"#.to_string()))
                    .await
                    .unwrap();
                ws.send(Message::Text(
                    r#"{"type":"alert-error","subject":"x","error":"smtp down"}"#.to_string(),
                ))
                .await
                .unwrap();
            }
        }
    });

    let cancel = CancellationToken::new();
    let (handle, mut events, task) = RealtimeChannel::spawn(config(addr), cancel.clone());

    wait_for_state(&mut events, ConnectionState::Connected).await;
    assert_eq!(handle.state(), ConnectionState::Connected);
    handle.mirror(&snapshot()).unwrap();

    let frame = tokio::time::timeout(WAIT, received_rx.recv())
        .await
        .unwrap()
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(json["type"], "sensor-report");
    assert_eq!(json["waterLevel"], 96.0);

    let sent = tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap();
    match sent {
        ChannelEvent::RemoteAlertSent(sent) => {
            assert_eq!(sent.subject, "CRITICAL: Water level 96.0%");
            assert_eq!(sent.successful, Some(2));
        }
        other => panic!("unexpected event {other:?}"),
    }

    // The unknown frame is skipped; the error arrives next.
    let error = tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert!(matches!(error, ChannelEvent::RemoteAlertError(e) if e.error == "smtp down"));

    cancel.cancel();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    assert_eq!(handle.state(), ConnectionState::Disconnected);
}

// ---------------------------------------------------------------------------
// Test: a dropped session is followed by an automatic reconnect
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconnects_after_server_drops_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        // First session: accept, then close immediately.
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        ws.close(None).await.ok();
        drop(ws);

        // Second session: stay open.
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let cancel = CancellationToken::new();
    let (handle, mut events, task) = RealtimeChannel::spawn(config(addr), cancel.clone());

    wait_for_state(&mut events, ConnectionState::Connected).await;
    wait_for_state(&mut events, ConnectionState::Disconnected).await;
    wait_for_state(&mut events, ConnectionState::Connecting).await;
    wait_for_state(&mut events, ConnectionState::Connected).await;
    assert_eq!(handle.state(), ConnectionState::Connected);

    cancel.cancel();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
}

// ---------------------------------------------------------------------------
// Test: an unreachable remote keeps retrying until cancelled
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unreachable_remote_retries_until_cancelled() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let cancel = CancellationToken::new();
    let (handle, mut events, task) = RealtimeChannel::spawn(config(addr), cancel.clone());

    // Two connection attempts observed.
    wait_for_state(&mut events, ConnectionState::Connecting).await;
    wait_for_state(&mut events, ConnectionState::Disconnected).await;
    wait_for_state(&mut events, ConnectionState::Connecting).await;
    assert!(handle.mirror(&snapshot()).is_err());

    cancel.cancel();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
}
