// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end tests: a real session against an in-process axum server
//! speaking the auth endpoints and the realtime WebSocket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

use natter::api::HttpAuthApi;
use natter::channel::{ChannelState, WsConnector};
use natter::session::{Session, SessionConfig, SessionEvent, SessionHandle, Timings};
use natter::test_support::{token_response, triple_for};
use natter::token::persist::{FileTokenStore, TokenStore};
use natter::token::{epoch_secs, TokenTriple};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Server side of one accepted WebSocket.
struct ServerSocket {
    token: String,
    to_client: mpsc::Sender<String>,
    from_client: mpsc::Receiver<String>,
}

struct MockBackend {
    accepted: mpsc::UnboundedSender<ServerSocket>,
    refresh: Mutex<Option<TokenTriple>>,
    refresh_headers: Mutex<Vec<String>>,
    logout_headers: Mutex<Vec<String>>,
}

#[derive(Deserialize)]
struct WsQuery {
    #[serde(default)]
    token: String,
}

async fn ws_handler(
    State(backend): State<Arc<MockBackend>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| bridge(socket, backend, query.token))
}

/// Relay between the socket and the test's channels. Dropping the test's
/// `to_client` closes the socket.
async fn bridge(socket: WebSocket, backend: Arc<MockBackend>, token: String) {
    let (out_tx, mut out_rx) = mpsc::channel::<String>(16);
    let (in_tx, in_rx) = mpsc::channel::<String>(16);
    let server = ServerSocket { token, to_client: out_tx, from_client: in_rx };
    if backend.accepted.send(server).is_err() {
        return;
    }

    let (mut ws_tx, mut ws_rx) = socket.split();
    loop {
        tokio::select! {
            out = out_rx.recv() => match out {
                Some(text) => {
                    if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                None => {
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    break;
                }
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => {
                    let _ = in_tx.send(text.as_str().to_owned()).await;
                }
                Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => break,
                _ => {}
            },
        }
    }
}

async fn refresh_handler(
    State(backend): State<Arc<MockBackend>>,
    headers: HeaderMap,
) -> axum::response::Response {
    backend.refresh_headers.lock().push(authorization(&headers));
    match backend.refresh.lock().clone() {
        Some(triple) => Json(token_response(&triple)).into_response(),
        None => (StatusCode::UNAUTHORIZED, "refresh token expired").into_response(),
    }
}

async fn logout_handler(State(backend): State<Arc<MockBackend>>, headers: HeaderMap) -> StatusCode {
    backend.logout_headers.lock().push(authorization(&headers));
    StatusCode::NO_CONTENT
}

fn authorization(headers: &HeaderMap) -> String {
    headers.get("authorization").and_then(|v| v.to_str().ok()).unwrap_or_default().to_owned()
}

type Backend = (SocketAddr, Arc<MockBackend>, mpsc::UnboundedReceiver<ServerSocket>);

async fn spawn_backend() -> anyhow::Result<Backend> {
    let (accepted, sockets) = mpsc::unbounded_channel();
    let backend = Arc::new(MockBackend {
        accepted,
        refresh: Mutex::new(None),
        refresh_headers: Mutex::new(Vec::new()),
        logout_headers: Mutex::new(Vec::new()),
    });
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/refresh", post(refresh_handler))
        .route("/api/logout", post(logout_handler))
        .with_state(Arc::clone(&backend));

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((addr, backend, sockets))
}

fn spawn_session(
    addr: SocketAddr,
    state_dir: &std::path::Path,
    refresh_check: Duration,
) -> SessionHandle {
    // main.rs installs the ring provider at startup; tests must do the same.
    let _ = rustls::crypto::ring::default_provider().install_default();
    let base = format!("http://{addr}");
    Session::spawn(SessionConfig {
        api: Arc::new(HttpAuthApi::new(&base, Duration::from_secs(5))),
        store: Box::new(FileTokenStore::new(state_dir)),
        connector: Arc::new(WsConnector),
        ws_base: base,
        timings: Timings {
            refresh_check,
            reconnect_delay: Duration::from_millis(100),
            ..Timings::default()
        },
    })
}

async fn accept(
    sockets: &mut mpsc::UnboundedReceiver<ServerSocket>,
) -> anyhow::Result<ServerSocket> {
    tokio::time::timeout(TIMEOUT, sockets.recv())
        .await
        .map_err(|_| anyhow::anyhow!("no websocket connection"))?
        .ok_or_else(|| anyhow::anyhow!("backend gone"))
}

async fn wait_for(
    events: &mut broadcast::Receiver<SessionEvent>,
    wanted: impl Fn(&SessionEvent) -> bool,
) -> anyhow::Result<SessionEvent> {
    tokio::time::timeout(TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(event) if wanted(&event) => return Ok(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => anyhow::bail!("event stream closed"),
            }
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("timed out waiting for event"))?
}

#[tokio::test]
async fn realtime_round_trip() -> anyhow::Result<()> {
    let (addr, backend, mut sockets) = spawn_backend().await?;
    let dir = tempfile::tempdir()?;
    let handle = spawn_session(addr, dir.path(), Duration::from_secs(30));
    let mut events = handle.subscribe();

    let triple = triple_for(1, "alice", epoch_secs() + 3_600);
    handle.login_with_token(triple.clone()).await?;
    let mut socket = accept(&mut sockets).await?;
    assert_eq!(socket.token, triple.access_token);
    wait_for(&mut events, |e| *e == SessionEvent::Channel(ChannelState::Open)).await?;

    // Keep-alive.
    socket.to_client.send(r#"{"type":"ping"}"#.to_owned()).await?;
    let pong = tokio::time::timeout(TIMEOUT, socket.from_client.recv()).await?;
    assert_eq!(pong.as_deref(), Some(r#"{"type":"pong"}"#));

    // Chat message with a double-encoded payload.
    let payload =
        serde_json::json!({ "id": 77, "sender_id": 2, "receiver_id": 1, "content": "hi" });
    let frame = serde_json::json!({
        "type": "message",
        "payload": payload.to_string(),
        "user_id": 2,
        "receiver_id": 1,
    });
    socket.to_client.send(frame.to_string()).await?;
    let event = wait_for(&mut events, |e| matches!(e, SessionEvent::ChatMessage(_))).await?;
    let SessionEvent::ChatMessage(message) = event else {
        anyhow::bail!("unexpected event");
    };
    assert_eq!(message.id, 77);
    assert_eq!(handle.messages().await?.len(), 1);

    // Server drops the socket; the client comes back with the same token.
    drop(socket);
    wait_for(&mut events, |e| *e == SessionEvent::Channel(ChannelState::Closed)).await?;
    let second = accept(&mut sockets).await?;
    assert_eq!(second.token, triple.access_token);
    wait_for(&mut events, |e| *e == SessionEvent::Channel(ChannelState::Open)).await?;

    // Logout invalidates server-side and stays disconnected.
    handle.logout().await?;
    wait_for(&mut events, |e| *e == SessionEvent::LoggedOut).await?;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(*backend.logout_headers.lock(), [format!("Bearer {}", triple.access_token)]);
    assert!(sockets.try_recv().is_err(), "no reconnect after logout");
    assert!(FileTokenStore::new(dir.path()).load().is_none());
    Ok(())
}

#[tokio::test]
async fn proactive_refresh_over_http() -> anyhow::Result<()> {
    let (addr, backend, mut sockets) = spawn_backend().await?;
    let dir = tempfile::tempdir()?;
    let fresh = triple_for(1, "alice", epoch_secs() + 3_600);
    *backend.refresh.lock() = Some(fresh.clone());

    let handle = spawn_session(addr, dir.path(), Duration::from_millis(50));
    let mut events = handle.subscribe();
    let stale = triple_for(1, "alice", epoch_secs() + 20);
    handle.login_with_token(stale.clone()).await?;
    let _socket = accept(&mut sockets).await?;

    wait_for(&mut events, |e| matches!(e, SessionEvent::Authenticated(_))).await?;
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while handle.access_token().await?.as_deref() != Some(fresh.access_token.as_str()) {
        anyhow::ensure!(tokio::time::Instant::now() < deadline, "token was never refreshed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(backend.refresh_headers.lock()[0], format!("Bearer {}", stale.refresh_token));
    assert_eq!(FileTokenStore::new(dir.path()).load(), Some(fresh));
    Ok(())
}

#[tokio::test]
async fn rejected_refresh_requires_login() -> anyhow::Result<()> {
    let (addr, backend, mut sockets) = spawn_backend().await?;
    let dir = tempfile::tempdir()?;
    let handle = spawn_session(addr, dir.path(), Duration::from_secs(30));
    let mut events = handle.subscribe();

    handle.login_with_token(triple_for(1, "alice", epoch_secs() + 3_600)).await?;
    let _socket = accept(&mut sockets).await?;

    let err = handle.refresh_token().await.expect_err("401 must fail");
    assert!(err.message.contains("401"), "got: {err}");
    wait_for(&mut events, |e| *e == SessionEvent::LoginRequired).await?;
    assert!(!handle.is_authenticated().await?);
    assert_eq!(backend.refresh_headers.lock().len(), 1);
    Ok(())
}
