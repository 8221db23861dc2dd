// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Realtime channel: the single push socket of an authenticated session.
//!
//! [`RealtimeChannel`] is plain state owned by the session actor. Network work
//! happens in a spawned reader task that posts [`ChannelEvent`]s back into the
//! actor's queue; every event carries the socket generation so anything from
//! a superseded socket is ignored.

pub mod frame;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;

/// Fixed delay between a socket close and the next open.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(2000);

/// Connection state of the push socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

impl ChannelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An established text-frame connection.
///
/// Dropping `outbound` closes the socket; `inbound` yields `None` once the
/// socket is gone.
pub struct Connection {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<String>,
}

/// Boxed future returned by [`Connector::connect`].
pub type ConnectFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<Connection>> + Send + 'a>>;

/// Transport seam for the push socket.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: String) -> ConnectFuture<'_>;
}

/// tokio-tungstenite [`Connector`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, url: String) -> ConnectFuture<'_> {
        Box::pin(async move {
            let (ws_stream, _) = tokio_tungstenite::connect_async(&url).await?;
            let (mut write, mut read) = ws_stream.split();
            let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
            let (in_tx, in_rx) = mpsc::channel::<String>(256);

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        out = out_rx.recv() => match out {
                            Some(text) => {
                                if let Err(e) = write.send(WsMessage::Text(text.into())).await {
                                    tracing::debug!(err = %e, "ws send failed");
                                    break;
                                }
                            }
                            None => {
                                let _ = write.send(WsMessage::Close(None)).await;
                                break;
                            }
                        },
                        msg = read.next() => match msg {
                            Some(Ok(WsMessage::Text(text))) => {
                                if in_tx.send(text.to_string()).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(WsMessage::Close(_))) | None => break,
                            Some(Err(e)) => {
                                tracing::debug!(err = %e, "ws read error");
                                break;
                            }
                            Some(Ok(_)) => {} // binary and transport-level ping/pong
                        },
                    }
                }
            });

            Ok(Connection { outbound: out_tx, inbound: in_rx })
        })
    }
}

/// Notifications posted by the reader task.
#[derive(Debug)]
pub enum ChannelEvent {
    Opened { generation: u64, outbound: mpsc::Sender<String> },
    Frame { generation: u64, text: String },
    Closed { generation: u64, reason: String },
}

/// Build the socket URL from an HTTP or WS base URL.
pub fn build_ws_url(base_url: &str, access_token: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let ws_base = if base.starts_with("https://") {
        base.replacen("https://", "wss://", 1)
    } else {
        base.replacen("http://", "ws://", 1)
    };
    format!("{ws_base}/ws?token={access_token}")
}

/// Push socket state: at most one live socket, fixed-delay reconnect.
pub struct RealtimeChannel {
    connector: Arc<dyn Connector>,
    base_url: String,
    reconnect_delay: Duration,
    state: ChannelState,
    generation: u64,
    outbound: Option<mpsc::Sender<String>>,
    cancel: Option<CancellationToken>,
    reconnect_on_close: bool,
    reconnect_at: Option<Instant>,
}

impl RealtimeChannel {
    pub fn new(connector: Arc<dyn Connector>, base_url: &str, reconnect_delay: Duration) -> Self {
        Self {
            connector,
            base_url: base_url.to_owned(),
            reconnect_delay,
            state: ChannelState::Closed,
            generation: 0,
            outbound: None,
            cancel: None,
            reconnect_on_close: false,
            reconnect_at: None,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Deadline of the pending reconnect, if one is scheduled.
    pub fn reconnect_at(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Start a new socket with `access_token`, replacing any current one.
    ///
    /// No-op (returns `false`) without a token. Events from the new socket
    /// are posted to `events`.
    pub fn open<T>(&mut self, access_token: Option<&str>, events: &mpsc::Sender<T>) -> bool
    where
        T: From<ChannelEvent> + Send + 'static,
    {
        self.reconnect_at = None;
        let Some(token) = access_token.filter(|t| !t.is_empty()) else {
            tracing::debug!("channel open skipped: no access token");
            return false;
        };

        self.teardown();
        self.generation += 1;
        self.state = ChannelState::Connecting;
        self.reconnect_on_close = true;

        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());
        let url = build_ws_url(&self.base_url, token);
        tracing::debug!(generation = self.generation, "channel connecting");
        spawn_reader(Arc::clone(&self.connector), url, self.generation, cancel, events.clone());
        true
    }

    /// The socket for `generation` finished its handshake.
    pub fn on_opened(&mut self, generation: u64, outbound: mpsc::Sender<String>) -> bool {
        if !self.is_current(generation) || self.state != ChannelState::Connecting {
            return false;
        }
        self.state = ChannelState::Open;
        self.outbound = Some(outbound);
        tracing::info!(generation, "channel open");
        true
    }

    /// The socket for `generation` closed (or failed to connect). Schedules a
    /// reconnect unless the close handler was detached.
    pub fn on_closed(&mut self, generation: u64, reason: &str) -> bool {
        if !self.is_current(generation) || self.state == ChannelState::Closed {
            return false;
        }
        tracing::info!(generation, reason, "channel closed");
        self.teardown();
        self.schedule_reconnect();
        true
    }

    /// Stop reconnecting after the next close.
    pub fn detach_close_handler(&mut self) {
        self.reconnect_on_close = false;
        self.reconnect_at = None;
    }

    /// Close the current socket locally. Runs the close handler like a
    /// remote close does, so detach first to stay closed.
    pub fn close(&mut self) {
        if self.state == ChannelState::Closed {
            return;
        }
        self.teardown();
        self.schedule_reconnect();
    }

    /// Take the due reconnect, if any. The caller then calls [`Self::open`]
    /// with the then-current access token.
    pub fn take_reconnect(&mut self) -> bool {
        self.reconnect_at.take().is_some()
    }

    /// Queue a frame on the open socket.
    pub fn send(&self, text: String) -> bool {
        if self.state != ChannelState::Open {
            return false;
        }
        match self.outbound.as_ref() {
            Some(tx) => tx.try_send(text).is_ok(),
            None => false,
        }
    }

    /// Answer a keep-alive ping. Only an open socket replies.
    pub fn send_pong(&self) -> bool {
        self.send(frame::pong())
    }

    fn teardown(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.outbound = None;
        self.state = ChannelState::Closed;
    }

    fn schedule_reconnect(&mut self) {
        if self.reconnect_on_close {
            self.reconnect_at = Some(Instant::now() + self.reconnect_delay);
        }
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

/// Connect, then forward frames until the socket ends or `cancel` fires.
fn spawn_reader<T>(
    connector: Arc<dyn Connector>,
    url: String,
    generation: u64,
    cancel: CancellationToken,
    events: mpsc::Sender<T>,
) where
    T: From<ChannelEvent> + Send + 'static,
{
    tokio::spawn(async move {
        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            res = connector.connect(url) => res,
        };
        let Connection { outbound, mut inbound } = match connected {
            Ok(conn) => conn,
            Err(e) => {
                tracing::debug!(generation, err = %e, "channel connect failed");
                let reason = format!("connect failed: {e}");
                let _ = events.send(ChannelEvent::Closed { generation, reason }.into()).await;
                return;
            }
        };
        if cancel.is_cancelled() {
            return;
        }
        if events.send(ChannelEvent::Opened { generation, outbound }.into()).await.is_err() {
            return;
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                text = inbound.recv() => match text {
                    Some(text) => {
                        let frame = ChannelEvent::Frame { generation, text };
                        if events.send(frame.into()).await.is_err() {
                            return;
                        }
                    }
                    None => break,
                },
            }
        }
        let reason = "socket closed".to_owned();
        let _ = events.send(ChannelEvent::Closed { generation, reason }.into()).await;
    });
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
