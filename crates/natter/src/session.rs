// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session actor: token lifecycle, refresh scheduling, and realtime dispatch.
//!
//! One task owns every piece of mutable session state. Public operations,
//! socket events, and refresh results all arrive on a single command queue;
//! the refresh interval, the typing deadline, and the reconnect deadline are
//! branches of the same `select!`, so every handler runs to completion before
//! the next one starts.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::AuthApi;
use crate::channel::frame::{self, InboundEvent, Message, Notification};
use crate::channel::{ChannelEvent, ChannelState, Connector, RealtimeChannel};
use crate::chat::ChatState;
use crate::error::SessionError;
use crate::notify::NotificationSink;
use crate::refresh::RefreshScheduler;
use crate::token::persist::TokenStore;
use crate::token::{
    bearer, decode_claims, SessionUser, TokenKind, TokenResponse, TokenTriple, UserId,
};

/// Timer settings for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub refresh_check: Duration,
    pub refresh_margin_secs: i64,
    pub reconnect_delay: Duration,
    pub typing_quiet: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            refresh_check: crate::refresh::DEFAULT_CHECK_INTERVAL,
            refresh_margin_secs: crate::refresh::DEFAULT_REFRESH_MARGIN_SECS,
            reconnect_delay: crate::channel::DEFAULT_RECONNECT_DELAY,
            typing_quiet: crate::chat::DEFAULT_TYPING_QUIET,
        }
    }
}

/// Parameters for [`Session::spawn`].
pub struct SessionConfig {
    pub api: Arc<dyn AuthApi>,
    pub store: Box<dyn TokenStore>,
    pub connector: Arc<dyn Connector>,
    /// Base URL the socket URL is derived from (`http(s)://` or `ws(s)://`).
    pub ws_base: String,
    pub timings: Timings,
}

/// UI-facing notifications published by the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum SessionEvent {
    Authenticated(SessionUser),
    LoggedOut,
    /// A refresh failed; the user has to log in again.
    LoginRequired,
    ChatMessage(Message),
    Typing(bool),
    Notification(Notification),
    Channel(ChannelState),
}

type Reply<T> = oneshot::Sender<T>;
type Inspect = Box<dyn FnOnce(&Actor) + Send>;

enum Command {
    Login { triple: TokenTriple, reply: Reply<Result<SessionUser, SessionError>> },
    Logout { reply: Reply<()> },
    Refresh { reply: Reply<Result<SessionUser, SessionError>> },
    Restore { reply: Reply<bool> },
    OpenChannel { reply: Reply<bool> },
    SetCurrentPeer(Option<UserId>),
    SetMessages(Vec<Message>),
    MarkNotificationRead { id: u64, reply: Reply<bool> },
    MarkAllNotificationsRead,
    Inspect(Inspect),
    Shutdown,
    Channel(ChannelEvent),
    RefreshDone { epoch: u64, result: anyhow::Result<TokenResponse> },
}

impl From<ChannelEvent> for Command {
    fn from(event: ChannelEvent) -> Self {
        Self::Channel(event)
    }
}

/// Entry point for starting a session actor.
pub struct Session;

impl Session {
    /// Spawn the actor on the current runtime.
    pub fn spawn(config: SessionConfig) -> SessionHandle {
        let (tx, rx) = mpsc::channel(256);
        let (events, _) = broadcast::channel(256);
        let actor = Actor::new(config, tx.downgrade(), rx, events.clone());
        tokio::spawn(actor.run());
        SessionHandle { tx, events }
    }
}

/// Cloneable handle to a running session.
///
/// Every call fails with a `SHUTDOWN` error once the actor has stopped.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Adopt `triple` as the session credentials.
    ///
    /// Decodes the user, persists the tokens, ensures the realtime channel is
    /// open, and starts the refresh scheduler. Nothing changes when the access
    /// token is missing or does not decode.
    pub async fn login_with_token(&self, triple: TokenTriple) -> Result<SessionUser, SessionError> {
        self.request(|reply| Command::Login { triple, reply }).await?
    }

    pub async fn logout(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Logout { reply }).await
    }

    /// Exchange the refresh token now. Failure forces a logout and publishes
    /// [`SessionEvent::LoginRequired`].
    pub async fn refresh_token(&self) -> Result<SessionUser, SessionError> {
        self.request(|reply| Command::Refresh { reply }).await?
    }

    /// Log in from persisted tokens. `false` when nothing complete is stored.
    pub async fn restore_session(&self) -> Result<bool, SessionError> {
        self.request(|reply| Command::Restore { reply }).await
    }

    /// Open the realtime channel with the current access token.
    pub async fn open_channel(&self) -> Result<bool, SessionError> {
        self.request(|reply| Command::OpenChannel { reply }).await
    }

    pub async fn set_current_peer(&self, peer: Option<UserId>) -> Result<(), SessionError> {
        self.send(Command::SetCurrentPeer(peer)).await
    }

    pub async fn set_messages(&self, messages: Vec<Message>) -> Result<(), SessionError> {
        self.send(Command::SetMessages(messages)).await
    }

    pub async fn mark_notification_read(&self, id: u64) -> Result<bool, SessionError> {
        self.request(|reply| Command::MarkNotificationRead { id, reply }).await
    }

    pub async fn mark_all_notifications_read(&self) -> Result<(), SessionError> {
        self.send(Command::MarkAllNotificationsRead).await
    }

    /// `Bearer <token>` for `kind`, if a session exists.
    pub async fn auth_header(&self, kind: TokenKind) -> Result<Option<String>, SessionError> {
        self.inspect(move |a| a.tokens.as_ref().map(|t| bearer(t.token(kind)))).await
    }

    /// Authorization plus `Content-Type: application/json`.
    pub async fn auth_json_headers(&self, kind: TokenKind) -> Result<HeaderMap, SessionError> {
        let header = self.auth_header(kind).await?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(value) = header.and_then(|h| HeaderValue::from_str(&h).ok()) {
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    pub async fn access_token(&self) -> Result<Option<String>, SessionError> {
        self.inspect(|a| {
            let token = a.tokens.as_ref().map(|t| t.access_token.clone());
            if token.is_none() {
                debug!("no access token");
            }
            token
        })
        .await
    }

    pub async fn is_authenticated(&self) -> Result<bool, SessionError> {
        self.inspect(|a| a.user.is_some()).await
    }

    pub async fn user(&self) -> Result<Option<SessionUser>, SessionError> {
        self.inspect(|a| a.user.clone()).await
    }

    /// Conversation messages, most recent first.
    pub async fn messages(&self) -> Result<Vec<Message>, SessionError> {
        self.inspect(|a| a.chat.messages().to_vec()).await
    }

    pub async fn current_peer(&self) -> Result<Option<UserId>, SessionError> {
        self.inspect(|a| a.chat.current_peer()).await
    }

    pub async fn is_typing(&self) -> Result<bool, SessionError> {
        self.inspect(|a| a.chat.is_typing()).await
    }

    pub async fn notifications(&self) -> Result<Vec<Notification>, SessionError> {
        self.inspect(|a| a.notifications.list().to_vec()).await
    }

    pub async fn unread_count(&self) -> Result<usize, SessionError> {
        self.inspect(|a| a.notifications.unread_count()).await
    }

    pub async fn channel_state(&self) -> Result<ChannelState, SessionError> {
        self.inspect(|a| a.channel.state()).await
    }

    pub async fn is_refresh_running(&self) -> Result<bool, SessionError> {
        self.inspect(|a| a.scheduler.is_running()).await
    }

    /// Stop the actor. Later calls fail with `SHUTDOWN`.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown).await;
    }

    async fn send(&self, cmd: Command) -> Result<(), SessionError> {
        self.tx.send(cmd).await.map_err(|_| SessionError::shutdown())
    }

    async fn request<T>(&self, cmd: impl FnOnce(Reply<T>) -> Command) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(cmd(reply)).await?;
        rx.await.map_err(|_| SessionError::shutdown())
    }

    async fn inspect<T, F>(&self, f: F) -> Result<T, SessionError>
    where
        T: Send + 'static,
        F: FnOnce(&Actor) -> T + Send + 'static,
    {
        self.request(|reply| {
            Command::Inspect(Box::new(move |actor| {
                let _ = reply.send(f(actor));
            }))
        })
        .await
    }
}

struct Actor {
    api: Arc<dyn AuthApi>,
    store: Box<dyn TokenStore>,
    tx: mpsc::WeakSender<Command>,
    rx: mpsc::Receiver<Command>,
    events: broadcast::Sender<SessionEvent>,

    tokens: Option<TokenTriple>,
    user: Option<SessionUser>,
    scheduler: RefreshScheduler,
    channel: RealtimeChannel,
    chat: ChatState,
    notifications: NotificationSink,

    /// Bumped on logout so a late refresh result cannot log back in.
    epoch: u64,
    refresh_in_flight: bool,
    refresh_waiters: Vec<Reply<Result<SessionUser, SessionError>>>,
}

impl Actor {
    fn new(
        config: SessionConfig,
        tx: mpsc::WeakSender<Command>,
        rx: mpsc::Receiver<Command>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        let SessionConfig { api, store, connector, ws_base, timings } = config;
        Self {
            api,
            store,
            tx,
            rx,
            events,
            tokens: None,
            user: None,
            scheduler: RefreshScheduler::new(timings.refresh_check, timings.refresh_margin_secs),
            channel: RealtimeChannel::new(connector, &ws_base, timings.reconnect_delay),
            chat: ChatState::new(timings.typing_quiet),
            notifications: NotificationSink::new(),
            epoch: 0,
            refresh_in_flight: false,
            refresh_waiters: Vec::new(),
        }
    }

    async fn run(mut self) {
        loop {
            let typing_deadline = self.chat.typing_deadline();
            let reconnect_at = self.channel.reconnect_at();

            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle(cmd),
                },
                _ = self.scheduler.tick() => self.on_refresh_tick(),
                _ = sleep_until(typing_deadline) => {
                    if self.chat.expire_typing(Instant::now()) {
                        self.emit(SessionEvent::Typing(false));
                    }
                }
                _ = sleep_until(reconnect_at) => {
                    if self.channel.take_reconnect() {
                        debug!("reconnecting channel");
                        self.open_channel();
                    }
                }
            }
        }
        debug!("session actor stopped");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Login { triple, reply } => {
                let _ = reply.send(self.login_with_token(triple));
            }
            Command::Logout { reply } => {
                self.logout();
                let _ = reply.send(());
            }
            Command::Refresh { reply } => self.start_refresh(Some(reply)),
            Command::Restore { reply } => {
                let _ = reply.send(self.restore_session());
            }
            Command::OpenChannel { reply } => {
                let _ = reply.send(self.open_channel());
            }
            Command::SetCurrentPeer(peer) => {
                if self.chat.set_current_peer(peer) {
                    self.emit(SessionEvent::Typing(false));
                }
            }
            Command::SetMessages(messages) => self.chat.set_messages(messages),
            Command::MarkNotificationRead { id, reply } => {
                let _ = reply.send(self.notifications.mark_read(id));
            }
            Command::MarkAllNotificationsRead => self.notifications.mark_all_read(),
            Command::Inspect(f) => f(self),
            Command::Channel(event) => self.on_channel_event(event),
            Command::RefreshDone { epoch, result } => self.on_refresh_done(epoch, result),
            Command::Shutdown => {}
        }
    }

    // -- Token lifecycle ------------------------------------------------------

    fn login_with_token(&mut self, triple: TokenTriple) -> Result<SessionUser, SessionError> {
        if triple.access_token.is_empty() {
            warn!("login skipped: no access token");
            return Err(SessionError::decode("no access token"));
        }
        let claims = decode_claims(&triple.access_token).inspect_err(|e| {
            warn!(err = %e, "login skipped: undecodable access token");
        })?;
        let user = SessionUser::from(claims);

        if let Err(e) = self.store.save(&triple) {
            warn!(err = %e, "failed to persist tokens");
        }
        self.tokens = Some(triple);
        self.user = Some(user.clone());

        if self.channel.state() != ChannelState::Open {
            self.open_channel();
        }
        if self.scheduler.start() {
            debug!("refresh scheduler started");
        }
        info!(user_id = user.id, username = %user.username, "session authenticated");
        self.emit(SessionEvent::Authenticated(user.clone()));
        Ok(user)
    }

    fn logout(&mut self) {
        self.scheduler.stop();
        self.channel.detach_close_handler();

        if let Some(tokens) = self.tokens.as_ref() {
            let api = Arc::clone(&self.api);
            let header = bearer(&tokens.access_token);
            tokio::spawn(async move {
                if let Err(e) = api.logout(header).await {
                    warn!(err = %e, "server-side logout failed");
                }
            });
        }

        self.epoch += 1;
        self.tokens = None;
        self.user = None;
        if let Err(e) = self.store.clear() {
            warn!(err = %e, "failed to clear persisted tokens");
        }
        self.notifications.clear();

        let before = self.channel.state();
        self.channel.close();
        self.publish_channel(before);
        info!("session logged out");
        self.emit(SessionEvent::LoggedOut);
    }

    fn restore_session(&mut self) -> bool {
        let Some(triple) = self.store.load().filter(TokenTriple::is_complete) else {
            debug!("no complete persisted session");
            return false;
        };
        self.login_with_token(triple).is_ok()
    }

    fn on_refresh_tick(&mut self) {
        if self.refresh_in_flight {
            debug!("refresh already in flight, skipping check");
            return;
        }
        let Some(tokens) = self.tokens.as_ref() else {
            return;
        };
        match self.scheduler.needs_refresh(tokens) {
            Ok(true) => {
                debug!("access token near expiry");
                self.start_refresh(None);
            }
            Ok(false) => {}
            Err(e) => debug!(err = %e, "expiry check failed, treating as unauthenticated"),
        }
    }

    fn start_refresh(&mut self, reply: Option<Reply<Result<SessionUser, SessionError>>>) {
        self.refresh_waiters.extend(reply);
        if self.refresh_in_flight {
            return;
        }
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        self.refresh_in_flight = true;

        let refresh_token = self.tokens.as_ref().map(|t| t.refresh_token.as_str());
        let header = bearer(refresh_token.unwrap_or_default());
        let api = Arc::clone(&self.api);
        let epoch = self.epoch;
        tokio::spawn(async move {
            let result = api.refresh(header).await;
            let _ = tx.send(Command::RefreshDone { epoch, result }).await;
        });
    }

    fn on_refresh_done(&mut self, epoch: u64, result: anyhow::Result<TokenResponse>) {
        self.refresh_in_flight = false;
        let waiters = std::mem::take(&mut self.refresh_waiters);

        let outcome = if epoch != self.epoch {
            debug!("discarding refresh result from a previous session");
            Err(SessionError::network("session ended during refresh"))
        } else {
            let refreshed = match result {
                Ok(body) => body
                    .into_triple()
                    .ok_or_else(|| SessionError::network("refresh response without tokens")),
                Err(e) => Err(SessionError::network(e.to_string())),
            };
            match refreshed.and_then(|triple| self.login_with_token(triple)) {
                Ok(user) => {
                    info!("access token refreshed");
                    Ok(user)
                }
                Err(e) => {
                    warn!(err = %e, "refresh failed, forcing logout");
                    self.logout();
                    self.emit(SessionEvent::LoginRequired);
                    Err(e)
                }
            }
        };

        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    // -- Realtime channel -----------------------------------------------------

    fn open_channel(&mut self) -> bool {
        let Some(tx) = self.tx.upgrade() else {
            return false;
        };
        let before = self.channel.state();
        let token = self.tokens.as_ref().map(|t| t.access_token.as_str());
        let opened = self.channel.open(token, &tx);
        self.publish_channel(before);
        opened
    }

    fn on_channel_event(&mut self, event: ChannelEvent) {
        let before = self.channel.state();
        match event {
            ChannelEvent::Opened { generation, outbound } => {
                self.channel.on_opened(generation, outbound);
            }
            ChannelEvent::Closed { generation, reason } => {
                if self.channel.on_closed(generation, &reason) {
                    debug!(err = %SessionError::connection_lost(reason), "reconnect scheduled");
                }
            }
            ChannelEvent::Frame { generation, text } => {
                if self.channel.is_current(generation) {
                    self.dispatch(&text);
                }
            }
        }
        self.publish_channel(before);
    }

    /// Classify one inbound frame and route it.
    fn dispatch(&mut self, text: &str) {
        let inbound = match frame::parse(text, chrono::Utc::now()) {
            Ok(Some(inbound)) => inbound,
            Ok(None) => {
                debug!("dropping malformed frame");
                return;
            }
            Err(e) => {
                warn!(err = %e, "dropping frame");
                return;
            }
        };

        debug!(
            kind = inbound.event.kind(),
            origin = ?inbound.origin(),
            at = inbound.timestamp(),
            "frame"
        );
        match &inbound.event {
            InboundEvent::Ping => {
                if !self.channel.send_pong() {
                    debug!(state = %self.channel.state(), "ping dropped");
                }
                return;
            }
            InboundEvent::Message(message) => {
                if !self.chat.receive_message(message.clone()) {
                    debug!(id = message.id, "duplicate message");
                }
                self.emit(SessionEvent::ChatMessage(message.clone()));
            }
            InboundEvent::Seen { user_id: Some(reader), receiver_id: Some(sender) } => {
                let flipped = self.chat.mark_as_read(*sender, *reader);
                debug!(sender, receiver = reader, flipped, "read receipt");
            }
            InboundEvent::Typing { user_id: Some(from) } => {
                if self.chat.on_typing(*from, Instant::now()) {
                    self.emit(SessionEvent::Typing(true));
                }
            }
            InboundEvent::Seen { .. } | InboundEvent::Typing { user_id: None } => {
                debug!("frame without user ids");
            }
            InboundEvent::Pong | InboundEvent::Other(_) => {}
        }

        self.notifications.receive(inbound.notification.clone());
        self.emit(SessionEvent::Notification(inbound.notification));
    }

    fn publish_channel(&self, before: ChannelState) {
        let now = self.channel.state();
        if now != before {
            self.emit(SessionEvent::Channel(now));
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

/// Sleep until `deadline`; never resolves for `None`.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
