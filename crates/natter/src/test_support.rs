// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: token builders, mock seams, and assertion helpers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::api::{ApiFuture, AuthApi};
use crate::channel::{ConnectFuture, Connection, Connector};
use crate::token::{epoch_secs, TokenResponse, TokenTriple, UserId};

/// Unsigned JWT with `claims` as its payload.
pub fn fake_jwt(claims: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2ln")
}

/// Access token for `user_id` expiring at epoch second `exp`.
pub fn jwt_expiring_at(user_id: UserId, username: &str, exp: i64) -> String {
    fake_jwt(serde_json::json!({
        "sub": user_id,
        "username": username,
        "verified": true,
        "exp": exp,
    }))
}

/// Complete triple for `user_id` whose access token expires at `exp`.
pub fn triple_for(user_id: UserId, username: &str, exp: i64) -> TokenTriple {
    TokenTriple::new(
        jwt_expiring_at(user_id, username, exp),
        format!("refresh-{user_id}-{exp}"),
        format!("id-{user_id}"),
    )
}

/// Complete triple for user 1 expiring `secs` from now.
pub fn triple_expiring_in(secs: i64) -> TokenTriple {
    triple_for(1, "alice", epoch_secs() + secs)
}

/// Refresh response carrying `triple`.
pub fn token_response(triple: &TokenTriple) -> TokenResponse {
    TokenResponse {
        access_token: Some(triple.access_token.clone()),
        refresh_token: Some(triple.refresh_token.clone()),
        id_token: Some(triple.id_token.clone()),
    }
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}

/// Scripted [`AuthApi`]: refresh answers are popped from a queue (an empty
/// queue fails), every Authorization header is recorded.
#[derive(Default)]
pub struct MockAuthApi {
    refresh_results: Mutex<VecDeque<Result<TokenResponse, String>>>,
    refresh_headers: Mutex<Vec<String>>,
    logout_headers: Mutex<Vec<String>>,
    logout_fails: AtomicBool,
    refresh_delay: Mutex<Duration>,
}

impl MockAuthApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_refresh(&self, response: TokenResponse) {
        self.refresh_results.lock().push_back(Ok(response));
    }

    pub fn push_refresh_error(&self, message: &str) {
        self.refresh_results.lock().push_back(Err(message.to_owned()));
    }

    /// Hold every refresh answer back for `delay`.
    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock() = delay;
    }

    pub fn fail_logout(&self) {
        self.logout_fails.store(true, Ordering::Relaxed);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_headers.lock().len()
    }

    pub fn refresh_headers(&self) -> Vec<String> {
        self.refresh_headers.lock().clone()
    }

    pub fn logout_headers(&self) -> Vec<String> {
        self.logout_headers.lock().clone()
    }
}

impl AuthApi for MockAuthApi {
    fn refresh(&self, authorization: String) -> ApiFuture<'_, TokenResponse> {
        self.refresh_headers.lock().push(authorization);
        let next = self.refresh_results.lock().pop_front();
        let delay = *self.refresh_delay.lock();
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match next {
                Some(Ok(response)) => Ok(response),
                Some(Err(message)) => Err(anyhow::anyhow!(message)),
                None => Err(anyhow::anyhow!("no refresh response queued")),
            }
        })
    }

    fn logout(&self, authorization: String) -> ApiFuture<'_, ()> {
        self.logout_headers.lock().push(authorization);
        let fails = self.logout_fails.load(Ordering::Relaxed);
        Box::pin(async move {
            if fails {
                anyhow::bail!("logout failed (500 Internal Server Error)");
            }
            Ok(())
        })
    }
}

/// Server side of a [`MockConnector`] connection.
///
/// Frames pushed into `to_client` arrive as inbound text; dropping it closes
/// the socket. Frames the client sends show up on `from_client`.
pub struct MockSocket {
    pub url: String,
    pub to_client: mpsc::Sender<String>,
    pub from_client: mpsc::Receiver<String>,
}

/// In-process [`Connector`] handing each accepted socket to the test.
pub struct MockConnector {
    urls: Mutex<Vec<String>>,
    refuse: AtomicBool,
    accepted: mpsc::UnboundedSender<MockSocket>,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockSocket>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            urls: Mutex::new(Vec::new()),
            refuse: AtomicBool::new(false),
            accepted,
        });
        (connector, rx)
    }

    /// Make subsequent connects fail (or succeed again).
    pub fn set_refusing(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::Relaxed);
    }

    pub fn connect_count(&self) -> usize {
        self.urls.lock().len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

impl Connector for MockConnector {
    fn connect(&self, url: String) -> ConnectFuture<'_> {
        self.urls.lock().push(url.clone());
        let refuse = self.refuse.load(Ordering::Relaxed);
        Box::pin(async move {
            if refuse {
                anyhow::bail!("connection refused");
            }
            let (out_tx, from_client) = mpsc::channel(64);
            let (to_client, in_rx) = mpsc::channel(64);
            self.accepted
                .send(MockSocket { url, to_client, from_client })
                .map_err(|_| anyhow::anyhow!("test dropped the socket receiver"))?;
            Ok(Connection { outbound: out_tx, inbound: in_rx })
        })
    }
}
