// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Natter: session and realtime client for a social-chat backend.

pub mod api;
pub mod channel;
pub mod chat;
pub mod config;
pub mod error;
pub mod notify;
pub mod refresh;
pub mod session;
pub mod test_support;
pub mod token;

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::api::HttpAuthApi;
use crate::channel::WsConnector;
use crate::config::NatterConfig;
use crate::session::{Session, SessionConfig, SessionEvent};
use crate::token::persist::FileTokenStore;

/// Run a session until Ctrl-C, printing every [`SessionEvent`] as a JSON line.
pub async fn run(config: NatterConfig) -> anyhow::Result<()> {
    let state_dir = config.state_dir();
    info!(state_dir = %state_dir.display(), base_url = %config.base_url, "starting session");

    let handle = Session::spawn(SessionConfig {
        api: Arc::new(HttpAuthApi::new(&config.base_url, config.http_timeout())),
        store: Box::new(FileTokenStore::new(&state_dir)),
        connector: Arc::new(WsConnector),
        ws_base: config.ws_base().to_owned(),
        timings: config.timings(),
    });
    let mut events = handle.subscribe();

    let authenticated = match config.seed_triple() {
        Some(triple) => match handle.login_with_token(triple).await {
            Ok(_) => true,
            Err(e) => {
                warn!(err = %e, "login with supplied tokens failed");
                false
            }
        },
        None => handle.restore_session().await?,
    };
    if !authenticated {
        handle.shutdown().await;
        anyhow::bail!("no session: pass --access-token or log in first");
    }
    if let Some(peer) = config.peer {
        handle.set_current_peer(Some(peer)).await?;
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => {
                    println!("{}", serde_json::to_string(&event)?);
                    if event == SessionEvent::LoginRequired {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    if config.logout_on_exit && handle.is_authenticated().await? {
        handle.logout().await?;
    }
    handle.shutdown().await;
    Ok(())
}
