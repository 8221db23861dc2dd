// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::session::Timings;
use crate::token::TokenTriple;

/// Session and realtime client for the natter chat backend.
#[derive(Debug, Clone, Parser)]
#[command(name = "natter", version, about)]
pub struct NatterConfig {
    /// Backend base URL (serves /api/refresh and /api/logout).
    #[arg(long, env = "NATTER_BASE_URL", default_value = "http://127.0.0.1:3222")]
    pub base_url: String,

    /// Realtime base URL. Defaults to the backend base URL.
    #[arg(long, env = "NATTER_WS_URL")]
    pub ws_url: Option<String>,

    /// Directory holding persisted tokens.
    #[arg(long, env = "NATTER_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Interval between access-token expiry checks, in milliseconds.
    #[arg(long, env = "NATTER_REFRESH_CHECK_MS", default_value_t = 30_000)]
    pub refresh_check_ms: u64,

    /// Refresh once fewer than this many seconds of validity remain.
    #[arg(long, env = "NATTER_REFRESH_MARGIN_SECS", default_value_t = 30)]
    pub refresh_margin_secs: i64,

    /// Delay before reopening a closed realtime socket, in milliseconds.
    #[arg(long, env = "NATTER_RECONNECT_DELAY_MS", default_value_t = 2_000)]
    pub reconnect_delay_ms: u64,

    /// Quiet period before a typing indicator clears, in milliseconds.
    #[arg(long, env = "NATTER_TYPING_QUIET_MS", default_value_t = 3_000)]
    pub typing_quiet_ms: u64,

    /// Timeout for auth HTTP requests, in seconds.
    #[arg(long, env = "NATTER_HTTP_TIMEOUT_SECS", default_value_t = 10)]
    pub http_timeout_secs: u64,

    /// Log format (json or text).
    #[arg(long, env = "NATTER_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "NATTER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Access token to log in with instead of restoring persisted tokens.
    #[arg(long, env = "NATTER_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    #[arg(long, env = "NATTER_REFRESH_TOKEN", hide_env_values = true)]
    pub refresh_token: Option<String>,

    #[arg(long, env = "NATTER_ID_TOKEN", hide_env_values = true)]
    pub id_token: Option<String>,

    /// Conversation peer whose typing events are tracked.
    #[arg(long, env = "NATTER_PEER")]
    pub peer: Option<u64>,

    /// Log out (server-side too) before exiting.
    #[arg(long, env = "NATTER_LOGOUT_ON_EXIT")]
    pub logout_on_exit: bool,
}

impl NatterConfig {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !is_http(&self.base_url) {
            anyhow::bail!("--base-url must be an http:// or https:// URL");
        }
        if let Some(ref ws) = self.ws_url {
            if !is_http(ws) && !ws.starts_with("ws://") && !ws.starts_with("wss://") {
                anyhow::bail!("--ws-url must be an http(s):// or ws(s):// URL");
            }
        }

        for (flag, value) in [
            ("--refresh-check-ms", self.refresh_check_ms),
            ("--reconnect-delay-ms", self.reconnect_delay_ms),
            ("--typing-quiet-ms", self.typing_quiet_ms),
            ("--http-timeout-secs", self.http_timeout_secs),
        ] {
            if value == 0 {
                anyhow::bail!("{flag} must be greater than zero");
            }
        }
        if self.refresh_margin_secs < 0 {
            anyhow::bail!("--refresh-margin-secs must not be negative");
        }

        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }

        let seeded = self.refresh_token.is_some() || self.id_token.is_some();
        if seeded && self.access_token.is_none() {
            anyhow::bail!("--refresh-token/--id-token require --access-token");
        }

        Ok(())
    }

    pub fn refresh_check_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_check_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn typing_quiet(&self) -> Duration {
        Duration::from_millis(self.typing_quiet_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn timings(&self) -> Timings {
        Timings {
            refresh_check: self.refresh_check_interval(),
            refresh_margin_secs: self.refresh_margin_secs,
            reconnect_delay: self.reconnect_delay(),
            typing_quiet: self.typing_quiet(),
        }
    }

    /// Base URL the realtime socket URL is derived from.
    pub fn ws_base(&self) -> &str {
        self.ws_url.as_deref().unwrap_or(&self.base_url)
    }

    /// Credentials passed on the command line, if any.
    pub fn seed_triple(&self) -> Option<TokenTriple> {
        let access = self.access_token.clone()?;
        Some(TokenTriple::new(
            access,
            self.refresh_token.clone().unwrap_or_default(),
            self.id_token.clone().unwrap_or_default(),
        ))
    }

    /// Resolved state directory.
    pub fn state_dir(&self) -> PathBuf {
        match self.state_dir {
            Some(ref dir) => dir.clone(),
            None => default_state_dir(),
        }
    }
}

/// `$XDG_STATE_HOME/natter`, else `$HOME/.local/state/natter`.
pub fn default_state_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("natter");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/natter");
    }
    PathBuf::from(".natter")
}

fn is_http(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
