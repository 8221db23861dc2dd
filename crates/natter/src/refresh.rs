// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Refresh scheduler: a recurring expiry check while a session is active.
//!
//! The scheduler owns the timer only. The session actor polls [`RefreshScheduler::tick`]
//! in its select loop and decides with [`RefreshScheduler::needs_refresh`].

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::error::SessionError;
use crate::token::{expires_in_secs, TokenTriple};

/// Default time between expiry checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Default low-water mark: refresh once fewer seconds than this remain.
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 30;

/// `Stopped` / `Running` timer with idempotent start.
#[derive(Debug)]
pub struct RefreshScheduler {
    period: Duration,
    margin_secs: i64,
    interval: Option<Interval>,
}

impl Default for RefreshScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_CHECK_INTERVAL, DEFAULT_REFRESH_MARGIN_SECS)
    }
}

impl RefreshScheduler {
    pub fn new(period: Duration, margin_secs: i64) -> Self {
        Self { period, margin_secs, interval: None }
    }

    /// Start the recurring check. The first tick fires one full period from
    /// now. Returns `false` (and leaves the running timer untouched) when
    /// already running.
    pub fn start(&mut self) -> bool {
        if self.interval.is_some() {
            return false;
        }
        let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
        true
    }

    /// Cancel the pending timer. Returns `false` when already stopped.
    pub fn stop(&mut self) -> bool {
        self.interval.take().is_some()
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Resolves on the next scheduled check; never resolves while stopped.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Whether a token with `expires_in` seconds left is below the low-water mark.
    pub fn is_due(&self, expires_in: i64) -> bool {
        expires_in < self.margin_secs
    }

    /// Decode the access token's expiry and compare against the margin.
    pub fn needs_refresh(&self, triple: &TokenTriple) -> Result<bool, SessionError> {
        Ok(self.is_due(expires_in_secs(triple)?))
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
