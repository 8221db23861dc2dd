// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Malformed or missing token. The session is treated as absent.
    Decode,
    /// Refresh or logout HTTP call failed.
    Network,
    /// Malformed realtime frame.
    Protocol,
    /// Realtime socket closed or could not connect.
    ConnectionLost,
    /// Session actor is gone.
    Shutdown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decode => "DECODE_ERROR",
            Self::Network => "NETWORK_ERROR",
            Self::Protocol => "PROTOCOL_ERROR",
            Self::ConnectionLost => "CONNECTION_LOST",
            Self::Shutdown => "SHUTDOWN",
        }
    }

    /// Whether this failure is surfaced to the UI as a state change.
    ///
    /// Only a failed refresh escalates (to a forced logout); the refresh path
    /// reports it as `Network`, every other code is absorbed locally.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, Self::Network)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A session-layer failure: an [`ErrorCode`] plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    pub code: ErrorCode,
    pub message: String,
}

impl SessionError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Decode, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Network, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Protocol, message)
    }

    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConnectionLost, message)
    }

    pub fn shutdown() -> Self {
        Self::new(ErrorCode::Shutdown, "session actor stopped")
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for SessionError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
