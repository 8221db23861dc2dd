// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token triple, access-token claims, and expiry prediction.
//!
//! Tokens are decoded client-side without signature verification: the
//! server is the authority, the client only needs the user fields and the
//! `exp` claim to know when to refresh.

pub mod persist;

use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Numeric user id as issued by the server (`sub` claim, `user_id` on the wire).
pub type UserId = u64;

/// The credential set held by an authenticated session.
///
/// All three are present or the session is absent; see [`TokenTriple::is_complete`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTriple {
    pub access_token: String,
    pub refresh_token: String,
    pub id_token: String,
}

impl TokenTriple {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        id_token: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            id_token: id_token.into(),
        }
    }

    /// True when none of the three tokens is empty.
    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty() && !self.id_token.is_empty()
    }

    pub fn token(&self, kind: TokenKind) -> &str {
        match kind {
            TokenKind::Access => &self.access_token,
            TokenKind::Refresh => &self.refresh_token,
        }
    }
}

/// Token body returned by `POST /api/refresh`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl TokenResponse {
    /// Convert into a triple. Requires an access and a refresh token; a
    /// missing id token is kept as an empty string.
    pub fn into_triple(self) -> Option<TokenTriple> {
        let access_token = self.access_token.filter(|t| !t.is_empty())?;
        let refresh_token = self.refresh_token.filter(|t| !t.is_empty())?;
        let id_token = self.id_token.unwrap_or_default();
        Some(TokenTriple { access_token, refresh_token, id_token })
    }
}

/// Which token an Authorization header is built from.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    #[default]
    Access,
    Refresh,
}

impl std::str::FromStr for TokenKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "access" => Ok(Self::Access),
            "refresh" => Ok(Self::Refresh),
            other => anyhow::bail!("invalid token kind: {other}"),
        }
    }
}

/// Claims read from an access token payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Claims {
    #[serde(deserialize_with = "de_user_id")]
    pub sub: UserId,
    #[serde(default)]
    pub username: String,
    pub exp: i64,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub email: Option<String>,
}

/// The authenticated user, derived from the access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl From<Claims> for SessionUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            username: claims.username,
            role: claims.role,
            verified: claims.verified,
            email: claims.email,
        }
    }
}

/// Decode the payload segment of a JWT without verifying its signature.
pub fn decode_claims(token: &str) -> Result<Claims, SessionError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_sig), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(SessionError::decode("token is not a three-segment JWT"));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| SessionError::decode(format!("invalid payload encoding: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| SessionError::decode(format!("invalid payload claims: {e}")))
}

/// Seconds until the access token expires (negative once expired).
pub fn expires_in_secs(triple: &TokenTriple) -> Result<i64, SessionError> {
    expires_in_secs_at(&triple.access_token, epoch_secs())
}

/// [`expires_in_secs`] against an explicit clock.
pub fn expires_in_secs_at(access_token: &str, now: i64) -> Result<i64, SessionError> {
    let claims = decode_claims(access_token)?;
    Ok(claims.exp - now)
}

/// `Authorization` header value for a token.
pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Current epoch seconds.
pub fn epoch_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

/// Accept `sub` as either a JSON number or a numeric string.
fn de_user_id<'de, D>(deserializer: D) -> Result<UserId, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(UserId),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
