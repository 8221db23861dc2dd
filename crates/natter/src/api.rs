// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auth endpoints consumed by the session: `POST /api/refresh` and
//! `POST /api/logout`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;

use crate::token::TokenResponse;

/// Boxed future returned by [`AuthApi`] methods.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// HTTP seam for the token lifecycle.
///
/// Object-safe for use as `Arc<dyn AuthApi>`. `authorization` is the full
/// header value (`Bearer <token>`).
pub trait AuthApi: Send + Sync + 'static {
    /// Exchange the refresh token for a new token set.
    fn refresh(&self, authorization: String) -> ApiFuture<'_, TokenResponse>;

    /// Invalidate the session server-side.
    fn logout(&self, authorization: String) -> ApiFuture<'_, ()>;
}

/// reqwest-backed [`AuthApi`].
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    client: reqwest::Client,
    base: String,
}

impl HttpAuthApi {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { client, base: base_url.trim_end_matches('/').to_owned() }
    }

    async fn do_refresh(&self, authorization: String) -> anyhow::Result<TokenResponse> {
        let resp = self
            .client
            .post(format!("{}/api/refresh", self.base))
            .header(AUTHORIZATION, authorization)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("refresh failed ({status}): {text}");
        }

        let token: TokenResponse = resp.json().await?;
        Ok(token)
    }

    async fn do_logout(&self, authorization: String) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(format!("{}/api/logout", self.base))
            .header(AUTHORIZATION, authorization)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        resp.error_for_status()?;
        Ok(())
    }
}

impl AuthApi for HttpAuthApi {
    fn refresh(&self, authorization: String) -> ApiFuture<'_, TokenResponse> {
        Box::pin(self.do_refresh(authorization))
    }

    fn logout(&self, authorization: String) -> ApiFuture<'_, ()> {
        Box::pin(self.do_logout(authorization))
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
