// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::*;
use crate::error::ErrorCode;
use crate::test_support::{fake_jwt, jwt_expiring_at};

#[test]
fn decode_reads_user_fields() -> anyhow::Result<()> {
    let token = fake_jwt(json!({
        "sub": 7,
        "username": "ada",
        "role": "admin",
        "verified": true,
        "email": "ada@example.com",
        "exp": 2_000_000_000,
    }));
    let claims = decode_claims(&token)?;
    assert_eq!(claims.exp, 2_000_000_000);

    let user = SessionUser::from(claims);
    assert_eq!(user.id, 7);
    assert_eq!(user.username, "ada");
    assert_eq!(user.role.as_deref(), Some("admin"));
    assert!(user.verified);
    assert_eq!(user.email.as_deref(), Some("ada@example.com"));
    Ok(())
}

#[test]
fn decode_defaults_optional_claims() -> anyhow::Result<()> {
    let token = fake_jwt(json!({ "sub": "12", "username": "bo", "exp": 10 }));
    let user = SessionUser::from(decode_claims(&token)?);
    assert_eq!(user.id, 12);
    assert!(!user.verified);
    assert!(user.role.is_none());
    assert!(user.email.is_none());
    Ok(())
}

#[test]
fn decode_tolerates_padding() -> anyhow::Result<()> {
    let token = fake_jwt(json!({ "sub": 1, "exp": 5 }));
    let mut parts: Vec<String> = token.split('.').map(str::to_owned).collect();
    parts[1].push_str("==");
    let claims = decode_claims(&parts.join("."))?;
    assert_eq!(claims.sub, 1);
    Ok(())
}

#[yare::parameterized(
    empty = { "" },
    two_segments = { "abc.def" },
    four_segments = { "a.b.c.d" },
    bad_base64 = { "a.!!!.c" },
    not_json = { "a.bm90LWpzb24.c" },
    missing_exp = { "a.eyJzdWIiOjF9.c" },
)]
fn decode_rejects_malformed(token: &str) {
    let err = decode_claims(token).expect_err("malformed token must not decode");
    assert_eq!(err.code, ErrorCode::Decode);
}

#[test]
fn expires_in_is_exp_minus_now() -> anyhow::Result<()> {
    let token = jwt_expiring_at(3, "cy", 1_000);
    assert_eq!(expires_in_secs_at(&token, 980)?, 20);
    assert_eq!(expires_in_secs_at(&token, 1_030)?, -30);
    Ok(())
}

#[test]
fn expires_in_uses_wall_clock() -> anyhow::Result<()> {
    let triple = TokenTriple::new(jwt_expiring_at(3, "cy", epoch_secs() + 120), "r", "i");
    let remaining = expires_in_secs(&triple)?;
    assert!((118..=120).contains(&remaining), "remaining = {remaining}");
    Ok(())
}

#[test]
fn expires_in_fails_on_garbage() {
    let triple = TokenTriple::new("garbage", "r", "i");
    assert!(expires_in_secs(&triple).is_err());
}

#[yare::parameterized(
    complete = { "a", "r", "i", true },
    no_access = { "", "r", "i", false },
    no_refresh = { "a", "", "i", false },
    no_id = { "a", "r", "", false },
)]
fn triple_completeness(access: &str, refresh: &str, id: &str, expected: bool) {
    assert_eq!(TokenTriple::new(access, refresh, id).is_complete(), expected);
}

#[test]
fn token_response_requires_access_and_refresh() {
    let full = TokenResponse {
        access_token: Some("a".into()),
        refresh_token: Some("r".into()),
        id_token: Some("i".into()),
    };
    assert_eq!(full.into_triple(), Some(TokenTriple::new("a", "r", "i")));

    let no_id = TokenResponse {
        access_token: Some("a".into()),
        refresh_token: Some("r".into()),
        ..Default::default()
    };
    assert_eq!(no_id.into_triple(), Some(TokenTriple::new("a", "r", "")));

    let no_refresh =
        TokenResponse { access_token: Some("a".into()), ..Default::default() };
    assert_eq!(no_refresh.into_triple(), None);

    let empty_refresh = TokenResponse {
        access_token: Some("a".into()),
        refresh_token: Some(String::new()),
        ..Default::default()
    };
    assert_eq!(empty_refresh.into_triple(), None);
}

#[test]
fn token_by_kind() -> anyhow::Result<()> {
    let triple = TokenTriple::new("acc", "ref", "id");
    assert_eq!(triple.token(TokenKind::Access), "acc");
    assert_eq!(triple.token("refresh".parse()?), "ref");
    assert!("bogus".parse::<TokenKind>().is_err());
    assert_eq!(bearer("acc"), "Bearer acc");
    Ok(())
}

#[test]
fn token_response_carries_only_the_triple() -> anyhow::Result<()> {
    let body: TokenResponse = serde_json::from_str(
        r#"{"access_token":"a","refresh_token":"r","id_token":"i","expires_in":60}"#,
    )?;
    assert_eq!(body.clone().into_triple(), Some(TokenTriple::new("a", "r", "i")));
    assert_eq!(
        serde_json::to_value(&body)?,
        serde_json::json!({ "access_token": "a", "refresh_token": "r", "id_token": "i" })
    );
    Ok(())
}
