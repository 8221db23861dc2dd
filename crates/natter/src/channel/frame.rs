// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Realtime wire frames and inbound classification.
//!
//! Inbound: `{"type": ..., "payload"?: "<json>", "user_id", "receiver_id", "timestamp"?}`.
//! For `message` frames the payload is itself a JSON-encoded [`Message`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SessionError;
use crate::token::UserId;

pub const TYPE_PING: &str = "ping";
pub const TYPE_PONG: &str = "pong";
pub const TYPE_MESSAGE: &str = "message";
pub const TYPE_SEEN: &str = "seen";
pub const TYPE_TYPING: &str = "typing";

/// Attached media reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub id: u64,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub file_path: String,
}

/// A direct chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    #[serde(default)]
    pub sender_id: UserId,
    #[serde(default)]
    pub receiver_id: UserId,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<Vec<Media>>,
    #[serde(default)]
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Server-side creation time; present on messages relayed from storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Classified inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Ping,
    Pong,
    Message(Message),
    /// Read receipt. Ids the frame lacks are `None`.
    Seen { user_id: Option<UserId>, receiver_id: Option<UserId> },
    Typing { user_id: Option<UserId> },
    /// Any other `type`, kept as-is.
    Other(String),
}

impl InboundEvent {
    pub fn kind(&self) -> &str {
        match self {
            Self::Ping => TYPE_PING,
            Self::Pong => TYPE_PONG,
            Self::Message(_) => TYPE_MESSAGE,
            Self::Seen { .. } => TYPE_SEEN,
            Self::Typing { .. } => TYPE_TYPING,
            Self::Other(kind) => kind,
        }
    }
}

/// A timestamp-normalized frame as handed to the notification sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
    pub timestamp: String,
    /// Every other field of the frame, untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Notification {
    /// Server-assigned notification id, when the frame carries one.
    pub fn id(&self) -> Option<u64> {
        self.extra.get("id").and_then(Value::as_u64)
    }
}

/// A parsed inbound frame: its classification plus the sink form.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub event: InboundEvent,
    pub notification: Notification,
}

impl Inbound {
    /// Origin user id of the frame.
    pub fn origin(&self) -> Option<UserId> {
        self.notification.user_id
    }

    pub fn timestamp(&self) -> &str {
        &self.notification.timestamp
    }
}

/// Parse and classify one text frame.
///
/// `Ok(None)` is a malformed frame to drop silently (not JSON, `null`, or an
/// empty value). `Err` is a `message` frame whose payload does not decode.
/// Envelope ids are read leniently: a missing or non-numeric `user_id` or
/// `receiver_id` leaves the id unset and the field in [`Notification::extra`].
pub fn parse(text: &str, arrived_at: DateTime<Utc>) -> Result<Option<Inbound>, SessionError> {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return Ok(None);
    };
    let Value::Object(mut object) = value else {
        return Ok(None);
    };
    if object.is_empty() {
        return Ok(None);
    }

    let kind = match object.remove("type") {
        Some(Value::String(kind)) => kind,
        Some(other) => other.to_string(),
        None => String::new(),
    };
    let user_id = take_id(&mut object, "user_id");
    let receiver_id = take_id(&mut object, "receiver_id");

    let event = match kind.as_str() {
        TYPE_PING => InboundEvent::Ping,
        TYPE_PONG => InboundEvent::Pong,
        TYPE_MESSAGE => InboundEvent::Message(decode_payload(object.get("payload"))?),
        TYPE_SEEN => InboundEvent::Seen { user_id, receiver_id },
        TYPE_TYPING => InboundEvent::Typing { user_id },
        other => InboundEvent::Other(other.to_owned()),
    };

    let timestamp = match object.remove("timestamp") {
        Some(Value::String(ts)) if !ts.is_empty() => ts,
        Some(Value::Number(n)) => n.to_string(),
        _ => iso_timestamp(arrived_at),
    };

    let notification = Notification { kind, user_id, receiver_id, timestamp, extra: object };
    Ok(Some(Inbound { event, notification }))
}

/// Remove `key` from `object` when it holds a user id.
fn take_id(object: &mut Map<String, Value>, key: &str) -> Option<UserId> {
    let id = object.get(key).and_then(Value::as_u64)?;
    object.remove(key);
    Some(id)
}

/// Decode a `message` payload: a JSON string holding a [`Message`], or an
/// already-structured object.
fn decode_payload(payload: Option<&Value>) -> Result<Message, SessionError> {
    let decoded = match payload {
        Some(Value::String(encoded)) => serde_json::from_str(encoded),
        Some(value @ Value::Object(_)) => Message::deserialize(value),
        _ => return Err(SessionError::protocol("message frame without payload")),
    };
    decoded.map_err(|e| SessionError::protocol(format!("bad message payload: {e}")))
}

/// The keep-alive reply.
pub fn pong() -> String {
    serde_json::json!({ "type": TYPE_PONG }).to_string()
}

/// ISO-8601 UTC with millisecond precision (`2026-01-02T03:04:05.678Z`).
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
