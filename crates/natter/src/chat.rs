// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conversation state: the message list, read marking, and the typing
//! indicator for the currently open peer.

use std::time::Duration;

use tokio::time::Instant;

use crate::channel::frame::Message;
use crate::token::UserId;

/// Quiet period after which a peer stops counting as typing.
pub const DEFAULT_TYPING_QUIET: Duration = Duration::from_millis(3000);

/// Messages (most recent first) plus the typing state machine.
///
/// The typing timer is a single deadline: a new typing event replaces it,
/// so at most one is ever pending.
#[derive(Debug)]
pub struct ChatState {
    messages: Vec<Message>,
    current_peer: Option<UserId>,
    typing_until: Option<Instant>,
    quiet: Duration,
}

impl Default for ChatState {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_QUIET)
    }
}

impl ChatState {
    pub fn new(quiet: Duration) -> Self {
        Self { messages: Vec::new(), current_peer: None, typing_until: None, quiet }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Replace the list wholesale (after a history fetch).
    pub fn set_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// Insert at the head unless a message with the same id is already
    /// stored. Returns whether it was inserted.
    pub fn receive_message(&mut self, message: Message) -> bool {
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        self.messages.insert(0, message);
        true
    }

    /// Mark every message of the `sender -> receiver` stream as read.
    /// Returns how many flipped from unread.
    pub fn mark_as_read(&mut self, sender: UserId, receiver: UserId) -> usize {
        let mut flipped = 0;
        let stream = |m: &&mut Message| m.sender_id == sender && m.receiver_id == receiver;
        for m in self.messages.iter_mut().filter(stream) {
            if !m.read {
                m.read = true;
                flipped += 1;
            }
        }
        flipped
    }

    pub fn current_peer(&self) -> Option<UserId> {
        self.current_peer
    }

    /// Track a new conversation peer. Changing peers ends any typing
    /// indicator; returns `true` when that happened.
    pub fn set_current_peer(&mut self, peer: Option<UserId>) -> bool {
        if self.current_peer == peer {
            return false;
        }
        self.current_peer = peer;
        self.typing_until.take().is_some()
    }

    /// A typing event from `from` at `now`. Ignored unless `from` is the
    /// tracked peer; otherwise (re)arms the quiet deadline. Returns `true`
    /// on the `NotTyping -> Typing` transition.
    pub fn on_typing(&mut self, from: UserId, now: Instant) -> bool {
        if self.current_peer != Some(from) {
            return false;
        }
        let was_typing = self.typing_until.is_some();
        self.typing_until = Some(now + self.quiet);
        !was_typing
    }

    pub fn is_typing(&self) -> bool {
        self.typing_until.is_some()
    }

    pub fn typing_deadline(&self) -> Option<Instant> {
        self.typing_until
    }

    /// Drop the typing indicator once its deadline has passed. Returns
    /// `true` on the `Typing -> NotTyping` transition.
    pub fn expire_typing(&mut self, now: Instant) -> bool {
        match self.typing_until {
            Some(deadline) if deadline <= now => {
                self.typing_until = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "chat_tests.rs"]
mod tests;
