// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn msg(id: u64, from: UserId, to: UserId, content: &str) -> Message {
    Message {
        id,
        sender_id: from,
        receiver_id: to,
        content: content.to_owned(),
        media: None,
        read: false,
        timestamp: None,
        created_at: None,
    }
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[test]
fn receive_inserts_at_head() {
    let mut chat = ChatState::default();
    assert!(chat.receive_message(msg(1, 2, 1, "first")));
    assert!(chat.receive_message(msg(2, 2, 1, "second")));
    let ids: Vec<u64> = chat.messages().iter().map(|m| m.id).collect();
    assert_eq!(ids, [2, 1]);
}

#[test]
fn duplicate_id_keeps_first_copy() {
    let mut chat = ChatState::default();
    assert!(chat.receive_message(msg(5, 2, 1, "original")));
    assert!(chat.receive_message(msg(6, 2, 1, "other")));
    assert!(!chat.receive_message(msg(5, 2, 1, "replayed")));
    assert_eq!(chat.messages().len(), 2);
    assert_eq!(chat.messages()[1].content, "original");
}

#[test]
fn set_messages_replaces_list() {
    let mut chat = ChatState::default();
    chat.receive_message(msg(1, 2, 1, "a"));
    chat.set_messages(vec![msg(9, 1, 2, "x"), msg(8, 2, 1, "y")]);
    assert_eq!(chat.messages().len(), 2);
    assert!(!chat.receive_message(msg(8, 2, 1, "dup of fetched")));
}

#[test]
fn read_marking_flips_only_matching_stream() {
    let mut chat = ChatState::default();
    chat.set_messages(vec![msg(1, 1, 2, "a"), msg(2, 2, 1, "b")]);

    assert_eq!(chat.mark_as_read(1, 2), 1);
    assert!(chat.messages()[0].read);
    assert!(!chat.messages()[1].read);

    // Already read: nothing new flips.
    assert_eq!(chat.mark_as_read(1, 2), 0);
}

#[yare::parameterized(
    whole_stream = { 1, 2, 2 },
    reverse_stream = { 2, 1, 1 },
    unknown_pair = { 3, 1, 0 },
)]
fn read_marking_counts(sender: UserId, receiver: UserId, expected: usize) {
    let mut chat = ChatState::default();
    chat.set_messages(vec![msg(1, 1, 2, "a"), msg(2, 2, 1, "b"), msg(3, 1, 2, "c")]);
    assert_eq!(chat.mark_as_read(sender, receiver), expected);
}

#[test]
fn typing_from_other_peer_is_ignored() {
    let mut chat = ChatState::default();
    let now = Instant::now();
    assert!(!chat.on_typing(4, now), "no tracked peer");

    chat.set_current_peer(Some(4));
    assert!(!chat.on_typing(5, now));
    assert!(!chat.is_typing());
}

#[test]
fn typing_expires_after_quiet_period() {
    let mut chat = ChatState::default();
    chat.set_current_peer(Some(4));
    let t0 = Instant::now();

    assert!(chat.on_typing(4, t0));
    assert!(chat.is_typing());
    assert!(!chat.expire_typing(t0 + ms(2999)));
    assert!(chat.expire_typing(t0 + ms(3000)));
    assert!(!chat.is_typing());
}

#[test]
fn second_typing_event_extends_deadline() {
    let mut chat = ChatState::default();
    chat.set_current_peer(Some(4));
    let t0 = Instant::now();

    assert!(chat.on_typing(4, t0));
    assert!(!chat.on_typing(4, t0 + ms(2000)), "already typing");
    assert_eq!(chat.typing_deadline(), Some(t0 + ms(5000)));
    assert!(!chat.expire_typing(t0 + ms(3500)));
    assert!(chat.is_typing());
}

#[test]
fn changing_peer_clears_typing() {
    let mut chat = ChatState::default();
    chat.set_current_peer(Some(4));
    chat.on_typing(4, Instant::now());

    assert!(!chat.set_current_peer(Some(4)), "same peer keeps state");
    assert!(chat.is_typing());
    assert!(chat.set_current_peer(Some(7)));
    assert!(!chat.is_typing());
    assert!(chat.typing_deadline().is_none());
}
