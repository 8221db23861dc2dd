// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Generic notification sink: every inbound frame the UI may care about.

use crate::channel::frame::Notification;

#[derive(Debug, Default)]
pub struct NotificationSink {
    items: Vec<Notification>,
    unread: usize,
}

impl NotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append in arrival order and bump the unread counter.
    pub fn receive(&mut self, notification: Notification) {
        self.items.push(notification);
        self.unread += 1;
    }

    pub fn list(&self) -> &[Notification] {
        &self.items
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    /// Remove the notification with server id `id`.
    pub fn mark_read(&mut self, id: u64) -> bool {
        let before = self.items.len();
        self.items.retain(|n| n.id() != Some(id));
        let removed = before - self.items.len();
        self.unread = self.unread.saturating_sub(removed);
        removed > 0
    }

    /// Zero the counter; entries stay listed.
    pub fn mark_all_read(&mut self) {
        self.unread = 0;
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.unread = 0;
    }
}

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
