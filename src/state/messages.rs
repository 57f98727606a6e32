//! Message window merge rules.
//!
//! A live message and a fetched page can arrive in either order; both paths
//! must converge on the same window. Ids are unique within a window and the
//! copy already in the window wins over a fetched duplicate.

#[cfg(test)]
#[path = "messages_test.rs"]
mod messages_test;

use std::collections::{BTreeSet, HashSet};

use crate::net::types::{Message, MessageId};

/// Replace the message with the same id, or append in arrival order.
pub(crate) fn upsert(window: &mut Vec<Message>, message: Message) {
    match window.iter_mut().find(|existing| existing.id == message.id) {
        Some(existing) => *existing = message,
        None => window.push(message),
    }
}

/// Union `page` into `window` by id, skipping tombstoned ids, ordered by `(ts, id)`.
pub(crate) fn merge_history(window: &mut Vec<Message>, page: Vec<Message>, tombstones: &BTreeSet<MessageId>) {
    let mut seen: HashSet<MessageId> = window.iter().map(|message| message.id).collect();
    for message in page {
        if tombstones.contains(&message.id) || !seen.insert(message.id) {
            continue;
        }
        window.push(message);
    }
    window.sort_by_key(|message| (message.ts, message.id));
}

/// Replace the message with the same id if it is loaded. Returns whether it was.
pub(crate) fn replace(window: &mut [Message], message: Message) -> bool {
    match window.iter_mut().find(|existing| existing.id == message.id) {
        Some(existing) => {
            *existing = message;
            true
        }
        None => false,
    }
}
