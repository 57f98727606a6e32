//! Pure session transition function.
//!
//! DESIGN
//! ======
//! `reduce` never mutates its input: it clones the prior session, applies one
//! action to the copy and returns it, so snapshots already handed to observers
//! stay valid. No I/O happens here; callers perform requests and dispatch the
//! outcome.
//!
//! Invariants kept by every transition:
//! - `current_room` mirrors the matching entry of `rooms`.
//! - `messages` only ever holds messages of the current room.
//! - A room's unread counter grows by one per inbound message while it is not
//!   current and is only cleared by selecting it or `ResetUnreadCount`.
//! - Channel events and room snapshots are dropped while no user is signed in.
//! - A room snapshot and a live message converge to the same room list in
//!   either order: counters keep the larger value, summaries the newer one.

#[cfg(test)]
#[path = "reducer_test.rs"]
mod reducer_test;

use super::action::Action;
use super::messages;
use super::session::Session;
use crate::net::types::{DeletedMessage, LastMessage, Message, Room, RoomId};

/// Apply `action` to `state`, returning the next session.
#[must_use]
pub fn reduce(state: &Session, action: Action) -> Session {
    let mut next = state.clone();
    apply(&mut next, action);
    next
}

fn apply(session: &mut Session, action: Action) {
    if session.user.is_none() && requires_identity(&action) {
        tracing::debug!(action = action.name(), "no active session; action dropped");
        return;
    }

    match action {
        Action::Authenticate(user) | Action::UpdateProfile(user) => session.user = Some(user),
        Action::SetRooms(rooms) => set_rooms(session, rooms),
        Action::UpsertRoom(room) => upsert_room(session, room),
        Action::SelectRoom(room_id) => select_room(session, room_id),
        Action::SetMessages { room_id, messages } => {
            if session.current_room_id() != Some(room_id) {
                tracing::debug!(room_id, "history page for a room that is not current; dropped");
                return;
            }
            messages::merge_history(&mut session.messages, messages, &session.tombstones);
        }
        Action::ReceiveMessage(message) => receive_message(session, message),
        Action::EditMessage(message) => edit_message(session, message),
        Action::DeleteMessage(deleted) => delete_message(session, &deleted),
        Action::ResetUnreadCount(room_id) => {
            let Some(index) = session.room_index(room_id) else {
                tracing::debug!(room_id, "reset unread for unknown room ignored");
                return;
            };
            session.rooms[index].unread_count = 0;
            session.sync_current_room();
        }
        Action::SetConnectionStatus(status) => session.connection_status = status,
        Action::SetSearch(search) => session.search = search,
        Action::HighlightMessage(message_id) => session.highlighted_message = message_id,
        Action::Error | Action::Logout => *session = Session::default(),
    }
}

fn requires_identity(action: &Action) -> bool {
    action.is_channel_event()
        || matches!(action, Action::SetRooms(_) | Action::UpsertRoom(_) | Action::UpdateProfile(_))
}

// =============================================================================
// ROOMS
// =============================================================================

/// Merge a REST room snapshot into the live list.
///
/// The snapshot decides membership, order and room metadata. For rooms already
/// known locally the unread counter keeps the larger of the two values and the
/// summary keeps whichever `last_message` is newer, so a live message applied
/// before or after the snapshot ends in the same list.
fn set_rooms(session: &mut Session, rooms: Vec<Room>) {
    let mut merged = rooms;
    for room in &mut merged {
        let Some(local) = session.rooms.iter().find(|local| local.id == room.id) else {
            continue;
        };
        room.unread_count = room.unread_count.max(local.unread_count);
        room.last_message = newer_summary(local.last_message.as_ref(), room.last_message.take());
    }
    session.rooms = merged;

    let Some(current) = session.current_room_id() else {
        return;
    };
    match session.room_index(current) {
        Some(index) => {
            session.rooms[index].unread_count = 0;
            session.sync_current_room();
        }
        None => {
            tracing::info!(room_id = current, "current room no longer listed; deselecting");
            session.clear_selection();
        }
    }
}

/// Later `(ts, message_id)` wins; ties keep the local summary.
fn newer_summary(local: Option<&LastMessage>, incoming: Option<LastMessage>) -> Option<LastMessage> {
    match (local, incoming) {
        (Some(local), Some(incoming)) if (local.ts, local.message_id) >= (incoming.ts, incoming.message_id) => {
            Some(local.clone())
        }
        (local, None) => local.cloned(),
        (_, incoming) => incoming,
    }
}

fn upsert_room(session: &mut Session, room: Room) {
    match session.room_index(room.id) {
        Some(index) => {
            let existing = &mut session.rooms[index];
            let unread_count = existing.unread_count;
            let last_message = existing.last_message.take().or(room.last_message.clone());
            *existing = Room { unread_count, last_message, ..room };
            session.sync_current_room();
        }
        None => session.rooms.insert(0, room),
    }
}

fn select_room(session: &mut Session, room_id: RoomId) {
    if session.current_room_id() == Some(room_id) {
        return;
    }
    let Some(index) = session.room_index(room_id) else {
        tracing::warn!(room_id, "select for unknown room ignored");
        return;
    };
    session.clear_selection();
    session.rooms[index].unread_count = 0;
    session.current_room = Some(session.rooms[index].clone());
}

// =============================================================================
// MESSAGES
// =============================================================================

fn receive_message(session: &mut Session, message: Message) {
    let Some(index) = session.room_index(message.room_id) else {
        tracing::warn!(room_id = message.room_id, message_id = message.id, "message for unknown room dropped");
        return;
    };
    if session.tombstones.contains(&message.id) {
        tracing::debug!(message_id = message.id, "message already deleted; dropped");
        return;
    }

    let room = &mut session.rooms[index];
    room.last_message = newer_summary(room.last_message.as_ref(), Some(LastMessage::from(&message)));
    if session.current_room_id() == Some(message.room_id) {
        messages::upsert(&mut session.messages, message);
    } else {
        let room = &mut session.rooms[index];
        room.unread_count = room.unread_count.saturating_add(1);
    }
    session.sync_current_room();
}

fn edit_message(session: &mut Session, message: Message) {
    let Some(index) = session.room_index(message.room_id) else {
        tracing::debug!(room_id = message.room_id, message_id = message.id, "edit for unknown room dropped");
        return;
    };
    let room = &mut session.rooms[index];
    if room.last_message.as_ref().and_then(|summary| summary.message_id) == Some(message.id) {
        room.last_message = Some(LastMessage::from(&message));
    }
    if session.current_room_id() == Some(message.room_id) {
        messages::replace(&mut session.messages, message);
    }
    session.sync_current_room();
}

fn delete_message(session: &mut Session, deleted: &DeletedMessage) {
    if session.current_room_id() == Some(deleted.room_id) {
        session.messages.retain(|message| message.id != deleted.message_id);
        session.tombstones.insert(deleted.message_id);
        if session.highlighted_message == Some(deleted.message_id) {
            session.highlighted_message = None;
        }
    }

    let Some(index) = session.room_index(deleted.room_id) else {
        tracing::debug!(room_id = deleted.room_id, "delete for unknown room; summary untouched");
        return;
    };
    let room = &mut session.rooms[index];
    match &deleted.last_message {
        Some(summary) => room.last_message = Some(summary.clone()),
        None => {
            if room.last_message.as_ref().and_then(|summary| summary.message_id) == Some(deleted.message_id) {
                room.last_message = None;
            }
        }
    }
    session.sync_current_room();
}
