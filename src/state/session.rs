//! Client-visible session state.
//!
//! SYSTEM CONTEXT
//! ==============
//! One `Session` value describes everything the presentation layer renders:
//! identity, the room list, the selected room with its loaded message window,
//! and the channel status. It is only ever replaced wholesale by the reducer.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::net::connection::ConnectionStatus;
use crate::net::types::{Message, MessageId, Room, RoomId, User};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Authenticated identity. `None` before login and after logout.
    pub user: Option<User>,
    /// Room list in server order; new rooms are prepended.
    pub rooms: Vec<Room>,
    /// Mirror of the selected entry of `rooms`.
    pub current_room: Option<Room>,
    /// Loaded window of the current room, ordered by `(ts, id)`.
    pub messages: Vec<Message>,
    pub connection_status: ConnectionStatus,
    /// Sidebar filter, matched case-insensitively against display names.
    pub search: String,
    pub highlighted_message: Option<MessageId>,
    /// Ids deleted from the current room while its window was loaded.
    pub tombstones: BTreeSet<MessageId>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            user: None,
            rooms: Vec::new(),
            current_room: None,
            messages: Vec::new(),
            // Optimistic until the first real connection attempt reports otherwise.
            connection_status: ConnectionStatus::Connected,
            search: String::new(),
            highlighted_message: None,
            tombstones: BTreeSet::new(),
        }
    }
}

impl Session {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    #[must_use]
    pub fn current_room_id(&self) -> Option<RoomId> {
        self.current_room.as_ref().map(|room| room.id)
    }

    #[must_use]
    pub fn room(&self, room_id: RoomId) -> Option<&Room> {
        self.rooms.iter().find(|room| room.id == room_id)
    }

    /// Rooms matching the search filter, in list order.
    #[must_use]
    pub fn visible_rooms(&self) -> Vec<&Room> {
        let needle = self.search.trim().to_lowercase();
        if needle.is_empty() {
            return self.rooms.iter().collect();
        }
        self.rooms
            .iter()
            .filter(|room| room.display_name().to_lowercase().contains(&needle))
            .collect()
    }

    #[must_use]
    pub fn total_unread(&self) -> u64 {
        self.rooms.iter().map(|room| u64::from(room.unread_count)).sum()
    }

    /// Composition needs a live channel and a selected room.
    #[must_use]
    pub fn can_compose(&self) -> bool {
        self.connection_status == ConnectionStatus::Connected && self.current_room.is_some()
    }

    #[must_use]
    pub fn oldest_message_id(&self) -> Option<MessageId> {
        self.messages.first().map(|message| message.id)
    }

    pub(crate) fn room_index(&self, room_id: RoomId) -> Option<usize> {
        self.rooms.iter().position(|room| room.id == room_id)
    }

    /// Refresh the `current_room` mirror from the room list.
    pub(crate) fn sync_current_room(&mut self) {
        if let Some(room_id) = self.current_room_id()
            && let Some(room) = self.room(room_id)
        {
            self.current_room = Some(room.clone());
        }
    }

    /// Drop the selection together with everything scoped to it.
    pub(crate) fn clear_selection(&mut self) {
        self.current_room = None;
        self.messages.clear();
        self.tombstones.clear();
        self.highlighted_message = None;
    }
}
