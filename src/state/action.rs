//! Closed set of session transitions.

use crate::net::connection::ConnectionStatus;
use crate::net::types::{DeletedMessage, Frame, Message, MessageId, Room, RoomId, User};

#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Login or registration succeeded.
    Authenticate(User),
    UpdateProfile(User),
    /// Replace the room list with a REST snapshot.
    SetRooms(Vec<Room>),
    /// Insert a new room at the front or refresh an existing one.
    UpsertRoom(Room),
    SelectRoom(RoomId),
    /// Merge a fetched history page into the window of `room_id`.
    SetMessages { room_id: RoomId, messages: Vec<Message> },
    ReceiveMessage(Message),
    EditMessage(Message),
    DeleteMessage(DeletedMessage),
    ResetUnreadCount(RoomId),
    SetConnectionStatus(ConnectionStatus),
    SetSearch(String),
    HighlightMessage(Option<MessageId>),
    /// Unrecoverable session error; resets to the initial state.
    Error,
    Logout,
}

impl Action {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticate(_) => "authenticate",
            Self::UpdateProfile(_) => "update_profile",
            Self::SetRooms(_) => "set_rooms",
            Self::UpsertRoom(_) => "upsert_room",
            Self::SelectRoom(_) => "select_room",
            Self::SetMessages { .. } => "set_messages",
            Self::ReceiveMessage(_) => "receive_message",
            Self::EditMessage(_) => "edit_message",
            Self::DeleteMessage(_) => "delete_message",
            Self::ResetUnreadCount(_) => "reset_unread_count",
            Self::SetConnectionStatus(_) => "set_connection_status",
            Self::SetSearch(_) => "set_search",
            Self::HighlightMessage(_) => "highlight_message",
            Self::Error => "error",
            Self::Logout => "logout",
        }
    }

    /// True for transitions sourced from the realtime channel.
    #[must_use]
    pub fn is_channel_event(&self) -> bool {
        matches!(self, Self::ReceiveMessage(_) | Self::EditMessage(_) | Self::DeleteMessage(_))
    }
}

impl From<Frame> for Action {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::SendMessage(message) => Self::ReceiveMessage(message),
            Frame::EditMessage(message) => Self::EditMessage(message),
            Frame::DeleteMessage(deleted) => Self::DeleteMessage(deleted),
        }
    }
}
