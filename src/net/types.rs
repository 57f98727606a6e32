//! REST-side DTOs for the client/server boundary.
//!
//! DESIGN
//! ======
//! Channel payload types live in the `frames` crate and are re-exported here
//! so state code imports every wire type from one place.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use serde::{Deserialize, Serialize};

pub use frames::{
    Attachment, DeletedMessage, Frame, LastMessage, MediaKind, Message, MessageId, ReplySnapshot, RoomId,
    UserId, UserRef,
};

/// The authenticated user of the session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

/// A conversation in the sidebar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    /// Messages received while this room was not current.
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    #[serde(default)]
    pub members: Vec<UserRef>,
    /// Direct-message rooms are displayed under the other participant's name.
    #[serde(default)]
    pub is_direct: bool,
    #[serde(default)]
    pub recipient: Option<UserRef>,
}

impl Room {
    /// Name shown in the sidebar: the recipient for direct messages.
    #[must_use]
    pub fn display_name(&self) -> &str {
        match (&self.recipient, self.is_direct) {
            (Some(recipient), true) => &recipient.username,
            _ => &self.name,
        }
    }
}

/// Login form payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Registration form payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Payload for creating a group room or a direct conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewRoom {
    pub name: String,
    pub member_ids: Vec<UserId>,
    pub is_direct: bool,
}

/// Partial room metadata update; absent fields are left unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RoomUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_ids: Option<Vec<UserId>>,
}

/// Partial profile update; absent fields are left unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

/// A file queued for upload with an outgoing message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// An outgoing message draft.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewMessage {
    pub content: String,
    pub reply_to: Option<MessageId>,
    pub attachments: Vec<Upload>,
}

impl NewMessage {
    /// Plain text message without reply target or attachments.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), ..Self::default() }
    }

    /// True when there is nothing to send.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.attachments.is_empty()
    }
}

/// A room invitation resolved from a share token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInvitation {
    pub token: String,
    pub room_id: RoomId,
    pub room_name: String,
    #[serde(default)]
    pub invited_by: Option<UserRef>,
}
