//! Shared envelope model and JSON codec for the realtime chat channel.
//!
//! This crate owns the wire representation of server-pushed chat events. Every
//! envelope carries a `type` discriminant and a `payload` object:
//!
//! ```json
//! {"type": "send_message", "payload": {"id": 1, "room_id": 7, ...}}
//! ```
//!
//! ERROR HANDLING
//! ==============
//! Decoding never panics. Callers get a [`CodecError`] that distinguishes
//! broken JSON from a well-formed envelope the client does not understand, so
//! the connection layer can report either without tearing down the channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server-assigned room identifier.
pub type RoomId = i64;
/// Server-assigned message identifier.
pub type MessageId = i64;
/// Server-assigned user identifier.
pub type UserId = i64;

const KNOWN_TYPES: [&str; 3] = ["send_message", "edit_message", "delete_message"];

/// Error returned by [`decode_frame`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The raw text is not valid JSON.
    #[error("frame is not valid JSON: {0}")]
    Json(serde_json::Error),
    /// The envelope has no string `type` field.
    #[error("frame has no `type` discriminant")]
    MissingType,
    /// The `type` field names an event this client does not handle.
    #[error("unknown frame type: {0}")]
    UnknownType(String),
    /// The discriminant is known but the payload does not match its schema.
    #[error("malformed `{kind}` payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Minimal user reference embedded in messages and room membership lists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Media category of an attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    File,
}

/// A media item attached to a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub kind: MediaKind,
    #[serde(default)]
    pub name: Option<String>,
}

/// Copy of a reply target taken when the reply was created.
///
/// Later edits or deletion of the target never rewrite this snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplySnapshot {
    pub id: MessageId,
    pub author: String,
    pub content: String,
}

/// A chat message as pushed over the channel and returned by history fetches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub author: UserRef,
    #[serde(default)]
    pub content: String,
    /// Milliseconds since the Unix epoch.
    pub ts: i64,
    #[serde(default)]
    pub reply_to: Option<ReplySnapshot>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub edited: bool,
}

/// Summary of the newest message of a room, shown in the sidebar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    #[serde(default)]
    pub message_id: Option<MessageId>,
    pub sender: String,
    pub content: String,
    pub ts: i64,
}

impl From<&Message> for LastMessage {
    fn from(message: &Message) -> Self {
        let content = if message.content.is_empty() && !message.attachments.is_empty() {
            "[attachment]".to_owned()
        } else {
            message.content.clone()
        };
        Self {
            message_id: Some(message.id),
            sender: message.author.username.clone(),
            content,
            ts: message.ts,
        }
    }
}

/// Payload of a `delete_message` envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedMessage {
    pub message_id: MessageId,
    pub room_id: RoomId,
    /// Room summary recomputed by the server after the deletion.
    #[serde(default)]
    pub last_message: Option<LastMessage>,
}

/// A single envelope on the realtime channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Frame {
    /// A new message was posted.
    SendMessage(Message),
    /// An existing message was replaced by an edited version.
    EditMessage(Message),
    /// A message was removed.
    DeleteMessage(DeletedMessage),
}

impl Frame {
    /// Room the event is addressed to.
    #[must_use]
    pub fn room_id(&self) -> RoomId {
        match self {
            Self::SendMessage(message) | Self::EditMessage(message) => message.room_id,
            Self::DeleteMessage(deleted) => deleted.room_id,
        }
    }

    /// Wire discriminant of this envelope.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SendMessage(_) => "send_message",
            Self::EditMessage(_) => "edit_message",
            Self::DeleteMessage(_) => "delete_message",
        }
    }
}

/// Encode a frame into its JSON text form.
#[must_use]
pub fn encode_frame(frame: &Frame) -> String {
    // Serializing plain structs with string keys cannot fail.
    serde_json::to_string(frame).unwrap_or_default()
}

/// Decode JSON text into a frame.
///
/// # Errors
///
/// Returns [`CodecError::Json`] for unparsable text, [`CodecError::MissingType`]
/// and [`CodecError::UnknownType`] for envelopes without a usable
/// discriminant, and [`CodecError::Payload`] when the payload does not match
/// the discriminant's schema.
pub fn decode_frame(text: &str) -> Result<Frame, CodecError> {
    let value: Value = serde_json::from_str(text).map_err(CodecError::Json)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(CodecError::MissingType)?
        .to_owned();
    if !KNOWN_TYPES.contains(&kind.as_str()) {
        return Err(CodecError::UnknownType(kind));
    }
    serde_json::from_value(value).map_err(|source| CodecError::Payload { kind, source })
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
