//! Errors surfaced to callers of [`crate::ChatClient`] operations.

use std::time::Duration;

use frames::RoomId;

use crate::config::ConfigError;
use crate::net::api::ApiError;

/// Failure of a user-initiated client operation.
///
/// Session-fatal failures are additionally reflected in state through the
/// `Error` transition; everything else is only returned to the caller so the
/// presentation layer can show a localized error.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The REST collaborator rejected or failed the request.
    #[error(transparent)]
    Api(#[from] ApiError),
    /// Client configuration could not be built.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The operation needs a selected room.
    #[error("no room is selected")]
    NoCurrentRoom,
    /// The room is not part of the session's room list.
    #[error("room {0} is not in the room list")]
    UnknownRoom(RoomId),
    /// Message composition is disabled while the channel is down.
    #[error("realtime channel is not connected")]
    Offline,
    /// The realtime channel did not open in time.
    #[error("realtime channel did not connect within {0:?}")]
    ConnectTimeout(Duration),
    /// The outgoing message has neither text nor attachments.
    #[error("message has no content or attachments")]
    EmptyMessage,
}
