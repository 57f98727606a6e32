//! REST collaborator: the request/response side of the chat backend.
//!
//! SYSTEM CONTEXT
//! ==============
//! The session core consumes the backend through the [`ChatApi`] trait so the
//! orchestration layer can be exercised against an in-memory mock. The
//! production implementation, [`HttpApi`], talks JSON over reqwest and keeps
//! the session cookie in the client's cookie store.
//!
//! ERROR HANDLING
//! ==============
//! Every call returns a typed payload or an [`ApiError`]. Callers decide
//! whether a failure is fatal for the session (login) or local to the
//! initiating action (send, create room).

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::types::{
    Credentials, Message, MessageId, NewMessage, NewRoom, ProfileUpdate, Registration, Room, RoomId,
    RoomInvitation, RoomUpdate, User,
};
use crate::config::ClientConfig;

const LOGIN_PATH: &str = "/api/auth/login";
const REGISTER_PATH: &str = "/api/auth/register";
const LOGOUT_PATH: &str = "/api/auth/logout";
const PROFILE_PATH: &str = "/api/auth/profile";
const CHECK_USERNAME_PATH: &str = "/api/auth/check-username";
const ROOMS_PATH: &str = "/api/rooms";

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request to {path} failed: {source}")]
    Request {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{path} returned HTTP {status}: {body}")]
    Status { path: String, status: u16, body: String },
    #[error("unexpected response body from {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to build http client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl ApiError {
    /// The server rejected the session or credentials.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. })
    }

    /// Worth retrying unchanged: network failure, throttling or a server fault.
    #[must_use]
    pub fn retryable(&self) -> bool {
        match self {
            Self::Request { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Parse { .. } | Self::ClientBuild(_) => false,
        }
    }
}

// =============================================================================
// TRAIT
// =============================================================================

/// Backend operations consumed by the chat session.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<User, ApiError>;
    async fn register(&self, registration: &Registration) -> Result<User, ApiError>;
    async fn logout(&self) -> Result<(), ApiError>;
    async fn list_rooms(&self) -> Result<Vec<Room>, ApiError>;
    async fn create_room(&self, room: &NewRoom) -> Result<Room, ApiError>;
    async fn update_room(&self, room_id: RoomId, update: &RoomUpdate) -> Result<Room, ApiError>;

    /// One page of history, newest page first when `before` is `None`.
    async fn list_messages(&self, room_id: RoomId, before: Option<MessageId>) -> Result<Vec<Message>, ApiError>;
    async fn send_message(&self, room_id: RoomId, message: &NewMessage) -> Result<Message, ApiError>;

    /// True when nobody has claimed `username` yet.
    async fn check_username(&self, username: &str) -> Result<bool, ApiError>;
    async fn fetch_invitation(&self, token: &str) -> Result<RoomInvitation, ApiError>;
    async fn join_invitation(&self, token: &str) -> Result<Room, ApiError>;
    async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError>;
}

// =============================================================================
// HTTP IMPLEMENTATION
// =============================================================================

/// reqwest-backed [`ChatApi`] with a cookie session.
#[derive(Debug, Clone)]
pub struct HttpApi {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct TextMessageBody<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<MessageId>,
}

#[derive(Deserialize)]
struct Availability {
    available: bool,
}

impl HttpApi {
    /// Build a client for `base_url`. Only the TCP connect is bounded by a timeout.
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(ApiError::ClientBuild)?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned() })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        Self::new(&config.api_base_url, config.connect_timeout)
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send the request and return the body of a 2xx response.
    async fn execute(&self, path: &str, request: reqwest::RequestBuilder) -> Result<String, ApiError> {
        let response = request
            .send()
            .await
            .map_err(|source| request_error(path, source))?;
        let status = response.status();
        let body = response.text().await.map_err(|source| request_error(path, source))?;
        if !status.is_success() {
            tracing::warn!(path, status = status.as_u16(), "api request rejected");
            return Err(ApiError::Status { path: path.to_owned(), status: status.as_u16(), body });
        }
        tracing::debug!(path, status = status.as_u16(), "api request ok");
        Ok(body)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let body = self.execute(path, self.http.get(self.url(path))).await?;
        parse_body(path, &body)
    }

    async fn post_json<B, T>(&self, path: &str, payload: &B) -> Result<T, ApiError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let body = self.execute(path, self.http.post(self.url(path)).json(payload)).await?;
        parse_body(path, &body)
    }

    async fn patch_json<B, T>(&self, path: &str, payload: &B) -> Result<T, ApiError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let body = self.execute(path, self.http.patch(self.url(path)).json(payload)).await?;
        parse_body(path, &body)
    }
}

#[async_trait]
impl ChatApi for HttpApi {
    async fn login(&self, credentials: &Credentials) -> Result<User, ApiError> {
        self.post_json(LOGIN_PATH, credentials).await
    }

    async fn register(&self, registration: &Registration) -> Result<User, ApiError> {
        self.post_json(REGISTER_PATH, registration).await
    }

    async fn logout(&self) -> Result<(), ApiError> {
        self.execute(LOGOUT_PATH, self.http.post(self.url(LOGOUT_PATH))).await?;
        Ok(())
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, ApiError> {
        self.get(ROOMS_PATH).await
    }

    async fn create_room(&self, room: &NewRoom) -> Result<Room, ApiError> {
        self.post_json(ROOMS_PATH, room).await
    }

    async fn update_room(&self, room_id: RoomId, update: &RoomUpdate) -> Result<Room, ApiError> {
        self.patch_json(&room_path(room_id), update).await
    }

    async fn list_messages(&self, room_id: RoomId, before: Option<MessageId>) -> Result<Vec<Message>, ApiError> {
        self.get(&history_path(room_id, before)).await
    }

    async fn send_message(&self, room_id: RoomId, message: &NewMessage) -> Result<Message, ApiError> {
        let path = messages_path(room_id);
        if message.attachments.is_empty() {
            let payload = TextMessageBody { content: &message.content, reply_to: message.reply_to };
            return self.post_json(&path, &payload).await;
        }
        let form = message_form(&path, message)?;
        let body = self.execute(&path, self.http.post(self.url(&path)).multipart(form)).await?;
        parse_body(&path, &body)
    }

    async fn check_username(&self, username: &str) -> Result<bool, ApiError> {
        let request = self.http.get(self.url(CHECK_USERNAME_PATH)).query(&[("username", username)]);
        let body = self.execute(CHECK_USERNAME_PATH, request).await?;
        let availability: Availability = parse_body(CHECK_USERNAME_PATH, &body)?;
        Ok(availability.available)
    }

    async fn fetch_invitation(&self, token: &str) -> Result<RoomInvitation, ApiError> {
        self.get(&invitation_path(token)).await
    }

    async fn join_invitation(&self, token: &str) -> Result<Room, ApiError> {
        let path = format!("{}/join", invitation_path(token));
        let body = self.execute(&path, self.http.post(self.url(&path))).await?;
        parse_body(&path, &body)
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        self.patch_json(PROFILE_PATH, update).await
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn request_error(path: &str, source: reqwest::Error) -> ApiError {
    tracing::warn!(path, error = %source, "api request failed");
    ApiError::Request { path: path.to_owned(), source }
}

fn parse_body<T: DeserializeOwned>(path: &str, body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|source| ApiError::Parse { path: path.to_owned(), source })
}

fn room_path(room_id: RoomId) -> String {
    format!("{ROOMS_PATH}/{room_id}")
}

fn messages_path(room_id: RoomId) -> String {
    format!("{ROOMS_PATH}/{room_id}/messages")
}

fn history_path(room_id: RoomId, before: Option<MessageId>) -> String {
    match before {
        Some(before) => format!("{}?before={before}", messages_path(room_id)),
        None => messages_path(room_id),
    }
}

fn invitation_path(token: &str) -> String {
    format!("/api/invitations/{token}")
}

fn message_form(path: &str, message: &NewMessage) -> Result<Form, ApiError> {
    let mut form = Form::new().text("content", message.content.clone());
    if let Some(reply_to) = message.reply_to {
        form = form.text("reply_to", reply_to.to_string());
    }
    for upload in &message.attachments {
        let part = Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.mime_type)
            .map_err(|source| request_error(path, source))?;
        form = form.part("attachments", part);
    }
    Ok(form)
}
