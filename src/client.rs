//! Session orchestration: performs I/O and dispatches the outcome.
//!
//! SYSTEM CONTEXT
//! ==============
//! `ChatClient` is the environment of the state machine. It owns the REST
//! collaborator, the realtime channel and the store, and is the only place
//! where requests and channel events turn into actions. The reducer itself
//! never sees the network.
//!
//! DESIGN
//! ======
//! - Session start (`login`/`register`) authenticates, binds the channel's
//!   listeners to the store and connects. A background observer fetches the
//!   room list once per store session epoch.
//! - Responses are dispatched only while the session (and, for history pages,
//!   the selection) that requested them is still in place.
//! - Session end (`logout`) disconnects the channel before resetting state, so
//!   no event of the old session is dispatched once the identity is cleared.
//! - The unread counter is only written through transitions; the client
//!   dispatches `ResetUnreadCount` instead of touching room values.
//!
//! ERROR HANDLING
//! ==============
//! Authentication and initial room-list failures are session-fatal and dispatch
//! `Error`. Everything else is returned to the caller and leaves state intact.

#[cfg(test)]
#[path = "client_test.rs"]
mod client_test;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::net::api::{ApiError, ChatApi, HttpApi};
use crate::net::connection::{ChannelError, ChannelEvent, ConnectionManager, ConnectionStatus, EventKind};
use crate::net::transport::WsConnector;
use crate::net::types::{
    Credentials, Message, MessageId, NewMessage, NewRoom, ProfileUpdate, Registration, Room, RoomId,
    RoomInvitation, RoomUpdate, User, UserId,
};
use crate::state::{Action, Session, Store};

pub struct ChatClient {
    api: Arc<dyn ChatApi>,
    connection: ConnectionManager,
    store: Store,
    observer: JoinHandle<()>,
}

impl ChatClient {
    /// Build a client around injected services and start the identity observer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(api: Arc<dyn ChatApi>, connection: ConnectionManager) -> Self {
        let store = Store::default();
        let observer = tokio::spawn(watch_sessions(Arc::clone(&api), store.clone()));
        Self { api, connection, store, observer }
    }

    /// Production wiring: reqwest for REST and tokio-tungstenite for the channel.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let api = HttpApi::from_config(config)?;
        let connection = ConnectionManager::new(config.ws_url.clone(), Arc::new(WsConnector), config.reconnect);
        Ok(Self::spawn(Arc::new(api), connection))
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<Session> {
        self.store.snapshot()
    }

    #[must_use]
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    // =========================================================================
    // SESSION LIFECYCLE
    // =========================================================================

    pub async fn login(&self, username: &str, password: &str) -> Result<User, ClientError> {
        let credentials = Credentials { username: username.to_owned(), password: password.to_owned() };
        let result = self.api.login(&credentials).await;
        self.finish_auth("login", result)
    }

    pub async fn register(&self, registration: &Registration) -> Result<User, ClientError> {
        let result = self.api.register(registration).await;
        self.finish_auth("register", result)
    }

    fn finish_auth(&self, operation: &'static str, result: Result<User, ApiError>) -> Result<User, ClientError> {
        match result {
            Ok(user) => {
                tracing::info!(user_id = user.id, username = %user.username, operation, "session started");
                self.store.dispatch(Action::Authenticate(user.clone()));
                self.bind_channel();
                self.connection.connect();
                Ok(user)
            }
            Err(err) => {
                tracing::warn!(error = %err, operation, "authentication failed");
                self.store.dispatch(Action::Error);
                Err(err.into())
            }
        }
    }

    /// End the session. The server-side logout is best effort.
    pub async fn logout(&self) {
        self.connection.disconnect();
        self.store.dispatch(Action::Logout);
        if let Err(err) = self.api.logout().await {
            tracing::warn!(error = %err, "server logout failed");
        }
    }

    /// Reopen the channel after exhaustion or an error banner.
    pub fn retry_connection(&self) {
        if !self.store.snapshot().is_authenticated() {
            tracing::debug!("retry ignored without an active session");
            return;
        }
        self.bind_channel();
        self.connection.connect();
    }

    /// Wait until the realtime channel is open and the session reflects it.
    ///
    /// Composition is gated on `Connected`, so callers that send right after
    /// signing in wait here first.
    pub async fn wait_connected(&self, limit: Duration) -> Result<(), ClientError> {
        let mut rx = self.store.subscribe();
        let open = rx.wait_for(|session| {
            session.connection_status == ConnectionStatus::Connected
                && self.connection.status() == ConnectionStatus::Connected
        });
        let connected = matches!(tokio::time::timeout(limit, open).await, Ok(Ok(_)));
        if connected {
            Ok(())
        } else {
            tracing::warn!(status = ?self.connection.status(), ?limit, "realtime channel did not connect");
            Err(ClientError::ConnectTimeout(limit))
        }
    }

    fn bind_channel(&self) {
        let bind_status = |kind: EventKind, status: ConnectionStatus| {
            let store = self.store.clone();
            self.connection.on(kind, move |_| store.dispatch(Action::SetConnectionStatus(status)));
        };
        bind_status(EventKind::Connecting, ConnectionStatus::Connecting);
        bind_status(EventKind::Connect, ConnectionStatus::Connected);
        bind_status(EventKind::Disconnect, ConnectionStatus::Disconnected);

        let store = self.store.clone();
        self.connection.on(EventKind::Message, move |event| {
            if let ChannelEvent::Message(frame) = event {
                store.dispatch(Action::from(frame));
            }
        });

        let store = self.store.clone();
        self.connection.on(EventKind::Error, move |event| match event {
            ChannelEvent::Error(ChannelError::ReconnectExhausted { attempts }) => {
                tracing::warn!(attempts, "realtime channel gave up");
                store.dispatch(Action::SetConnectionStatus(ConnectionStatus::Error));
            }
            ChannelEvent::Error(err) => tracing::warn!(error = %err, "realtime channel error"),
            _ => {}
        });
    }

    // =========================================================================
    // ROOMS
    // =========================================================================

    /// Make `room_id` current and load its latest history page.
    pub async fn select_room(&self, room_id: RoomId) -> Result<(), ClientError> {
        let session = self.store.snapshot();
        if session.current_room_id() == Some(room_id) {
            return Ok(());
        }
        if session.room(room_id).is_none() {
            return Err(ClientError::UnknownRoom(room_id));
        }

        let epoch = self.store.epoch();
        self.store.dispatch(Action::SelectRoom(room_id));
        let messages = self.api.list_messages(room_id, None).await?;

        // The user may have moved on while the page was in flight.
        let still_viewing = |session: &Session| self.store.epoch() == epoch && session.current_room_id() == Some(room_id);
        self.store.dispatch_if(&still_viewing, Action::SetMessages { room_id, messages });
        if !self.store.dispatch_if(&still_viewing, Action::ResetUnreadCount(room_id)) {
            tracing::debug!(room_id, "selection changed during history fetch; unread counter left alone");
        }
        Ok(())
    }

    /// Fetch the page preceding the oldest loaded message. Returns the page size.
    pub async fn load_older_messages(&self) -> Result<usize, ClientError> {
        let session = self.store.snapshot();
        let room_id = session.current_room_id().ok_or(ClientError::NoCurrentRoom)?;
        let messages = self.api.list_messages(room_id, session.oldest_message_id()).await?;
        let fetched = messages.len();
        self.store.dispatch(Action::SetMessages { room_id, messages });
        Ok(fetched)
    }

    pub async fn refresh_rooms(&self) -> Result<(), ClientError> {
        let epoch = self.store.epoch();
        let rooms = self.api.list_rooms().await?;
        self.store.dispatch_in_epoch(epoch, Action::SetRooms(rooms));
        Ok(())
    }

    pub async fn create_room(&self, room: &NewRoom) -> Result<Room, ClientError> {
        let created = self.api.create_room(room).await?;
        self.store.dispatch(Action::UpsertRoom(created.clone()));
        Ok(created)
    }

    /// Open (or create) a direct conversation with `user_id`.
    pub async fn start_direct_message(&self, user_id: UserId) -> Result<Room, ClientError> {
        let room = NewRoom { name: String::new(), member_ids: vec![user_id], is_direct: true };
        let created = self.create_room(&room).await?;
        self.select_room(created.id).await?;
        Ok(created)
    }

    pub async fn update_room(&self, room_id: RoomId, update: &RoomUpdate) -> Result<Room, ClientError> {
        let room = self.api.update_room(room_id, update).await?;
        self.store.dispatch(Action::UpsertRoom(room.clone()));
        Ok(room)
    }

    pub async fn fetch_invitation(&self, token: &str) -> Result<RoomInvitation, ClientError> {
        Ok(self.api.fetch_invitation(token).await?)
    }

    pub async fn join_invitation(&self, token: &str) -> Result<Room, ClientError> {
        let room = self.api.join_invitation(token).await?;
        self.store.dispatch(Action::UpsertRoom(room.clone()));
        Ok(room)
    }

    pub fn mark_read(&self, room_id: RoomId) {
        self.store.dispatch(Action::ResetUnreadCount(room_id));
    }

    pub fn set_search(&self, search: impl Into<String>) {
        self.store.dispatch(Action::SetSearch(search.into()));
    }

    pub fn highlight_message(&self, message_id: Option<MessageId>) {
        self.store.dispatch(Action::HighlightMessage(message_id));
    }

    // =========================================================================
    // MESSAGES AND PROFILE
    // =========================================================================

    /// Send to the current room. Needs a live channel.
    pub async fn send_message(&self, message: &NewMessage) -> Result<Message, ClientError> {
        if message.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        let session = self.store.snapshot();
        let room_id = session.current_room_id().ok_or(ClientError::NoCurrentRoom)?;
        if session.connection_status != ConnectionStatus::Connected {
            return Err(ClientError::Offline);
        }

        let sent = self.api.send_message(room_id, message).await?;
        self.store.dispatch(Action::ReceiveMessage(sent.clone()));
        self.store.dispatch_if(|session| session.current_room_id() == Some(room_id), Action::ResetUnreadCount(room_id));
        Ok(sent)
    }

    pub async fn check_username(&self, username: &str) -> Result<bool, ClientError> {
        Ok(self.api.check_username(username).await?)
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ClientError> {
        let user = self.api.update_profile(update).await?;
        self.store.dispatch(Action::UpdateProfile(user.clone()));
        Ok(user)
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.observer.abort();
        self.connection.disconnect();
    }
}

/// Fetch the room list once per sign-in.
///
/// Keyed on the store's session epoch rather than the user id: watch
/// notifications coalesce, so a logout followed by a login as the same user can
/// reach this loop as a single change.
async fn watch_sessions(api: Arc<dyn ChatApi>, store: Store) {
    let mut rx = store.subscribe();
    let mut seen: Option<u64> = None;
    loop {
        let signed_in = {
            let session = rx.borrow_and_update();
            session.user.as_ref().map(|user| (store.epoch(), user.id))
        };
        if let Some((epoch, user_id)) = signed_in
            && seen != Some(epoch)
        {
            seen = Some(epoch);
            load_rooms(api.as_ref(), &store, epoch, user_id).await;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn load_rooms(api: &dyn ChatApi, store: &Store, epoch: u64, user_id: UserId) {
    let (outcome, applied) = match api.list_rooms().await {
        Ok(rooms) => {
            tracing::debug!(user_id, rooms = rooms.len(), "room list loaded");
            ("rooms", store.dispatch_in_epoch(epoch, Action::SetRooms(rooms)))
        }
        Err(err) => {
            tracing::warn!(user_id, error = %err, "room list fetch failed");
            ("error", store.dispatch_in_epoch(epoch, Action::Error))
        }
    };
    if !applied {
        tracing::debug!(user_id, epoch, outcome, "session changed during room fetch; result discarded");
    }
}
