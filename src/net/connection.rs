//! Realtime channel lifecycle for the chat session.
//!
//! The `ConnectionManager` owns one logical channel to the server: it opens it
//! through an injected [`Connector`], decodes inbound envelopes, reconnects
//! with linear backoff after unexpected closure, and publishes everything
//! through a typed, single-slot listener table.
//!
//! DESIGN
//! ======
//! Each `connect()` starts a new driver task tagged with a generation number.
//! Replacing or stopping the channel bumps the generation and aborts the old
//! task, so a superseded task can never emit events or schedule reconnects.
//! Reconnect attempt `n` waits `n × base_delay`; a successful open resets the
//! counter, and running out of attempts leaves the manager idle.
//!
//! ERROR HANDLING
//! ==============
//! Transport failures, undecodable payloads and reconnect exhaustion are all
//! reported as `error` events. Nothing is propagated as a `Result` or panic
//! across the event boundary.

#[cfg(test)]
#[path = "connection_test.rs"]
mod connection_test;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use frames::Frame;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use super::transport::{Connector, FrameStream, TransportError};
use crate::config::{DEFAULT_RECONNECT_BASE_DELAY_MS, DEFAULT_RECONNECT_MAX_ATTEMPTS};

// =============================================================================
// PUBLIC TYPES
// =============================================================================

/// Channel lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// An open attempt is in progress.
    Connecting,
    /// The channel is open and receiving.
    Connected,
    /// The channel is closed, either waiting for a retry or idle.
    Disconnected,
    /// The last open attempt failed, or reconnection gave up.
    Error,
}

impl ConnectionStatus {
    /// Persistent banner text for the presentation layer, if any.
    #[must_use]
    pub fn banner(self) -> Option<&'static str> {
        match self {
            Self::Connected => None,
            Self::Connecting => Some("Connecting…"),
            Self::Disconnected => Some("Disconnected, reconnecting…"),
            Self::Error => Some("Connection lost. Retry to reconnect."),
        }
    }
}

/// Linear reconnect backoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(DEFAULT_RECONNECT_BASE_DELAY_MS),
            max_attempts: DEFAULT_RECONNECT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Error payload of the `error` event category.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Inbound text that is not a valid envelope.
    #[error("malformed inbound payload: {reason}")]
    Malformed { raw: String, reason: String },
    /// Every reconnect attempt failed; the manager stays idle until `connect()`.
    #[error("gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

/// Listener categories. Each holds at most one handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connecting,
    Connect,
    Message,
    Disconnect,
    Error,
}

/// An event delivered to listeners.
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelEvent {
    /// An open attempt started. Attempt 0 is a caller-initiated `connect()`.
    Connecting { attempt: u32 },
    Connect,
    Message(Frame),
    Disconnect,
    Error(ChannelError),
}

impl ChannelEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connecting { .. } => EventKind::Connecting,
            Self::Connect => EventKind::Connect,
            Self::Message(_) => EventKind::Message,
            Self::Disconnect => EventKind::Disconnect,
            Self::Error(_) => EventKind::Error,
        }
    }
}

type Handler = Arc<dyn Fn(ChannelEvent) + Send + Sync>;

// =============================================================================
// CONNECTION MANAGER
// =============================================================================

/// Handle to the realtime channel. Clones share the same channel.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

struct Shared {
    url: String,
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    state: Mutex<ChannelState>,
    handlers: Mutex<HashMap<EventKind, Handler>>,
}

struct ChannelState {
    status: ConnectionStatus,
    /// Reconnect attempts since the last successful open.
    attempts: u32,
    reconnect_suppressed: bool,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

/// What the driver does after a channel closes.
enum AfterClose {
    Retry { attempt: u32, delay: Duration },
    Exhausted { attempts: u32 },
    Stop,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(url: impl Into<String>, connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Self {
        Self {
            shared: Arc::new(Shared {
                url: url.into(),
                connector,
                policy,
                state: Mutex::new(ChannelState {
                    status: ConnectionStatus::Disconnected,
                    attempts: 0,
                    reconnect_suppressed: false,
                    generation: 0,
                    task: None,
                }),
                handlers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Open the channel, replacing any existing one.
    ///
    /// An existing channel is dropped without a `disconnect` event and without
    /// scheduling a reconnect. Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let mut state = self.shared.lock_state();
        if let Some(task) = state.task.take() {
            tracing::debug!(url = %self.shared.url, "replacing existing channel");
            task.abort();
        }
        state.generation += 1;
        state.attempts = 0;
        state.reconnect_suppressed = false;
        state.status = ConnectionStatus::Connecting;
        let generation = state.generation;
        state.task = Some(tokio::spawn(run_channel(Arc::clone(&self.shared), generation)));
    }

    /// Close the channel for good: cancel pending reconnects and drop all listeners.
    pub fn disconnect(&self) {
        {
            let mut state = self.shared.lock_state();
            state.reconnect_suppressed = true;
            state.generation += 1;
            state.status = ConnectionStatus::Disconnected;
            if let Some(task) = state.task.take() {
                task.abort();
            }
        }
        self.shared.lock_handlers().clear();
        tracing::info!(url = %self.shared.url, "channel disconnected by caller");
    }

    /// Register the handler for `kind`.
    ///
    /// The first registrant keeps the slot until [`off`](Self::off); a second
    /// registration is ignored and returns `false`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> bool
    where
        F: Fn(ChannelEvent) + Send + Sync + 'static,
    {
        match self.shared.lock_handlers().entry(kind) {
            Entry::Occupied(_) => {
                tracing::debug!(?kind, "listener slot taken; registration ignored");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(handler));
                true
            }
        }
    }

    /// Clear the handler for `kind`.
    pub fn off(&self, kind: EventKind) {
        self.shared.lock_handlers().remove(&kind);
    }

    #[must_use]
    pub fn has_listener(&self, kind: EventKind) -> bool {
        self.shared.lock_handlers().contains_key(&kind)
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.shared.lock_state().status
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.shared.url
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_handlers(&self) -> MutexGuard<'_, HashMap<EventKind, Handler>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock_state().generation == generation
    }

    /// Invoke the listener for the event's category, unless this driver was superseded.
    fn emit(&self, generation: u64, event: ChannelEvent) {
        if !self.is_current(generation) {
            return;
        }
        let handler = self.lock_handlers().get(&event.kind()).cloned();
        if let Some(handler) = handler {
            handler(event);
        }
    }

    fn begin_attempt(&self, generation: u64) -> bool {
        let mut state = self.lock_state();
        if state.generation != generation || state.reconnect_suppressed {
            return false;
        }
        state.status = ConnectionStatus::Connecting;
        true
    }

    fn mark_connected(&self, generation: u64) -> bool {
        let mut state = self.lock_state();
        if state.generation != generation {
            return false;
        }
        state.status = ConnectionStatus::Connected;
        state.attempts = 0;
        true
    }

    fn mark_failed(&self, generation: u64) {
        let mut state = self.lock_state();
        if state.generation == generation {
            state.status = ConnectionStatus::Error;
        }
    }

    fn mark_closed(&self, generation: u64) -> Option<AfterClose> {
        let mut state = self.lock_state();
        if state.generation != generation {
            return None;
        }
        state.status = ConnectionStatus::Disconnected;
        if state.reconnect_suppressed {
            return Some(AfterClose::Stop);
        }
        if state.attempts >= self.policy.max_attempts {
            return Some(AfterClose::Exhausted { attempts: state.attempts });
        }
        state.attempts += 1;
        Some(AfterClose::Retry {
            attempt: state.attempts,
            delay: self.policy.delay_for(state.attempts),
        })
    }

    async fn pump(&self, generation: u64, mut stream: FrameStream) {
        while let Some(item) = stream.next().await {
            match item {
                Ok(text) => self.deliver(generation, &text),
                Err(err) => {
                    tracing::warn!(url = %self.url, error = %err, "channel receive failed");
                    self.emit(generation, ChannelEvent::Error(err.into()));
                    break;
                }
            }
        }
    }

    fn deliver(&self, generation: u64, text: &str) {
        match frames::decode_frame(text) {
            Ok(frame) => {
                tracing::debug!(kind = frame.kind(), room_id = frame.room_id(), "inbound frame");
                self.emit(generation, ChannelEvent::Message(frame));
            }
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed inbound payload");
                self.emit(
                    generation,
                    ChannelEvent::Error(ChannelError::Malformed { raw: text.to_owned(), reason: err.to_string() }),
                );
            }
        }
    }
}

/// Driver task: open, pump, and reconnect until superseded, stopped or exhausted.
async fn run_channel(shared: Arc<Shared>, generation: u64) {
    let mut attempt = 0;
    loop {
        if !shared.begin_attempt(generation) {
            return;
        }
        shared.emit(generation, ChannelEvent::Connecting { attempt });

        match shared.connector.open(&shared.url).await {
            Ok(stream) => {
                if !shared.mark_connected(generation) {
                    return;
                }
                tracing::info!(url = %shared.url, attempt, "channel connected");
                shared.emit(generation, ChannelEvent::Connect);
                shared.pump(generation, stream).await;
                tracing::info!(url = %shared.url, "channel closed");
            }
            Err(err) => {
                tracing::warn!(url = %shared.url, attempt, error = %err, "channel open failed");
                shared.mark_failed(generation);
                shared.emit(generation, ChannelEvent::Error(err.into()));
            }
        }

        let Some(after) = shared.mark_closed(generation) else {
            return;
        };
        shared.emit(generation, ChannelEvent::Disconnect);

        match after {
            AfterClose::Retry { attempt: next, delay } => {
                tracing::info!(attempt = next, delay_ms = delay.as_millis(), "reconnect scheduled");
                attempt = next;
                tokio::time::sleep(delay).await;
            }
            AfterClose::Exhausted { attempts } => {
                tracing::warn!(url = %shared.url, attempts, "reconnect attempts exhausted; channel idle");
                shared.emit(generation, ChannelEvent::Error(ChannelError::ReconnectExhausted { attempts }));
                return;
            }
            AfterClose::Stop => return,
        }
    }
}
