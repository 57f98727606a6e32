//! Session state machine.
//!
//! SYSTEM CONTEXT
//! ==============
//! `session` defines the single authoritative state object and its read-only
//! selectors, `action` the closed set of transitions, and `reducer` the pure
//! transition function. `store` serializes dispatch and publishes immutable
//! snapshots to observers.

pub mod action;
mod messages;
pub mod reducer;
pub mod session;
pub mod store;

pub use action::Action;
pub use reducer::reduce;
pub use session::Session;
pub use store::Store;

pub use crate::net::connection::ConnectionStatus;
