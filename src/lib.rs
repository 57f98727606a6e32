//! Client core for a real-time chat application.
//!
//! SYSTEM CONTEXT
//! ==============
//! `net` owns all network I/O: the REST collaborator (`api`) and the single
//! realtime channel (`connection`). `state` holds the authoritative session
//! state and its pure transition function. `client` orchestrates the two:
//! it performs I/O and dispatches the outcome as actions.

pub mod client;
pub mod config;
pub mod error;
pub mod net;
pub mod state;

pub use client::ChatClient;
pub use config::ClientConfig;
pub use error::ClientError;
