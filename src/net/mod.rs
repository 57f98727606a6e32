//! Networking modules for the REST collaborator and the realtime channel.
//!
//! SYSTEM CONTEXT
//! ==============
//! `api` handles REST calls, `connection` manages the channel lifecycle on top
//! of the `transport` seam, and `types` defines the REST-side schema.

pub mod api;
pub mod connection;
pub mod transport;
pub mod types;
