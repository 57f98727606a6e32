//! Transport seam for the realtime channel.
//!
//! The connection manager only needs two things from a transport: a way to
//! open a channel and a stream of inbound text payloads that ends when the
//! channel closes. Production uses tokio-tungstenite; tests inject scripted
//! connectors to drive failures and closures under virtual time.

#[cfg(test)]
#[path = "transport_test.rs"]
mod transport_test;

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};

/// Inbound payloads of one open channel. Ends when the channel closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// Failure of the underlying transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("channel open failed: {0}")]
    Open(String),
    #[error("channel receive failed: {0}")]
    Receive(String),
}

/// Opens realtime channels.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a channel to `url`, resolving once it is ready to receive.
    async fn open(&self, url: &str) -> Result<FrameStream, TransportError>;
}

/// WebSocket connector backed by tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> Result<FrameStream, TransportError> {
        let (socket, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Open(e.to_string()))?;
        let stream = socket.filter_map(|item| futures::future::ready(inbound_text(item).transpose()));
        Ok(Box::pin(stream))
    }
}

/// Extract the application payload of a WebSocket message.
///
/// Control frames yield `Ok(None)` and are skipped by the stream.
fn inbound_text(item: Result<WsMessage, tungstenite::Error>) -> Result<Option<String>, TransportError> {
    match item {
        Ok(WsMessage::Text(text)) => Ok(Some(text.as_str().to_owned())),
        Ok(WsMessage::Binary(bytes)) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Close(_) | WsMessage::Frame(_)) => Ok(None),
        Err(err) => Err(TransportError::Receive(err.to_string())),
    }
}
