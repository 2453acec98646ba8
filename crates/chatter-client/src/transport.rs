//! Transport seams for the two channels.
//!
//! The core never opens sockets. Embedders supply one implementation per
//! channel: a strictly request-then-reply command transport (REQ-style) and a
//! topic-filtered fan-out stream (SUB-style). Endpoints and connection
//! strings are the embedder's concern.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Errors surfaced by transport implementations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection closed or was torn down mid-operation.
    ///
    /// Fatal to the current call or listener; propagates up as session
    /// termination, never silently retried.
    #[error("transport closed")]
    Closed,

    /// Any other transport-level failure.
    #[error("transport failure: {reason}")]
    Failed {
        /// Description of the failure.
        reason: String,
    },
}

/// Synchronous request/reply channel to the broker.
///
/// The underlying transport guarantees exactly one reply per request and
/// enforces strict alternation; the client keeps its own state-machine guard
/// on top so misuse fails fast instead of corrupting the reply stream.
#[async_trait]
pub trait CommandTransport: Send + 'static {
    /// Transmit one encoded request envelope.
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Await the single reply to the previously sent request.
    async fn recv(&mut self) -> Result<Bytes, TransportError>;
}

/// Asynchronous topic-filtered broadcast stream from the proxy.
#[async_trait]
pub trait FanoutTransport: Send + 'static {
    /// Register interest in a topic on the already-connected stream.
    ///
    /// Purely client-side; no broker round trip is involved.
    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Await the next `(topic, payload)` delivery.
    ///
    /// Within the stream, deliveries arrive in publication order. If the
    /// consumer is slow, buffering or dropping is the transport's business.
    async fn next(&mut self) -> Result<(String, Bytes), TransportError>;
}
