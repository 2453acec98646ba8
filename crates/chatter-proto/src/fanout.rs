//! Typed fan-out payloads.
//!
//! The proxy delivers `(topic, bytes)` pairs; the bytes are a bare field map.
//! Which shape applies is decided by the topic: the session's own username
//! carries [`DirectMessage`], any other topic carries [`ChannelPost`].

use serde::Deserialize;

/// Private message delivered on the recipient's username topic.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DirectMessage {
    /// Sending user.
    pub src: String,
    /// Message text.
    pub message: String,
}

/// Broadcast delivered on a channel topic.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelPost {
    /// Publishing user.
    pub user: String,
    /// Message text.
    pub message: String,
}
