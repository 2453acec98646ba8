//! Wire types for the chatter protocol.
//!
//! Everything exchanged with the broker and the proxy is a MessagePack
//! envelope: a `service` name plus a string-keyed `data` map carrying the
//! operation fields, a `timestamp`, and the sender's logical clock. Fan-out
//! deliveries omit the `service` wrapper and carry the bare data map.
//!
//! # Components
//!
//! - [`Envelope`] / [`Fields`]: the wire shape and its codec
//! - [`Request`]: tagged union of the client-issued operations
//! - [`Ack`], [`UserList`], [`ChannelList`]: typed reply payloads
//! - [`DirectMessage`], [`ChannelPost`]: typed fan-out payloads
//!
//! The typed layer gives compile-time field checking per service while the
//! underlying map keeps the wire tolerant of extra fields.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod envelope;
mod fanout;
mod request;
mod reply;

pub use envelope::{CodecError, Envelope, Fields};
// Field values are MessagePack values; re-exported so callers can build and
// inspect payloads without naming the codec crate.
pub use rmpv::Value;
pub use fanout::{ChannelPost, DirectMessage};
pub use request::Request;
pub use reply::{Ack, ChannelList, Status, UserList};
