//! Client
//!
//! Client-side half of the chatter protocol: a single coherent session over
//! two independent transports, with causal message ordering maintained by a
//! Lamport clock.
//!
//! # Architecture
//!
//! Two independently progressing activities share one session:
//!
//! - The [`CommandChannel`] runs a strictly sequential request/reply cycle
//!   against the broker, at most one call outstanding at a time.
//! - The fan-out listener continuously drains the topic-filtered broadcast
//!   stream from the proxy, classifying each delivery as private or
//!   broadcast.
//!
//! They coordinate only through the atomically-updated [`LamportClock`] and a
//! control channel for subscriptions, never through locks: clock merges are
//! simple forward-only scalar updates that are safe to interleave.
//!
//! # Components
//!
//! - [`Session`]: login handshake and the user-facing operations
//! - [`CommandChannel`]: one-request/one-reply primitive with an explicit
//!   in-flight guard
//! - [`Inbound`]: classified fan-out deliveries surfaced to the embedder
//! - [`CommandTransport`] / [`FanoutTransport`]: seams the embedder wires to
//!   real endpoints

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod command;
mod error;
mod listener;
mod session;
mod transport;

pub use clock::LamportClock;
pub use command::CommandChannel;
pub use error::ClientError;
pub use listener::Inbound;
pub use session::{Outcome, Session};
pub use transport::{CommandTransport, FanoutTransport, TransportError};
