//! Fan-out listener task.
//!
//! A continuously-draining consumer over the subscription stream. Each
//! delivery is decoded, its clock merged into the session clock, classified
//! by topic (own username means private, anything else is a channel
//! broadcast), and forwarded to the session's event sink.
//!
//! The listener has two states: `Idle` (not yet started, the session still
//! holds the transport) and `Running` (this task draining the stream). There
//! is no way back to `Idle`; shutdown is a hard stop driven by session
//! teardown, not a pause. Subscription additions reach the running task over
//! a control channel, so the command path never touches the stream directly.

use std::sync::Arc;

use bytes::Bytes;
use chatter_proto::{ChannelPost, DirectMessage, Fields};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    clock::LamportClock,
    transport::{FanoutTransport, TransportError},
};

/// A classified fan-out delivery, surfaced to the embedder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Private message: the topic matched the session's own username.
    Direct {
        /// Sending user.
        from: String,
        /// Message text.
        message: String,
        /// Session clock value after merging this message.
        clock: u64,
    },

    /// Channel broadcast: any other topic.
    Broadcast {
        /// Channel the message was published on.
        channel: String,
        /// Publishing user.
        from: String,
        /// Message text.
        message: String,
        /// Session clock value after merging this message.
        clock: u64,
    },
}

/// Control messages from the session to the running listener.
pub(crate) enum ListenerCommand {
    /// Register interest in an additional topic.
    Subscribe(String),
}

/// Handle to a running listener task.
///
/// Dropping the handle closes the control channel, which stops the task.
pub(crate) struct ListenerHandle {
    control: mpsc::UnboundedSender<ListenerCommand>,
    _task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Transition `Idle` -> `Running`: subscribe to the session's own
    /// username and start draining the stream.
    pub(crate) fn spawn<F: FanoutTransport>(
        transport: F,
        username: String,
        clock: Arc<LamportClock>,
        sink: mpsc::UnboundedSender<Inbound>,
    ) -> Self {
        let (control, control_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(transport, username, clock, sink, control_rx));
        Self { control, _task: task }
    }

    /// Ask the running task to subscribe to a topic.
    ///
    /// Returns false if the task has already stopped.
    pub(crate) fn subscribe(&self, topic: String) -> bool {
        self.control.send(ListenerCommand::Subscribe(topic)).is_ok()
    }
}

/// The consumption loop. Never terminates on its own; it ends when the
/// control channel closes (session teardown) or the transport does.
async fn run<F: FanoutTransport>(
    mut transport: F,
    username: String,
    clock: Arc<LamportClock>,
    sink: mpsc::UnboundedSender<Inbound>,
    mut control: mpsc::UnboundedReceiver<ListenerCommand>,
) {
    if let Err(e) = transport.subscribe(&username).await {
        tracing::warn!(topic = username.as_str(), error = %e, "initial subscription failed");
        return;
    }
    tracing::info!(topic = username.as_str(), "fan-out listener running");

    loop {
        tokio::select! {
            // Pending subscriptions apply before later deliveries are read.
            biased;

            command = control.recv() => match command {
                Some(ListenerCommand::Subscribe(topic)) => {
                    if let Err(e) = transport.subscribe(&topic).await {
                        tracing::warn!(topic = topic.as_str(), error = %e, "subscription failed");
                    }
                },
                None => {
                    tracing::debug!("session closed, stopping fan-out listener");
                    break;
                },
            },

            delivery = transport.next() => match delivery {
                Ok((topic, bytes)) => {
                    if !deliver(&topic, &bytes, &username, &clock, &sink) {
                        break;
                    }
                },
                Err(TransportError::Closed) => {
                    tracing::debug!("fan-out stream closed");
                    break;
                },
                Err(e) => {
                    tracing::warn!(error = %e, "fan-out transport failure");
                    break;
                },
            },
        }
    }
}

/// Decode, merge, classify, and forward one delivery.
///
/// Returns false when the sink is gone and the loop should stop. A payload
/// that does not decode is logged and skipped without a clock merge; one that
/// decodes but lacks the expected fields has already been merged (the
/// envelope itself was sound) and is then skipped.
fn deliver(
    topic: &str,
    bytes: &Bytes,
    username: &str,
    clock: &LamportClock,
    sink: &mpsc::UnboundedSender<Inbound>,
) -> bool {
    let fields = match Fields::decode(bytes) {
        Ok(fields) => fields,
        Err(e) => {
            tracing::warn!(topic, error = %e, "malformed fan-out payload");
            return true;
        },
    };

    let merged = clock.merge(fields.clock());

    let inbound = if topic == username {
        match fields.extract::<DirectMessage>() {
            Ok(message) => {
                Inbound::Direct { from: message.src, message: message.message, clock: merged }
            },
            Err(e) => {
                tracing::warn!(topic, error = %e, "private message missing fields");
                return true;
            },
        }
    } else {
        match fields.extract::<ChannelPost>() {
            Ok(post) => Inbound::Broadcast {
                channel: topic.to_string(),
                from: post.user,
                message: post.message,
                clock: merged,
            },
            Err(e) => {
                tracing::warn!(topic, error = %e, "channel post missing fields");
                return true;
            },
        }
    };

    sink.send(inbound).is_ok()
}
