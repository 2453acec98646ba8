//! Session orchestration.
//!
//! One connected identity over two transports: the command channel for
//! request/reply operations and the fan-out listener for continuous delivery.
//! The session owns the logical clock and the topic set; the two transport
//! paths get merge access to the clock but never own it.

use std::{collections::HashSet, sync::Arc};

use chatter_proto::{Ack, ChannelList, Request, UserList};
use tokio::sync::mpsc;

use crate::{
    clock::LamportClock,
    command::CommandChannel,
    error::ClientError,
    listener::{Inbound, ListenerHandle},
    transport::{CommandTransport, FanoutTransport, TransportError},
};

/// The broker's verdict on a request, as ordinary data.
///
/// A rejection is a successful round trip carrying a negative status; the
/// caller reports it to the user and may retry with corrected input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The broker accepted the request.
    Accepted,
    /// The broker rejected the request.
    Rejected {
        /// Broker-supplied detail, when present.
        reason: Option<String>,
    },
}

impl Outcome {
    /// True for accepted requests.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    fn from_ack(ack: &Ack) -> Self {
        if ack.status.is_success() {
            Self::Accepted
        } else {
            Self::Rejected { reason: ack.reason().map(str::to_string) }
        }
    }
}

/// A chat session over a command transport and a fan-out transport.
///
/// Classified fan-out deliveries arrive on the [`Inbound`] receiver returned
/// by [`Session::connect`]. Dropping the session closes the listener's
/// control channel, which hard-stops the consumption loop.
pub struct Session<C: CommandTransport, F: FanoutTransport> {
    command: CommandChannel<C>,
    /// Fan-out transport, held until login starts the listener.
    fanout: Option<F>,
    /// Running listener; `None` while the listener is idle.
    listener: Option<ListenerHandle>,
    clock: Arc<LamportClock>,
    /// Write-once identity, set by the first successful login.
    username: Option<String>,
    /// Topics the fan-out listener watches. Grows only; there is no
    /// unsubscribe in the protocol.
    topics: HashSet<String>,
    sink: mpsc::UnboundedSender<Inbound>,
}

impl<C: CommandTransport, F: FanoutTransport> Session<C, F> {
    /// Wrap a pair of connected transports into a session.
    ///
    /// The clock starts at 0. The returned receiver yields every classified
    /// fan-out delivery once the listener is running.
    pub fn connect(command: C, fanout: F) -> (Self, mpsc::UnboundedReceiver<Inbound>) {
        let clock = Arc::new(LamportClock::new());
        let (sink, events) = mpsc::unbounded_channel();

        let session = Self {
            command: CommandChannel::new(command, Arc::clone(&clock)),
            fanout: Some(fanout),
            listener: None,
            clock,
            username: None,
            topics: HashSet::new(),
            sink,
        };

        (session, events)
    }

    /// Current logical clock value.
    pub fn clock(&self) -> u64 {
        self.clock.value()
    }

    /// The session identity, once login has succeeded.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Topics currently watched by the fan-out listener.
    pub fn topics(&self) -> &HashSet<String> {
        &self.topics
    }

    /// Claim an identity with the broker.
    ///
    /// On acceptance the username is fixed for the session's lifetime, the
    /// fan-out listener starts, and it subscribes to the topic equal to the
    /// username so private messages are delivered. On rejection the identity
    /// stays unset and the caller may retry with another name.
    pub async fn login(&mut self, username: &str) -> Result<Outcome, ClientError> {
        if let Some(existing) = &self.username {
            return Err(ClientError::AlreadyLoggedIn { username: existing.clone() });
        }

        let reply = self.command.call(Request::Login { user: username.to_string() }).await?;
        let ack: Ack = reply.data.extract()?;

        let outcome = Outcome::from_ack(&ack);
        if !outcome.is_accepted() {
            tracing::info!(user = username, reason = ?ack.reason(), "login rejected");
            return Ok(outcome);
        }

        self.username = Some(username.to_string());
        self.topics.insert(username.to_string());

        if let Some(transport) = self.fanout.take() {
            self.listener = Some(ListenerHandle::spawn(
                transport,
                username.to_string(),
                Arc::clone(&self.clock),
                self.sink.clone(),
            ));
        }

        tracing::info!(user = username, clock = self.clock(), "logged in");
        Ok(outcome)
    }

    /// Fetch the registered usernames.
    pub async fn list_users(&mut self) -> Result<Vec<String>, ClientError> {
        let reply = self.command.call(Request::ListUsers).await?;
        Ok(reply.data.extract::<UserList>()?.users)
    }

    /// Fetch the existing channel names.
    pub async fn list_channels(&mut self) -> Result<Vec<String>, ClientError> {
        let reply = self.command.call(Request::ListChannels).await?;
        Ok(reply.data.extract::<ChannelList>()?.channels)
    }

    /// Create a broadcast channel.
    ///
    /// Creation does not subscribe: a creator that wants the channel's
    /// traffic calls [`Session::subscribe_to_channel`] as well.
    pub async fn create_channel(&mut self, name: &str) -> Result<Outcome, ClientError> {
        let reply = self.command.call(Request::CreateChannel { channel: name.to_string() }).await?;
        let ack: Ack = reply.data.extract()?;
        Ok(Outcome::from_ack(&ack))
    }

    /// Start watching a channel's broadcasts.
    ///
    /// Purely local: the topic registers against the already-connected
    /// fan-out transport, with no broker round trip. Requires a running
    /// listener, i.e. a completed login. Subscribing twice is a no-op.
    pub fn subscribe_to_channel(&mut self, name: &str) -> Result<(), ClientError> {
        let Some(listener) = &self.listener else {
            return Err(ClientError::NotLoggedIn);
        };

        if self.topics.contains(name) {
            return Ok(());
        }

        if !listener.subscribe(name.to_string()) {
            return Err(ClientError::Transport(TransportError::Closed));
        }

        // Recorded only once the listener has the topic; a failed send must
        // not leave a phantom subscription behind.
        self.topics.insert(name.to_string());
        tracing::info!(channel = name, "subscribed");
        Ok(())
    }

    /// Publish a message to a channel.
    pub async fn publish_to_channel(
        &mut self,
        channel: &str,
        message: &str,
    ) -> Result<Outcome, ClientError> {
        let user = self.username.clone().ok_or(ClientError::NotLoggedIn)?;

        let reply = self
            .command
            .call(Request::Publish {
                user,
                channel: channel.to_string(),
                message: message.to_string(),
            })
            .await?;
        let ack: Ack = reply.data.extract()?;
        Ok(Outcome::from_ack(&ack))
    }

    /// Send a private message to another user.
    pub async fn send_direct(
        &mut self,
        to_user: &str,
        message: &str,
    ) -> Result<Outcome, ClientError> {
        let src = self.username.clone().ok_or(ClientError::NotLoggedIn)?;

        let reply = self
            .command
            .call(Request::Direct {
                src,
                dst: to_user.to_string(),
                message: message.to_string(),
            })
            .await?;
        let ack: Ack = reply.data.extract()?;
        Ok(Outcome::from_ack(&ack))
    }
}
