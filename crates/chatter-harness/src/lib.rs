//! In-memory test doubles for the chatter broker and proxy.
//!
//! The doubles reproduce the external collaborators' observable contract so
//! end-to-end session behavior can be tested without sockets:
//!
//! - [`ChatBroker`]: request/reply service handling with the broker's own
//!   Lamport clock (merge on receive, increment before reply) and its mixed
//!   legacy status sentinels (`"sucesso"`, `"OK"`, `"erro"`), so client-side
//!   status normalization is exercised against the real wire vocabulary.
//! - A proxy stand-in: a broadcast channel of `(topic, bytes)` pairs that
//!   each [`InMemoryFanout`] filters by its subscribed topics, exactly like a
//!   SUB socket. Messages published on topics nobody watches are dropped.
//!
//! Transports are wired over tokio channels; one broker serves any number of
//! concurrent client sessions.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashSet;

use async_trait::async_trait;
use bytes::Bytes;
use chatter_client::{CommandTransport, FanoutTransport, TransportError};
use chatter_proto::{Envelope, Fields, Value};
use tokio::sync::{broadcast, mpsc, oneshot};

/// Capacity of the proxy's broadcast buffer. Slow consumers lag and drop,
/// which is the real proxy's behavior too.
const PROXY_BUFFER: usize = 256;

type RequestSlot = (Vec<u8>, oneshot::Sender<Vec<u8>>);

/// Handle to a running broker double.
///
/// Clones of the transports it hands out all talk to the same broker state,
/// so multi-client scenarios work the way they do against the real stack.
#[derive(Clone)]
pub struct BrokerHandle {
    requests: mpsc::UnboundedSender<RequestSlot>,
    fanout: broadcast::Sender<(String, Bytes)>,
}

impl BrokerHandle {
    /// A fresh command transport connected to this broker.
    pub fn command_transport(&self) -> InMemoryCommand {
        InMemoryCommand { requests: self.requests.clone(), pending: None }
    }

    /// A fresh fan-out transport connected to the proxy stand-in.
    ///
    /// Deliveries published after this call are visible, subject to topic
    /// filtering; earlier ones are not, as with a late-joining subscriber.
    pub fn fanout_transport(&self) -> InMemoryFanout {
        InMemoryFanout { stream: self.fanout.subscribe(), topics: HashSet::new() }
    }
}

/// Spawn a broker double on the current runtime.
pub fn spawn_broker() -> BrokerHandle {
    let (requests_tx, requests_rx) = mpsc::unbounded_channel();
    let (fanout_tx, _) = broadcast::channel(PROXY_BUFFER);

    let broker = ChatBroker::new(fanout_tx.clone());
    tokio::spawn(broker.run(requests_rx));

    BrokerHandle { requests: requests_tx, fanout: fanout_tx }
}

/// REQ-style command transport over an in-memory channel.
///
/// Enforces strict send/recv alternation like the real socket: a second send
/// before the reply, or a recv with nothing outstanding, is a transport
/// failure.
pub struct InMemoryCommand {
    requests: mpsc::UnboundedSender<RequestSlot>,
    pending: Option<oneshot::Receiver<Vec<u8>>>,
}

#[async_trait]
impl CommandTransport for InMemoryCommand {
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if self.pending.is_some() {
            return Err(TransportError::Failed { reason: "send out of turn".into() });
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send((frame.to_vec(), reply_tx))
            .map_err(|_| TransportError::Closed)?;
        self.pending = Some(reply_rx);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        let reply = self
            .pending
            .take()
            .ok_or_else(|| TransportError::Failed { reason: "recv with no request".into() })?;

        reply.await.map(Bytes::from).map_err(|_| TransportError::Closed)
    }
}

/// SUB-style fan-out transport: receives everything the proxy publishes and
/// keeps only the topics it subscribed to.
pub struct InMemoryFanout {
    stream: broadcast::Receiver<(String, Bytes)>,
    topics: HashSet<String>,
}

#[async_trait]
impl FanoutTransport for InMemoryFanout {
    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.topics.insert(topic.to_string());
        Ok(())
    }

    async fn next(&mut self) -> Result<(String, Bytes), TransportError> {
        loop {
            match self.stream.recv().await {
                Ok((topic, bytes)) if self.topics.contains(&topic) => {
                    return Ok((topic, bytes));
                },
                // Not subscribed: the proxy filters it out.
                Ok(_) => {},
                // Fell behind the buffer: the transport drops, we move on.
                Err(broadcast::error::RecvError::Lagged(_)) => {},
                Err(broadcast::error::RecvError::Closed) => return Err(TransportError::Closed),
            }
        }
    }
}

/// Broker service state, mirroring the real broker's registry semantics.
pub struct ChatBroker {
    users: HashSet<String>,
    channels: Vec<String>,
    clock: u64,
    fanout: broadcast::Sender<(String, Bytes)>,
}

impl ChatBroker {
    fn new(fanout: broadcast::Sender<(String, Bytes)>) -> Self {
        Self { users: HashSet::new(), channels: Vec::new(), clock: 0, fanout }
    }

    /// Serve requests until every command transport is gone.
    async fn run(mut self, mut requests: mpsc::UnboundedReceiver<RequestSlot>) {
        while let Some((frame, reply_to)) = requests.recv().await {
            let reply = self.handle_frame(&frame);
            let _ = reply_to.send(reply);
        }
        tracing::debug!("broker double stopped");
    }

    fn handle_frame(&mut self, frame: &[u8]) -> Vec<u8> {
        let envelope = match Envelope::decode(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "broker received malformed request");
                return self.reply("error", Self::rejection("erro", "malformed request"));
            },
        };

        self.clock = self.clock.max(envelope.clock()) + 1;
        tracing::debug!(service = envelope.service.as_str(), clock = self.clock, "broker request");

        let service = envelope.service.clone();
        let fields = match service.as_str() {
            "login" => self.handle_login(&envelope.data),
            "users" => self.handle_users(),
            "channel" => self.handle_channel(&envelope.data),
            "channels" => self.handle_channels(),
            "publish" => self.handle_publish(&envelope.data),
            "message" => self.handle_message(&envelope.data),
            _ => Self::rejection("erro", "unknown service"),
        };

        self.reply(&service, fields)
    }

    fn handle_login(&mut self, data: &Fields) -> Fields {
        let Some(user) = text(data, "user").filter(|u| !u.is_empty()) else {
            return Self::rejection("erro", "username required");
        };

        self.users.insert(user);
        Self::status("sucesso")
    }

    fn handle_users(&self) -> Fields {
        let mut fields = Fields::new();
        let users = self.users.iter().map(|u| Value::from(u.as_str())).collect::<Vec<_>>();
        fields.insert("users", Value::Array(users));
        fields
    }

    fn handle_channel(&mut self, data: &Fields) -> Fields {
        let Some(channel) = text(data, "channel").filter(|c| !c.is_empty()) else {
            return Self::rejection("erro", "channel name required");
        };
        if self.channels.contains(&channel) {
            return Self::rejection("erro", "channel already exists");
        }

        self.channels.push(channel);
        Self::status("sucesso")
    }

    fn handle_channels(&self) -> Fields {
        let mut fields = Fields::new();
        let channels = self.channels.iter().map(|c| Value::from(c.as_str())).collect::<Vec<_>>();
        fields.insert("channels", Value::Array(channels));
        fields
    }

    fn handle_publish(&mut self, data: &Fields) -> Fields {
        let channel = text(data, "channel").unwrap_or_default();
        if !self.channels.contains(&channel) {
            let mut fields = Self::status("erro");
            fields.insert("message", "unknown channel");
            return fields;
        }

        self.clock += 1;
        let mut payload = Fields::new();
        payload.insert("user", text(data, "user").unwrap_or_default());
        payload.insert("message", text(data, "message").unwrap_or_default());
        payload.insert("clock", self.clock);
        self.publish(&channel, &payload);

        Self::status("OK")
    }

    fn handle_message(&mut self, data: &Fields) -> Fields {
        let dst = text(data, "dst").unwrap_or_default();
        if !self.users.contains(&dst) {
            let mut fields = Self::status("erro");
            fields.insert("message", "unknown user");
            return fields;
        }

        self.clock += 1;
        let mut payload = Fields::new();
        payload.insert("src", text(data, "src").unwrap_or_default());
        payload.insert("message", text(data, "message").unwrap_or_default());
        payload.insert("clock", self.clock);
        self.publish(&dst, &payload);

        Self::status("OK")
    }

    /// Re-publish a payload on a fan-out topic, the proxy's job in the real
    /// deployment. A send error only means nobody is subscribed.
    fn publish(&self, topic: &str, payload: &Fields) {
        match payload.encode() {
            Ok(bytes) => {
                let _ = self.fanout.send((topic.to_string(), Bytes::from(bytes)));
            },
            Err(e) => tracing::warn!(error = %e, "fan-out payload encoding failed"),
        }
    }

    fn reply(&mut self, service: &str, fields: Fields) -> Vec<u8> {
        self.clock += 1;
        match Envelope::request(service, fields, self.clock).encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                // Unreachable with these payloads; surface something decodable.
                tracing::warn!(error = %e, "broker reply encoding failed");
                Vec::new()
            },
        }
    }

    fn status(sentinel: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert("status", sentinel);
        fields
    }

    fn rejection(sentinel: &str, description: &str) -> Fields {
        let mut fields = Self::status(sentinel);
        fields.insert("description", description);
        fields
    }
}

fn text(fields: &Fields, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_string)
}
