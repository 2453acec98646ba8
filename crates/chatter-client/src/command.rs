//! Synchronous command channel.
//!
//! One blocking call/response cycle at a time: tick the clock, stamp and
//! encode the envelope, transmit, await the single reply, merge its clock,
//! hand the decoded envelope back. The `Idle`/`AwaitingReply` state machine
//! makes the single-outstanding-call contract explicit instead of relying on
//! caller discipline.

use std::sync::Arc;

use chatter_proto::{Envelope, Request};

use crate::{clock::LamportClock, error::ClientError, transport::CommandTransport};

/// Command channel call state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallState {
    /// No call outstanding; the next call may proceed.
    Idle,
    /// A request has been issued and its reply has not been processed.
    AwaitingReply,
}

/// Request/reply primitive over a [`CommandTransport`].
///
/// Holds merge access to the session clock; the session owns the clock
/// itself.
pub struct CommandChannel<T: CommandTransport> {
    transport: T,
    clock: Arc<LamportClock>,
    state: CallState,
}

impl<T: CommandTransport> CommandChannel<T> {
    /// Create an idle channel over the given transport.
    pub fn new(transport: T, clock: Arc<LamportClock>) -> Self {
        Self { transport, clock, state: CallState::Idle }
    }

    /// True when no call is outstanding.
    pub fn is_idle(&self) -> bool {
        self.state == CallState::Idle
    }

    /// Issue one request and await its reply.
    ///
    /// Ticks the clock exactly once before the envelope is built and merges
    /// the reply clock exactly once after decode. A reply that decodes but
    /// carries a failure status is returned as ordinary data; interpreting
    /// status is the caller's job.
    ///
    /// # Errors
    ///
    /// - [`ClientError::CallInFlight`] if a prior call has not completed.
    /// - [`ClientError::Transport`] if the transport fails or closes.
    /// - [`ClientError::Codec`] if the reply does not decode; the clock is
    ///   left at its post-tick value, no merge is applied.
    pub async fn call(&mut self, request: Request) -> Result<Envelope, ClientError> {
        if self.state == CallState::AwaitingReply {
            return Err(ClientError::CallInFlight);
        }
        self.state = CallState::AwaitingReply;

        let service = request.service();
        let clock = self.clock.tick();
        let envelope = Envelope::request(service, request.into_fields(), clock);
        let frame = envelope.encode()?;

        tracing::debug!(service, clock, "issuing command");
        self.transport.send(&frame).await?;

        let reply_bytes = self.transport.recv().await?;
        // Reply consumed: the request/reply cycle is complete whether or not
        // the bytes decode.
        self.state = CallState::Idle;

        let reply = Envelope::decode(&reply_bytes)?;
        let merged = self.clock.merge(reply.clock());
        tracing::debug!(service = reply.service.as_str(), clock = merged, "reply merged");

        Ok(reply)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;
    use chatter_proto::{CodecError, Fields, Status};

    use crate::transport::TransportError;

    use super::*;

    /// Replies with a canned frame per request, in order.
    struct CannedTransport {
        replies: Vec<Vec<u8>>,
        sent: Vec<Vec<u8>>,
    }

    impl CannedTransport {
        fn new(mut replies: Vec<Vec<u8>>) -> Self {
            replies.reverse();
            Self { replies, sent: Vec::new() }
        }
    }

    #[async_trait]
    impl CommandTransport for CannedTransport {
        async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
            self.sent.push(frame.to_vec());
            Ok(())
        }

        async fn recv(&mut self) -> Result<Bytes, TransportError> {
            self.replies.pop().map(Bytes::from).ok_or(TransportError::Closed)
        }
    }

    /// Fails every send, leaving the call mid-flight.
    struct BrokenTransport;

    #[async_trait]
    impl CommandTransport for BrokenTransport {
        async fn send(&mut self, _frame: &[u8]) -> Result<(), TransportError> {
            Err(TransportError::Failed { reason: "wire cut".into() })
        }

        async fn recv(&mut self) -> Result<Bytes, TransportError> {
            Err(TransportError::Closed)
        }
    }

    fn reply(service: &str, status: &str, clock: u64) -> Vec<u8> {
        let mut fields = Fields::new();
        fields.insert("status", status);
        Envelope::request(service, fields, clock).encode().unwrap()
    }

    #[tokio::test]
    async fn call_ticks_then_merges_reply_clock() {
        let clock = Arc::new(LamportClock::new());
        let transport = CannedTransport::new(vec![reply("login", "sucesso", 7)]);
        let mut channel = CommandChannel::new(transport, Arc::clone(&clock));

        let envelope =
            channel.call(Request::Login { user: "alice".into() }).await.unwrap();

        // Tick took the clock to 1, merge(7) to max(1,7)+1 = 8.
        assert_eq!(clock.value(), 8);
        assert_eq!(envelope.service, "login");
        assert!(channel.is_idle());

        let ack: chatter_proto::Ack = envelope.data.extract().unwrap();
        assert_eq!(ack.status, Status::Success);
    }

    #[tokio::test]
    async fn sent_envelope_carries_post_tick_clock() {
        let clock = Arc::new(LamportClock::new());
        let transport = CannedTransport::new(vec![
            reply("users", "sucesso", 1),
            reply("users", "sucesso", 1),
        ]);
        let mut channel = CommandChannel::new(transport, Arc::clone(&clock));

        channel.call(Request::ListUsers).await.unwrap();
        channel.call(Request::ListUsers).await.unwrap();

        let sent: Vec<Envelope> = channel
            .transport
            .sent
            .iter()
            .map(|bytes| Envelope::decode(bytes).unwrap())
            .collect();

        // Each send strictly increases the envelope clock.
        assert_eq!(sent[0].clock(), 1);
        assert!(sent[1].clock() > sent[0].clock());
    }

    #[tokio::test]
    async fn malformed_reply_leaves_clock_unmerged() {
        let clock = Arc::new(LamportClock::new());
        let transport = CannedTransport::new(vec![b"\xc1garbage".to_vec()]);
        let mut channel = CommandChannel::new(transport, Arc::clone(&clock));

        let result = channel.call(Request::ListChannels).await;

        assert!(matches!(result, Err(ClientError::Codec(CodecError::Malformed { .. }))));
        // Only the tick happened; the merge was never applied.
        assert_eq!(clock.value(), 1);
        // The cycle completed, so the channel is usable again.
        assert!(channel.is_idle());
    }

    #[tokio::test]
    async fn failed_call_trips_in_flight_guard() {
        let clock = Arc::new(LamportClock::new());
        let mut channel = CommandChannel::new(BrokenTransport, clock);

        let first = channel.call(Request::ListUsers).await;
        assert!(matches!(first, Err(ClientError::Transport(_))));
        assert!(!channel.is_idle());

        let second = channel.call(Request::ListUsers).await;
        assert!(matches!(second, Err(ClientError::CallInFlight)));
    }

    #[tokio::test]
    async fn transport_closure_surfaces_as_error() {
        let clock = Arc::new(LamportClock::new());
        let transport = CannedTransport::new(vec![]);
        let mut channel = CommandChannel::new(transport, clock);

        let result = channel.call(Request::ListUsers).await;
        assert!(matches!(
            result,
            Err(ClientError::Transport(TransportError::Closed))
        ));
    }
}
