//! Client error types.

use chatter_proto::CodecError;
use thiserror::Error;

use crate::transport::TransportError;

/// Errors from session operations.
///
/// Application-level rejections are not errors: a decoded reply whose status
/// says the broker refused the request comes back as ordinary data
/// ([`crate::Outcome::Rejected`]), and the caller decides whether to retry.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Envelope could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The transport failed or closed mid-operation.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A second command call was issued before the prior reply was processed.
    ///
    /// The command channel is strictly request-then-reply; tripping this
    /// guard is a programming error, not a recoverable condition.
    #[error("command call already in flight")]
    CallInFlight,

    /// The operation needs an identity but no login has succeeded yet.
    #[error("not logged in")]
    NotLoggedIn,

    /// A login was attempted on a session that already has an identity.
    ///
    /// The username is write-once for the session's lifetime.
    #[error("already logged in as {username}")]
    AlreadyLoggedIn {
        /// The identity the session already holds.
        username: String,
    },
}

impl ClientError {
    /// Returns true if this error ends the session or the affected call.
    ///
    /// Transient errors can be retried by the caller with corrected input;
    /// fatal ones cannot.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Codec(_) | Self::Transport(_) | Self::CallInFlight => true,
            Self::NotLoggedIn | Self::AlreadyLoggedIn { .. } => false,
        }
    }
}
