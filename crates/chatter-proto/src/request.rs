//! Client-issued operations.
//!
//! Each broker service is one variant with exactly the fields that service
//! defines, so payload shapes are checked at compile time instead of being
//! assembled from ad hoc maps.

use crate::envelope::Fields;

/// One command-channel operation, keyed by broker service name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Register this session's identity (`login` service).
    Login {
        /// Username to claim.
        user: String,
    },

    /// Fetch the registered usernames (`users` service).
    ListUsers,

    /// Create a broadcast channel (`channel` service). Does not subscribe.
    CreateChannel {
        /// Channel name to create.
        channel: String,
    },

    /// Fetch the existing channel names (`channels` service).
    ListChannels,

    /// Publish a message to a channel (`publish` service).
    Publish {
        /// Publishing user.
        user: String,
        /// Target channel.
        channel: String,
        /// Message text.
        message: String,
    },

    /// Send a private message to another user (`message` service).
    Direct {
        /// Sending user.
        src: String,
        /// Receiving user.
        dst: String,
        /// Message text.
        message: String,
    },
}

impl Request {
    /// The broker service name this request is routed to.
    pub fn service(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::ListUsers => "users",
            Self::CreateChannel { .. } => "channel",
            Self::ListChannels => "channels",
            Self::Publish { .. } => "publish",
            Self::Direct { .. } => "message",
        }
    }

    /// Lower the typed request into wire fields.
    pub fn into_fields(self) -> Fields {
        let mut fields = Fields::new();
        match self {
            Self::Login { user } => {
                fields.insert("user", user);
            },
            Self::ListUsers | Self::ListChannels => {},
            Self::CreateChannel { channel } => {
                fields.insert("channel", channel);
            },
            Self::Publish { user, channel, message } => {
                fields.insert("user", user);
                fields.insert("channel", channel);
                fields.insert("message", message);
            },
            Self::Direct { src, dst, message } => {
                fields.insert("src", src);
                fields.insert("dst", dst);
                fields.insert("message", message);
            },
        }
        fields
    }
}
