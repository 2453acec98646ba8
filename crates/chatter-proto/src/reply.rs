//! Typed reply payloads.
//!
//! Replies arrive as open maps; these types pull out the fields each service
//! is contracted to return. Unknown extra fields are ignored by serde, which
//! keeps the wire forward-compatible.

use serde::{Deserialize, Deserializer};

/// Normalized reply status.
///
/// The broker uses mixed sentinel strings across services (`"sucesso"` for
/// login/channel, `"OK"` for publish/message, `"erro"` on rejection). They
/// collapse into one enumeration at the deserialization boundary; anything
/// not recognized as a success sentinel is a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The broker accepted the request.
    Success,
    /// The broker rejected the request. The reply's detail field says why.
    Failure,
}

impl Status {
    /// True for accepted requests.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    fn from_sentinel(sentinel: &str) -> Self {
        match sentinel {
            "sucesso" | "OK" | "ok" | "success" => Self::Success,
            _ => Self::Failure,
        }
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let sentinel = String::deserialize(deserializer)?;
        Ok(Self::from_sentinel(&sentinel))
    }
}

/// Status-bearing reply to a mutating operation.
///
/// Rejection detail lives in `description` for login/channel and in `message`
/// for publish/direct; [`Ack::reason`] reads whichever is present.
#[derive(Debug, Clone, Deserialize)]
pub struct Ack {
    /// Normalized broker verdict.
    pub status: Status,
    /// Rejection detail (login/channel services).
    #[serde(default)]
    pub description: Option<String>,
    /// Rejection detail (publish/message services).
    #[serde(default)]
    pub message: Option<String>,
}

impl Ack {
    /// Human-readable rejection detail, wherever the broker put it.
    pub fn reason(&self) -> Option<&str> {
        self.description.as_deref().or(self.message.as_deref())
    }
}

/// Reply to the `users` service.
#[derive(Debug, Clone, Deserialize)]
pub struct UserList {
    /// Registered usernames.
    #[serde(default)]
    pub users: Vec<String>,
}

/// Reply to the `channels` service.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelList {
    /// Existing channel names.
    #[serde(default)]
    pub channels: Vec<String>,
}
