//! Message envelope and MessagePack codec.
//!
//! The envelope is the unit of exchange on both transports. On the command
//! channel it is a two-field map `{service, data}`; on the fan-out channel
//! only the data map travels (the topic is carried by the transport). The
//! codec stamps every outgoing data map with an RFC 3339 `timestamp` and the
//! sender's logical `clock` value.

use std::collections::BTreeMap;

use chrono::Utc;
use rmpv::Value;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Errors from envelope encoding and decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Bytes did not parse as a well-formed envelope.
    #[error("malformed envelope: {reason}")]
    Malformed {
        /// Description of the parse failure.
        reason: String,
    },

    /// Envelope could not be serialized.
    #[error("envelope encoding failed: {reason}")]
    Encode {
        /// Description of the serialization failure.
        reason: String,
    },
}

/// String-keyed payload fields of an envelope.
///
/// Wire-level escape hatch: fields not known to the typed layer are kept in
/// the map and survive a round trip untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fields(BTreeMap<String, Value>);

impl Fields {
    /// Create an empty field map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, replacing any previous value under the same key.
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Look up a field by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The embedded logical clock value.
    ///
    /// A missing or non-integer `clock` field reads as 0, so a merge against
    /// it degrades to a plain increment.
    pub fn clock(&self) -> u64 {
        self.get("clock").and_then(Value::as_u64).unwrap_or(0)
    }

    /// Serialize a bare field map, as published on the fan-out channel.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec_named(self).map_err(|e| CodecError::Encode { reason: e.to_string() })
    }

    /// Decode a bare field map, as delivered on the fan-out channel.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        rmp_serde::from_slice(bytes).map_err(|e| CodecError::Malformed { reason: e.to_string() })
    }

    /// Deserialize the map into a typed payload.
    ///
    /// Unknown fields are ignored; missing required fields fail as
    /// [`CodecError::Malformed`].
    pub fn extract<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        let pairs =
            self.0.iter().map(|(k, v)| (Value::from(k.as_str()), v.clone())).collect::<Vec<_>>();

        rmpv::ext::from_value(Value::Map(pairs))
            .map_err(|e| CodecError::Malformed { reason: e.to_string() })
    }
}

impl FromIterator<(String, Value)> for Fields {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The unit of exchange on the command channel.
///
/// Immutable once constructed; one envelope is built per operation and
/// discarded after transmission or consumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Service name the broker routes the request by.
    pub service: String,
    /// Operation fields plus `timestamp` and `clock`.
    pub data: Fields,
}

impl Envelope {
    /// Build an outgoing envelope, stamping `timestamp` and `clock` into the
    /// data map.
    ///
    /// The clock value must come from a `tick()` performed for this envelope;
    /// the codec does not touch the clock itself.
    pub fn request(service: &str, mut data: Fields, clock: u64) -> Self {
        data.insert("timestamp", Utc::now().to_rfc3339());
        data.insert("clock", clock);
        Self { service: service.to_string(), data }
    }

    /// The logical clock value embedded in the data map.
    pub fn clock(&self) -> u64 {
        self.data.clock()
    }

    /// Serialize to MessagePack bytes.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec_named(self).map_err(|e| CodecError::Encode { reason: e.to_string() })
    }

    /// Deserialize from MessagePack bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        rmp_serde::from_slice(bytes).map_err(|e| CodecError::Malformed { reason: e.to_string() })
    }
}
