//! Typed envelopes for the realtime channel.
//!
//! Every frame is a JSON object of the form `{"type": string, "data": object}`.
//! Unrecognized types must parse successfully, payload or not, so they can be
//! logged and dropped without closing the connection; deserialization is
//! therefore a two-step envelope-then-payload decode rather than a serde
//! tagged enum.

use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::Value;

use crate::dto::api::{PairingResponse, VoteEvent};

/// Messages accepted from the backend over the realtime channel.
#[derive(Debug)]
pub enum ServerMessage {
    /// A vote was registered for this server.
    VoteReceived(VoteEvent),
    /// The operator completed the pairing flow on the backend dashboard.
    PairingConfirmed(PairingResponse),
    /// Keepalive probe; must be answered with a pong.
    Ping,
    /// Backend-reported channel error.
    Error(ChannelErrorData),
    /// Any message type this bridge version does not understand.
    Unknown,
}

/// Raw `{type, data}` frame before the payload is interpreted.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl<'de> Deserialize<'de> for ServerMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let envelope = Envelope::deserialize(deserializer)?;
        let message = match envelope.kind.as_str() {
            "vote.received" => Self::VoteReceived(
                serde_json::from_value(envelope.data).map_err(de::Error::custom)?,
            ),
            "pairing.confirmed" => Self::PairingConfirmed(
                serde_json::from_value(envelope.data).map_err(de::Error::custom)?,
            ),
            "ping" => Self::Ping,
            // An error frame with no usable payload still counts as an error.
            "error" => Self::Error(
                serde_json::from_value(envelope.data)
                    .unwrap_or(ChannelErrorData { message: None }),
            ),
            _ => Self::Unknown,
        };
        Ok(message)
    }
}

/// Payload of an `error` message.
#[derive(Debug, Deserialize)]
pub struct ChannelErrorData {
    /// Human-readable error description.
    #[serde(default)]
    pub message: Option<String>,
}

/// Messages the bridge sends to the backend over the realtime channel.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    /// Keepalive reply to a `ping`.
    #[serde(rename = "pong")]
    Pong,
}
