//! Battle wire messages
//!
//! Every frame on the channel is a JSON object tagged with a frame type:
//!
//! ```text
//! { "type": "battle_data", "data": { "type": <kind>, "data": {...}, "timestamp": <ms> } }
//! { "type": "battle_ack",  "data": { "type": <ack kind>, "timestamp": <ms> } }
//! ```
//!
//! Decoding is deliberately forgiving about content and strict about shape:
//! anything that is not a well-formed envelope becomes a [`FrameError`] that
//! the sessions log and drop.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod kinds;
mod payloads;


pub use payloads::{
    BattleEnded, CardCollectionUpdate, CreatureDamageApplied, CreatureStateSync, CreatureTarget,
    DamageApplied, DamageAppliedWithShields, GuestDesyncSignal, GuestReconnectionReady,
    HeroCreatures, HeroTarget, PauseNotice, PositionSwap, RequestCreatureSync, ResyncBattleState,
    SideCreatures, StatusEffectChange, TurnStarted,
};

use super::timing::wall_clock_ms;

/// Frame tag for host battle updates
pub const FRAME_BATTLE_DATA: &str = "battle_data";
/// Frame tag for guest acknowledgments
pub const FRAME_BATTLE_ACK: &str = "battle_ack";

/// A typed battle update: `{ type, data, timestamp }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleMessage {
    /// Stable tag from the message catalog
    #[serde(rename = "type")]
    pub kind: String,
    /// Kind-specific payload (always an object on the wire)
    #[serde(default)]
    pub data: Value,
    /// Sender wall clock, milliseconds since the UNIX epoch
    #[serde(default)]
    pub timestamp: i64,
}

impl BattleMessage {
    /// Build a message stamped with the current wall clock.
    pub fn new<T: Serialize>(kind: &str, payload: &T) -> Result<Self, FrameError> {
        let data = serde_json::to_value(payload).map_err(FrameError::Encode)?;
        Ok(Self {
            kind: kind.to_string(),
            data,
            timestamp: wall_clock_ms(),
        })
    }

    /// Validate an untrusted JSON value as a battle message.
    pub fn from_value(value: &Value) -> Result<Self, FrameError> {
        let object = value.as_object().ok_or(FrameError::NotAnObject)?;
        let kind = match object.get("type") {
            Some(Value::String(kind)) if !kind.is_empty() => kind.clone(),
            Some(_) => return Err(FrameError::InvalidField("type")),
            None => return Err(FrameError::MissingField("type")),
        };
        let data = match object.get("data") {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(data @ Value::Object(_)) => data.clone(),
            Some(_) => return Err(FrameError::InvalidField("data")),
        };
        let timestamp = object.get("timestamp").and_then(Value::as_i64).unwrap_or(0);

        Ok(Self {
            kind,
            data,
            timestamp,
        })
    }

    /// Decode the payload into its typed form.
    pub fn payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

/// Acknowledgment sent from guest to host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckData {
    /// The ack type being confirmed
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub timestamp: i64,
}

impl AckData {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            timestamp: wall_clock_ms(),
        }
    }
}

/// Top-level frame carried by the message channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WireFrame {
    /// Battle update (host -> guest, or guest -> host signals)
    BattleData(BattleMessage),
    /// Acknowledgment (guest -> host)
    BattleAck(AckData),
}

impl WireFrame {
    /// Wrap a typed payload in a `battle_data` frame.
    pub fn data<T: Serialize>(kind: &str, payload: &T) -> Result<Self, FrameError> {
        Ok(Self::BattleData(BattleMessage::new(kind, payload)?))
    }

    pub fn ack(kind: &str) -> Self {
        Self::BattleAck(AckData::new(kind))
    }

    /// Short label for logging.
    pub fn kind(&self) -> &str {
        match self {
            Self::BattleData(message) => &message.kind,
            Self::BattleAck(ack) => &ack.kind,
        }
    }

    pub fn encode(&self) -> Result<String, FrameError> {
        serde_json::to_string(self).map_err(FrameError::Encode)
    }

    /// Decode a frame from its JSON text.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text).map_err(FrameError::Json)?;
        Self::from_value(&value)
    }

    /// Validate an untrusted JSON value as a frame.
    pub fn from_value(value: &Value) -> Result<Self, FrameError> {
        let object = value.as_object().ok_or(FrameError::NotAnObject)?;
        let frame_type = object
            .get("type")
            .and_then(Value::as_str)
            .ok_or(FrameError::MissingField("type"))?;
        let data = object.get("data").ok_or(FrameError::MissingField("data"))?;

        match frame_type {
            FRAME_BATTLE_DATA => Ok(Self::BattleData(BattleMessage::from_value(data)?)),
            FRAME_BATTLE_ACK => {
                let ack = AckData::deserialize(data).map_err(FrameError::Json)?;
                Ok(Self::BattleAck(ack))
            }
            other => Err(FrameError::UnknownFrame(other.to_string())),
        }
    }
}

/// Errors that can occur when encoding or decoding frames
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Frame is not a JSON object")]
    NotAnObject,

    #[error("Frame is missing field '{0}'")]
    MissingField(&'static str),

    #[error("Frame field '{0}' has the wrong type")]
    InvalidField(&'static str),

    #[error("Unknown frame type '{0}'")]
    UnknownFrame(String),

    #[error("Invalid JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("Failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}
