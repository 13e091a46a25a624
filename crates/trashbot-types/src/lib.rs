use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The single currently-commanded motion state of the robot.
///
/// Stored by the motion scheduler as a `u8` so it can live in an atomic
/// register; the wire form is the upper-case variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum Direction {
    #[default]
    Stop = 0,
    Forward = 1,
    Backward = 2,
    Left = 3,
    Right = 4,
}

impl Direction {
    /// Every direction in wire order.
    pub const ALL: [Direction; 5] = [
        Direction::Left,
        Direction::Right,
        Direction::Forward,
        Direction::Backward,
        Direction::Stop,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Stop => "STOP",
            Direction::Forward => "FORWARD",
            Direction::Backward => "BACKWARD",
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
        }
    }

    /// Decode the atomic register value. Unknown codes decode to
    /// [`Direction::Stop`].
    pub fn from_u8(code: u8) -> Self {
        match code {
            1 => Direction::Forward,
            2 => Direction::Backward,
            3 => Direction::Left,
            4 => Direction::Right,
            _ => Direction::Stop,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Direction::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or(BotError::UnknownDirection)
    }
}

/// Identifier of one trashcan lid, drawn from the configured lid set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LidId(pub u32);

impl LidId {
    /// Read a lid id from the wire `lid` field.
    ///
    /// Only non-negative JSON integers that fit in `u32` yield an id; the
    /// caller still has to test membership in the configured set.
    pub fn from_json(value: &Value) -> Option<Self> {
        value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(LidId)
    }
}

impl fmt::Display for LidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Motion phase of a single lid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LidState {
    #[default]
    Idle,
    Opening,
    Closing,
}

/// Configuration of one physical lid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LidSpec {
    pub id: LidId,
    /// Human label, e.g. `"plastic"`.
    pub name: String,
    /// Servo channel on the actuator driver.
    pub servo_channel: u8,
}

impl LidSpec {
    pub fn new(id: u32, name: impl Into<String>, servo_channel: u8) -> Self {
        Self {
            id: LidId(id),
            name: name.into(),
            servo_channel,
        }
    }

    /// The plastic / paper / glass set the robot ships with.
    pub fn default_set() -> Vec<LidSpec> {
        vec![
            LidSpec::new(1, "plastic", 0),
            LidSpec::new(2, "paper", 1),
            LidSpec::new(3, "glass", 2),
        ]
    }
}

/// Signed per-channel drive magnitudes. Sign encodes rotation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DriveSignal {
    pub left: i32,
    pub right: i32,
}

impl DriveSignal {
    pub const STOP: DriveSignal = DriveSignal { left: 0, right: 0 };

    pub fn new(left: i32, right: i32) -> Self {
        Self { left, right }
    }

    /// Saturate both channels into `[-max, max]`.
    pub fn clamp(self, max: i32) -> Self {
        let max = max.abs();
        Self {
            left: self.left.clamp(-max, max),
            right: self.right.clamp(-max, max),
        }
    }
}

/// One inbound frame as handed over by the connection layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary,
}

/// A parsed, not yet validated control message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InboundMessage {
    pub event: String,
    pub direction: Option<String>,
    pub lid: Option<Value>,
}

impl InboundMessage {
    /// Parse a text payload.
    ///
    /// # Errors
    ///
    /// - [`BotError::InvalidFormat`] when `text` is not JSON.
    /// - [`BotError::MissingEvent`] when there is no `event` field (including
    ///   valid JSON that is not an object).
    /// - [`BotError::UnknownEvent`] when `event` is present but not a string.
    pub fn parse(text: &str) -> Result<Self, BotError> {
        let json: Value = serde_json::from_str(text).map_err(|_| BotError::InvalidFormat)?;
        let event = match json.get("event") {
            None | Some(Value::Null) => return Err(BotError::MissingEvent),
            Some(Value::String(event)) => event.clone(),
            Some(_) => return Err(BotError::UnknownEvent),
        };
        Ok(Self {
            event,
            direction: json
                .get("direction")
                .and_then(|d| d.as_str())
                .map(str::to_string),
            lid: json.get("lid").cloned(),
        })
    }
}

/// Wire event names.
pub mod events {
    pub const TEST_CONNECTION: &str = "TEST_CONNECTION";
    pub const TEST_CONNECTION_RESPONSE: &str = "TEST_CONNECTION_RESPONSE";
    pub const MOVE: &str = "MOVE";
    pub const OPEN_TRASHCAN: &str = "OPEN_TRASHCAN";
    pub const CLOSE_TRASHCAN: &str = "CLOSE_TRASHCAN";
}

pub const GREETING: &str = "WebSocket connection established.";
pub const CONNECTION_ACTIVE: &str = "Connection is active.";

/// Every outbound message shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Greeting {
        message: &'static str,
    },
    ConnectionActive {
        event: &'static str,
        message: &'static str,
    },
    Moved {
        status: &'static str,
        action: &'static str,
        direction: Direction,
    },
    Lid {
        status: &'static str,
        lid: LidId,
        action: &'static str,
    },
    Error {
        error: String,
    },
}

impl Reply {
    pub fn greeting() -> Self {
        Reply::Greeting { message: GREETING }
    }

    pub fn connection_active() -> Self {
        Reply::ConnectionActive {
            event: events::TEST_CONNECTION_RESPONSE,
            message: CONNECTION_ACTIVE,
        }
    }

    pub fn moved(direction: Direction) -> Self {
        Reply::Moved {
            status: "ok",
            action: events::MOVE,
            direction,
        }
    }

    pub fn lid(lid: LidId, action: &'static str) -> Self {
        Reply::Lid {
            status: "ok",
            lid,
            action,
        }
    }

    pub fn error(err: &BotError) -> Self {
        Reply::Error {
            error: err.to_string(),
        }
    }

    /// Serialise to the JSON text sent on the wire.
    pub fn to_json(&self) -> String {
        // Every variant is a flat map of strings and integers.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

/// Global error type spanning protocol rejections, hardware faults and
/// transport failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BotError {
    #[error("Invalid JSON format.")]
    InvalidFormat,

    #[error("Unsupported message type. Only text messages are accepted.")]
    UnsupportedMessageType,

    #[error("Missing event field.")]
    MissingEvent,

    #[error("Unknown event type.")]
    UnknownEvent,

    #[error("Unknown move direction.")]
    UnknownDirection,

    #[error("Invalid trashcan lid identifier.")]
    InvalidLidId,

    #[error("Trashcan lid {0} is busy.")]
    LidBusy(LidId),

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}

impl BotError {
    /// Whether this error is a per-request rejection reported back to the
    /// client (as opposed to an internal or startup failure).
    pub fn is_protocol(&self) -> bool {
        !matches!(
            self,
            BotError::HardwareFault { .. } | BotError::Transport(_) | BotError::Config(_)
        )
    }
}
