//! Control frames the Gateway decodes off its transport and hands to the
//! coordinator (§6 "Control/data events consumed from the Gateway").

use serde::{Deserialize, Serialize};

use agentctl_core::types::{Delay, Mode};

/// One incoming control frame. Wire shape: `{"type": "...", ...fields}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    UserMessage { content: String },
    SetMode { mode: Mode },
    SetDelay { delay: DelayWire },
    Step,
}

/// `delay` on the wire is either the string `"infinite"` or a positive
/// integer second count (§6); this mirrors [`Delay::from_json`] /
/// [`Delay::to_json`] without requiring a custom (de)serializer on `Delay`
/// itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayWire {
    Seconds(u64),
    Infinite,
}

impl Serialize for DelayWire {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            DelayWire::Seconds(s) => serializer.serialize_u64(*s),
            DelayWire::Infinite => serializer.serialize_str("infinite"),
        }
    }
}

impl<'de> Deserialize<'de> for DelayWire {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(s) if s == "infinite" => Ok(DelayWire::Infinite),
            serde_json::Value::Number(n) => n
                .as_u64()
                .map(DelayWire::Seconds)
                .ok_or_else(|| serde::de::Error::custom("delay must be a non-negative integer")),
            other => Err(serde::de::Error::custom(format!("invalid delay value: {other}"))),
        }
    }
}

impl DelayWire {
    pub fn to_delay(self) -> Option<Delay> {
        match self {
            DelayWire::Seconds(s) if s > 0 => Some(Delay::Seconds(s)),
            DelayWire::Seconds(_) => None,
            DelayWire::Infinite => Some(Delay::Infinite),
        }
    }

    pub fn from_delay(delay: Delay) -> Self {
        match delay {
            Delay::Seconds(s) => DelayWire::Seconds(s),
            Delay::Infinite => DelayWire::Infinite,
        }
    }
}
