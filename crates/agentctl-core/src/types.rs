use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Monotonic identifier assigned by the store on insertion.
pub type MessageId = i64;

/// Where a [`Message`] originated from.
///
/// `External(name)` carries the injector's name, e.g. `external:cron`.
/// Serializes/deserializes as the flat strings the spec names
/// (`"user"`, `"tool_call"`, `"external:cron"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    User,
    Assistant,
    System,
    Reasoning,
    ToolCall,
    ToolResult,
    External(String),
}

impl Source {
    pub fn external(name: impl Into<String>) -> Self {
        Self::External(name.into())
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Source::External(_))
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::User => write!(f, "user"),
            Source::Assistant => write!(f, "assistant"),
            Source::System => write!(f, "system"),
            Source::Reasoning => write!(f, "reasoning"),
            Source::ToolCall => write!(f, "tool_call"),
            Source::ToolResult => write!(f, "tool_result"),
            Source::External(name) => write!(f, "external:{name}"),
        }
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "user" => Source::User,
            "assistant" => Source::Assistant,
            "system" => Source::System,
            "reasoning" => Source::Reasoning,
            "tool_call" => Source::ToolCall,
            "tool_result" => Source::ToolResult,
            other => match other.strip_prefix("external:") {
                Some(name) if !name.is_empty() => Source::External(name.to_string()),
                _ => return Err(format!("unrecognised message source: {other}")),
            },
        })
    }
}

impl Serialize for Source {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Source {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One entry in the durable conversation log.
///
/// Append-only: never mutated after insertion. Ordering is by `id` ascending,
/// which coincides with `timestamp` ordering on a single process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub source: Source,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// A curated highlight surfaced by the agent, distinct from the raw log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notable {
    pub id: i64,
    pub label: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
}

/// Status of a [`BackgroundTask`]. Transitions are strictly
/// `Running -> Completed` or `Running -> Failed`; terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

/// A tool invocation whose result is delivered asynchronously through the
/// task registry instead of inline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundTask {
    pub id: String,
    pub tool_name: String,
    pub input: Value,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// A durable marker partitioning the working window's lifetime. New sessions
/// begin on hard compaction and carry a handoff summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub started_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handoff_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Session {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Reserved KV-state key controlling whether the agent waits for an operator
/// `step` or runs on a timer/immediately between turns.
pub const STATE_KEY_MODE: &str = "mode";
/// Reserved KV-state key controlling post-turn delay.
pub const STATE_KEY_DELAY: &str = "delay";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Conversational,
    Autonomous,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Conversational
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Conversational => write!(f, "conversational"),
            Mode::Autonomous => write!(f, "autonomous"),
        }
    }
}

/// Post-turn delay before the next autonomous tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delay {
    Seconds(u64),
    Infinite,
}

impl Default for Delay {
    fn default() -> Self {
        Delay::Seconds(5)
    }
}

impl Delay {
    pub fn from_json(v: &Value) -> Option<Self> {
        match v {
            Value::String(s) if s == "infinite" => Some(Delay::Infinite),
            Value::Number(n) => n.as_u64().filter(|s| *s > 0).map(Delay::Seconds),
            _ => None,
        }
    }

    pub fn to_json(self) -> Value {
        match self {
            Delay::Seconds(s) => Value::from(s),
            Delay::Infinite => Value::from("infinite"),
        }
    }
}

/// Context-pressure classification against the configured context size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureLevel {
    Normal,
    Soft,
    Hard,
    Overflow,
}

impl fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PressureLevel::Normal => write!(f, "normal"),
            PressureLevel::Soft => write!(f, "soft"),
            PressureLevel::Hard => write!(f, "hard"),
            PressureLevel::Overflow => write!(f, "overflow"),
        }
    }
}

/// Classify a pressure ratio per the boundary table in the spec: the lower
/// bound of each band is inclusive.
pub fn classify_pressure(ratio: f64) -> PressureLevel {
    if ratio >= 1.10 {
        PressureLevel::Overflow
    } else if ratio >= 0.90 {
        PressureLevel::Hard
    } else if ratio >= 0.70 {
        PressureLevel::Soft
    } else {
        PressureLevel::Normal
    }
}

/// One element of the in-memory chat sequence sent to the Model on each turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowMessage {
    pub role: Source,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRecord>>,
}

impl WindowMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Source::System,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
            tool_calls: None,
        }
    }
}

/// A single tool call attached to an assistant [`WindowMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Final assembled Model response for one stream, as delivered by `stream_end`.
#[derive(Debug, Clone, Default)]
pub struct ModelMessage {
    pub content: String,
    pub reasoning: String,
    pub tool_calls: Vec<ToolCallRecord>,
}

/// Token-usage record returned by the Model on the final streaming chunk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}
