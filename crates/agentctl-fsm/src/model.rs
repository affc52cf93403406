//! OpenAI-compatible streaming chat-completions client (§6 "Model wire
//! contract"). Tool-call argument fragments are concatenated across chunks
//! by index and handed to the lenient-JSON repair path only at dispatch
//! time, never here.

use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;

use agentctl_core::types::{ModelMessage, ToolCallRecord, Usage, WindowMessage};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("model endpoint returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("malformed stream event: {0}")]
    MalformedStream(String),
}

pub struct ModelClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
}

impl ModelClient {
    pub fn new(http: reqwest::Client, endpoint: String, model: String) -> Self {
        Self { http, endpoint, model }
    }

    /// Open a streaming chat-completion call. Returns a stream of parsed
    /// events; the caller drains it into `stream_chunk`/`stream_end` events.
    pub async fn stream_chat(
        &self,
        window: &[WindowMessage],
        tool_schemas: &[Value],
    ) -> Result<impl Stream<Item = Result<StreamEvent, ModelError>>, ModelError> {
        let url = format!("{}/chat/completions", self.endpoint.trim_end_matches('/'));
        let body = build_request_body(&self.model, window, tool_schemas);

        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Http { status: status.as_u16(), body });
        }

        let byte_stream = response.bytes_stream();
        Ok(sse_events(byte_stream))
    }
}

fn build_request_body(model: &str, window: &[WindowMessage], tool_schemas: &[Value]) -> Value {
    let messages: Vec<Value> = window.iter().map(window_message_to_wire).collect();
    let mut body = serde_json::json!({
        "model": model,
        "messages": messages,
        "stream": true,
        "stream_options": { "include_usage": true },
    });
    if !tool_schemas.is_empty() {
        body["tools"] = Value::Array(tool_schemas.to_vec());
    }
    body
}

fn window_message_to_wire(msg: &WindowMessage) -> Value {
    use agentctl_core::types::Source;
    match &msg.role {
        Source::ToolResult => serde_json::json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id,
            "content": msg.content,
        }),
        Source::Assistant => {
            let mut v = serde_json::json!({ "role": "assistant", "content": msg.content });
            if let Some(calls) = &msg.tool_calls {
                v["tool_calls"] = Value::Array(
                    calls
                        .iter()
                        .map(|c| {
                            serde_json::json!({
                                "id": c.id,
                                "type": "function",
                                "function": { "name": c.name, "arguments": c.arguments },
                            })
                        })
                        .collect(),
                );
            }
            v
        }
        Source::System | Source::External(_) => {
            serde_json::json!({ "role": "system", "content": msg.content })
        }
        Source::User => serde_json::json!({ "role": "user", "content": msg.content }),
        Source::Reasoning | Source::ToolCall => {
            serde_json::json!({ "role": "assistant", "content": msg.content })
        }
    }
}

/// One parsed increment of the streaming response.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Chunk { content: Option<String>, reasoning: Option<String> },
    ToolCallDelta { index: usize, id: Option<String>, name: Option<String>, arguments: Option<String> },
    Usage(Usage),
    Done,
}

#[derive(Deserialize)]
struct WireChunk {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    #[serde(default)]
    delta: WireDelta,
}

#[derive(Deserialize, Default)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCallDelta>,
}

#[derive(Deserialize)]
struct WireToolCallDelta {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireFunctionDelta>,
}

#[derive(Deserialize, Default)]
struct WireFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

/// Parse a raw SSE byte stream into [`StreamEvent`]s, splitting on `\n\n`
/// frame boundaries and stripping the `data: ` prefix per line.
fn sse_events<S, E>(byte_stream: S) -> impl Stream<Item = Result<StreamEvent, ModelError>>
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display,
{
    async_stream::stream! {
        let mut buf = String::new();
        let mut byte_stream = Box::pin(byte_stream);
        while let Some(chunk) = byte_stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    yield Err(ModelError::MalformedStream(e.to_string()));
                    return;
                }
            };
            buf.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = buf.find("\n\n") {
                let frame = buf[..pos].to_string();
                buf.drain(..pos + 2);
                for line in frame.lines() {
                    let line = line.trim();
                    let Some(payload) = line.strip_prefix("data:") else { continue };
                    let payload = payload.trim();
                    if payload == "[DONE]" {
                        yield Ok(StreamEvent::Done);
                        return;
                    }
                    match parse_wire_chunk(payload) {
                        Ok(events) => for ev in events { yield Ok(ev); },
                        Err(e) => yield Err(e),
                    }
                }
            }
        }
    }
}

fn parse_wire_chunk(payload: &str) -> Result<Vec<StreamEvent>, ModelError> {
    let wire: WireChunk = serde_json::from_str(payload)
        .map_err(|e| ModelError::MalformedStream(format!("{e}: {payload}")))?;
    let mut events = Vec::new();

    if let Some(choice) = wire.choices.into_iter().next() {
        if choice.delta.content.is_some() || choice.delta.reasoning.is_some() {
            events.push(StreamEvent::Chunk {
                content: choice.delta.content,
                reasoning: choice.delta.reasoning,
            });
        }
        for tc in choice.delta.tool_calls {
            events.push(StreamEvent::ToolCallDelta {
                index: tc.index,
                id: tc.id,
                name: tc.function.as_ref().and_then(|f| f.name.clone()),
                arguments: tc.function.and_then(|f| f.arguments),
            });
        }
    }

    if let Some(usage) = wire.usage {
        events.push(StreamEvent::Usage(Usage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }));
    }

    Ok(events)
}

/// Accumulates `ToolCallDelta` fragments (keyed by stream index) into
/// finished [`ToolCallRecord`]s once the stream ends.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    by_index: std::collections::BTreeMap<usize, ToolCallBuilder>,
}

#[derive(Debug, Default)]
struct ToolCallBuilder {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, index: usize, id: Option<String>, name: Option<String>, arguments: Option<String>) {
        let entry = self.by_index.entry(index).or_default();
        if let Some(id) = id {
            entry.id = id;
        }
        if let Some(name) = name {
            entry.name = name;
        }
        if let Some(arguments) = arguments {
            entry.arguments.push_str(&arguments);
        }
    }

    pub fn finish(self) -> Vec<ToolCallRecord> {
        self.by_index
            .into_values()
            .map(|b| ToolCallRecord { id: b.id, name: b.name, arguments: b.arguments })
            .collect()
    }
}

/// Build the final [`ModelMessage`] from accumulated content/reasoning and
/// tool calls once `stream_end` fires.
pub fn finish_message(content: String, reasoning: String, tool_calls: Vec<ToolCallRecord>) -> ModelMessage {
    ModelMessage { content, reasoning, tool_calls }
}
