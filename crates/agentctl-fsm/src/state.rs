use std::collections::VecDeque;

use agentctl_core::types::{Delay, Mode, ModelMessage, ToolCallRecord, Usage, WindowMessage};

/// One turn cycle's state tag (§4.5). No terminal state — the FSM runs as
/// long as the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsmState {
    Idle,
    Streaming { stream_id: String },
    ExecutingTools { calls: Vec<ToolCallRecord>, cursor: usize },
    WaitingDelay { ms: u64 },
    WaitingStep,
}

impl FsmState {
    pub fn tag(&self) -> &'static str {
        match self {
            FsmState::Idle => "idle",
            FsmState::Streaming { .. } => "streaming",
            FsmState::ExecutingTools { .. } => "executing_tools",
            FsmState::WaitingDelay { .. } => "waiting_delay",
            FsmState::WaitingStep => "waiting_step",
        }
    }
}

/// Inputs to the transition function (§4.5).
#[derive(Debug, Clone)]
pub enum Event {
    UserMessage(String),
    ExternalMessage { source: String, content: String },
    AutonomousTick,
    StreamStart { stream_id: String },
    StreamChunk { content: Option<String>, reasoning: Option<String> },
    StreamEnd { message: ModelMessage, usage: Option<Usage> },
    StreamError(String),
    ToolResult { tool_call_id: String, result: String },
    ModeChanged(Mode),
    DelayChanged(Delay),
    Step,
    DelayElapsed,
}

/// Outputs of the transition function (§4.5). The executor is the only
/// entity that performs I/O; it drives effects sequentially for one
/// transition before delivering the next event.
#[derive(Debug, Clone)]
pub enum Effect {
    StartStream,
    EmitToken { stream_id: String, text: String },
    EmitReasoning { stream_id: String, text: String },
    ExecuteTool { tool_call_id: String, name: String, arguments: String },
    SaveMessage {
        source: agentctl_core::types::Source,
        content: String,
        tool_name: Option<String>,
        tool_input: Option<String>,
    },
    BroadcastMessage(agentctl_core::types::Message),
    UpdateContextPressure { usage: Option<Usage> },
    ScheduleDelay { ms: u64 },
    WaitForStep,
    CheckContextPressure,
    LogError(String),
    BroadcastFsmState,
}

/// Exclusively owned by the single coordinator driving the FSM (§3).
#[derive(Clone)]
pub struct Context {
    pub window: Vec<WindowMessage>,
    pub mode: Mode,
    pub delay: Delay,
    pub queued_user_messages: VecDeque<String>,
    pub consecutive_errors: u32,
    pub turn_number: u64,
    pub current_content: String,
    pub current_reasoning: String,
    /// Text pushed onto the window on an `autonomous_tick` that finds no
    /// queued user message. Loaded once at startup from the operator's
    /// `autonomous_prompt_path` (or the built-in default) and carried in
    /// `Context` so `transition` stays pure.
    pub autonomous_prompt: String,
}

impl Context {
    pub fn new(system_prompt: String, autonomous_prompt: String) -> Self {
        Self {
            window: vec![WindowMessage::system(system_prompt)],
            mode: Mode::Conversational,
            delay: Delay::Seconds(5),
            queued_user_messages: VecDeque::new(),
            consecutive_errors: 0,
            turn_number: 0,
            current_content: String::new(),
            current_reasoning: String::new(),
            autonomous_prompt,
        }
    }

    pub fn reset_stream_accumulator(&mut self) {
        self.current_content.clear();
        self.current_reasoning.clear();
    }
}
