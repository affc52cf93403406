//! Drives effects produced by [`crate::transition::transition`]: the only
//! place in the crate that performs I/O (§4.5, §5). One coordinator owns
//! the FSM state and context; transitions are never interleaved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{error, warn};

use agentctl_broadcast::{BroadcastEvent, BroadcastFabric};
use agentctl_context::ContextManager;
use agentctl_core::types::{Delay, Mode, Source, ToolCallRecord};
use agentctl_store::Store;
use agentctl_tools::{Dispatcher, ToolContext};

use crate::model::{finish_message, ModelClient, StreamEvent, ToolCallAccumulator};
use crate::state::{Context, Effect, Event, FsmState};
use crate::transition::transition;

/// Grace window during which the interrupt probe reports `true` after a
/// user message arrives, giving in-flight blocking tools (notably `sleep`)
/// a chance to notice before the next probe tick (§5).
const PENDING_INPUT_GRACE: Duration = Duration::from_millis(100);

/// Events the coordinator consumes from the outside world plus from its own
/// effect execution. Distinct from [`Event`]: this is the queue wire type,
/// [`Event`] is the FSM's pure input alphabet.
pub enum Inbound {
    UserMessage(String),
    ExternalMessage { source: String, content: String },
    ModeChanged(Mode),
    DelayChanged(Delay),
    Step,
}

pub struct Executor {
    store: Store,
    broadcast: BroadcastFabric,
    context_manager: ContextManager,
    dispatcher: Arc<Dispatcher>,
    model: ModelClient,
    workspace_root: std::path::PathBuf,
    search_api_key: Option<String>,
    pending_input: Arc<AtomicBool>,
}

impl Executor {
    pub fn new(
        store: Store,
        broadcast: BroadcastFabric,
        context_manager: ContextManager,
        dispatcher: Arc<Dispatcher>,
        model: ModelClient,
        workspace_root: std::path::PathBuf,
        search_api_key: Option<String>,
    ) -> Self {
        Self {
            store,
            broadcast,
            context_manager,
            dispatcher,
            model,
            workspace_root,
            search_api_key,
            pending_input: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run the coordinator loop until `inbound` closes. `system_prompt` seeds
    /// a fresh [`Context`]'s window; `autonomous_prompt` is pushed on every
    /// `autonomous_tick` that finds no queued user message. Callers that are
    /// resuming from a handoff should instead have already restored state.
    pub async fn run(
        &self,
        system_prompt: String,
        autonomous_prompt: String,
        mut inbound: mpsc::Receiver<Inbound>,
    ) {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();
        let mut state = FsmState::Idle;
        let mut ctx = Context::new(system_prompt.clone(), autonomous_prompt);

        loop {
            tokio::select! {
                maybe_in = inbound.recv() => {
                    match maybe_in {
                        Some(msg) => self.handle_inbound(msg, &event_tx),
                        None => return,
                    }
                }
                maybe_ev = event_rx.recv() => {
                    let Some(event) = maybe_ev else { return };
                    let (next_state, next_ctx, effects) = transition(state, ctx, event);
                    state = next_state;
                    ctx = next_ctx;
                    self.drive_effects(&state, &mut ctx, effects, &event_tx, &system_prompt).await;
                }
            }
        }
    }

    fn handle_inbound(&self, msg: Inbound, event_tx: &mpsc::UnboundedSender<Event>) {
        match msg {
            Inbound::UserMessage(content) => {
                self.pending_input.store(true, Ordering::SeqCst);
                let pending = Arc::clone(&self.pending_input);
                tokio::spawn(async move {
                    tokio::time::sleep(PENDING_INPUT_GRACE).await;
                    pending.store(false, Ordering::SeqCst);
                });
                let _ = event_tx.send(Event::UserMessage(content));
            }
            Inbound::ExternalMessage { source, content } => {
                let _ = event_tx.send(Event::ExternalMessage { source, content });
            }
            Inbound::ModeChanged(mode) => {
                let _ = event_tx.send(Event::ModeChanged(mode));
            }
            Inbound::DelayChanged(delay) => {
                let _ = event_tx.send(Event::DelayChanged(delay));
            }
            Inbound::Step => {
                let _ = event_tx.send(Event::Step);
            }
        }
    }

    async fn drive_effects(
        &self,
        state: &FsmState,
        ctx: &mut Context,
        effects: Vec<Effect>,
        event_tx: &mpsc::UnboundedSender<Event>,
        system_prompt: &str,
    ) {
        for effect in effects {
            match effect {
                Effect::StartStream => self.start_stream(state, ctx, event_tx).await,
                Effect::ExecuteTool { tool_call_id, name, arguments } => {
                    self.run_one_tool(ToolCallRecord { id: tool_call_id, name, arguments }, event_tx).await;
                }
                Effect::SaveMessage { source, content, tool_name, tool_input } => {
                    match self
                        .store
                        .append_message(source, content, tool_name, tool_input, None)
                        .await
                    {
                        Ok(saved) => self.broadcast.publish(BroadcastEvent::Message(saved)),
                        Err(e) => error!("store append_message failed, exiting coordinator: {e}"),
                    }
                }
                Effect::BroadcastMessage(msg) => self.broadcast.publish(BroadcastEvent::Message(msg)),
                Effect::UpdateContextPressure { usage } => {
                    let pressure = match usage {
                        Some(u) => self.context_manager.pressure_for_tokens(u.prompt_tokens),
                        None => self.context_manager.pressure_for_window(&ctx.window),
                    };
                    self.broadcast.publish(BroadcastEvent::ContextPressure {
                        tokens: pressure.tokens,
                        max: pressure.max,
                        ratio: pressure.ratio,
                        level: pressure.level,
                    });
                    self.handle_pressure(pressure, ctx, system_prompt).await;
                }
                Effect::CheckContextPressure => {
                    let pressure = self.context_manager.pressure_for_window(&ctx.window);
                    self.handle_pressure(pressure, ctx, system_prompt).await;
                }
                Effect::ScheduleDelay { ms } => {
                    let tx = event_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(ms)).await;
                        let _ = tx.send(Event::DelayElapsed);
                    });
                }
                Effect::WaitForStep => {
                    // No timer to arm; `step` arrives as an Inbound.
                }
                Effect::LogError(e) => warn!("agent stream error: {e}"),
                Effect::EmitToken { stream_id, text } => {
                    self.broadcast.publish(BroadcastEvent::Token { stream_id, text });
                }
                Effect::EmitReasoning { stream_id, text } => {
                    self.broadcast.publish(BroadcastEvent::Reasoning { stream_id, text });
                }
                Effect::BroadcastFsmState => {
                    self.broadcast.publish(BroadcastEvent::FsmState {
                        state: state.tag().to_string(),
                        turn_number: ctx.turn_number,
                    });
                }
            }
        }
    }

    async fn handle_pressure(&self, pressure: agentctl_context::Pressure, ctx: &mut Context, system_prompt: &str) {
        use agentctl_core::types::PressureLevel;
        match pressure.level {
            PressureLevel::Soft => self.context_manager.soft_compact(&mut ctx.window),
            PressureLevel::Hard | PressureLevel::Overflow => {
                match self
                    .context_manager
                    .hard_compact(&mut ctx.window, system_prompt, &self.store, &self.broadcast)
                    .await
                {
                    Ok(_session_id) => {}
                    Err(e) => warn!("hard compaction failed, continuing under pressure: {e}"),
                }
            }
            PressureLevel::Normal => {}
        }
    }

    /// Spawn a task that drains the Model's stream and forwards each
    /// increment as a discrete [`Event`]. The coordinator's own loop (not
    /// this task) is what turns `StreamChunk` into `emit_token`/
    /// `emit_reasoning` effects, so tokens reach observers live rather than
    /// only once the whole response has arrived.
    async fn start_stream(&self, state: &FsmState, ctx: &Context, event_tx: &mpsc::UnboundedSender<Event>) {
        let FsmState::Streaming { .. } = state else { return };
        let schemas = self.dispatcher.schemas();
        let window = ctx.window.clone();
        let model_stream = self.model.stream_chat(&window, &schemas).await;

        let stream = match model_stream {
            Ok(s) => s,
            Err(e) => {
                let _ = event_tx.send(Event::StreamError(e.to_string()));
                return;
            }
        };

        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            let mut stream = Box::pin(stream);
            let mut accumulator = ToolCallAccumulator::new();
            let mut content = String::new();
            let mut reasoning = String::new();
            let mut usage = None;

            while let Some(item) = stream.next().await {
                match item {
                    Ok(StreamEvent::Chunk { content: c, reasoning: r }) => {
                        if let Some(c) = &c {
                            content.push_str(c);
                        }
                        if let Some(r) = &r {
                            reasoning.push_str(r);
                        }
                        if event_tx.send(Event::StreamChunk { content: c, reasoning: r }).is_err() {
                            return;
                        }
                    }
                    Ok(StreamEvent::ToolCallDelta { index, id, name, arguments }) => {
                        accumulator.apply(index, id, name, arguments);
                    }
                    Ok(StreamEvent::Usage(u)) => usage = Some(u),
                    Ok(StreamEvent::Done) => break,
                    Err(e) => {
                        let _ = event_tx.send(Event::StreamError(e.to_string()));
                        return;
                    }
                }
            }

            let tool_calls: Vec<ToolCallRecord> = accumulator.finish();
            let message = finish_message(content, reasoning, tool_calls);
            let _ = event_tx.send(Event::StreamEnd { message, usage });
        });
    }

    /// Execute one tool call within `executing_tools` per the executor
    /// contract in §4.5: persist+broadcast the call, invoke the dispatcher
    /// with the interrupt probe, persist+broadcast the result, then deliver
    /// `tool_result` back to the FSM. Runs on a spawned task so a slow tool
    /// never blocks the coordinator from draining other inbound events.
    async fn run_one_tool(&self, call: ToolCallRecord, event_tx: &mpsc::UnboundedSender<Event>) {
        let store = self.store.clone();
        let broadcast = self.broadcast.clone();
        let dispatcher = Arc::clone(&self.dispatcher);
        let workspace_root = self.workspace_root.clone();
        let search_api_key = self.search_api_key.clone();
        let pending = Arc::clone(&self.pending_input);
        let event_tx = event_tx.clone();

        tokio::spawn(async move {
            let call_message = format!("Calling {}", call.name);
            match store
                .append_message(Source::ToolCall, call_message, Some(call.name.clone()), Some(call.arguments.clone()), None)
                .await
            {
                Ok(saved) => broadcast.publish(BroadcastEvent::Message(saved)),
                Err(e) => {
                    error!("store append_message failed, exiting coordinator: {e}");
                    return;
                }
            }

            let interrupt: agentctl_tools::context::InterruptProbe =
                Arc::new(move || pending.load(Ordering::SeqCst));
            let tool_ctx = ToolContext::new(workspace_root, interrupt).with_search_api_key(search_api_key);

            let result = dispatcher.dispatch(&call.name, &call.arguments, tool_ctx).await;

            match store
                .append_message(Source::ToolResult, result.clone(), Some(call.id.clone()), None, None)
                .await
            {
                Ok(saved) => broadcast.publish(BroadcastEvent::Message(saved)),
                Err(e) => {
                    error!("store append_message failed, exiting coordinator: {e}");
                    return;
                }
            }

            let _ = event_tx.send(Event::ToolResult { tool_call_id: call.id, result });
        });
    }
}
