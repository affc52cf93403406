//! Pure transition function for the agent FSM (§4.5). No I/O happens here;
//! `transition` only computes the next state, the next context, and the
//! effects the executor must drive.

use agentctl_core::types::{Delay, Mode, Source, WindowMessage};

use crate::state::{Context, Effect, Event, FsmState};

const MAX_CONSECUTIVE_ERRORS: u32 = 3;

pub fn transition(state: FsmState, mut ctx: Context, event: Event) -> (FsmState, Context, Vec<Effect>) {
    let before_tag = state.tag();
    let (next_state, mut effects) = step(state, &mut ctx, event);
    if next_state.tag() != before_tag {
        effects.push(Effect::BroadcastFsmState);
    }
    (next_state, ctx, effects)
}

fn step(state: FsmState, ctx: &mut Context, event: Event) -> (FsmState, Vec<Effect>) {
    match (state, event) {
        (FsmState::Idle, Event::UserMessage(content)) => begin_user_turn(ctx, content),

        (FsmState::Idle, Event::ExternalMessage { source, content }) => {
            let wrapped = format!("[External message from {source}]\n{content}");
            ctx.window.push(WindowMessage {
                role: Source::External(source.clone()),
                content: wrapped.clone(),
                tool_call_id: None,
                tool_name: None,
                tool_calls: None,
            });
            ctx.consecutive_errors = 0;
            ctx.turn_number += 1;
            (
                FsmState::Streaming { stream_id: new_stream_id(ctx) },
                vec![
                    Effect::SaveMessage {
                        source: Source::External(source),
                        content: wrapped,
                        tool_name: None,
                        tool_input: None,
                    },
                    Effect::CheckContextPressure,
                    Effect::StartStream,
                ],
            )
        }

        (FsmState::Idle, Event::AutonomousTick) => {
            if ctx.mode != Mode::Autonomous {
                return (FsmState::Idle, vec![]);
            }
            if let Some(queued) = ctx.queued_user_messages.pop_front() {
                return begin_user_turn(ctx, queued);
            }
            let nudge = ctx.autonomous_prompt.clone();
            ctx.window.push(WindowMessage::system(nudge.clone()));
            ctx.turn_number += 1;
            (
                FsmState::Streaming { stream_id: new_stream_id(ctx) },
                vec![
                    Effect::SaveMessage {
                        source: Source::System,
                        content: nudge,
                        tool_name: None,
                        tool_input: None,
                    },
                    Effect::CheckContextPressure,
                    Effect::StartStream,
                ],
            )
        }

        (FsmState::Streaming { stream_id }, Event::StreamChunk { content, reasoning }) => {
            let mut effects = Vec::new();
            if let Some(c) = content {
                ctx.current_content.push_str(&c);
                effects.push(Effect::EmitToken { stream_id: stream_id.clone(), text: c });
            }
            if let Some(r) = reasoning {
                ctx.current_reasoning.push_str(&r);
                effects.push(Effect::EmitReasoning { stream_id: stream_id.clone(), text: r });
            }
            (FsmState::Streaming { stream_id }, effects)
        }

        (FsmState::Streaming { .. }, Event::StreamEnd { message, usage }) => {
            let mut effects = Vec::new();

            if !ctx.current_reasoning.is_empty() {
                effects.push(Effect::SaveMessage {
                    source: Source::Reasoning,
                    content: ctx.current_reasoning.clone(),
                    tool_name: None,
                    tool_input: None,
                });
            }
            let content = if !message.content.is_empty() {
                message.content.clone()
            } else {
                ctx.current_content.clone()
            };
            if !content.is_empty() {
                effects.push(Effect::SaveMessage {
                    source: Source::Assistant,
                    content: content.clone(),
                    tool_name: None,
                    tool_input: None,
                });
            }
            ctx.window.push(WindowMessage {
                role: Source::Assistant,
                content,
                tool_call_id: None,
                tool_name: None,
                tool_calls: if message.tool_calls.is_empty() {
                    None
                } else {
                    Some(message.tool_calls.clone())
                },
            });
            ctx.reset_stream_accumulator();

            if usage.is_some() {
                effects.push(Effect::UpdateContextPressure { usage });
            }

            if !message.tool_calls.is_empty() {
                let calls = message.tool_calls;
                if let Some(first) = calls.first() {
                    effects.push(Effect::ExecuteTool {
                        tool_call_id: first.id.clone(),
                        name: first.name.clone(),
                        arguments: first.arguments.clone(),
                    });
                }
                (FsmState::ExecutingTools { calls, cursor: 0 }, effects)
            } else {
                let (next, mut routing) = post_turn_routing(ctx);
                effects.append(&mut routing);
                (next, effects)
            }
        }

        (FsmState::Streaming { .. }, Event::StreamError(e)) => {
            ctx.consecutive_errors += 1;
            ctx.reset_stream_accumulator();
            let mut effects = vec![Effect::SaveMessage {
                source: Source::System,
                content: format!("[System: model stream error: {e}]"),
                tool_name: None,
                tool_input: None,
            }];

            if ctx.consecutive_errors < MAX_CONSECUTIVE_ERRORS {
                let recovery = format!(
                    "[System: The previous response caused an error: \"{e}\". Please try a different approach.]"
                );
                ctx.window.push(WindowMessage::system(recovery));
                effects.push(Effect::LogError(e));
                effects.push(Effect::StartStream);
                (FsmState::Streaming { stream_id: new_stream_id(ctx) }, effects)
            } else {
                effects.push(Effect::SaveMessage {
                    source: Source::System,
                    content: "[System: repeated model failures, pausing the agent.]".to_string(),
                    tool_name: None,
                    tool_input: None,
                });
                effects.push(Effect::LogError(e));
                ctx.consecutive_errors = 0;
                (FsmState::Idle, effects)
            }
        }

        (FsmState::ExecutingTools { mut calls, cursor }, Event::ToolResult { tool_call_id, result }) => {
            ctx.window.push(WindowMessage {
                role: Source::ToolResult,
                content: result,
                tool_call_id: Some(tool_call_id),
                tool_name: None,
                tool_calls: None,
            });
            let next_cursor = cursor + 1;
            if let Some(next_call) = calls.get(next_cursor) {
                let effects = vec![Effect::ExecuteTool {
                    tool_call_id: next_call.id.clone(),
                    name: next_call.name.clone(),
                    arguments: next_call.arguments.clone(),
                }];
                (FsmState::ExecutingTools { calls, cursor: next_cursor }, effects)
            } else {
                calls.clear();
                (
                    FsmState::Streaming { stream_id: new_stream_id(ctx) },
                    vec![Effect::CheckContextPressure, Effect::StartStream],
                )
            }
        }

        (FsmState::WaitingDelay { .. }, Event::DelayElapsed) => step(FsmState::Idle, ctx, Event::AutonomousTick),

        (FsmState::WaitingDelay { .. }, Event::UserMessage(content)) => begin_user_turn(ctx, content),

        (FsmState::WaitingStep, Event::Step) => step(FsmState::Idle, ctx, Event::AutonomousTick),

        (FsmState::WaitingStep, Event::DelayChanged(delay)) => {
            ctx.delay = delay;
            match ctx.delay {
                Delay::Infinite => (FsmState::WaitingStep, vec![]),
                Delay::Seconds(s) => (
                    FsmState::WaitingDelay { ms: s * 1000 },
                    vec![Effect::ScheduleDelay { ms: s * 1000 }],
                ),
            }
        }

        (state, Event::ModeChanged(mode)) => {
            let was_waiting = matches!(state, FsmState::WaitingDelay { .. } | FsmState::WaitingStep);
            ctx.mode = mode;
            if mode == Mode::Conversational && was_waiting {
                (FsmState::Idle, vec![])
            } else if mode == Mode::Autonomous && matches!(state, FsmState::Idle) {
                step(FsmState::Idle, ctx, Event::AutonomousTick)
            } else {
                (state, vec![])
            }
        }

        (state, Event::DelayChanged(delay)) => {
            ctx.delay = delay;
            (state, vec![])
        }

        (state, Event::UserMessage(content)) if !matches!(state, FsmState::Idle) => {
            ctx.queued_user_messages.push_back(content);
            (state, vec![])
        }

        (state, _other) => (state, vec![]),
    }
}

fn begin_user_turn(ctx: &mut Context, content: String) -> (FsmState, Vec<Effect>) {
    ctx.window.push(WindowMessage {
        role: Source::User,
        content: content.clone(),
        tool_call_id: None,
        tool_name: None,
        tool_calls: None,
    });
    ctx.consecutive_errors = 0;
    ctx.turn_number += 1;
    (
        FsmState::Streaming { stream_id: new_stream_id(ctx) },
        vec![
            Effect::SaveMessage {
                source: Source::User,
                content,
                tool_name: None,
                tool_input: None,
            },
            Effect::CheckContextPressure,
            Effect::StartStream,
        ],
    )
}

fn post_turn_routing(ctx: &mut Context) -> (FsmState, Vec<Effect>) {
    if let Some(queued) = ctx.queued_user_messages.pop_front() {
        return begin_user_turn(ctx, queued);
    }
    if ctx.mode == Mode::Conversational {
        return (FsmState::Idle, vec![]);
    }
    match ctx.delay {
        Delay::Infinite => (FsmState::WaitingStep, vec![Effect::WaitForStep]),
        Delay::Seconds(0) => step(FsmState::Idle, ctx, Event::AutonomousTick),
        Delay::Seconds(s) => (
            FsmState::WaitingDelay { ms: s * 1000 },
            vec![Effect::ScheduleDelay { ms: s * 1000 }],
        ),
    }
}

fn new_stream_id(ctx: &Context) -> String {
    format!("turn-{}", ctx.turn_number)
}
