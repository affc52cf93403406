//! Token estimation, pressure classification, soft compaction, and hard
//! compaction with session handoff (§4.3).

use agentctl_broadcast::{BroadcastEvent, BroadcastFabric};
use agentctl_core::types::{classify_pressure, PressureLevel, Source, WindowMessage};
use agentctl_store::Store;

/// Fixed per-message bookkeeping overhead counted toward token estimation.
const MESSAGE_OVERHEAD_TOKENS: u64 = 4;

/// Deliberately approximate: `tokens(text) ≈ ceil(len(text)/4)`.
pub fn estimate_text_tokens(text: &str) -> u64 {
    ((text.chars().count() as u64) + 3) / 4
}

/// A message's token cost is its overhead plus content, plus (for tool
/// calls) the name and arguments of every attached tool call.
pub fn estimate_message_tokens(msg: &WindowMessage) -> u64 {
    let mut total = MESSAGE_OVERHEAD_TOKENS + estimate_text_tokens(&msg.content);
    if let Some(calls) = &msg.tool_calls {
        for call in calls {
            total += estimate_text_tokens(&call.name) + estimate_text_tokens(&call.arguments);
        }
    }
    total
}

pub fn estimate_window_tokens(window: &[WindowMessage]) -> u64 {
    window.iter().map(estimate_message_tokens).sum()
}

/// Pressure reading: exact token count, ratio against the configured
/// context size, and the classified level.
#[derive(Debug, Clone, Copy)]
pub struct Pressure {
    pub tokens: u64,
    pub max: u64,
    pub ratio: f64,
    pub level: PressureLevel,
}

pub struct ContextManager {
    context_size: u64,
}

impl ContextManager {
    pub fn new(context_size: u64) -> Self {
        Self { context_size }
    }

    /// Classify pressure from an estimated token count. When the Model
    /// returns actual prompt-token usage, pass that instead — it supersedes
    /// the estimate for pressure broadcasts (§4.3).
    pub fn pressure_for_tokens(&self, tokens: u64) -> Pressure {
        let ratio = if self.context_size == 0 {
            f64::INFINITY
        } else {
            tokens as f64 / self.context_size as f64
        };
        Pressure {
            tokens,
            max: self.context_size,
            ratio,
            level: classify_pressure(ratio),
        }
    }

    pub fn pressure_for_window(&self, window: &[WindowMessage]) -> Pressure {
        self.pressure_for_tokens(estimate_window_tokens(window))
    }

    /// Rewrite the working window in place: keep the first element (system
    /// prompt) untouched; for every message except the last 10, substitute
    /// summarised forms for long *tool* messages. Assistant/user messages
    /// pass through untouched regardless of length — see DESIGN.md for the
    /// rationale behind this policy choice (§9 open question).
    ///
    /// Idempotent: already-summarised tool messages are short enough to skip
    /// re-summarisation, and the substitution is driven off role, not a
    /// mutated marker, so a second pass is a no-op.
    pub fn soft_compact(&self, window: &mut [WindowMessage]) {
        if window.len() <= 1 {
            return;
        }
        let keep_tail_from = window.len().saturating_sub(10).max(1);
        for msg in window.iter_mut().take(keep_tail_from).skip(1) {
            if msg.role == Source::ToolResult && msg.content.len() > 500 {
                msg.content = summarise_tool_message(&msg.content);
            }
        }
    }

    /// Perform a session handoff: emit a warning, give the agent a ~5s grace
    /// window, compute a summary, roll the session, and reset the window to
    /// `[system_prompt, handoff(summary)]`. Returns the new session id.
    pub async fn hard_compact(
        &self,
        window: &mut Vec<WindowMessage>,
        system_prompt: &str,
        store: &Store,
        broadcast: &BroadcastFabric,
    ) -> agentctl_store::Result<i64> {
        let warning = "[System: context window is at capacity. A session handoff is about \
            to occur — persist anything you need to remember via your own tools now. \
            You have about 5 seconds.]";
        window.push(WindowMessage::system(warning));
        let saved = store
            .append_message(Source::System, warning.to_string(), None, None, None)
            .await?;
        broadcast.publish(BroadcastEvent::Message(saved));

        tokio::time::sleep(std::time::Duration::from_secs(5)).await;

        let summary = summarise_handoff(window);

        store.end_current_session().await?;
        let session = store.start_session(Some(summary.clone())).await?;

        window.clear();
        window.push(WindowMessage::system(system_prompt.to_string()));
        window.push(WindowMessage::system(format_handoff_block(&summary)));

        let divider = format!(
            "[System: session handoff complete. New session id: {}]",
            session.id
        );
        let saved = store
            .append_message(Source::System, divider, None, None, None)
            .await?;
        broadcast.publish(BroadcastEvent::Message(saved));

        Ok(session.id)
    }
}

fn summarise_tool_message(content: &str) -> String {
    let prefix: String = content.chars().take(200).collect();
    format!(
        "[Summarized tool result: {prefix}… ({} chars total)]",
        content.chars().count()
    )
}

/// The second window element when a handoff summary exists (§3 invariant).
pub fn format_handoff_block(summary: &str) -> String {
    format!("[Session handoff summary]\n{summary}")
}

/// Deterministically digest the outgoing window into a short structured
/// paragraph: counts of assistant turns and tool uses, plus a free-form
/// tail of the most recent user-visible content.
fn summarise_handoff(window: &[WindowMessage]) -> String {
    let assistant_turns = window.iter().filter(|m| m.role == Source::Assistant).count();
    let tool_uses = window.iter().filter(|m| m.role == Source::ToolCall).count();
    let last_user = window
        .iter()
        .rev()
        .find(|m| m.role == Source::User)
        .map(|m| truncate_chars(&m.content, 240))
        .unwrap_or_default();

    format!(
        "Prior session: {assistant_turns} assistant turn(s), {tool_uses} tool call(s). \
         Last user request: \"{last_user}\""
    )
}

fn truncate_chars(s: &str, n: usize) -> String {
    if s.chars().count() <= n {
        s.to_string()
    } else {
        let head: String = s.chars().take(n).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentctl_core::types::ToolCallRecord;

    #[test]
    fn pressure_boundaries_are_inclusive_lower_bound() {
        let cm = ContextManager::new(1000);
        assert_eq!(cm.pressure_for_tokens(699).level, PressureLevel::Normal);
        assert_eq!(cm.pressure_for_tokens(700).level, PressureLevel::Soft);
        assert_eq!(cm.pressure_for_tokens(900).level, PressureLevel::Hard);
        assert_eq!(cm.pressure_for_tokens(1100).level, PressureLevel::Overflow);
    }

    #[test]
    fn soft_compaction_summarises_old_long_tool_messages_only() {
        let cm = ContextManager::new(1000);
        let long_tool_result = "x".repeat(600);
        let mut window = vec![WindowMessage::system("sys")];
        for _ in 0..15 {
            window.push(WindowMessage {
                role: Source::ToolResult,
                content: long_tool_result.clone(),
                tool_call_id: None,
                tool_name: None,
                tool_calls: None,
            });
        }
        let long_user = "y".repeat(600);
        window.push(WindowMessage {
            role: Source::User,
            content: long_user.clone(),
            tool_call_id: None,
            tool_name: None,
            tool_calls: None,
        });
        cm.soft_compact(&mut window);
        // system prompt untouched
        assert_eq!(window[0].content, "sys");
        // old tool messages (not in the last 10) are summarised
        assert!(window[1].content.starts_with("[Summarized tool result:"));
        // the long user message, regardless of age, is left untouched
        assert_eq!(window.last().unwrap().content, long_user);
    }

    #[test]
    fn soft_compaction_is_idempotent() {
        let cm = ContextManager::new(1000);
        let mut window = vec![WindowMessage::system("sys")];
        for _ in 0..15 {
            window.push(WindowMessage {
                role: Source::ToolResult,
                content: "z".repeat(600),
                tool_call_id: None,
                tool_name: None,
                tool_calls: None,
            });
        }
        cm.soft_compact(&mut window);
        let once = window.clone();
        cm.soft_compact(&mut window);
        assert_eq!(
            once.iter().map(|m| &m.content).collect::<Vec<_>>(),
            window.iter().map(|m| &m.content).collect::<Vec<_>>()
        );
    }

    #[test]
    fn estimate_includes_tool_call_overhead() {
        let msg = WindowMessage {
            role: Source::Assistant,
            content: String::new(),
            tool_call_id: None,
            tool_name: None,
            tool_calls: Some(vec![ToolCallRecord {
                id: "1".into(),
                name: "filesystem".into(),
                arguments: "{\"path\":\".\"}".into(),
            }]),
        };
        assert!(estimate_message_tokens(&msg) > MESSAGE_OVERHEAD_TOKENS);
    }

    #[tokio::test]
    async fn hard_compact_resets_window_and_rolls_session() {
        let store = Store::open_in_memory().unwrap();
        let broadcast = BroadcastFabric::new();
        store.start_session(None).await.unwrap();
        let cm = ContextManager::new(10);
        let mut window = vec![
            WindowMessage::system("system prompt"),
            WindowMessage {
                role: Source::Assistant,
                content: "did a thing".into(),
                tool_call_id: None,
                tool_name: None,
                tool_calls: None,
            },
        ];

        // keep the test fast: shrink the grace window via a scoped override
        // is not exposed, so we just accept the 5s sleep cost here.
        let new_id = cm
            .hard_compact(&mut window, "system prompt", &store, &broadcast)
            .await
            .unwrap();

        assert_eq!(window.len(), 2);
        assert_eq!(window[0].content, "system prompt");
        assert!(window[1].content.starts_with("[Session handoff summary]"));
        let session = store.current_session().await.unwrap().unwrap();
        assert_eq!(session.id, new_id);
    }
}
