//! `/message`, `/external`, and `/control/*` — the Gateway's write surface
//! onto the coordinator (§6). Every handler here does one thing: validate
//! the request body, mutate Store KV state when the control contract calls
//! for it, and enqueue an [`Inbound`] event. None of them touch FSM state
//! directly — only the coordinator task does that.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;

use agentctl_broadcast::BroadcastEvent;
use agentctl_core::types::{Delay, Mode, STATE_KEY_DELAY, STATE_KEY_MODE};
use agentctl_fsm::Inbound;
use agentctl_protocol::validate_external_source;

use crate::app::AppState;

/// Publish the combined mode+delay snapshot the `state` broadcast event
/// carries (§3, §4.2). Only one of `mode`/`delay` changed in the caller;
/// the other is read back from the Store so observers always see the full
/// pair, not just the field that just changed.
async fn broadcast_state(
    state: &AppState,
    mode: Option<Mode>,
    delay: Option<Delay>,
) -> Result<(), (StatusCode, Json<ErrorBody>)> {
    let store_err =
        |e: agentctl_store::StoreError| (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error: e.to_string() }));

    let mode = match mode {
        Some(m) => m,
        None => {
            let v = state
                .store
                .get_state(STATE_KEY_MODE.to_string(), json!(Mode::Conversational.to_string()))
                .await
                .map_err(store_err)?;
            serde_json::from_value(v).unwrap_or(Mode::Conversational)
        }
    };
    let delay = match delay {
        Some(d) => d,
        None => {
            let v = state
                .store
                .get_state(STATE_KEY_DELAY.to_string(), Delay::Seconds(5).to_json())
                .await
                .map_err(store_err)?;
            Delay::from_json(&v).unwrap_or(Delay::Seconds(5))
        }
    };

    state.broadcast.publish(BroadcastEvent::State { mode: mode.to_string(), delay: delay.to_json() });
    Ok(())
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

fn bad_request(msg: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (StatusCode::BAD_REQUEST, Json(ErrorBody { error: msg.into() }))
}

async fn enqueue(state: &AppState, inbound: Inbound) -> Result<(), (StatusCode, Json<ErrorBody>)> {
    state.inbound.send(inbound).await.map_err(|_| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorBody { error: "coordinator is not running".to_string() }),
        )
    })
}

#[derive(Deserialize)]
pub struct MessageRequest {
    pub content: String,
}

/// POST /message — body `{content}`, enqueues `user_message`.
pub async fn message_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MessageRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorBody>)> {
    if req.content.trim().is_empty() {
        return Err(bad_request("content cannot be empty"));
    }
    enqueue(&state, Inbound::UserMessage(req.content)).await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Deserialize)]
pub struct ExternalRequest {
    pub source: String,
    pub content: String,
}

/// POST /external — body `{source, content}`, `source` validated against
/// `^external:[^\s]+$` before it ever reaches the coordinator.
pub async fn external_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExternalRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorBody>)> {
    let name = validate_external_source(&req.source)
        .map_err(|e| bad_request(e.to_string()))?
        .to_string();
    enqueue(&state, Inbound::ExternalMessage { source: name, content: req.content }).await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Deserialize)]
pub struct SetModeRequest {
    pub mode: Mode,
}

/// POST /control/mode — mutates the `mode` KV entry, then enqueues
/// `mode_changed` so the running coordinator picks it up without a restart.
pub async fn set_mode_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetModeRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorBody>)> {
    state
        .store
        .set_state(STATE_KEY_MODE.to_string(), json!(req.mode.to_string()))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error: e.to_string() })))?;
    broadcast_state(&state, Some(req.mode), None).await?;
    enqueue(&state, Inbound::ModeChanged(req.mode)).await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Deserialize)]
pub struct SetDelayRequest {
    pub delay: agentctl_protocol::DelayWire,
}

/// POST /control/delay — accepts the same `{delay}` wire shape as the
/// WebSocket `set_delay` control frame (bare integer seconds, or the
/// literal string `"infinite"`).
pub async fn set_delay_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetDelayRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorBody>)> {
    let delay = req
        .delay
        .to_delay()
        .ok_or_else(|| bad_request("delay seconds must be positive, or the string \"infinite\""))?;
    state
        .store
        .set_state(STATE_KEY_DELAY.to_string(), delay.to_json())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error: e.to_string() })))?;
    broadcast_state(&state, None, Some(delay)).await?;
    enqueue(&state, Inbound::DelayChanged(delay)).await?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /control/step — only meaningful while the agent is in
/// `waiting_step`; harmless no-op otherwise (the FSM drops it).
pub async fn step_handler(
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, (StatusCode, Json<ErrorBody>)> {
    enqueue(&state, Inbound::Step).await?;
    Ok(StatusCode::ACCEPTED)
}
