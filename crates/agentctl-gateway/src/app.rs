//! Shared state and router assembly for the Gateway HTTP/WS surface (§6).

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::mpsc;

use agentctl_broadcast::BroadcastFabric;
use agentctl_fsm::Inbound;
use agentctl_store::Store;

/// Central shared state — passed as `Arc<AppState>` to all Axum handlers.
///
/// The executor's coordinator loop runs on its own task; handlers only ever
/// reach it through `inbound`, never by touching FSM state directly.
pub struct AppState {
    pub store: Store,
    pub broadcast: BroadcastFabric,
    pub inbound: mpsc::Sender<Inbound>,
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/message", post(crate::http::control::message_handler))
        .route("/external", post(crate::http::control::external_handler))
        .route("/control/mode", post(crate::http::control::set_mode_handler))
        .route("/control/delay", post(crate::http::control::set_delay_handler))
        .route("/control/step", post(crate::http::control::step_handler))
        .route("/ws", get(crate::ws::connection::ws_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
