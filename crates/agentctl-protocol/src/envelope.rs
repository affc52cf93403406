//! Broadcast event envelope shipped to observers (§6): `{type, data}` where
//! `type` mirrors the shape already tagged onto [`BroadcastEvent`] by serde;
//! this wrapper exists so the Gateway has one stable type to serialize to
//! a WS text frame without reaching into the broadcast crate's internals.

use serde::Serialize;
use serde_json::Value;

use agentctl_broadcast::BroadcastEvent;

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastEnvelope<'a> {
    #[serde(flatten)]
    pub event: &'a BroadcastEvent,
}

impl<'a> BroadcastEnvelope<'a> {
    pub fn new(event: &'a BroadcastEvent) -> Self {
        Self { event }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn to_text_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
