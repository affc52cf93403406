//! Wire types shared by `agentctl-gateway` and `agentctl-fsm`: control
//! frames (§6), the external-injection contract, and the broadcast event
//! envelope. Kept in its own crate so neither side depends on the other's
//! transport concerns.

pub mod envelope;
pub mod external;
pub mod frames;

pub use envelope::BroadcastEnvelope;
pub use external::{validate_external_source, ExternalInjection, ExternalSourceError};
pub use frames::{ControlFrame, DelayWire};
