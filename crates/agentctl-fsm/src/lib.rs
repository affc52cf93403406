//! The agent finite-state machine and its effect executor (§4.5): the pure
//! transition function, the OpenAI-compatible streaming Model client, the
//! default prompts, and the coordinator that drives effects as the only I/O
//! boundary in the crate.

pub mod executor;
pub mod model;
pub mod prompt;
pub mod state;
pub mod transition;

pub use executor::{Executor, Inbound};
pub use state::{Context, Effect, Event, FsmState};
pub use transition::transition;
