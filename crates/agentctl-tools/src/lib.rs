//! Uniform tool dispatch and the background-task registry (§4.4).
//!
//! Every tool implements one contract — `(args_json, ctx) -> result_string`
//! — colocated with its JSON schema. The [`Dispatcher`] looks handlers up by
//! name and layers the three invocation modes (foreground, background,
//! timed) on top, uniformly, regardless of which handler is underneath.

pub mod context;
pub mod dispatcher;
pub mod handler;
pub mod json_repair;
pub mod safety;
pub mod tools;
pub mod truncate;

pub use context::ToolContext;
pub use dispatcher::Dispatcher;
pub use handler::ToolHandler;

use std::sync::Arc;

use agentctl_broadcast::BroadcastFabric;
use agentctl_store::Store;

/// Build a [`Dispatcher`] with the full built-in tool set registered:
/// filesystem, terminal, web fetch/search, sleep, notable, and the two
/// task-polling tools (§4.1 and the tool roster in §4.4).
pub fn build_default_dispatcher(store: Store, broadcast: BroadcastFabric) -> Dispatcher {
    let mut dispatcher = Dispatcher::new(store.clone());
    dispatcher.register(Arc::new(tools::filesystem::FilesystemTool));
    dispatcher.register(Arc::new(tools::terminal::TerminalTool));
    dispatcher.register(Arc::new(tools::web::WebFetchTool));
    dispatcher.register(Arc::new(tools::web::WebSearchTool));
    dispatcher.register(Arc::new(tools::sleep::SleepTool));
    dispatcher.register(Arc::new(tools::notable::NotableTool::new(
        store.clone(),
        broadcast,
    )));
    dispatcher.register(Arc::new(tools::task_tools::TaskStatusTool::new(store.clone())));
    dispatcher.register(Arc::new(tools::task_tools::TaskWaitTool::new(store)));
    dispatcher
}
