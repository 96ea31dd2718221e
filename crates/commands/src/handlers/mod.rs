mod engine_ops;
mod system;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use botkeeper_engine::BotEngine;

pub use engine_ops::{
    DisableHandler, EnableHandler, ResetHandler, RestartHandler, StartHandler, StatusHandler,
    StopHandler,
};
pub use system::{FullReportHandler, ListCommandsHandler, ShutdownHandler};

use crate::registry::CommandRegistry;

/// Builds the full control vocabulary against one engine instance.
///
/// `list-commands` is registered last so its metadata covers every other
/// handler, itself included.
pub fn standard_registry(engine: Arc<BotEngine>, root_cancel: CancellationToken) -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    registry.register(Arc::new(StartHandler::new(Arc::clone(&engine))));
    registry.register(Arc::new(StopHandler::new(Arc::clone(&engine))));
    registry.register(Arc::new(RestartHandler::new(Arc::clone(&engine))));
    registry.register(Arc::new(EnableHandler::new(Arc::clone(&engine))));
    registry.register(Arc::new(DisableHandler::new(Arc::clone(&engine))));
    registry.register(Arc::new(ResetHandler::new(Arc::clone(&engine))));
    registry.register(Arc::new(StatusHandler::new(Arc::clone(&engine))));
    registry.register(Arc::new(FullReportHandler::new(engine)));
    registry.register(Arc::new(ShutdownHandler::new(root_cancel)));

    let mut infos = registry.list();
    infos.push(crate::handler::CommandInfo {
        name: "list-commands".to_string(),
        description: system::LIST_COMMANDS_DESCRIPTION.to_string(),
        min_args: 0,
        allowed_args: None,
    });
    infos.sort_by(|a, b| a.name.cmp(&b.name));
    registry.register(Arc::new(ListCommandsHandler::new(infos)));

    registry
}
