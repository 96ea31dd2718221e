use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use botkeeper_core::BotkeeperResult;
use botkeeper_engine::BotEngine;

use crate::command::CommandContext;
use crate::handler::{CommandHandler, CommandInfo};

pub(crate) const LIST_COMMANDS_DESCRIPTION: &str = "Lists every available command";

/// Status and crash-count snapshot of every registered bot.
pub struct FullReportHandler {
    engine: Arc<BotEngine>,
}

impl FullReportHandler {
    pub fn new(engine: Arc<BotEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl CommandHandler for FullReportHandler {
    fn name(&self) -> &str {
        "full-report"
    }

    fn description(&self) -> &str {
        "Reports the status of every bot"
    }

    async fn handle(&self, _ctx: &CommandContext) -> BotkeeperResult<Option<Value>> {
        let statuses = self.engine.list_statuses().await;
        Ok(Some(serde_json::to_value(statuses)?))
    }
}

pub struct ListCommandsHandler {
    infos: Vec<CommandInfo>,
}

impl ListCommandsHandler {
    pub fn new(infos: Vec<CommandInfo>) -> Self {
        Self { infos }
    }
}

#[async_trait]
impl CommandHandler for ListCommandsHandler {
    fn name(&self) -> &str {
        "list-commands"
    }

    fn description(&self) -> &str {
        LIST_COMMANDS_DESCRIPTION
    }

    async fn handle(&self, _ctx: &CommandContext) -> BotkeeperResult<Option<Value>> {
        Ok(Some(serde_json::to_value(&self.infos)?))
    }
}

/// Cancels the process root token, which cascades to every supervision loop
/// and every command source.
pub struct ShutdownHandler {
    root_cancel: CancellationToken,
}

impl ShutdownHandler {
    pub fn new(root_cancel: CancellationToken) -> Self {
        Self { root_cancel }
    }
}

#[async_trait]
impl CommandHandler for ShutdownHandler {
    fn name(&self) -> &str {
        "shutdown"
    }

    fn description(&self) -> &str {
        "Shuts the whole process down"
    }

    async fn handle(&self, ctx: &CommandContext) -> BotkeeperResult<Option<Value>> {
        info!(
            correlation_id = %ctx.correlation_id,
            sender = %ctx.command.sender_id,
            "Shutdown requested"
        );
        self.root_cancel.cancel();
        Ok(None)
    }
}
