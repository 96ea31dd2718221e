use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use botkeeper_core::BotkeeperResult;

use crate::command::CommandContext;

/// Executable endpoint of the dispatch pipeline.
///
/// `min_args` and `allowed_args` drive validation; `handle` only runs once
/// validation, authorization and the rate limiter have all passed. Returning
/// `None` means "accepted, no content".
#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn min_args(&self) -> usize {
        0
    }

    /// Whitelist of accepted argument values, matched case-insensitively.
    /// `None` accepts any argument.
    fn allowed_args(&self) -> Option<Vec<String>> {
        None
    }

    async fn handle(&self, ctx: &CommandContext) -> BotkeeperResult<Option<Value>>;
}

impl std::fmt::Debug for dyn CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler")
            .field("name", &self.name())
            .finish()
    }
}

/// Metadata row rendered by the `list-commands` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandInfo {
    pub name: String,
    pub description: String,
    pub min_args: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_args: Option<Vec<String>>,
}

impl CommandInfo {
    pub fn of(handler: &dyn CommandHandler) -> Self {
        Self {
            name: handler.name().to_string(),
            description: handler.description().to_string(),
            min_args: handler.min_args(),
            allowed_args: handler.allowed_args(),
        }
    }
}
