use std::collections::HashMap;

use tracing::warn;

use botkeeper_core::CommandError;

use crate::command::{CommandContext, CommandSource};

/// Authorization stage with one shared-secret token per source.
///
/// An empty token map means open mode: every command is accepted. This is
/// intentional for local use and is logged once at construction.
pub struct CommandAuthorizer {
    tokens: HashMap<CommandSource, String>,
}

impl CommandAuthorizer {
    pub fn new(tokens: HashMap<CommandSource, String>) -> Self {
        if tokens.is_empty() {
            warn!("No command tokens configured, authorization is disabled");
        }
        Self { tokens }
    }

    pub fn open() -> Self {
        Self::new(HashMap::new())
    }

    pub fn authorize(&self, ctx: &CommandContext) -> Result<(), CommandError> {
        if self.tokens.is_empty() {
            return Ok(());
        }

        let Some(expected) = self.tokens.get(&ctx.command.source) else {
            return Err(CommandError::Unauthorized);
        };

        match ctx.token.as_deref() {
            Some(presented) if presented == expected => Ok(()),
            _ => Err(CommandError::Unauthorized),
        }
    }
}
