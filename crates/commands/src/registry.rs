use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::handler::{CommandHandler, CommandInfo};

/// Case-insensitive name to handler lookup.
#[derive(Default)]
pub struct CommandRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn CommandHandler>) {
        let key = handler.name().to_ascii_lowercase();
        if self.handlers.insert(key, handler).is_some() {
            warn!("A command handler was replaced during registration");
        }
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn list(&self) -> Vec<CommandInfo> {
        let mut infos: Vec<CommandInfo> = self
            .handlers
            .values()
            .map(|h| CommandInfo::of(h.as_ref()))
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;

    use botkeeper_core::BotkeeperResult;

    use crate::command::CommandContext;

    struct NoopHandler;

    #[async_trait]
    impl CommandHandler for NoopHandler {
        fn name(&self) -> &str {
            "Ping"
        }

        fn description(&self) -> &str {
            "replies with nothing"
        }

        async fn handle(&self, _ctx: &CommandContext) -> BotkeeperResult<Option<Value>> {
            Ok(None)
        }
    }

    #[test]
    fn test_resolution_is_case_insensitive() {
        let mut registry = CommandRegistry::new();
        registry.register(Arc::new(NoopHandler));

        assert!(registry.resolve("ping").is_some());
        assert!(registry.resolve("PING").is_some());
        assert!(registry.resolve("pong").is_none());
    }

    #[test]
    fn test_list_reports_metadata() {
        let mut registry = CommandRegistry::new();
        registry.register(Arc::new(NoopHandler));

        let infos = registry.list();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].name, "Ping");
        assert_eq!(infos[0].min_args, 0);
    }
}
