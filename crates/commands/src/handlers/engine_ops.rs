use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use botkeeper_core::{ActionResult, BotkeeperResult, CommandError};
use botkeeper_engine::BotEngine;

use crate::command::CommandContext;
use crate::handler::CommandHandler;

fn bot_name(ctx: &CommandContext) -> BotkeeperResult<&str> {
    ctx.command
        .args
        .first()
        .map(String::as_str)
        .ok_or_else(|| CommandError::invalid("A bot name argument is required").into())
}

fn render(result: ActionResult) -> BotkeeperResult<Option<Value>> {
    Ok(Some(serde_json::to_value(result)?))
}

macro_rules! engine_op_handler {
    ($handler:ident, $name:literal, $description:literal, $op:ident) => {
        pub struct $handler {
            engine: Arc<BotEngine>,
        }

        impl $handler {
            pub fn new(engine: Arc<BotEngine>) -> Self {
                Self { engine }
            }
        }

        #[async_trait]
        impl CommandHandler for $handler {
            fn name(&self) -> &str {
                $name
            }

            fn description(&self) -> &str {
                $description
            }

            fn min_args(&self) -> usize {
                1
            }

            async fn handle(&self, ctx: &CommandContext) -> BotkeeperResult<Option<Value>> {
                let name = bot_name(ctx)?;
                render(self.engine.$op(name).await)
            }
        }
    };
}

engine_op_handler!(StartHandler, "start", "Starts a bot's supervision loop", start);
engine_op_handler!(StopHandler, "stop", "Stops a running bot", stop);
engine_op_handler!(
    RestartHandler,
    "restart",
    "Stops a bot, clears its crash count and starts it again",
    restart
);
engine_op_handler!(EnableHandler, "enable", "Enables a disabled bot and starts it", enable);
engine_op_handler!(DisableHandler, "disable", "Disables a bot and stops its loop", disable);
engine_op_handler!(
    ResetHandler,
    "reset",
    "Deletes a bot's persisted runtime state",
    reset_state
);

/// Reports one bot's status, settings and the reason for its current state.
pub struct StatusHandler {
    engine: Arc<BotEngine>,
}

impl StatusHandler {
    pub fn new(engine: Arc<BotEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl CommandHandler for StatusHandler {
    fn name(&self) -> &str {
        "status"
    }

    fn description(&self) -> &str {
        "Reports a single bot's status"
    }

    fn min_args(&self) -> usize {
        1
    }

    async fn handle(&self, ctx: &CommandContext) -> BotkeeperResult<Option<Value>> {
        let name = bot_name(ctx)?;
        match self.engine.status(name).await {
            Some(report) => Ok(Some(serde_json::to_value(report)?)),
            None => render(ActionResult::fail("Bot could not be found.")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use botkeeper_core::{Bot, BotSettings, BotkeeperResult, StorageKind};
    use botkeeper_datastore::{DataAccess, MemoryStore};

    use crate::command::{Command, CommandSource};

    struct SleeperBot;

    #[async_trait]
    impl Bot for SleeperBot {
        fn name(&self) -> &str {
            "sleeper"
        }

        fn settings(&self) -> BotSettings {
            BotSettings {
                run_interval: Some(Duration::from_millis(50)),
                ..BotSettings::default()
            }
        }

        async fn run(&self, _cancel: CancellationToken) -> BotkeeperResult<()> {
            Ok(())
        }
    }

    async fn engine_with_sleeper() -> Arc<BotEngine> {
        let data = DataAccess::new(Arc::new(MemoryStore::new()), None, StorageKind::InMemory);
        let engine = Arc::new(BotEngine::new(data, CancellationToken::new()));
        engine.register_all(vec![Arc::new(SleeperBot)]).await;
        engine
    }

    fn ctx(name: &str, args: &[&str]) -> CommandContext {
        CommandContext::new(
            Command::new(
                name,
                args.iter().map(|a| a.to_string()).collect(),
                CommandSource::Http,
                "tester",
            ),
            None,
            "corr-test",
        )
    }

    #[tokio::test]
    async fn test_start_handler_wraps_engine_result() {
        let engine = engine_with_sleeper().await;
        let handler = StartHandler::new(Arc::clone(&engine));

        let value = handler
            .handle(&ctx("start", &["sleeper"]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value["success"], true);

        let again = handler
            .handle(&ctx("start", &["sleeper"]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again["success"], false);
    }

    #[tokio::test]
    async fn test_status_handler_reports_unknown_bot_as_failure() {
        let engine = engine_with_sleeper().await;
        let handler = StatusHandler::new(engine);

        let value = handler
            .handle(&ctx("status", &["ghost"]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value["success"], false);

        let known = handler
            .handle(&ctx("status", &["sleeper"]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(known["name"], "sleeper");
    }
}
