use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use botkeeper_core::BotkeeperResult;

use crate::authorize::CommandAuthorizer;
use crate::command::CommandContext;
use crate::rate_limit::CommandRateLimiter;
use crate::registry::CommandRegistry;
use crate::validate::CommandValidator;

/// Fixed-order dispatch pipeline: validate, authorize, rate-limit-gated
/// execute. Unknown commands never reach the authorizer.
pub struct CommandBus {
    validator: CommandValidator,
    authorizer: CommandAuthorizer,
    rate_limiter: CommandRateLimiter,
}

impl CommandBus {
    pub fn new(
        registry: Arc<CommandRegistry>,
        authorizer: CommandAuthorizer,
        rate_limiter: CommandRateLimiter,
    ) -> Self {
        if registry.is_empty() {
            warn!("Command registry is empty, every command will be rejected");
        }
        Self {
            validator: CommandValidator::new(registry),
            authorizer,
            rate_limiter,
        }
    }

    pub async fn dispatch(&self, ctx: &CommandContext) -> BotkeeperResult<Option<Value>> {
        debug!(
            correlation_id = %ctx.correlation_id,
            source = %ctx.command.source,
            command = %ctx.command.name,
            "Dispatching command"
        );

        let handler = self.validator.validate(&ctx.command)?;
        self.authorizer.authorize(ctx)?;

        let _permit = self.rate_limiter.acquire().await?;
        let result = handler.handle(ctx).await;

        match &result {
            Ok(_) => info!(
                correlation_id = %ctx.correlation_id,
                command = %ctx.command.name,
                "Command executed"
            ),
            Err(e) => warn!(
                correlation_id = %ctx.correlation_id,
                command = %ctx.command.name,
                "Command failed: {e}"
            ),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use botkeeper_core::{BotkeeperError, CommandError};

    use crate::command::{Command, CommandSource};
    use crate::handler::CommandHandler;

    struct EchoHandler {
        delay: Duration,
    }

    #[async_trait]
    impl CommandHandler for EchoHandler {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "echoes its arguments"
        }

        fn min_args(&self) -> usize {
            1
        }

        async fn handle(&self, ctx: &CommandContext) -> BotkeeperResult<Option<Value>> {
            tokio::time::sleep(self.delay).await;
            Ok(Some(json!({ "args": ctx.command.args })))
        }
    }

    fn bus(capacity: usize, tokens: HashMap<CommandSource, String>) -> Arc<CommandBus> {
        let mut registry = CommandRegistry::new();
        registry.register(Arc::new(EchoHandler {
            delay: Duration::from_millis(100),
        }));
        Arc::new(CommandBus::new(
            Arc::new(registry),
            CommandAuthorizer::new(tokens),
            CommandRateLimiter::new(capacity, Duration::from_millis(30)),
        ))
    }

    fn ctx(name: &str, args: &[&str], token: Option<&str>) -> CommandContext {
        CommandContext::new(
            Command::new(
                name,
                args.iter().map(|a| a.to_string()).collect(),
                CommandSource::Http,
                "tester",
            ),
            token.map(str::to_string),
            "corr-test",
        )
    }

    fn http_tokens() -> HashMap<CommandSource, String> {
        let mut tokens = HashMap::new();
        tokens.insert(CommandSource::Http, "secret".to_string());
        tokens
    }

    #[tokio::test]
    async fn test_happy_path_returns_handler_result() {
        let bus = bus(5, HashMap::new());
        let result = bus.dispatch(&ctx("echo", &["hi"], None)).await.unwrap();
        assert_eq!(result, Some(json!({ "args": ["hi"] })));
    }

    #[tokio::test]
    async fn test_unknown_command_fails_before_authorization() {
        // the token is wrong for this source, yet the error must be the
        // validation error, proving the authorizer never ran
        let bus = bus(5, http_tokens());
        let err = bus
            .dispatch(&ctx("bogus", &[], Some("wrong-token")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BotkeeperError::Command(CommandError::Invalid { .. })
        ));
    }

    #[tokio::test]
    async fn test_bad_token_is_unauthorized() {
        let bus = bus(5, http_tokens());
        let err = bus
            .dispatch(&ctx("echo", &["hi"], Some("wrong-token")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BotkeeperError::Command(CommandError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_excess_concurrent_commands_are_rate_limited() {
        let bus = bus(1, HashMap::new());

        let busy = {
            let bus = Arc::clone(&bus);
            tokio::spawn(async move { bus.dispatch(&ctx("echo", &["slow"], None)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = bus.dispatch(&ctx("echo", &["fast"], None)).await.unwrap_err();
        assert!(matches!(
            err,
            BotkeeperError::Command(CommandError::RateLimited)
        ));

        assert!(busy.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_missing_argument_fails_validation() {
        let bus = bus(5, HashMap::new());
        let err = bus.dispatch(&ctx("echo", &[], None)).await.unwrap_err();
        assert!(matches!(
            err,
            BotkeeperError::Command(CommandError::Invalid { .. })
        ));
    }
}
