use std::sync::Arc;

use botkeeper_core::CommandError;

use crate::command::Command;
use crate::handler::CommandHandler;
use crate::registry::CommandRegistry;

/// Validation stage: resolves the handler and checks the argument contract.
///
/// Runs before authorization, so an unknown command is rejected without the
/// authorizer ever seeing it.
pub struct CommandValidator {
    registry: Arc<CommandRegistry>,
}

impl CommandValidator {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self { registry }
    }

    pub fn validate(&self, command: &Command) -> Result<Arc<dyn CommandHandler>, CommandError> {
        if command.name.trim().is_empty() {
            return Err(CommandError::invalid("Command name must not be empty"));
        }

        let Some(handler) = self.registry.resolve(&command.name) else {
            return Err(CommandError::invalid(format!(
                "Unknown command '{}'",
                command.name
            )));
        };

        let min_args = handler.min_args();
        if command.args.len() < min_args {
            return Err(CommandError::invalid(format!(
                "Command '{}' requires at least {min_args} argument(s), got {}",
                handler.name(),
                command.args.len()
            )));
        }

        if let Some(allowed) = handler.allowed_args() {
            for arg in &command.args {
                let known = allowed.iter().any(|a| a.eq_ignore_ascii_case(arg));
                if !known {
                    return Err(CommandError::invalid_with_allowed(
                        format!("Argument '{arg}' is not accepted by '{}'", handler.name()),
                        allowed,
                    ));
                }
            }
        }

        Ok(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;

    use botkeeper_core::BotkeeperResult;

    use crate::command::{CommandContext, CommandSource};

    struct LogLevelHandler;

    #[async_trait]
    impl CommandHandler for LogLevelHandler {
        fn name(&self) -> &str {
            "log-level"
        }

        fn description(&self) -> &str {
            "changes the log level"
        }

        fn min_args(&self) -> usize {
            2
        }

        fn allowed_args(&self) -> Option<Vec<String>> {
            Some(vec![
                "debug".to_string(),
                "info".to_string(),
                "warn".to_string(),
            ])
        }

        async fn handle(&self, _ctx: &CommandContext) -> BotkeeperResult<Option<Value>> {
            Ok(None)
        }
    }

    fn validator() -> CommandValidator {
        let mut registry = CommandRegistry::new();
        registry.register(std::sync::Arc::new(LogLevelHandler));
        CommandValidator::new(Arc::new(registry))
    }

    fn command(name: &str, args: &[&str]) -> Command {
        Command::new(
            name,
            args.iter().map(|a| a.to_string()).collect(),
            CommandSource::Http,
            "tester",
        )
    }

    #[test]
    fn test_unknown_command_is_invalid() {
        let err = validator().validate(&command("bogus", &[])).unwrap_err();
        assert!(matches!(err, CommandError::Invalid { .. }));
    }

    #[test]
    fn test_too_few_arguments_names_the_minimum() {
        let err = validator()
            .validate(&command("log-level", &["debug"]))
            .unwrap_err();
        match err {
            CommandError::Invalid { message, .. } => assert!(message.contains("at least 2")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_argument_outside_fixed_set_lists_allowed_values() {
        let err = validator()
            .validate(&command("log-level", &["debug", "loud"]))
            .unwrap_err();
        match err {
            CommandError::Invalid { allowed_args, .. } => {
                let allowed = allowed_args.expect("allowed set attached");
                assert_eq!(allowed, vec!["debug", "info", "warn"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_fixed_set_matches_case_insensitively() {
        let handler = validator()
            .validate(&command("LOG-LEVEL", &["DEBUG", "Info"]))
            .unwrap();
        assert_eq!(handler.name(), "log-level");
    }
}
