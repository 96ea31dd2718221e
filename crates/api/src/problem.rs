use serde::{Deserialize, Serialize};

use botkeeper_core::{BotkeeperError, CommandError};

pub mod problem_type {
    pub const INVALID_COMMAND: &str = "https://botkeeper.dev/problems/invalid-command";
    pub const UNAUTHORIZED: &str = "https://botkeeper.dev/problems/unauthorized";
    pub const RATE_LIMITED: &str = "https://botkeeper.dev/problems/rate-limited";
    pub const NOT_FOUND: &str = "https://botkeeper.dev/problems/not-found";
    pub const INTERNAL_ERROR: &str = "https://botkeeper.dev/problems/internal-error";
}

/// Structured error payload rendered by every command source.
///
/// Follows the RFC 7807 field names; `allowed_args` is attached only to
/// invalid-command problems that carry a whitelist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDocument {
    pub status: u16,
    pub title: String,
    #[serde(rename = "type")]
    pub problem_type: String,
    pub detail: String,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_args: Option<Vec<String>>,
}

impl ProblemDocument {
    pub fn from_error(error: &BotkeeperError, correlation_id: &str) -> Self {
        match error {
            BotkeeperError::Command(CommandError::Invalid {
                message,
                allowed_args,
            }) => Self {
                status: 400,
                title: "Invalid command".to_string(),
                problem_type: problem_type::INVALID_COMMAND.to_string(),
                detail: message.clone(),
                correlation_id: correlation_id.to_string(),
                allowed_args: allowed_args.clone(),
            },
            BotkeeperError::Command(CommandError::Unauthorized) => Self {
                status: 401,
                title: "Unauthorized".to_string(),
                problem_type: problem_type::UNAUTHORIZED.to_string(),
                detail: "The presented token is not valid for this source".to_string(),
                correlation_id: correlation_id.to_string(),
                allowed_args: None,
            },
            BotkeeperError::Command(CommandError::RateLimited) => Self {
                status: 429,
                title: "Rate limited".to_string(),
                problem_type: problem_type::RATE_LIMITED.to_string(),
                detail: "Too many concurrent commands, try again shortly".to_string(),
                correlation_id: correlation_id.to_string(),
                allowed_args: None,
            },
            BotkeeperError::BotNotFound { name } => Self {
                status: 404,
                title: "Not found".to_string(),
                problem_type: problem_type::NOT_FOUND.to_string(),
                detail: format!("No bot named '{name}' is registered"),
                correlation_id: correlation_id.to_string(),
                allowed_args: None,
            },
            other => Self {
                status: 500,
                title: "Internal error".to_string(),
                problem_type: problem_type::INTERNAL_ERROR.to_string(),
                detail: other.to_string(),
                correlation_id: correlation_id.to_string(),
                allowed_args: None,
            },
        }
    }
}
