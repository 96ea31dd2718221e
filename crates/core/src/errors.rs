use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotkeeperError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("bot not found: {name}")]
    BotNotFound { name: String },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("bot execution error: {0}")]
    BotExecution(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("circuit breaker is open for {destination}")]
    CircuitOpen { destination: String },
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("command rejected: {0}")]
    Command(#[from] CommandError),
    #[error("operation cancelled")]
    Cancelled,
    #[error("internal error: {0}")]
    Internal(String),
}

pub type BotkeeperResult<T> = Result<T, BotkeeperError>;

impl BotkeeperError {
    pub fn storage_error<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn bot_not_found<S: Into<String>>(name: S) -> Self {
        Self::BotNotFound { name: name.into() }
    }
    pub fn execution_error<S: Into<String>>(msg: S) -> Self {
        Self::BotExecution(msg.into())
    }
    pub fn network_error<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Fatal errors abort startup; everything else is contained per-bot or
    /// per-command.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Internal(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Storage(_))
    }
}

impl From<serde_json::Error> for BotkeeperError {
    fn from(err: serde_json::Error) -> Self {
        BotkeeperError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for BotkeeperError {
    fn from(err: anyhow::Error) -> Self {
        BotkeeperError::Internal(err.to_string())
    }
}

/// Pipeline rejection carried through the command bus as a value instead of
/// distinct exception types. The category survives all the way to the
/// transport so it can be rendered as the matching problem document.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("invalid command: {message}")]
    Invalid {
        message: String,
        allowed_args: Option<Vec<String>>,
    },
    #[error("unauthorized")]
    Unauthorized,
    #[error("rate limit exceeded")]
    RateLimited,
}

impl CommandError {
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
            allowed_args: None,
        }
    }

    pub fn invalid_with_allowed<S: Into<String>>(message: S, allowed: Vec<String>) -> Self {
        Self::Invalid {
            message: message.into(),
            allowed_args: Some(allowed),
        }
    }
}
