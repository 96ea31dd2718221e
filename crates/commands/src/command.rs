use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transport a command arrived over. Authorization tokens are configured per
/// source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSource {
    Http,
    Telegram,
}

impl std::fmt::Display for CommandSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http => f.write_str("http"),
            Self::Telegram => f.write_str("telegram"),
        }
    }
}

/// One inbound request, immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
    pub source: CommandSource,
    pub sender_id: String,
    pub timestamp: DateTime<Utc>,
}

impl Command {
    pub fn new(
        name: impl Into<String>,
        args: Vec<String>,
        source: CommandSource,
        sender_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            args,
            source,
            sender_id: sender_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A [`Command`] plus the transport-supplied credential and the correlation
/// id threaded through logging and responses.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub command: Command,
    pub token: Option<String>,
    pub correlation_id: String,
}

impl CommandContext {
    pub fn new(
        command: Command,
        token: Option<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            command,
            token,
            correlation_id: correlation_id.into(),
        }
    }
}
