use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pause between successful runs when a bot does not configure its own
/// interval.
pub const DEFAULT_RUN_INTERVAL: Duration = Duration::from_secs(60);

/// Which backend holds a bot's persisted runtime state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    InMemory,
    Durable,
}

impl Default for StorageKind {
    fn default() -> Self {
        Self::InMemory
    }
}

/// Lifecycle state of a supervised bot.
///
/// `Disabled` and `PermanentlyStopped` are parked states: the supervision
/// loop persists them and then suspends until externally cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotStatus {
    Idle,
    Running,
    Crashed,
    Disabled,
    PermanentlyStopped,
    Stopped,
}

impl BotStatus {
    /// Terminal states require an explicit restart or reset to leave.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::PermanentlyStopped)
    }
}

impl std::fmt::Display for BotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Crashed => "crashed",
            Self::Disabled => "disabled",
            Self::PermanentlyStopped => "permanently_stopped",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotSettings {
    pub enabled: bool,
    /// Pause between successful runs; `None` falls back to
    /// [`DEFAULT_RUN_INTERVAL`].
    pub run_interval: Option<Duration>,
    pub max_failures: u32,
    pub restart_delay: Duration,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            run_interval: None,
            max_failures: 3,
            restart_delay: Duration::from_secs(5),
        }
    }
}

impl BotSettings {
    pub fn effective_run_interval(&self) -> Duration {
        self.run_interval.unwrap_or(DEFAULT_RUN_INTERVAL)
    }
}

/// Per-bot mutable record persisted after every status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotRuntimeState {
    pub bot_name: String,
    pub status: BotStatus,
    pub crash_count: u32,
    pub next_run_utc: Option<DateTime<Utc>>,
}

impl BotRuntimeState {
    pub fn initial(bot_name: &str, enabled: bool) -> Self {
        Self {
            bot_name: bot_name.to_string(),
            status: if enabled {
                BotStatus::Idle
            } else {
                BotStatus::Disabled
            },
            crash_count: 0,
            next_run_utc: Some(Utc::now()),
        }
    }
}

/// Full status answer for a single bot, including a human-readable reason
/// derived from the current state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotStatusReport {
    pub name: String,
    pub status: BotStatus,
    pub crash_count: u32,
    pub settings: BotSettings,
    pub is_running: bool,
    pub next_run: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

/// Outcome of an engine control operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub reason: Option<String>,
}

impl ActionResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            reason: None,
        }
    }

    pub fn ok_with<S: Into<String>>(reason: S) -> Self {
        Self {
            success: true,
            reason: Some(reason.into()),
        }
    }

    pub fn fail<S: Into<String>>(reason: S) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
        }
    }
}
