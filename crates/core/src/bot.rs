use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::BotkeeperResult;
use crate::models::{BotSettings, StorageKind};

/// Contract every supervised bot implements.
///
/// The engine owns the *current* settings once a bot is registered; the
/// trait only supplies the initial snapshot. `run` is invoked repeatedly by
/// the supervision loop and must observe `cancel` at its suspension points.
/// Returning an error counts as a crash; cancellation does not.
#[async_trait]
pub trait Bot: Send + Sync {
    /// Unique, case-insensitive identifier.
    fn name(&self) -> &str;

    /// Settings applied on first discovery, unless a persisted copy exists.
    fn settings(&self) -> BotSettings {
        BotSettings::default()
    }

    /// Preferred backend for this bot's runtime state.
    fn state_storage(&self) -> StorageKind {
        StorageKind::InMemory
    }

    async fn run(&self, cancel: CancellationToken) -> BotkeeperResult<()>;
}
