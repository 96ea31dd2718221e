pub mod bot;
pub mod config;
pub mod errors;
pub mod models;

pub use bot::Bot;
pub use config::AppConfig;
pub use errors::{BotkeeperError, BotkeeperResult, CommandError};
pub use models::{
    ActionResult, BasicCredentials, BotHttpSettings, BotRuntimeState, BotSettings, BotStatus,
    BotStatusReport, BotsHttpSettings, StorageKind,
};
