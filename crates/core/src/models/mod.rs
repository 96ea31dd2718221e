mod bot;
mod http;

pub use bot::{
    ActionResult, BotRuntimeState, BotSettings, BotStatus, BotStatusReport, StorageKind,
    DEFAULT_RUN_INTERVAL,
};
pub use http::{BasicCredentials, BotHttpSettings, BotsHttpSettings};
