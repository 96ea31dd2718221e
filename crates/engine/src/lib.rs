mod engine;
mod supervisor;

pub use engine::{BotEngine, BotStatusSummary};
