mod breaker;
mod client;

pub use breaker::{BreakerState, CircuitBreaker};
pub use client::BotWebClient;
