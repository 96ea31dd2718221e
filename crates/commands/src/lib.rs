mod authorize;
mod bus;
mod command;
mod handler;
pub mod handlers;
mod rate_limit;
mod registry;
mod validate;

pub use authorize::CommandAuthorizer;
pub use bus::CommandBus;
pub use command::{Command, CommandContext, CommandSource};
pub use handler::{CommandHandler, CommandInfo};
pub use rate_limit::CommandRateLimiter;
pub use registry::CommandRegistry;
pub use validate::CommandValidator;
