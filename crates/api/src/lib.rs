mod http;
mod problem;
mod telegram;

pub use http::{command_router, serve_http, CORRELATION_HEADER};
pub use problem::{problem_type, ProblemDocument};
pub use telegram::TelegramSource;
