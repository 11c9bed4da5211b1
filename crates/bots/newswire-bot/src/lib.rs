pub mod bot;
pub mod composer;
pub mod lifecycle;
pub mod notifier;
pub mod publisher;
pub mod scorer;
pub mod source;

pub const PROJECT_NAME: &str = "newswire-bot";
pub const LOG_TARGET: &str = "newswire_bot::main";

/// User agent sent with every outgoing HTTP request.
pub(crate) const USER_AGENT: &str = concat!("newswire-bot/", env!("CARGO_PKG_VERSION"));
