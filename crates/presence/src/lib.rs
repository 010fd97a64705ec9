// tandem-presence: presence and selection sync over an awareness channel.

pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod registry;
pub mod session;
