pub mod arena;
pub mod config;
pub mod connection;
pub mod logging;
pub mod matchmaker;
pub mod protocol;
pub mod registry;
pub mod resolver;
pub mod server;
pub mod session;
