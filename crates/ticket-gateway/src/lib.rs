pub mod auth;
pub mod config;
pub mod items;
pub mod server;
pub mod telemetry;
pub mod tickets;
