//! Hub server
//!
//! axum routes for the chat and feed paths plus the listener that serves them.

pub mod config;
pub mod listener;
pub mod router;

pub use config::ServerConfig;
pub use listener::HubServer;
pub use router::hub_router;
