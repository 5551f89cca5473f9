//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::hub::HubConfig;

/// Default bind address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Default chat route
pub const DEFAULT_CHAT_PATH: &str = "/ws";

/// Default feed subscription route
pub const DEFAULT_FEED_PATH: &str = "/ws/subscribe/order-book";

/// Default health route
pub const DEFAULT_HEALTH_PATH: &str = "/health";

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Route that upgrades to a chat connection
    pub chat_path: String,

    /// Route that upgrades to a feed subscription
    pub feed_path: String,

    /// Plain HTTP liveness route
    pub health_path: String,

    /// How often hub stats are logged (zero disables)
    pub stats_interval: Duration,

    /// Settings for the hub behind the routes
    pub hub: HubConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            chat_path: DEFAULT_CHAT_PATH.to_string(),
            feed_path: DEFAULT_FEED_PATH.to_string(),
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            stats_interval: Duration::from_secs(30),
            hub: HubConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the chat route
    pub fn chat_path(mut self, path: impl Into<String>) -> Self {
        self.chat_path = path.into();
        self
    }

    /// Set the feed route
    pub fn feed_path(mut self, path: impl Into<String>) -> Self {
        self.feed_path = path.into();
        self
    }

    /// Set the health route
    pub fn health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = path.into();
        self
    }

    /// Set the stats logging interval
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    /// Replace the hub settings
    pub fn hub(mut self, hub: HubConfig) -> Self {
        self.hub = hub;
        self
    }

    /// Check routes and hub settings
    pub fn validate(&self) -> Result<()> {
        let paths = [&self.chat_path, &self.feed_path, &self.health_path];

        for path in paths {
            if !path.starts_with('/') {
                return Err(Error::Config(format!(
                    "route '{}' must start with '/'",
                    path
                )));
            }
        }

        if self.chat_path == self.feed_path
            || self.chat_path == self.health_path
            || self.feed_path == self.health_path
        {
            return Err(Error::Config("routes must be distinct".into()));
        }

        self.hub.validate()
    }
}
