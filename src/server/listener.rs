//! Hub server listener
//!
//! Binds the TCP listener and serves the hub routes until shut down.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::hub::Hub;
use crate::server::config::ServerConfig;
use crate::server::router::hub_router;

/// WebSocket hub server
pub struct HubServer {
    config: ServerConfig,
    hub: Arc<Hub>,
}

impl HubServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        let hub = Arc::new(Hub::new(config.hub.clone()));
        Self { config, hub }
    }

    /// Create a server around an existing hub
    ///
    /// `config.hub` is ignored; the hub keeps its own settings.
    pub fn with_hub(config: ServerConfig, hub: Arc<Hub>) -> Self {
        Self { config, hub }
    }

    /// Get a reference to the hub
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the listener fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.config.validate()?;
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// When `shutdown` resolves the hub is shut down as well, which ends
    /// every open chat and feed connection.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            addr = %addr,
            chat = %self.config.chat_path,
            feed = %self.config.feed_path,
            "Hub server listening"
        );

        let stats_handle = self.spawn_stats_task();

        let hub = Arc::clone(&self.hub);
        let signal = async move {
            shutdown.await;
            tracing::info!("Shutdown signal received");
            hub.shutdown();
        };

        let app = hub_router(Arc::clone(&self.hub), &self.config);
        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await;

        self.hub.shutdown();
        if let Some(handle) = stats_handle {
            handle.abort();
        }

        result?;
        Ok(())
    }

    fn spawn_stats_task(&self) -> Option<JoinHandle<()>> {
        let period = self.config.stats_interval;
        if period.is_zero() {
            return None;
        }

        let hub = Arc::clone(&self.hub);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let stats = hub.stats().snapshot();
                let members = hub.registry().len().await;

                tracing::info!(
                    members = members,
                    chat_connections = stats.chat_connections,
                    feed_connections = stats.feed_connections,
                    messages = stats.messages_received,
                    deliveries = stats.deliveries,
                    failures = stats.delivery_failures,
                    dropped = stats.deliveries_dropped,
                    feed_ticks = stats.feed_ticks,
                    "Hub stats"
                );
            }
        }))
    }
}
