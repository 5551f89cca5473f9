//! Hub composition root
//!
//! The hub owns the chat registry and routes accepted transports to one of
//! two paths:
//!
//! - **chat**: the connection is registered and its read loop runs until the
//!   stream ends; every inbound message is broadcast to the registry.
//! - **feed**: the connection is *not* registered; a periodic publisher writes
//!   to it until its budget runs out, then the connection is closed.
//!
//! Hubs are plain values. Nothing is global, so tests can run as many
//! independent hubs as they like.

pub mod config;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::broadcast::Broadcaster;
use crate::connection::{Connection, ConnectionId};
use crate::publisher::{PayloadSource, PeriodicPublisher, PublishReport, StaticPayload};
use crate::registry::ConnectionRegistry;
use crate::session::{ReadLoop, ReadLoopExit};
use crate::stats::HubStats;
use crate::transport::{ReadOutcome, Transport, TransportReader};

pub use config::HubConfig;

/// Real-time connection hub
pub struct Hub {
    config: HubConfig,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Broadcaster,
    publisher: PeriodicPublisher,
    stats: Arc<HubStats>,
    feed_source: Arc<dyn PayloadSource>,
    shutdown: CancellationToken,
    next_connection_id: AtomicU64,
}

impl Hub {
    /// Create a hub whose feed publishes the default payload
    pub fn new(config: HubConfig) -> Self {
        Self::with_feed_source(config, Arc::new(StaticPayload::default()))
    }

    /// Create a hub with a custom feed payload source
    pub fn with_feed_source(config: HubConfig, feed_source: Arc<dyn PayloadSource>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let stats = Arc::new(HubStats::new());
        let shutdown = CancellationToken::new();

        let broadcaster = Broadcaster::new(
            Arc::clone(&registry),
            Arc::clone(&stats),
            config.sender_policy,
        );
        let publisher = PeriodicPublisher::new(
            Arc::clone(&registry),
            Arc::clone(&stats),
            shutdown.clone(),
        );

        Self {
            config,
            registry,
            broadcaster,
            publisher,
            stats,
            feed_source,
            shutdown,
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// Hub configuration
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Chat registry
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Chat broadcaster
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Publisher used for feed subscriptions
    pub fn publisher(&self) -> &PeriodicPublisher {
        &self.publisher
    }

    /// Activity counters
    pub fn stats(&self) -> &Arc<HubStats> {
        &self.stats
    }

    /// Wrap a transport in a connection and start its writer task
    ///
    /// The connection is not registered anywhere; the returned reader half
    /// belongs to the caller.
    pub fn admit<T: Transport>(&self, transport: T) -> (Arc<Connection>, T::Reader) {
        let id = ConnectionId::new(self.next_connection_id.fetch_add(1, Ordering::Relaxed));
        let remote = transport.remote_identity();
        let (reader, writer) = transport.split();

        let (conn, _writer_task) =
            Connection::spawn(id, remote, writer, self.config.outbound_capacity);

        (conn, reader)
    }

    /// Chat path: register the connection and relay its messages until it closes
    pub async fn on_chat_connection<T: Transport>(&self, transport: T) -> ReadLoopExit {
        let (conn, reader) = self.admit(transport);
        self.stats.record_chat_connection();

        tracing::info!(
            conn = %conn.id(),
            peer = conn.remote_identity(),
            "Chat connection opened"
        );

        self.registry.add(Arc::clone(&conn)).await;

        let exit = ReadLoop::new(
            Arc::clone(&conn),
            reader,
            self.broadcaster.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.stats),
        )
        .buffer_size(self.config.read_buffer_size)
        .max_read_errors(self.config.max_read_errors)
        .shutdown_token(self.shutdown.clone())
        .run()
        .await;

        tracing::info!(
            conn = %conn.id(),
            peer = conn.remote_identity(),
            exit = ?exit,
            "Chat connection closed"
        );

        exit
    }

    /// Feed path: publish to the connection for the configured budget, then close it
    ///
    /// Inbound frames are read and discarded so a client hang-up stops the
    /// feed early.
    pub async fn on_feed_connection<T: Transport>(&self, transport: T) -> PublishReport {
        let (conn, reader) = self.admit(transport);
        self.stats.record_feed_connection();

        tracing::info!(
            conn = %conn.id(),
            peer = conn.remote_identity(),
            "Feed connection opened"
        );

        let handle = self.publisher.start(
            Arc::clone(&conn),
            self.config.feed_job,
            Arc::clone(&self.feed_source),
        );
        tokio::spawn(drain_inbound(Arc::clone(&conn), reader));

        let report = handle.join().await;
        conn.close();

        tracing::info!(
            conn = %conn.id(),
            peer = conn.remote_identity(),
            outcome = ?report.outcome,
            ticks = report.ticks,
            "Feed connection closed"
        );

        report
    }

    /// Stop every read loop and publisher
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::info!("Hub shutting down");
        }
        self.shutdown.cancel();
    }

    /// Whether [`Hub::shutdown`] has been called
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

// Feed clients are not expected to send anything
async fn drain_inbound<R: TransportReader>(conn: Arc<Connection>, mut reader: R) {
    let mut buf = [0u8; 256];

    loop {
        let outcome = tokio::select! {
            biased;
            _ = conn.closed() => return,
            outcome = reader.read(&mut buf) => outcome,
        };

        match outcome {
            Ok(ReadOutcome::Data(_)) => {}
            Ok(ReadOutcome::Closed) => {
                tracing::debug!(conn = %conn.id(), "Feed client hung up");
                conn.close();
                return;
            }
            Err(e) => {
                tracing::debug!(conn = %conn.id(), error = %e, "Feed read failed");
                conn.close();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    use super::*;
    use crate::publisher::PublishOutcome;
    use crate::transport::StreamTransport;

    fn pipe(name: &str) -> (StreamTransport<DuplexStream>, DuplexStream) {
        let (server, client) = tokio::io::duplex(64 * 1024);
        (StreamTransport::new(server, name), client)
    }

    fn spawn_chat(
        hub: &Arc<Hub>,
        name: &str,
    ) -> (DuplexStream, tokio::task::JoinHandle<ReadLoopExit>) {
        let (transport, client) = pipe(name);
        let hub = Arc::clone(hub);
        let task = tokio::spawn(async move { hub.on_chat_connection(transport).await });
        (client, task)
    }

    async fn wait_for_members(hub: &Hub, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while hub.registry().len().await != count {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("registry never reached expected size");
    }

    async fn read_exactly(client: &mut DuplexStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut buf))
            .await
            .expect("timed out waiting for payload")
            .unwrap();
        buf
    }

    async fn assert_silent(client: &mut DuplexStream) {
        let mut buf = [0u8; 16];
        let result = tokio::time::timeout(Duration::from_millis(50), client.read(&mut buf)).await;
        assert!(result.is_err(), "unexpected bytes: {:?}", result);
    }

    #[tokio::test]
    async fn test_chat_fan_out() {
        let hub = Arc::new(Hub::default());
        let (mut a, _) = spawn_chat(&hub, "a");
        let (mut b, _) = spawn_chat(&hub, "b");
        let (mut c, _) = spawn_chat(&hub, "c");
        wait_for_members(&hub, 3).await;

        a.write_all(b"hello").await.unwrap();

        assert_eq!(read_exactly(&mut b, 5).await, b"hello");
        assert_eq!(read_exactly(&mut c, 5).await, b"hello");
        // The sender hears its own message
        assert_eq!(read_exactly(&mut a, 5).await, b"hello");

        // Exactly once
        assert_silent(&mut b).await;
        assert_silent(&mut c).await;

        assert_eq!(
            hub.registry().ids().await,
            vec![ConnectionId::new(1), ConnectionId::new(2), ConnectionId::new(3)]
        );
    }

    #[tokio::test]
    async fn test_chat_fan_out_excluding_sender() {
        let config = HubConfig::default().sender_policy(crate::broadcast::SenderPolicy::Exclude);
        let hub = Arc::new(Hub::new(config));
        let (mut a, _) = spawn_chat(&hub, "a");
        let (mut b, _) = spawn_chat(&hub, "b");
        wait_for_members(&hub, 2).await;

        a.write_all(b"hi").await.unwrap();

        assert_eq!(read_exactly(&mut b, 2).await, b"hi");
        assert_silent(&mut a).await;
    }

    #[tokio::test]
    async fn test_closed_client_is_removed() {
        let hub = Arc::new(Hub::default());
        let (a, a_task) = spawn_chat(&hub, "a");
        let (mut b, _) = spawn_chat(&hub, "b");
        wait_for_members(&hub, 2).await;

        drop(a);
        assert_eq!(a_task.await.unwrap(), ReadLoopExit::EndOfStream);
        assert_eq!(hub.registry().ids().await, vec![ConnectionId::new(2)]);

        b.write_all(b"anyone").await.unwrap();
        assert_eq!(read_exactly(&mut b, 6).await, b"anyone");

        let stats = hub.stats().snapshot();
        assert_eq!(stats.chat_connections, 2);
        assert_eq!(stats.delivery_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_delivers_for_budget() {
        let hub = Arc::new(Hub::default());
        let (transport, mut client) = pipe("d");

        let feed = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move { hub.on_feed_connection(transport).await })
        };

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();

        let report = feed.await.unwrap();
        assert_eq!(report.outcome, PublishOutcome::BudgetElapsed);
        assert_eq!(report.ticks, 12);
        assert_eq!(received, b"Order ready".repeat(12));

        // Feed connections never join the chat registry
        assert!(hub.registry().is_empty().await);
        assert_eq!(hub.stats().snapshot().chat_connections, 0);
        assert_eq!(hub.stats().snapshot().feed_connections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_stops_when_client_leaves() {
        let hub = Arc::new(Hub::default());
        let (transport, client) = pipe("d");

        let feed = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move { hub.on_feed_connection(transport).await })
        };

        tokio::time::sleep(Duration::from_secs(12)).await;
        drop(client);

        let report = feed.await.unwrap();
        assert_eq!(report.outcome, PublishOutcome::ConnectionClosed);
        assert_eq!(report.ticks, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_with_unbounded_budget() {
        let config = HubConfig::default().feed_budget(Duration::MAX);
        assert!(config.validate().is_ok());

        let hub = Arc::new(Hub::new(config));
        let (transport, mut client) = pipe("d");
        let feed = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move { hub.on_feed_connection(transport).await })
        };

        let mut first = [0u8; 11];
        client.read_exact(&mut first).await.unwrap();
        assert_eq!(&first, b"Order ready");
        hub.shutdown();

        let report = feed.await.unwrap();
        assert_eq!(report.outcome, PublishOutcome::Cancelled);
        assert_eq!(report.ticks, 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_everything() {
        let hub = Arc::new(Hub::default());
        let (_a, a_task) = spawn_chat(&hub, "a");
        wait_for_members(&hub, 1).await;

        let (transport, _d) = pipe("d");
        let feed = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move { hub.on_feed_connection(transport).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        hub.shutdown();
        hub.shutdown();

        assert_eq!(a_task.await.unwrap(), ReadLoopExit::Shutdown);
        assert_eq!(feed.await.unwrap().outcome, PublishOutcome::Cancelled);
        assert!(hub.registry().is_empty().await);
        assert!(hub.is_shutdown());
    }

    #[tokio::test]
    async fn test_hubs_are_independent() {
        let first = Arc::new(Hub::default());
        let second = Arc::new(Hub::default());
        let (mut a, _) = spawn_chat(&first, "a");
        let (mut b, _) = spawn_chat(&second, "b");
        wait_for_members(&first, 1).await;
        wait_for_members(&second, 1).await;

        a.write_all(b"first only").await.unwrap();
        assert_eq!(read_exactly(&mut a, 10).await, b"first only");
        assert_silent(&mut b).await;
    }
}
