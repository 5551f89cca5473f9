//! wshub: a real-time connection hub
//!
//! Two kinds of clients connect over WebSocket:
//!
//! - **Chat** clients (`/ws`) join a shared registry. Every message a chat
//!   client sends is broadcast to every registered connection.
//! - **Feed** clients (`/ws/subscribe/order-book`) receive a payload from the
//!   server every 5 seconds for 60 seconds, then the connection is closed.
//!
//! # Example
//!
//! ```no_run
//! use wshub::{HubServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> wshub::Result<()> {
//!     let server = HubServer::new(ServerConfig::default());
//!     server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```
//!
//! The [`Hub`] itself is transport agnostic; anything implementing
//! [`Transport`] can be routed to [`Hub::on_chat_connection`] or
//! [`Hub::on_feed_connection`].

pub mod broadcast;
pub mod connection;
pub mod error;
pub mod hub;
pub mod publisher;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;
pub mod transport;

pub use broadcast::{Broadcaster, DeliveryReport, SenderPolicy};
pub use connection::{Connection, ConnectionId};
pub use error::{DeliveryError, Error, Result, TransportError};
pub use hub::{Hub, HubConfig};
pub use publisher::{
    PayloadSource, PeriodicPublisher, PublishJob, PublishOutcome, PublishReport, PublisherHandle,
    StaticPayload,
};
pub use registry::ConnectionRegistry;
pub use server::{HubServer, ServerConfig};
pub use session::{ReadLoop, ReadLoopExit};
pub use stats::{HubStats, HubStatsSnapshot};
pub use transport::{
    ReadOutcome, StreamTransport, Transport, TransportReader, TransportWriter, WsTransport,
};
