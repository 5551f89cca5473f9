//! Chat read loop
//!
//! Owns a chat connection's reader half until the stream ends. Every
//! non-empty read becomes exactly one broadcast. The payload is copied out of
//! the loop's reusable buffer before dispatch, so nothing downstream aliases
//! it.
//!
//! Transient read errors are logged and the read is retried. A run of
//! `max_read_errors` consecutive failures is treated as a dead stream (0
//! disables the limit).

use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::broadcast::Broadcaster;
use crate::connection::Connection;
use crate::registry::ConnectionRegistry;
use crate::stats::HubStats;
use crate::transport::{ReadOutcome, TransportReader};

/// Default inbound read size in bytes
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Default limit on consecutive transient read errors (0 = retry forever)
pub const DEFAULT_MAX_READ_ERRORS: u32 = 0;

/// Why a read loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadLoopExit {
    /// The client closed the stream
    EndOfStream,
    /// Too many consecutive read errors
    TooManyErrors,
    /// The connection was closed elsewhere (e.g. a failed write)
    ConnectionClosed,
    /// The hub is shutting down
    Shutdown,
}

/// Reads a connection's inbound stream and feeds the broadcaster
pub struct ReadLoop<R> {
    conn: Arc<Connection>,
    reader: R,
    broadcaster: Broadcaster,
    registry: Arc<ConnectionRegistry>,
    stats: Arc<HubStats>,
    shutdown: CancellationToken,
    buffer_size: usize,
    max_read_errors: u32,
}

impl<R: TransportReader> ReadLoop<R> {
    /// Create a read loop with default limits
    pub fn new(
        conn: Arc<Connection>,
        reader: R,
        broadcaster: Broadcaster,
        registry: Arc<ConnectionRegistry>,
        stats: Arc<HubStats>,
    ) -> Self {
        Self {
            conn,
            reader,
            broadcaster,
            registry,
            stats,
            shutdown: CancellationToken::new(),
            buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_read_errors: DEFAULT_MAX_READ_ERRORS,
        }
    }

    /// Set the read buffer size (minimum 1)
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// Set the consecutive read error limit (0 = retry forever)
    pub fn max_read_errors(mut self, limit: u32) -> Self {
        self.max_read_errors = limit;
        self
    }

    /// Stop when this token is cancelled
    pub fn shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Run until the stream ends
    ///
    /// On every exit path the connection is closed and removed from the
    /// registry.
    pub async fn run(mut self) -> ReadLoopExit {
        let id = self.conn.id();
        let mut buf = vec![0u8; self.buffer_size];
        let mut consecutive_errors = 0u32;

        let exit = loop {
            let outcome = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break ReadLoopExit::Shutdown,
                _ = self.conn.closed() => break ReadLoopExit::ConnectionClosed,
                outcome = self.reader.read(&mut buf) => outcome,
            };

            match outcome {
                Ok(ReadOutcome::Closed) => break ReadLoopExit::EndOfStream,
                // Control frames and empty reads say nothing about stream health
                Ok(ReadOutcome::Data(0)) => {}
                Ok(ReadOutcome::Data(n)) => {
                    consecutive_errors = 0;
                    self.stats.record_inbound(n);

                    let payload = Bytes::copy_from_slice(&buf[..n]);
                    let dispatch = self.broadcaster.dispatch(Some(id), payload).await;
                    tracing::trace!(conn = %id, size = n, recipients = dispatch.recipients(), "Inbound message");

                    // Queue positions are already taken; confirmation happens off the read path
                    tokio::spawn(dispatch.settle());
                }
                Err(e) => {
                    consecutive_errors += 1;
                    tracing::warn!(
                        conn = %id,
                        peer = self.conn.remote_identity(),
                        error = %e,
                        consecutive = consecutive_errors,
                        "Read error"
                    );

                    if self.max_read_errors > 0 && consecutive_errors >= self.max_read_errors {
                        break ReadLoopExit::TooManyErrors;
                    }
                }
            }
        };

        self.conn.close();
        self.registry.remove(id).await;

        tracing::debug!(
            conn = %id,
            peer = self.conn.remote_identity(),
            exit = ?exit,
            "Read loop finished"
        );

        exit
    }
}
