//! Hub-side connection handle
//!
//! Every admitted transport gets a [`Connection`]: an identity plus an
//! ordered outbound queue. The queue is drained by exactly one writer task
//! that owns the transport's writer half, so writes to a connection are
//! serialised and leave in the order they were enqueued, no matter how many
//! broadcasters and publishers target it.
//!
//! ```text
//!   broadcast ──┐
//!   broadcast ──┼──► outbox (FIFO) ──► writer task ──► TransportWriter
//!   publisher ──┘         │                  │
//!                         └── ack (oneshot) ◄┘
//! ```
//!
//! The first failed write closes the connection. Closing cancels the
//! connection's token, which stops the writer task and tells the read loop
//! and any publisher to stop too.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{DeliveryError, TransportError};
use crate::transport::TransportWriter;

/// Process-unique connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Create an id from a raw value
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A payload waiting in a connection's outbox
struct Outbound {
    payload: Bytes,
    ack: oneshot::Sender<Result<(), TransportError>>,
}

/// One live client connection
pub struct Connection {
    id: ConnectionId,
    remote: String,
    outbox: mpsc::Sender<Outbound>,
    closed: CancellationToken,
}

impl Connection {
    /// Create a connection and spawn its writer task
    ///
    /// `capacity` bounds the outbound queue. The returned handle resolves when
    /// the writer task has closed the transport.
    pub fn spawn<W>(
        id: ConnectionId,
        remote: impl Into<String>,
        writer: W,
        capacity: usize,
    ) -> (Arc<Self>, JoinHandle<()>)
    where
        W: TransportWriter,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let conn = Arc::new(Self {
            id,
            remote: remote.into(),
            outbox: tx,
            closed: CancellationToken::new(),
        });

        let task = tokio::spawn(write_loop(id, writer, rx, conn.closed.clone()));
        (conn, task)
    }

    /// Connection id
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote identity (peer address)
    pub fn remote_identity(&self) -> &str {
        &self.remote
    }

    /// Queue a payload without waiting for it to be written
    ///
    /// Never blocks. The returned [`Delivery`] resolves once the writer task
    /// has attempted the write.
    pub fn enqueue(&self, payload: Bytes) -> Result<Delivery, DeliveryError> {
        if self.closed.is_cancelled() {
            return Err(DeliveryError::Closed);
        }

        let (ack, rx) = oneshot::channel();
        match self.outbox.try_send(Outbound { payload, ack }) {
            Ok(()) => Ok(Delivery { rx }),
            Err(mpsc::error::TrySendError::Full(_)) => Err(DeliveryError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DeliveryError::Closed),
        }
    }

    /// Queue a payload and wait for the write to complete
    pub async fn send(&self, payload: Bytes) -> Result<(), DeliveryError> {
        self.enqueue(payload)?.settled().await
    }

    /// Close the connection
    ///
    /// Idempotent. Pending writes are abandoned and report `Closed`.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether the connection has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the connection is closed
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote", &self.remote)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Pending outcome of one queued write
#[derive(Debug)]
pub struct Delivery {
    rx: oneshot::Receiver<Result<(), TransportError>>,
}

impl Delivery {
    /// Wait for the writer task to attempt the write
    pub async fn settled(self) -> Result<(), DeliveryError> {
        match self.rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(DeliveryError::Write(e)),
            // Writer task dropped the payload because the connection closed
            Err(_) => Err(DeliveryError::Closed),
        }
    }
}

async fn write_loop<W: TransportWriter>(
    id: ConnectionId,
    mut writer: W,
    mut rx: mpsc::Receiver<Outbound>,
    closed: CancellationToken,
) {
    loop {
        let outbound = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            next = rx.recv() => match next {
                Some(outbound) => outbound,
                None => break,
            },
        };

        let result = tokio::select! {
            biased;
            // Closing abandons the write in progress; its waiter sees `Closed`
            _ = closed.cancelled() => break,
            result = writer.write(&outbound.payload) => result,
        };
        let failed = match &result {
            Ok(()) => false,
            Err(e) => {
                tracing::debug!(conn = %id, error = %e, "Write failed, closing connection");
                true
            }
        };

        // The waiter may have given up; that is fine
        let _ = outbound.ack.send(result);

        if failed {
            closed.cancel();
            break;
        }
    }

    rx.close();
    writer.close().await;
    tracing::trace!(conn = %id, "Writer task finished");
}
