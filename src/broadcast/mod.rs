//! Chat fan-out
//!
//! A broadcast runs in two phases:
//!
//! 1. [`Broadcaster::dispatch`] snapshots the registry and enqueues the
//!    payload on every recipient's outbound queue. Enqueueing never blocks,
//!    so the caller keeps its place in each recipient's queue and a source's
//!    broadcasts reach any given connection in the order they were made.
//! 2. [`Dispatch::settle`] waits for every recipient's write in its own
//!    task inside a `JoinSet`. A slow recipient holds up only its own task.
//!    Recipients whose write failed, or that were already closed, are closed
//!    and removed from the registry. Nothing is retried, and one recipient's
//!    failure never stops delivery to the others.
//!
//! Payloads are `Bytes`: immutable, so every recipient reads the same bytes
//! without any of them being able to change them.

use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinSet;

use crate::connection::{Connection, ConnectionId, Delivery};
use crate::error::DeliveryError;
use crate::registry::ConnectionRegistry;
use crate::stats::HubStats;

/// Whether the originating connection receives its own broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderPolicy {
    /// Every registered connection receives the payload, the sender included
    #[default]
    Include,
    /// The sender is skipped
    Exclude,
}

/// Outcome of one settled broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Recipients the payload was addressed to
    pub attempted: usize,
    /// Recipients whose write succeeded
    pub delivered: usize,
    /// Recipients that failed and were deregistered, in ascending id order
    pub failed: Vec<ConnectionId>,
    /// Recipients that skipped this payload because their queue was full
    pub dropped: Vec<ConnectionId>,
}

/// Delivers payloads to every registered connection
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    stats: Arc<HubStats>,
    policy: SenderPolicy,
}

impl Broadcaster {
    /// Create a broadcaster over a registry
    pub fn new(registry: Arc<ConnectionRegistry>, stats: Arc<HubStats>, policy: SenderPolicy) -> Self {
        Self {
            registry,
            stats,
            policy,
        }
    }

    /// Sender policy in effect
    pub fn policy(&self) -> SenderPolicy {
        self.policy
    }

    /// Enqueue `payload` for every current recipient
    ///
    /// `origin` is the sending connection, if any; it only matters under
    /// [`SenderPolicy::Exclude`].
    pub async fn dispatch(&self, origin: Option<ConnectionId>, payload: Bytes) -> Dispatch {
        let recipients = self.registry.snapshot().await;
        let mut pending = Vec::with_capacity(recipients.len());

        for conn in recipients {
            if self.policy == SenderPolicy::Exclude && origin == Some(conn.id()) {
                continue;
            }
            let queued = conn.enqueue(payload.clone());
            pending.push((conn, queued));
        }

        tracing::trace!(
            origin = ?origin.map(|id| id.as_u64()),
            recipients = pending.len(),
            size = payload.len(),
            "Broadcast dispatched"
        );

        Dispatch {
            registry: Arc::clone(&self.registry),
            stats: Arc::clone(&self.stats),
            pending,
        }
    }

    /// Dispatch and wait for every recipient to settle
    pub async fn broadcast(&self, origin: Option<ConnectionId>, payload: Bytes) -> DeliveryReport {
        self.dispatch(origin, payload).await.settle().await
    }
}

/// A broadcast whose payload is queued but not yet confirmed
pub struct Dispatch {
    registry: Arc<ConnectionRegistry>,
    stats: Arc<HubStats>,
    pending: Vec<(Arc<Connection>, Result<Delivery, DeliveryError>)>,
}

impl Dispatch {
    /// Number of recipients
    pub fn recipients(&self) -> usize {
        self.pending.len()
    }

    /// Wait for every recipient's write and clean up the failures
    pub async fn settle(self) -> DeliveryReport {
        let mut report = DeliveryReport {
            attempted: self.pending.len(),
            ..Default::default()
        };

        let mut deliveries = JoinSet::new();
        for (conn, queued) in self.pending {
            deliveries.spawn(async move {
                let result = match queued {
                    Ok(delivery) => delivery.settled().await,
                    Err(e) => Err(e),
                };
                (conn, result)
            });
        }

        while let Some(joined) = deliveries.join_next().await {
            let (conn, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, "Delivery task failed");
                    continue;
                }
            };

            match result {
                Ok(()) => report.delivered += 1,
                Err(e) if e.is_terminal() => {
                    tracing::warn!(
                        conn = %conn.id(),
                        peer = conn.remote_identity(),
                        error = %e,
                        "Broadcast delivery failed, dropping connection"
                    );
                    conn.close();
                    self.registry.remove(conn.id()).await;
                    report.failed.push(conn.id());
                }
                Err(e) => {
                    tracing::warn!(
                        conn = %conn.id(),
                        peer = conn.remote_identity(),
                        error = %e,
                        "Broadcast payload dropped for slow connection"
                    );
                    report.dropped.push(conn.id());
                }
            }
        }

        report.failed.sort();
        report.dropped.sort();
        self.stats
            .record_broadcast(report.delivered, report.failed.len(), report.dropped.len());

        report
    }
}
