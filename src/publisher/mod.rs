//! Timed one-way publishing
//!
//! A [`PeriodicPublisher`] writes a generated payload to one connection on a
//! fixed interval until its budget runs out.
//!
//! ```text
//!   Idle ──start()──► Running ──┬─ budget elapsed ─────► Stopped
//!                      │  ▲     ├─ cancel() / shutdown ─► Stopped
//!                   tick │      ├─ connection closed ───► Stopped
//!                      ▼  │     └─ write failed ────────► Stopped
//!                     write
//! ```
//!
//! The task services cancellation and connection close ahead of ticks, so
//! once either is observed no further tick is acted upon. A tick falling on
//! the budget deadline is serviced before the deadline: interval 5s with
//! budget 60s yields 12 payloads. Past the deadline nothing new is sent and a
//! write still in flight is no longer waited for, however slow the
//! connection. The ticker lives inside the task and is dropped on every exit
//! path.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::connection::{Connection, ConnectionId};
use crate::error::DeliveryError;
use crate::registry::ConnectionRegistry;
use crate::stats::HubStats;

/// Payload written by the default feed
pub const DEFAULT_FEED_PAYLOAD: &str = "Order ready";

/// Default time between feed payloads
pub const DEFAULT_FEED_INTERVAL: Duration = Duration::from_secs(5);

/// Default total feed duration
pub const DEFAULT_FEED_BUDGET: Duration = Duration::from_secs(60);

// tokio intervals cannot have a zero period
const MIN_INTERVAL: Duration = Duration::from_millis(1);

// Longest interval or budget honored; anything larger never elapses in practice
const MAX_SPAN: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// Produces the payload for each tick
pub trait PayloadSource: Send + Sync + 'static {
    /// Payload for tick `tick` (1-based)
    fn payload(&self, tick: u64) -> Bytes;
}

impl<F> PayloadSource for F
where
    F: Fn(u64) -> Bytes + Send + Sync + 'static,
{
    fn payload(&self, tick: u64) -> Bytes {
        self(tick)
    }
}

/// The same payload on every tick
#[derive(Debug, Clone)]
pub struct StaticPayload(Bytes);

impl StaticPayload {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self(payload.into())
    }
}

impl Default for StaticPayload {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_PAYLOAD)
    }
}

impl PayloadSource for StaticPayload {
    fn payload(&self, _tick: u64) -> Bytes {
        self.0.clone()
    }
}

/// Timing for one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishJob {
    /// Time between payloads; the first payload goes out one interval after start
    pub interval: Duration,
    /// Total running time
    pub budget: Duration,
}

impl PublishJob {
    pub fn new(interval: Duration, budget: Duration) -> Self {
        Self { interval, budget }
    }

    /// Number of ticks a job that runs to completion delivers
    pub fn expected_ticks(&self) -> u64 {
        let interval = self.interval.clamp(MIN_INTERVAL, MAX_SPAN).as_nanos();
        (self.budget.min(MAX_SPAN).as_nanos() / interval) as u64
    }
}

impl Default for PublishJob {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_INTERVAL, DEFAULT_FEED_BUDGET)
    }
}

/// Why a publisher stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Ran for its whole budget
    BudgetElapsed,
    /// Cancelled through its handle or by hub shutdown
    Cancelled,
    /// The connection was closed by someone else
    ConnectionClosed,
    /// A write failed; the connection was closed
    WriteFailed,
}

/// Final state of a stopped publisher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub outcome: PublishOutcome,
    /// Payloads written successfully
    pub ticks: u64,
}

/// Starts timed publishers
#[derive(Clone)]
pub struct PeriodicPublisher {
    registry: Arc<ConnectionRegistry>,
    stats: Arc<HubStats>,
    shutdown: CancellationToken,
}

impl PeriodicPublisher {
    /// Create a publisher
    ///
    /// Every started job is cancelled when `shutdown` is.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        stats: Arc<HubStats>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            stats,
            shutdown,
        }
    }

    /// Start publishing to `conn`
    ///
    /// The job runs detached; dropping the handle does not stop it.
    pub fn start(
        &self,
        conn: Arc<Connection>,
        job: PublishJob,
        source: Arc<dyn PayloadSource>,
    ) -> PublisherHandle {
        let cancel = self.shutdown.child_token();
        let id = conn.id();

        let task = tokio::spawn(run_job(
            conn,
            job,
            source,
            Arc::clone(&self.registry),
            Arc::clone(&self.stats),
            cancel.clone(),
        ));

        PublisherHandle { id, cancel, task }
    }
}

/// Control handle for a running publisher
pub struct PublisherHandle {
    id: ConnectionId,
    cancel: CancellationToken,
    task: JoinHandle<PublishReport>,
}

impl PublisherHandle {
    /// Connection the job publishes to
    pub fn connection_id(&self) -> ConnectionId {
        self.id
    }

    /// Ask the job to stop; idempotent, and a no-op once it has stopped
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the job has stopped
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the job to stop
    pub async fn join(self) -> PublishReport {
        match self.task.await {
            Ok(report) => report,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            // Only happens when the runtime is going away
            Err(_) => PublishReport {
                outcome: PublishOutcome::Cancelled,
                ticks: 0,
            },
        }
    }
}

async fn run_job(
    conn: Arc<Connection>,
    job: PublishJob,
    source: Arc<dyn PayloadSource>,
    registry: Arc<ConnectionRegistry>,
    stats: Arc<HubStats>,
    cancel: CancellationToken,
) -> PublishReport {
    let id = conn.id();
    let interval = job.interval.clamp(MIN_INTERVAL, MAX_SPAN);
    let start = Instant::now();
    let deadline = start + job.budget.min(MAX_SPAN);

    let mut ticker = time::interval_at(start + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let budget = time::sleep_until(deadline);
    tokio::pin!(budget);
    // A write started on the deadline tick may still finish; later ones may not
    let overrun = time::sleep_until(deadline + MIN_INTERVAL);
    tokio::pin!(overrun);

    tracing::debug!(
        conn = %id,
        peer = conn.remote_identity(),
        interval_ms = interval.as_millis() as u64,
        budget_ms = job.budget.as_millis() as u64,
        "Publisher started"
    );

    let mut ticks = 0u64;
    let outcome = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break PublishOutcome::Cancelled,
            _ = conn.closed() => break PublishOutcome::ConnectionClosed,
            _ = ticker.tick() => {}
            _ = &mut budget => break PublishOutcome::BudgetElapsed,
        }

        // A slow writer keeps the ticker permanently due
        if Instant::now() > deadline {
            break PublishOutcome::BudgetElapsed;
        }

        let payload = source.payload(ticks + 1);
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => break PublishOutcome::Cancelled,
            sent = conn.send(payload) => sent,
            _ = &mut overrun => {
                tracing::debug!(conn = %id, "Feed write still pending at budget deadline");
                break PublishOutcome::BudgetElapsed;
            }
        };

        match sent {
            Ok(()) => {
                ticks += 1;
                stats.record_feed_tick();
                tracing::trace!(conn = %id, tick = ticks, "Feed payload written");
            }
            Err(DeliveryError::QueueFull) => {
                tracing::warn!(conn = %id, "Feed payload dropped, outbound queue full");
            }
            Err(DeliveryError::Closed) => break PublishOutcome::ConnectionClosed,
            Err(e) => {
                tracing::warn!(
                    conn = %id,
                    peer = conn.remote_identity(),
                    error = %e,
                    "Feed write failed"
                );
                break PublishOutcome::WriteFailed;
            }
        }
    };

    if outcome == PublishOutcome::WriteFailed {
        conn.close();
    }
    registry.remove(id).await;

    tracing::debug!(conn = %id, outcome = ?outcome, ticks = ticks, "Publisher stopped");

    PublishReport { outcome, ticks }
}
