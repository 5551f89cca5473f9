//! Counters for hub activity
//!
//! Updated from many tasks at once, so every field is an atomic and reads go
//! through [`HubStats::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live hub counters
#[derive(Debug)]
pub struct HubStats {
    started_at: Instant,
    chat_connections: AtomicU64,
    feed_connections: AtomicU64,
    messages_received: AtomicU64,
    bytes_received: AtomicU64,
    broadcasts: AtomicU64,
    deliveries: AtomicU64,
    delivery_failures: AtomicU64,
    deliveries_dropped: AtomicU64,
    feed_ticks: AtomicU64,
}

impl HubStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            chat_connections: AtomicU64::new(0),
            feed_connections: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            deliveries_dropped: AtomicU64::new(0),
            feed_ticks: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_chat_connection(&self) {
        self.chat_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_feed_connection(&self) {
        self.feed_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_inbound(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_broadcast(&self, delivered: usize, failed: usize, dropped: usize) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.deliveries.fetch_add(delivered as u64, Ordering::Relaxed);
        self.delivery_failures.fetch_add(failed as u64, Ordering::Relaxed);
        self.deliveries_dropped.fetch_add(dropped as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_feed_tick(&self) {
        self.feed_ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current values
    pub fn snapshot(&self) -> HubStatsSnapshot {
        HubStatsSnapshot {
            uptime: self.started_at.elapsed(),
            chat_connections: self.chat_connections.load(Ordering::Relaxed),
            feed_connections: self.feed_connections.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            deliveries_dropped: self.deliveries_dropped.load(Ordering::Relaxed),
            feed_ticks: self.feed_ticks.load(Ordering::Relaxed),
        }
    }
}

impl Default for HubStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`HubStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStatsSnapshot {
    /// Time since the hub was created
    pub uptime: Duration,
    /// Chat connections accepted
    pub chat_connections: u64,
    /// Feed connections accepted
    pub feed_connections: u64,
    /// Inbound chat messages (non-empty reads)
    pub messages_received: u64,
    /// Inbound chat bytes
    pub bytes_received: u64,
    /// Broadcasts settled
    pub broadcasts: u64,
    /// Successful per-recipient writes
    pub deliveries: u64,
    /// Per-recipient writes that failed and deregistered the recipient
    pub delivery_failures: u64,
    /// Payloads dropped on full outbound queues
    pub deliveries_dropped: u64,
    /// Feed payloads written
    pub feed_ticks: u64,
}

impl HubStatsSnapshot {
    /// Average inbound message size in bytes
    pub fn average_message_size(&self) -> u64 {
        if self.messages_received > 0 {
            self.bytes_received / self.messages_received
        } else {
            0
        }
    }
}
