//! Hub configuration

use std::time::Duration;

use crate::broadcast::SenderPolicy;
use crate::error::{Error, Result};
use crate::publisher::PublishJob;
use crate::session::read_loop::{DEFAULT_MAX_READ_ERRORS, DEFAULT_READ_BUFFER_SIZE};

/// Default per-connection outbound queue capacity
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Hub configuration options
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum bytes taken from a chat connection per read
    pub read_buffer_size: usize,

    /// Payloads that may wait for a slow connection before new ones are dropped
    pub outbound_capacity: usize,

    /// Consecutive transient read errors before a chat connection is dropped (0 = never, the default)
    pub max_read_errors: u32,

    /// Whether chat senders receive their own messages
    pub sender_policy: SenderPolicy,

    /// Timing of feed subscriptions
    pub feed_job: PublishJob,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            max_read_errors: DEFAULT_MAX_READ_ERRORS,
            sender_policy: SenderPolicy::Include,
            feed_job: PublishJob::default(),
        }
    }
}

impl HubConfig {
    /// Set the read buffer size
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the outbound queue capacity
    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }

    /// Set the consecutive read error limit
    pub fn max_read_errors(mut self, limit: u32) -> Self {
        self.max_read_errors = limit;
        self
    }

    /// Set the sender policy
    pub fn sender_policy(mut self, policy: SenderPolicy) -> Self {
        self.sender_policy = policy;
        self
    }

    /// Set the feed interval
    pub fn feed_interval(mut self, interval: Duration) -> Self {
        self.feed_job.interval = interval;
        self
    }

    /// Set the feed budget
    pub fn feed_budget(mut self, budget: Duration) -> Self {
        self.feed_job.budget = budget;
        self
    }

    /// Check the values are usable
    pub fn validate(&self) -> Result<()> {
        if self.read_buffer_size == 0 {
            return Err(Error::Config("read_buffer_size must be at least 1".into()));
        }
        if self.outbound_capacity == 0 {
            return Err(Error::Config("outbound_capacity must be at least 1".into()));
        }
        if self.feed_job.interval.is_zero() {
            return Err(Error::Config("feed interval must be non-zero".into()));
        }
        Ok(())
    }
}
