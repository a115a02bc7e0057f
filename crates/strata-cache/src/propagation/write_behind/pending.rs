//! Deferred system-of-record mutations

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use strata_cache_core::{CacheError, PendingOperation, Result, SystemOfRecord};

/// Snapshot of a queued mutation
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWriteInfo {
    pub key: String,
    pub operation: PendingOperation,
    /// Failed attempts so far
    pub retries: u32,
    /// Time spent in the queue
    pub age: Duration,
    /// Error from the most recent failed attempt
    pub last_error: Option<String>,
}

/// Callback invoked once when a mutation is dropped after its last retry
pub type FailureCallback = Arc<dyn Fn(&PendingWriteInfo, &CacheError) + Send + Sync>;

/// Outcome of one flush pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Mutations sent to the system of record
    pub attempted: usize,
    /// Mutations applied and removed from the queue
    pub succeeded: usize,
    /// Mutations that failed and were scheduled again
    pub retried: usize,
    /// Mutations dropped after exhausting their retries
    pub dropped: usize,
    /// Another flush was already running, nothing was done
    pub skipped: bool,
}

impl FlushReport {
    pub(crate) fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

pub(crate) struct PendingWrite {
    pub key: String,
    pub operation: PendingOperation,
    pub target: Arc<dyn SystemOfRecord>,
    /// Bumped on every enqueue; a flush only settles the generation it sent
    pub generation: u64,
    pub enqueued_at: Instant,
    pub not_before: Instant,
    pub retries: u32,
    pub last_error: Option<String>,
}

impl PendingWrite {
    pub fn new(
        key: String,
        operation: PendingOperation,
        target: Arc<dyn SystemOfRecord>,
        generation: u64,
    ) -> Self {
        let now = Instant::now();
        Self {
            key,
            operation,
            target,
            generation,
            enqueued_at: now,
            not_before: now,
            retries: 0,
            last_error: None,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.not_before <= now
    }

    pub fn info(&self) -> PendingWriteInfo {
        PendingWriteInfo {
            key: self.key.clone(),
            operation: self.operation.clone(),
            retries: self.retries,
            age: self.enqueued_at.elapsed(),
            last_error: self.last_error.clone(),
        }
    }

    /// Detach the parts a flush needs so the queue lock is not held across I/O
    pub fn in_flight(&self) -> InFlight {
        InFlight {
            key: self.key.clone(),
            operation: self.operation.clone(),
            target: Arc::clone(&self.target),
            generation: self.generation,
        }
    }
}

pub(crate) struct InFlight {
    pub key: String,
    pub operation: PendingOperation,
    pub target: Arc<dyn SystemOfRecord>,
    pub generation: u64,
}

impl InFlight {
    pub async fn apply(&self) -> Result<()> {
        match &self.operation {
            PendingOperation::Write(value) => self.target.save(&self.key, value).await,
            PendingOperation::Delete => self.target.remove(&self.key).await,
        }
    }
}
