//! Write-behind propagation
//!
//! Writes and deletes are applied to the cache immediately and queued for
//! the system of record. A background flusher drains the queue in batches
//! on a fixed interval. Failed mutations are retried with a linearly
//! growing delay and dropped once they run out of retries, at which point
//! the failure callback fires.
//!
//! The queue holds at most one mutation per key: a newer write replaces a
//! queued one, so intermediate values never reach the system of record.

mod pending;

pub use pending::{FailureCallback, FlushReport, PendingWriteInfo};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, trace, warn};

use strata_cache_core::{
    CacheError, CacheResult, CacheStore, CacheStrategy, PendingOperation, PropagationStrategy,
    Result, StrategyKind, SystemOfRecord, Value,
};

use super::{delegate_policy, invalidate, lookup, populate};
use pending::{InFlight, PendingWrite};

/// Configuration for write-behind propagation
#[derive(Debug, Clone)]
pub struct WriteBehindConfig {
    /// Time between scheduled flushes
    pub flush_interval: Duration,
    /// Most mutations sent per flush
    pub batch_size: usize,
    /// Queue length that forces an immediate flush
    pub max_pending_writes: usize,
    /// Retries per mutation after the first attempt
    pub max_retries: u32,
    /// Base retry delay, multiplied by the retry count
    pub retry_delay: Duration,
}

impl Default for WriteBehindConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(1),
            batch_size: 100,
            max_pending_writes: 1000,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl WriteBehindConfig {
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn max_pending_writes(mut self, limit: usize) -> Self {
        self.max_pending_writes = limit;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

const DRAIN_POLL: Duration = Duration::from_millis(5);

/// When a mutation that has failed `retries` times may run again
///
/// Saturates at roughly thirty years, the horizon tokio uses for sleeps
/// that cannot be represented.
fn backoff_deadline(retry_delay: Duration, retries: u32) -> Instant {
    let now = Instant::now();
    now.checked_add(retry_delay.saturating_mul(retries))
        .unwrap_or_else(|| now + FAR_FUTURE)
}

const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

enum Settled {
    Retried,
    Dropped,
    Superseded,
}

/// Resets the busy flag when a flush ends, including on cancellation
struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Pending mutations shared with the flusher task
struct Queue {
    config: WriteBehindConfig,
    pending: DashMap<String, PendingWrite>,
    generation: AtomicU64,
    flushing: AtomicBool,
    failed_writes: AtomicU64,
    on_failure: RwLock<Option<FailureCallback>>,
}

impl Queue {
    fn new(config: WriteBehindConfig) -> Self {
        Self {
            config,
            pending: DashMap::new(),
            generation: AtomicU64::new(0),
            flushing: AtomicBool::new(false),
            failed_writes: AtomicU64::new(0),
            on_failure: RwLock::new(None),
        }
    }

    /// Queue a mutation, replacing any queued one for the key
    ///
    /// Returns the queue length after the insert.
    fn enqueue(
        &self,
        key: &str,
        operation: PendingOperation,
        target: &Arc<dyn SystemOfRecord>,
    ) -> usize {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let write = PendingWrite::new(key.to_string(), operation, Arc::clone(target), generation);

        if let Some(previous) = self.pending.insert(key.to_string(), write) {
            trace!(
                target: "strata_cache",
                key = %key,
                replaced = previous.operation.as_str(),
                "pending write superseded"
            );
        }
        self.pending.len()
    }

    /// Send one batch of due mutations to the system of record
    ///
    /// With `ignore_backoff` every queued mutation is due.
    async fn flush(&self, ignore_backoff: bool) -> FlushReport {
        if self
            .flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return FlushReport::skipped();
        }
        let _guard = FlushGuard(&self.flushing);

        let now = Instant::now();
        let mut batch: Vec<InFlight> = self
            .pending
            .iter()
            .filter(|write| ignore_backoff || write.is_due(now))
            .map(|write| write.in_flight())
            .collect();
        if batch.is_empty() {
            return FlushReport::default();
        }

        // oldest first
        batch.sort_by_key(|write| write.generation);
        batch.truncate(self.config.batch_size.max(1));

        let results = join_all(batch.iter().map(InFlight::apply)).await;

        let mut report = FlushReport {
            attempted: batch.len(),
            ..Default::default()
        };
        for (write, result) in batch.iter().zip(results) {
            match result {
                Ok(()) => {
                    self.pending
                        .remove_if(&write.key, |_, queued| queued.generation == write.generation);
                    report.succeeded += 1;
                }
                Err(e) => match self.settle_failure(write, &e) {
                    Settled::Retried => report.retried += 1,
                    Settled::Dropped => report.dropped += 1,
                    Settled::Superseded => {}
                },
            }
        }

        debug!(
            target: "strata_cache",
            attempted = report.attempted,
            succeeded = report.succeeded,
            retried = report.retried,
            dropped = report.dropped,
            remaining = self.pending.len(),
            "write-behind flush"
        );
        report
    }

    fn settle_failure(&self, write: &InFlight, err: &CacheError) -> Settled {
        {
            let Some(mut queued) = self.pending.get_mut(&write.key) else {
                return Settled::Superseded;
            };
            if queued.generation != write.generation {
                return Settled::Superseded;
            }

            queued.retries += 1;
            queued.last_error = Some(err.to_string());
            if queued.retries <= self.config.max_retries {
                queued.not_before = backoff_deadline(self.config.retry_delay, queued.retries);
                warn!(
                    target: "strata_cache",
                    key = %write.key,
                    operation = write.operation.as_str(),
                    retries = queued.retries,
                    error = %err,
                    "deferred write failed, will retry"
                );
                return Settled::Retried;
            }
        }

        let Some((_, dropped)) = self
            .pending
            .remove_if(&write.key, |_, queued| queued.generation == write.generation)
        else {
            return Settled::Superseded;
        };

        self.failed_writes.fetch_add(1, Ordering::Relaxed);
        error!(
            target: "strata_cache",
            key = %write.key,
            operation = write.operation.as_str(),
            attempts = dropped.retries,
            error = %err,
            "deferred write dropped after exhausting retries"
        );

        let callback = self.on_failure.read().clone();
        if let Some(callback) = callback {
            callback(&dropped.info(), err);
        }
        Settled::Dropped
    }

    /// Flush until the queue is empty, ignoring backoff
    async fn drain(&self) -> FlushReport {
        let mut total = FlushReport::default();
        while !self.pending.is_empty() {
            let report = self.flush(true).await;
            if report.skipped {
                // another flush holds the batch; wait for it to settle
                tokio::time::sleep(DRAIN_POLL).await;
                continue;
            }
            total.attempted += report.attempted;
            total.succeeded += report.succeeded;
            total.retried += report.retried;
            total.dropped += report.dropped;
        }
        total
    }
}

async fn run_flusher(queue: Weak<Queue>, stop: Arc<Notify>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.notified() => break,
        }

        let Some(queue) = queue.upgrade() else {
            break;
        };
        if queue.flush(false).await.skipped {
            trace!(target: "strata_cache", "flush already running, skipping tick");
        }
    }

    debug!(target: "strata_cache", "write-behind flusher stopped");
}

/// Cache-first strategy with deferred system-of-record writes
///
/// Construct inside a tokio runtime to get the background flusher; without
/// one the queue is drained only by [`flush`](Self::flush), backpressure and
/// [`shutdown`](PropagationStrategy::shutdown).
pub struct WriteBehindStrategy {
    policy: Arc<dyn CacheStrategy>,
    queue: Arc<Queue>,
    stop: Arc<Notify>,
    shut_down: AtomicBool,
}

impl WriteBehindStrategy {
    pub fn new(policy: Arc<dyn CacheStrategy>, config: WriteBehindConfig) -> Self {
        let period = config.flush_interval.max(Duration::from_millis(1));
        let queue = Arc::new(Queue::new(config));
        let stop = Arc::new(Notify::new());

        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(run_flusher(Arc::downgrade(&queue), Arc::clone(&stop), period));
            }
            Err(_) => {
                debug!(target: "strata_cache", "no tokio runtime, write-behind flusher not started");
            }
        }

        Self {
            policy,
            queue,
            stop,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Set the callback fired when a mutation is dropped
    pub fn with_failure_callback<F>(self, callback: F) -> Self
    where
        F: Fn(&PendingWriteInfo, &CacheError) + Send + Sync + 'static,
    {
        self.set_failure_callback(callback);
        self
    }

    pub fn set_failure_callback<F>(&self, callback: F)
    where
        F: Fn(&PendingWriteInfo, &CacheError) + Send + Sync + 'static,
    {
        *self.queue.on_failure.write() = Some(Arc::new(callback));
    }

    pub fn config(&self) -> &WriteBehindConfig {
        &self.queue.config
    }

    /// Flush one batch of due mutations now
    pub async fn flush(&self) -> FlushReport {
        self.queue.flush(false).await
    }

    /// Drop the queued mutation for a key
    ///
    /// The cached value is left alone. Returns `false` if nothing was queued.
    pub fn cancel(&self, key: &str) -> bool {
        self.queue.pending.remove(key).is_some()
    }

    /// Drop every queued mutation, returning how many were dropped
    pub fn cancel_all(&self) -> usize {
        let count = self.queue.pending.len();
        self.queue.pending.clear();
        count
    }

    pub fn pending_len(&self) -> usize {
        self.queue.pending.len()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.queue.pending.contains_key(key)
    }

    /// Queued keys, sorted
    pub fn pending_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.queue.pending.iter().map(|w| w.key.clone()).collect();
        keys.sort();
        keys
    }

    /// Snapshot of the queue, oldest first
    pub fn pending_writes(&self) -> Vec<PendingWriteInfo> {
        let mut writes: Vec<(u64, PendingWriteInfo)> = self
            .queue
            .pending
            .iter()
            .map(|w| (w.generation, w.info()))
            .collect();
        writes.sort_by_key(|(generation, _)| *generation);
        writes.into_iter().map(|(_, info)| info).collect()
    }

    /// Mutations dropped after exhausting their retries
    pub fn failed_writes(&self) -> u64 {
        self.queue.failed_writes.load(Ordering::Relaxed)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(CacheError::ShutDown);
        }
        Ok(())
    }

    async fn enqueue(
        &self,
        key: &str,
        operation: PendingOperation,
        source: &Arc<dyn SystemOfRecord>,
    ) {
        let pending = self.queue.enqueue(key, operation, source);

        let limit = self.queue.config.max_pending_writes;
        if pending >= limit {
            debug!(
                target: "strata_cache",
                pending,
                limit,
                "pending write limit reached, flushing"
            );
            self.queue.flush(false).await;
        }
    }
}

impl std::fmt::Debug for WriteBehindStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBehindStrategy")
            .field("policy", &self.policy.name())
            .field("config", &self.queue.config)
            .field("pending", &self.queue.pending.len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl Drop for WriteBehindStrategy {
    fn drop(&mut self) {
        let pending = self.queue.pending.len();
        if pending > 0 {
            warn!(
                target: "strata_cache",
                pending,
                "write-behind strategy dropped with pending writes"
            );
        }
        self.stop.notify_one();
    }
}

delegate_policy!(WriteBehindStrategy, "write_behind", |this| {
    let mut stats = this.policy.stats();
    stats.pending_writes = this.queue.pending.len();
    stats.failed_writes = this.failed_writes();
    stats
});

#[async_trait]
impl PropagationStrategy for WriteBehindStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::WriteBehind
    }

    async fn get(
        &self,
        key: &str,
        store: &dyn CacheStore,
        source: &Arc<dyn SystemOfRecord>,
    ) -> Result<CacheResult<Value>> {
        match lookup(self.policy.as_ref(), store, key).await {
            Ok(Some(value)) => return Ok(CacheResult::Hit(value)),
            Ok(None) => {}
            Err(e) => {
                warn!(target: "strata_cache", key = %key, error = %e, "cache read failed");
                self.policy.on_miss(key);
            }
        }

        // Queued mutations are newer than the system of record
        match self.pending(key) {
            Some(PendingOperation::Write(value)) => return Ok(CacheResult::Loaded(value)),
            Some(PendingOperation::Delete) => return Ok(CacheResult::Miss),
            None => {}
        }

        let Some(value) = source.load(key).await? else {
            return Ok(CacheResult::Miss);
        };
        if let Err(e) = populate(self.policy.as_ref(), store, key, &value).await {
            warn!(target: "strata_cache", key = %key, error = %e, "failed to populate cache");
        }
        Ok(CacheResult::Loaded(value))
    }

    async fn set(
        &self,
        key: &str,
        value: Value,
        store: &dyn CacheStore,
        source: &Arc<dyn SystemOfRecord>,
    ) -> Result<()> {
        self.ensure_open()?;

        match populate(self.policy.as_ref(), store, key, &value).await {
            Ok(true) => {}
            Ok(false) => {
                if invalidate(store, key).await {
                    self.policy.on_delete(key);
                }
            }
            Err(e) => {
                warn!(target: "strata_cache", key = %key, error = %e, "cache write failed");
            }
        }

        self.enqueue(key, PendingOperation::Write(value), source).await;
        Ok(())
    }

    async fn delete(
        &self,
        key: &str,
        store: &dyn CacheStore,
        source: &Arc<dyn SystemOfRecord>,
    ) -> Result<()> {
        self.ensure_open()?;

        invalidate(store, key).await;
        self.policy.on_delete(key);

        self.enqueue(key, PendingOperation::Delete, source).await;
        Ok(())
    }

    fn pending(&self, key: &str) -> Option<PendingOperation> {
        self.queue.pending.get(key).map(|w| w.operation.clone())
    }

    async fn shutdown(&self) -> Result<()> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let report = self.queue.drain().await;
        self.stop.notify_one();

        debug!(
            target: "strata_cache",
            succeeded = report.succeeded,
            dropped = report.dropped,
            "write-behind strategy shut down"
        );
        Ok(())
    }
}
