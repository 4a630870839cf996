//! Worker pool draining the item queue.
//!
//! `WorkerPool` spawns N independent polling loops. Each loop:
//! - claims a batch (the claim itself moves items to processing)
//! - runs the enrichment pipeline for each item in claim order
//! - retries a failing item in-process with linear backoff
//! - completes or fails the item through the queue
//!
//! # Architecture
//!
//! ```text
//! WorkerPool
//!     │
//!     ├─► worker-0 ─┐
//!     ├─► worker-1 ─┼─► ItemQueue::claim_batch
//!     └─► worker-N ─┘       └─► ItemPipeline::run (× max_attempts)
//!                                   └─► complete | fail
//! ```
//!
//! Every sleep and every pipeline call races the pool's cancellation token,
//! so `stop()` returns as soon as in-flight work is abandoned. Items a worker
//! claimed but did not finish are failed with an interrupted message rather
//! than left in processing.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::enrich::ItemPipeline;
use super::models::{Enrichment, Item};
use super::queue::ItemQueue;
use crate::common::{CoreError, Result};

pub const INTERRUPTED_MESSAGE: &str = "interrupted by worker shutdown";

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub worker_count: usize,
    /// Sleep between polls when the queue is empty
    pub poll_interval: Duration,
    pub batch_size: i64,
    /// Pipeline attempts per item before it is failed
    pub max_attempts: u32,
    /// Delay before retry `n` is `backoff_base × n`
    pub backoff_base: Duration,
    /// Pause after the claim itself errors (store unavailable)
    pub claim_error_backoff: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            claim_error_backoff: Duration::from_secs(1),
        }
    }
}

/// Delay slept after failed attempt number `attempt` (1-based).
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt)
}

struct Running {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

pub struct WorkerPool {
    queue: ItemQueue,
    pipeline: Arc<dyn ItemPipeline>,
    config: WorkerPoolConfig,
    running: Mutex<Option<Running>>,
}

impl WorkerPool {
    pub fn new(queue: ItemQueue, pipeline: Arc<dyn ItemPipeline>, config: WorkerPoolConfig) -> Self {
        Self {
            queue,
            pipeline,
            config,
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Spawns the workers and returns immediately.
    ///
    /// Workers also stop when `shutdown` is cancelled, after which the pool
    /// can be started again.
    pub fn start(&self, shutdown: &CancellationToken) -> Result<()> {
        let mut running = self.running.lock();
        if let Some(current) = running.as_ref() {
            if !current.cancel.is_cancelled() {
                return Err(CoreError::AlreadyRunning);
            }
            // Stopped through the parent token; those workers are already winding down
            debug!(
                workers = current.handles.len(),
                "Replacing worker pool cancelled by its parent token"
            );
        }

        let cancel = shutdown.child_token();
        let handles = (0..self.config.worker_count.max(1))
            .map(|worker_id| {
                let worker = Worker {
                    id: worker_id,
                    queue: self.queue.clone(),
                    pipeline: Arc::clone(&self.pipeline),
                    config: self.config.clone(),
                    cancel: cancel.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!(
            workers = self.config.worker_count.max(1),
            batch_size = self.config.batch_size,
            max_attempts = self.config.max_attempts,
            "Worker pool started"
        );

        *running = Some(Running { cancel, handles });
        Ok(())
    }

    /// Cancels every worker and waits until all of them have returned.
    pub async fn stop(&self) -> Result<()> {
        let Running { cancel, handles } = self.running.lock().take().ok_or(CoreError::NotRunning)?;

        cancel.cancel();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task ended abnormally");
            }
        }

        info!("Worker pool stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.cancel.is_cancelled())
    }
}

enum Attempts {
    Enriched(Enrichment),
    Exhausted { attempts: u32, last_error: String },
    Interrupted,
}

struct Worker {
    id: usize,
    queue: ItemQueue,
    pipeline: Arc<dyn ItemPipeline>,
    config: WorkerPoolConfig,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) {
        debug!(worker_id = self.id, "Worker starting");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let batch = match self.queue.claim_batch(self.config.batch_size).await {
                Ok(batch) => batch,
                Err(e) => {
                    error!(worker_id = self.id, error = %e, "Failed to claim items");
                    if self.pause(self.config.claim_error_backoff).await {
                        break;
                    }
                    continue;
                }
            };

            if batch.is_empty() {
                if self.pause(self.config.poll_interval).await {
                    break;
                }
                continue;
            }

            self.process_batch(&batch).await;
        }

        debug!(worker_id = self.id, "Worker stopped");
    }

    /// Sleeps for `duration`. Returns true if cancelled first.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }

    /// Items run one at a time, in claim order. Nothing one item does can
    /// stop the rest of the batch.
    async fn process_batch(&self, batch: &[Item]) {
        for (idx, item) in batch.iter().enumerate() {
            if self.cancel.is_cancelled() {
                self.interrupt(&batch[idx..]).await;
                return;
            }
            self.process_item(item).await;
        }
    }

    async fn process_item(&self, item: &Item) {
        match self.attempt(item).await {
            Attempts::Enriched(enrichment) => {
                if let Err(e) = self.queue.complete(item.id, enrichment).await {
                    error!(worker_id = self.id, item_id = %item.id, error = %e, "Failed to complete item");
                    // Otherwise the item sits in processing with no worker on it
                    let message = format!("enrichment could not be saved: {}", e);
                    if let Err(e) = self.queue.fail(item.id, &message).await {
                        error!(worker_id = self.id, item_id = %item.id, error = %e, "Failed to record item failure");
                    }
                }
            }
            Attempts::Exhausted {
                attempts,
                last_error,
            } => {
                let message = format!("failed after {} attempts: {}", attempts, last_error);
                if let Err(e) = self.queue.fail(item.id, &message).await {
                    error!(worker_id = self.id, item_id = %item.id, error = %e, "Failed to record item failure");
                }
            }
            Attempts::Interrupted => self.interrupt(std::slice::from_ref(item)).await,
        }
    }

    async fn attempt(&self, item: &Item) -> Attempts {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let run = AssertUnwindSafe(self.pipeline.run(item)).catch_unwind();
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Attempts::Interrupted,
                result = run => result,
            };

            match result {
                Ok(Ok(enrichment)) => return Attempts::Enriched(enrichment),
                Ok(Err(e)) => last_error = format!("{:#}", e),
                Err(_) => last_error = "enrichment pipeline panicked".to_string(),
            }

            warn!(
                worker_id = self.id,
                item_id = %item.id,
                attempt,
                max_attempts,
                error = %last_error,
                "Enrichment attempt failed"
            );

            if attempt < max_attempts
                && self
                    .pause(backoff_delay(self.config.backoff_base, attempt))
                    .await
            {
                return Attempts::Interrupted;
            }
        }

        Attempts::Exhausted {
            attempts: max_attempts,
            last_error,
        }
    }

    async fn interrupt(&self, items: &[Item]) {
        for item in items {
            if let Err(e) = self.queue.fail(item.id, INTERRUPTED_MESSAGE).await {
                warn!(worker_id = self.id, item_id = %item.id, error = %e, "Failed to release interrupted item");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn backoff_grows_linearly() {
        let base = Duration::from_secs(1);
        let delays: Vec<Duration> = (1..=4).map(|n| backoff_delay(base, n)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3),
                Duration::from_secs(4)
            ]
        );
    }
}
