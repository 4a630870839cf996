//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! - Daily digest for every user with an email address
//! - Periodic reset of recently failed items back to pending
//!
//! ```text
//! Scheduler (DIGEST_CRON)
//!     └─► DigestOrchestrator::send_for_all_users
//!             └─► per user: backlog → podcast (bounded wait) → email
//!
//! Scheduler (RETRY_CRON)
//!     └─► ItemQueue::retry_recent_failures(24h)
//!             └─► workers pick the items up on their next poll
//! ```

use std::sync::Arc;

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::domains::digest::DigestOrchestrator;
use crate::domains::items::{default_retry_window, ItemQueue};

/// Cron expressions for the scheduled jobs (seconds field first).
#[derive(Debug, Clone)]
pub struct Schedules {
    pub digest: String,
    pub retry: String,
}

/// Start all scheduled tasks
pub async fn start_scheduler(
    digest: Arc<DigestOrchestrator>,
    queue: ItemQueue,
    schedules: Schedules,
    shutdown: CancellationToken,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let digest_shutdown = shutdown.clone();
    let digest_job = Job::new_async(schedules.digest.as_str(), move |_uuid, _lock| {
        let digest = digest.clone();
        let shutdown = digest_shutdown.clone();
        Box::pin(async move {
            tracing::info!("Running daily digest task");
            if let Err(e) = digest.send_for_all_users(&shutdown).await {
                tracing::error!("Daily digest task failed: {}", e);
            }
        })
    })?;

    scheduler.add(digest_job).await?;

    let retry_job = Job::new_async(schedules.retry.as_str(), move |_uuid, _lock| {
        let queue = queue.clone();
        let shutdown = shutdown.clone();
        Box::pin(async move {
            if shutdown.is_cancelled() {
                return;
            }
            match queue.retry_recent_failures(default_retry_window()).await {
                Ok(sweep) => tracing::info!(
                    retried = sweep.retried,
                    skipped = sweep.skipped,
                    "Failed item retry sweep complete"
                ),
                Err(e) => tracing::error!("Failed item retry sweep failed: {}", e),
            }
        })
    })?;

    scheduler.add(retry_job).await?;
    scheduler.start().await?;

    tracing::info!(
        digest = %schedules.digest,
        retry = %schedules.retry,
        "Scheduled tasks started"
    );
    Ok(scheduler)
}
