//! Daily digest: unread backlog, optional podcast, one email per user.
//!
//! The podcast is generated in a background task while the orchestrator
//! polls its status under a deadline. A failed or slow podcast only downgrades
//! the email to the plain variant; cancellation aborts the send. Either way a
//! generation nobody waits for any more is stopped and marked failed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::compose::{compose_digest, DigestVariant};
use crate::common::{CoreError, PodcastId, Result, UserId};
use crate::domains::items::Item;
use crate::domains::podcasts::{Podcast, PodcastPipeline, PodcastStatus};
use crate::domains::users::User;
use crate::kernel::store::{ItemStore, UserStore};
use crate::kernel::BaseEmailSender;

#[derive(Debug, Clone)]
pub struct DigestConfig {
    pub podcast_enabled: bool,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            podcast_enabled: true,
            poll_interval: Duration::from_secs(5),
            poll_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// What one `send_for_user` call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestResult {
    pub email_sent: bool,
    pub podcast_url: Option<String>,
    pub items_count: usize,
    /// Why the podcast was left out, when it was
    pub error: Option<String>,
    pub variant: DigestVariant,
}

impl DigestResult {
    fn empty() -> Self {
        Self {
            email_sent: false,
            podcast_url: None,
            items_count: 0,
            error: None,
            variant: DigestVariant::Plain,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DigestBatchReport {
    pub users: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// `[start of yesterday, start of today)` in UTC.
pub fn previous_day_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN));
    (today - chrono::Duration::days(1), today)
}

pub struct DigestOrchestrator {
    items: Arc<dyn ItemStore>,
    users: Arc<dyn UserStore>,
    pipeline: Arc<PodcastPipeline>,
    email: Arc<dyn BaseEmailSender>,
    config: DigestConfig,
}

impl DigestOrchestrator {
    pub fn new(
        items: Arc<dyn ItemStore>,
        users: Arc<dyn UserStore>,
        pipeline: Arc<PodcastPipeline>,
        email: Arc<dyn BaseEmailSender>,
        config: DigestConfig,
    ) -> Self {
        Self {
            items,
            users,
            pipeline,
            email,
            config,
        }
    }

    pub async fn send_for_user(
        &self,
        user_id: UserId,
        cancel: &CancellationToken,
    ) -> Result<DigestResult> {
        let user = self
            .users
            .find_user(user_id)
            .await?
            .ok_or_else(|| CoreError::not_found("user", user_id))?;
        if !user.has_email() {
            return Err(CoreError::Validation(format!(
                "user {} has no email address",
                user_id
            )));
        }

        let now = Utc::now();
        let (from, to) = previous_day_window(now);
        let backlog = self.items.find_unread_between(user_id, from, to).await?;
        if backlog.is_empty() {
            info!(user_id = %user_id, "No unread items, skipping digest");
            return Ok(DigestResult::empty());
        }

        let (podcast_url, error) = if self.config.podcast_enabled {
            match self.podcast_for(&user, &backlog, cancel).await {
                Ok(url) => (Some(url), None),
                Err(CoreError::Cancelled) => return Err(CoreError::Cancelled),
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Sending digest without podcast");
                    (None, Some(e.to_string()))
                }
            }
        } else {
            (None, None)
        };

        let (email, variant) =
            compose_digest(&user, &backlog, podcast_url.as_deref(), from.date_naive());
        self.email
            .send(&email)
            .await
            .map_err(|e| CoreError::Delivery(format!("{:#}", e)))?;

        info!(
            user_id = %user_id,
            items = backlog.len(),
            with_podcast = podcast_url.is_some(),
            "Digest sent"
        );

        Ok(DigestResult {
            email_sent: true,
            podcast_url,
            items_count: backlog.len(),
            error,
            variant,
        })
    }

    /// Runs the digest for every user with an email address. One user's
    /// failure is logged and the batch moves on.
    pub async fn send_for_all_users(&self, cancel: &CancellationToken) -> Result<DigestBatchReport> {
        let users = self.users.users_with_email().await?;
        let mut report = DigestBatchReport {
            users: users.len(),
            ..Default::default()
        };

        for user in users {
            if cancel.is_cancelled() {
                warn!("Digest batch cancelled");
                break;
            }
            match self.send_for_user(user.id, cancel).await {
                Ok(result) if result.email_sent => report.sent += 1,
                Ok(_) => report.skipped += 1,
                Err(CoreError::Cancelled) => {
                    warn!("Digest batch cancelled");
                    break;
                }
                Err(e) => {
                    error!(user_id = %user.id, error = %e, "Digest failed for user");
                    report.failed += 1;
                }
            }
        }

        info!(
            users = report.users,
            sent = report.sent,
            skipped = report.skipped,
            failed = report.failed,
            "Digest batch finished"
        );
        Ok(report)
    }

    async fn podcast_for(
        &self,
        user: &User,
        backlog: &[Item],
        cancel: &CancellationToken,
    ) -> Result<String> {
        let ids: Vec<_> = backlog.iter().map(|i| i.id).collect();
        let title = format!("Your briefing for {}", Utc::now().format("%B %-d"));
        let podcast = self
            .pipeline
            .create_podcast(user.id, &title, None, &ids)
            .await?;

        let pipeline = Arc::clone(&self.pipeline);
        let podcast_id = podcast.id;
        let generation = tokio::spawn(async move {
            if let Err(e) = pipeline.process_podcast(podcast_id).await {
                warn!(podcast_id = %podcast_id, error = %e, "Background podcast generation failed");
            }
        });

        let podcast = match self.wait_for_podcast(podcast_id, cancel).await {
            Ok(podcast) => podcast,
            Err(e) => {
                // Nobody reads the result past this point
                generation.abort();
                let _ = generation.await;
                self.pipeline.abandon(podcast_id, &e).await;
                return Err(e);
            }
        };
        podcast
            .audio_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| CoreError::Generation("podcast completed without audio".into()))
    }

    /// Polls until the podcast settles, the deadline passes, or `cancel` fires.
    pub async fn wait_for_podcast(
        &self,
        id: PodcastId,
        cancel: &CancellationToken,
    ) -> Result<Podcast> {
        let deadline = Instant::now() + self.config.poll_timeout;

        loop {
            let podcast = self.pipeline.podcast(id).await?;
            match podcast.status {
                PodcastStatus::Completed => return Ok(podcast),
                PodcastStatus::Failed => {
                    return Err(CoreError::Generation(
                        podcast
                            .error_message
                            .unwrap_or_else(|| "podcast generation failed".to_string()),
                    ))
                }
                _ => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(CoreError::Timeout(self.config.poll_timeout));
            }
            let nap = self.config.poll_interval.min(deadline - now);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CoreError::Cancelled),
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }
}
