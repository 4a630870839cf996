//! Claim-based job queue over item records.
//!
//! Every transition is one conditional store update keyed on the status the
//! item must currently be in, so concurrent callers can race freely: exactly
//! one wins, the others get `InvalidTransition`. Each successful transition
//! is pushed to the owner's live subscribers in a spawned task.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::events::{ItemUpdate, UpdateType};
use super::models::{Enrichment, Item, NewItem, ProcessingStatus};
use crate::common::{CoreError, ItemId, Result, UserId};
use crate::kernel::store::ItemStore;
use crate::kernel::stream_hub::StreamHub;

pub type ItemUpdateHub = StreamHub<ItemUpdate>;

/// Window used by the scheduled sweep that re-queues recent failures.
pub fn default_retry_window() -> chrono::Duration {
    chrono::Duration::hours(24)
}

/// Derived read-only view of an item's processing state.
#[derive(Debug, Clone, Serialize)]
pub struct ItemStatusView {
    pub item: Item,
    pub is_processing: bool,
    pub is_completed: bool,
    pub is_failed: bool,
    pub error: Option<String>,
}

impl From<Item> for ItemStatusView {
    fn from(item: Item) -> Self {
        let status = item.processing_status;
        Self {
            is_processing: matches!(status, ProcessingStatus::Pending | ProcessingStatus::Processing),
            is_completed: status == ProcessingStatus::Completed,
            is_failed: status == ProcessingStatus::Failed,
            error: item.processing_error.clone(),
            item,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrySweep {
    pub retried: usize,
    pub skipped: usize,
}

#[derive(Clone)]
pub struct ItemQueue {
    store: Arc<dyn ItemStore>,
    hub: ItemUpdateHub,
}

impl ItemQueue {
    pub fn new(store: Arc<dyn ItemStore>, hub: ItemUpdateHub) -> Self {
        Self { store, hub }
    }

    pub fn hub(&self) -> &ItemUpdateHub {
        &self.hub
    }

    /// Creates a pending item with no enrichment.
    pub async fn enqueue(&self, user_id: UserId, url: &str, title: &str) -> Result<Item> {
        let url = url.trim();
        if url.is_empty() {
            return Err(CoreError::Validation("url is required".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CoreError::Validation(format!(
                "url must be http(s), got '{}'",
                url
            )));
        }

        let new = NewItem::builder()
            .user_id(user_id)
            .url(url)
            .title(title.trim())
            .build();
        let item = self.store.insert_item(new).await?;

        info!(item_id = %item.id, user_id = %user_id, "Item enqueued");
        self.notify(&item, UpdateType::Created);
        Ok(item)
    }

    /// Atomically moves up to `limit` pending items to processing.
    pub async fn claim_batch(&self, limit: i64) -> Result<Vec<Item>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }
        let items = self.store.claim_pending_batch(limit).await?;
        if !items.is_empty() {
            debug!(count = items.len(), "Claimed items");
        }
        for item in &items {
            self.notify(item, UpdateType::Processing);
        }
        Ok(items)
    }

    /// Applies the enrichment and marks the item completed.
    ///
    /// Only enrichment columns are written, so the read flag and URL keep
    /// whatever value they had when the item was claimed.
    pub async fn complete(&self, id: ItemId, enrichment: Enrichment) -> Result<Item> {
        let current = self.require(id).await?;
        if !current
            .processing_status
            .can_transition_to(ProcessingStatus::Completed)
        {
            return Err(CoreError::transition(
                "item",
                current.processing_status,
                ProcessingStatus::Completed,
            ));
        }

        let enrichment = enrichment.normalized();
        match self.store.mark_completed(id, &enrichment).await? {
            Some(item) => {
                info!(item_id = %id, "Item completed");
                self.notify(&item, UpdateType::Completed);
                Ok(item)
            }
            None => Err(self.explain_miss(id, ProcessingStatus::Completed).await),
        }
    }

    /// Marks the item failed. Enrichment fields are left as they are.
    pub async fn fail(&self, id: ItemId, message: &str) -> Result<Item> {
        let message = match message.trim() {
            "" => "processing failed",
            m => m,
        };
        match self.store.mark_failed(id, message).await? {
            Some(item) => {
                warn!(item_id = %id, error = %message, "Item failed");
                self.notify(&item, UpdateType::Failed);
                Ok(item)
            }
            None => Err(self.explain_miss(id, ProcessingStatus::Failed).await),
        }
    }

    /// Resets a failed item to pending. Any other status is rejected.
    pub async fn retry(&self, id: ItemId) -> Result<Item> {
        match self.store.reset_failed(id).await? {
            Some(item) => {
                info!(item_id = %id, "Item re-queued");
                self.notify(&item, UpdateType::Retried);
                Ok(item)
            }
            None => Err(self.explain_miss(id, ProcessingStatus::Pending).await),
        }
    }

    pub async fn status_of(&self, id: ItemId) -> Result<ItemStatusView> {
        Ok(self.require(id).await?.into())
    }

    /// Sets the read flag. Allowed in any status.
    pub async fn mark_read(&self, id: ItemId, is_read: Option<bool>) -> Result<Item> {
        self.store
            .set_read(id, is_read)
            .await?
            .ok_or_else(|| CoreError::not_found("item", id))
    }

    /// Items that failed within the last `window`.
    pub async fn failed_for_retry(&self, window: chrono::Duration) -> Result<Vec<Item>> {
        let since = chrono::Utc::now() - window;
        Ok(self.store.find_failed_since(since).await?)
    }

    /// Re-queues every failure inside `window`. One item losing a race
    /// (already retried elsewhere) is skipped, not fatal.
    pub async fn retry_recent_failures(&self, window: chrono::Duration) -> Result<RetrySweep> {
        let mut sweep = RetrySweep::default();
        for item in self.failed_for_retry(window).await? {
            match self.retry(item.id).await {
                Ok(_) => sweep.retried += 1,
                Err(e) => {
                    debug!(item_id = %item.id, error = %e, "Skipping retry");
                    sweep.skipped += 1;
                }
            }
        }
        if sweep.retried > 0 {
            info!(retried = sweep.retried, skipped = sweep.skipped, "Re-queued failed items");
        }
        Ok(sweep)
    }

    async fn require(&self, id: ItemId) -> Result<Item> {
        self.store
            .find_item(id)
            .await?
            .ok_or_else(|| CoreError::not_found("item", id))
    }

    /// A conditional update matched nothing: the row is gone or in a status
    /// that has no edge to `to`.
    async fn explain_miss(&self, id: ItemId, to: ProcessingStatus) -> CoreError {
        match self.store.find_item(id).await {
            Ok(Some(item)) => CoreError::transition("item", item.processing_status, to),
            Ok(None) => CoreError::not_found("item", id),
            Err(e) => CoreError::Persistence(e),
        }
    }

    fn notify(&self, item: &Item, update_type: UpdateType) {
        let hub = self.hub.clone();
        let user_id = item.user_id;
        let update = ItemUpdate::for_item(item, update_type);
        tokio::spawn(async move {
            hub.publish(user_id, update).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::store::MemoryStore;

    fn queue() -> (ItemQueue, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (ItemQueue::new(store.clone(), ItemUpdateHub::new()), store)
    }

    #[tokio::test]
    async fn enqueue_rejects_non_http_urls() {
        let (queue, _) = queue();
        let err = queue
            .enqueue(UserId::new(), "ftp://example.com", "")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn status_view_reflects_failure() {
        let (queue, _) = queue();
        let item = queue
            .enqueue(UserId::new(), "https://example.com", "Example")
            .await
            .unwrap();
        queue.claim_batch(1).await.unwrap();
        queue.fail(item.id, "HTTP 404").await.unwrap();

        let view = queue.status_of(item.id).await.unwrap();
        assert!(view.is_failed);
        assert!(!view.is_processing);
        assert_eq!(view.error.as_deref(), Some("HTTP 404"));
    }

    #[tokio::test]
    async fn blank_failure_message_still_sets_error() {
        let (queue, _) = queue();
        let item = queue
            .enqueue(UserId::new(), "https://example.com", "")
            .await
            .unwrap();
        queue.claim_batch(1).await.unwrap();
        let failed = queue.fail(item.id, "   ").await.unwrap();
        assert!(failed.error_matches_status());
    }

    #[tokio::test]
    async fn complete_on_missing_item_is_not_found() {
        let (queue, store) = queue();
        let item = queue
            .enqueue(UserId::new(), "https://example.com", "")
            .await
            .unwrap();
        queue.claim_batch(1).await.unwrap();
        store.remove_item(item.id);

        let err = queue
            .complete(item.id, Enrichment::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn claim_with_non_positive_limit_is_empty() {
        let (queue, _) = queue();
        queue
            .enqueue(UserId::new(), "https://example.com", "")
            .await
            .unwrap();
        assert!(queue.claim_batch(0).await.unwrap().is_empty());
    }
}
