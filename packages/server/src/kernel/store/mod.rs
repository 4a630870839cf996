//! Data-access traits consumed by the queue, pipeline and orchestrator.
//!
//! Every state-changing item or podcast operation is conditional on the
//! status it expects to find and returns `None` when the row was missing or
//! in another state. Callers re-read to tell the two apart.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::common::{ItemId, PodcastId, UserId};
use crate::domains::items::{Enrichment, Item, NewItem};
use crate::domains::podcasts::{
    DialogueTurn, MemberRemoval, NewPodcast, Podcast, PodcastItem, PodcastStatus,
};
use crate::domains::users::User;

#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn insert_item(&self, item: NewItem) -> Result<Item>;

    async fn find_item(&self, id: ItemId) -> Result<Option<Item>>;

    /// Moves up to `limit` pending items to processing and returns them,
    /// oldest first, as one atomic step.
    async fn claim_pending_batch(&self, limit: i64) -> Result<Vec<Item>>;

    /// `processing -> completed`, writing enrichment columns only.
    async fn mark_completed(&self, id: ItemId, enrichment: &Enrichment) -> Result<Option<Item>>;

    /// `processing -> failed`.
    async fn mark_failed(&self, id: ItemId, message: &str) -> Result<Option<Item>>;

    /// `failed -> pending`, clearing the error.
    async fn reset_failed(&self, id: ItemId) -> Result<Option<Item>>;

    async fn set_read(&self, id: ItemId, is_read: Option<bool>) -> Result<Option<Item>>;

    async fn find_failed_since(&self, since: DateTime<Utc>) -> Result<Vec<Item>>;

    async fn find_unread_between(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Item>>;
}

#[async_trait]
pub trait PodcastStore: Send + Sync {
    /// Creates the podcast in `pending` together with its ordered items.
    async fn create_podcast(&self, podcast: NewPodcast, item_ids: &[ItemId]) -> Result<Podcast>;

    async fn find_podcast(&self, id: PodcastId) -> Result<Option<Podcast>>;

    /// Items in membership order.
    async fn podcast_items(&self, id: PodcastId) -> Result<Vec<Item>>;

    async fn podcast_memberships(&self, id: PodcastId) -> Result<Vec<PodcastItem>>;

    async fn transition_podcast(
        &self,
        id: PodcastId,
        from: PodcastStatus,
        to: PodcastStatus,
    ) -> Result<Option<Podcast>>;

    /// Only applies while the podcast is `writing`.
    async fn save_script(&self, id: PodcastId, script: &[DialogueTurn]) -> Result<Option<Podcast>>;

    /// `generating -> completed` with audio URL and duration in one update.
    async fn complete_podcast(
        &self,
        id: PodcastId,
        audio_url: &str,
        duration_seconds: i32,
    ) -> Result<Option<Podcast>>;

    /// `writing | generating -> failed`.
    async fn fail_podcast(&self, id: PodcastId, message: &str) -> Result<Option<Podcast>>;

    async fn add_podcast_item(
        &self,
        id: PodcastId,
        item_id: ItemId,
        position: Option<i32>,
    ) -> Result<PodcastItem>;

    /// Checks membership, the last-item guard and the delete as one atomic
    /// step, so two concurrent removals can never empty a podcast.
    async fn remove_podcast_item(&self, id: PodcastId, item_id: ItemId) -> Result<MemberRemoval>;

    /// Removes membership rows before the podcast row.
    async fn delete_podcast(&self, id: PodcastId) -> Result<bool>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, id: UserId) -> Result<Option<User>>;

    /// Users whose email is not blank.
    async fn users_with_email(&self) -> Result<Vec<User>>;
}
