use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{ItemStore, PodcastStore, UserStore};
use crate::common::{ItemId, PodcastId, UserId};
use crate::domains::items::{Enrichment, Item, NewItem};
use crate::domains::podcasts::{
    DialogueTurn, MemberRemoval, NewPodcast, Podcast, PodcastItem, PodcastStatus,
};
use crate::domains::users::User;

/// Postgres backend. The SQL lives on the models; this only routes to it.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ItemStore for PgStore {
    async fn insert_item(&self, item: NewItem) -> Result<Item> {
        Item::create(&item, &self.pool).await
    }

    async fn find_item(&self, id: ItemId) -> Result<Option<Item>> {
        Item::find_by_id(id, &self.pool).await
    }

    async fn claim_pending_batch(&self, limit: i64) -> Result<Vec<Item>> {
        Item::claim_pending(limit, &self.pool).await
    }

    async fn mark_completed(&self, id: ItemId, enrichment: &Enrichment) -> Result<Option<Item>> {
        Item::mark_completed(id, enrichment, &self.pool).await
    }

    async fn mark_failed(&self, id: ItemId, message: &str) -> Result<Option<Item>> {
        Item::mark_failed(id, message, &self.pool).await
    }

    async fn reset_failed(&self, id: ItemId) -> Result<Option<Item>> {
        Item::reset_failed(id, &self.pool).await
    }

    async fn set_read(&self, id: ItemId, is_read: Option<bool>) -> Result<Option<Item>> {
        Item::set_read(id, is_read, &self.pool).await
    }

    async fn find_failed_since(&self, since: DateTime<Utc>) -> Result<Vec<Item>> {
        Item::find_failed_since(since, &self.pool).await
    }

    async fn find_unread_between(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Item>> {
        Item::find_unread_between(user_id, from, to, &self.pool).await
    }
}

#[async_trait]
impl PodcastStore for PgStore {
    async fn create_podcast(&self, podcast: NewPodcast, item_ids: &[ItemId]) -> Result<Podcast> {
        Podcast::create_with_items(&podcast, item_ids, &self.pool).await
    }

    async fn find_podcast(&self, id: PodcastId) -> Result<Option<Podcast>> {
        Podcast::find_by_id(id, &self.pool).await
    }

    async fn podcast_items(&self, id: PodcastId) -> Result<Vec<Item>> {
        Podcast::items(id, &self.pool).await
    }

    async fn podcast_memberships(&self, id: PodcastId) -> Result<Vec<PodcastItem>> {
        PodcastItem::find_for_podcast(id, &self.pool).await
    }

    async fn transition_podcast(
        &self,
        id: PodcastId,
        from: PodcastStatus,
        to: PodcastStatus,
    ) -> Result<Option<Podcast>> {
        Podcast::transition(id, from, to, &self.pool).await
    }

    async fn save_script(&self, id: PodcastId, script: &[DialogueTurn]) -> Result<Option<Podcast>> {
        Podcast::save_script(id, script, &self.pool).await
    }

    async fn complete_podcast(
        &self,
        id: PodcastId,
        audio_url: &str,
        duration_seconds: i32,
    ) -> Result<Option<Podcast>> {
        Podcast::complete(id, audio_url, duration_seconds, &self.pool).await
    }

    async fn fail_podcast(&self, id: PodcastId, message: &str) -> Result<Option<Podcast>> {
        Podcast::fail(id, message, &self.pool).await
    }

    async fn add_podcast_item(
        &self,
        id: PodcastId,
        item_id: ItemId,
        position: Option<i32>,
    ) -> Result<PodcastItem> {
        PodcastItem::insert(id, item_id, position, &self.pool).await
    }

    async fn remove_podcast_item(&self, id: PodcastId, item_id: ItemId) -> Result<MemberRemoval> {
        PodcastItem::remove(id, item_id, &self.pool).await
    }

    async fn delete_podcast(&self, id: PodcastId) -> Result<bool> {
        Podcast::delete(id, &self.pool).await
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        User::find_by_id(id, &self.pool).await
    }

    async fn users_with_email(&self) -> Result<Vec<User>> {
        User::find_with_email(&self.pool).await
    }
}
