use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sqlx::types::Json;

use super::{ItemStore, PodcastStore, UserStore};
use crate::common::{ItemId, PodcastId, UserId};
use crate::domains::items::{Enrichment, Item, NewItem, ProcessingStatus};
use crate::domains::podcasts::{
    clamp_position, DialogueTurn, MemberRemoval, NewPodcast, Podcast, PodcastItem, PodcastStatus,
};
use crate::domains::users::User;

#[derive(Default)]
struct State {
    items: HashMap<ItemId, Item>,
    podcasts: HashMap<PodcastId, Podcast>,
    memberships: HashMap<PodcastId, Vec<ItemId>>,
    users: HashMap<UserId, User>,
}

/// In-process backend. One mutex guards all tables, so every operation is a
/// single critical section and claims cannot overlap.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a fully formed item, bypassing the enqueue defaults.
    pub fn put_item(&self, item: Item) {
        self.state.lock().items.insert(item.id, item);
    }

    pub fn remove_item(&self, id: ItemId) -> Option<Item> {
        self.state.lock().items.remove(&id)
    }

    pub fn put_user(&self, user: User) {
        self.state.lock().users.insert(user.id, user);
    }

    /// Overwrites a podcast row as-is.
    pub fn put_podcast(&self, podcast: Podcast) {
        self.state.lock().podcasts.insert(podcast.id, podcast);
    }

    pub fn items(&self) -> Vec<Item> {
        let mut items: Vec<Item> = self.state.lock().items.values().cloned().collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        items
    }

    pub fn podcasts(&self) -> Vec<Podcast> {
        let mut podcasts: Vec<Podcast> = self.state.lock().podcasts.values().cloned().collect();
        podcasts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        podcasts
    }
}

fn update_if<T: Clone>(
    row: Option<&mut T>,
    guard: impl FnOnce(&T) -> bool,
    apply: impl FnOnce(&mut T),
) -> Option<T> {
    let row = row?;
    if !guard(&*row) {
        return None;
    }
    apply(&mut *row);
    Some(row.clone())
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn insert_item(&self, item: NewItem) -> Result<Item> {
        let mut state = self.state.lock();
        if state.items.contains_key(&item.id) {
            return Err(anyhow!("duplicate item id {}", item.id));
        }
        let item = Item::pending(item, Utc::now());
        state.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn find_item(&self, id: ItemId) -> Result<Option<Item>> {
        Ok(self.state.lock().items.get(&id).cloned())
    }

    async fn claim_pending_batch(&self, limit: i64) -> Result<Vec<Item>> {
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        let mut state = self.state.lock();

        let mut pending: Vec<&mut Item> = state
            .items
            .values_mut()
            .filter(|i| i.processing_status == ProcessingStatus::Pending)
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let now = Utc::now();
        Ok(pending
            .into_iter()
            .take(limit)
            .map(|item| {
                item.processing_status = ProcessingStatus::Processing;
                item.processing_error = None;
                item.updated_at = now;
                item.clone()
            })
            .collect())
    }

    async fn mark_completed(&self, id: ItemId, enrichment: &Enrichment) -> Result<Option<Item>> {
        let mut state = self.state.lock();
        Ok(update_if(
            state.items.get_mut(&id),
            |i| i.processing_status == ProcessingStatus::Processing,
            |i| i.apply_enrichment(enrichment, Utc::now()),
        ))
    }

    async fn mark_failed(&self, id: ItemId, message: &str) -> Result<Option<Item>> {
        let mut state = self.state.lock();
        Ok(update_if(
            state.items.get_mut(&id),
            |i| i.processing_status == ProcessingStatus::Processing,
            |i| {
                i.processing_status = ProcessingStatus::Failed;
                i.processing_error = Some(message.to_string());
                i.updated_at = Utc::now();
            },
        ))
    }

    async fn reset_failed(&self, id: ItemId) -> Result<Option<Item>> {
        let mut state = self.state.lock();
        Ok(update_if(
            state.items.get_mut(&id),
            |i| i.processing_status == ProcessingStatus::Failed,
            |i| {
                i.processing_status = ProcessingStatus::Pending;
                i.processing_error = None;
                i.updated_at = Utc::now();
            },
        ))
    }

    async fn set_read(&self, id: ItemId, is_read: Option<bool>) -> Result<Option<Item>> {
        let mut state = self.state.lock();
        Ok(update_if(
            state.items.get_mut(&id),
            |_| true,
            |i| {
                i.is_read = is_read;
                i.updated_at = Utc::now();
            },
        ))
    }

    async fn find_failed_since(&self, since: DateTime<Utc>) -> Result<Vec<Item>> {
        let mut items: Vec<Item> = self
            .state
            .lock()
            .items
            .values()
            .filter(|i| i.processing_status == ProcessingStatus::Failed && i.updated_at >= since)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.updated_at);
        Ok(items)
    }

    async fn find_unread_between(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Item>> {
        let mut items: Vec<Item> = self
            .state
            .lock()
            .items
            .values()
            .filter(|i| {
                i.user_id == user_id
                    && i.processing_status == ProcessingStatus::Completed
                    && i.is_read != Some(true)
                    && i.created_at >= from
                    && i.created_at < to
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(items)
    }
}

#[async_trait]
impl PodcastStore for MemoryStore {
    async fn create_podcast(&self, podcast: NewPodcast, item_ids: &[ItemId]) -> Result<Podcast> {
        let mut state = self.state.lock();
        if let Some(missing) = item_ids.iter().find(|id| !state.items.contains_key(id)) {
            return Err(anyhow!("item {} does not exist", missing));
        }
        let podcast = Podcast::pending(podcast, Utc::now());
        state.memberships.insert(podcast.id, item_ids.to_vec());
        state.podcasts.insert(podcast.id, podcast.clone());
        Ok(podcast)
    }

    async fn find_podcast(&self, id: PodcastId) -> Result<Option<Podcast>> {
        Ok(self.state.lock().podcasts.get(&id).cloned())
    }

    async fn podcast_items(&self, id: PodcastId) -> Result<Vec<Item>> {
        let state = self.state.lock();
        let Some(ids) = state.memberships.get(&id) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|item_id| state.items.get(item_id).cloned())
            .collect())
    }

    async fn podcast_memberships(&self, id: PodcastId) -> Result<Vec<PodcastItem>> {
        let state = self.state.lock();
        Ok(state
            .memberships
            .get(&id)
            .map(|ids| {
                ids.iter()
                    .enumerate()
                    .map(|(position, item_id)| PodcastItem {
                        podcast_id: id,
                        item_id: *item_id,
                        position: position as i32,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn transition_podcast(
        &self,
        id: PodcastId,
        from: PodcastStatus,
        to: PodcastStatus,
    ) -> Result<Option<Podcast>> {
        let mut state = self.state.lock();
        Ok(update_if(
            state.podcasts.get_mut(&id),
            |p| p.status == from,
            |p| {
                p.status = to;
                p.error_message = None;
                p.updated_at = Utc::now();
            },
        ))
    }

    async fn save_script(&self, id: PodcastId, script: &[DialogueTurn]) -> Result<Option<Podcast>> {
        let mut state = self.state.lock();
        Ok(update_if(
            state.podcasts.get_mut(&id),
            |p| p.status == PodcastStatus::Writing,
            |p| {
                p.script = Json(script.to_vec());
                p.updated_at = Utc::now();
            },
        ))
    }

    async fn complete_podcast(
        &self,
        id: PodcastId,
        audio_url: &str,
        duration_seconds: i32,
    ) -> Result<Option<Podcast>> {
        let mut state = self.state.lock();
        Ok(update_if(
            state.podcasts.get_mut(&id),
            |p| p.status == PodcastStatus::Generating,
            |p| {
                p.status = PodcastStatus::Completed;
                p.audio_url = Some(audio_url.to_string());
                p.duration_seconds = Some(duration_seconds);
                p.error_message = None;
                p.updated_at = Utc::now();
            },
        ))
    }

    async fn fail_podcast(&self, id: PodcastId, message: &str) -> Result<Option<Podcast>> {
        let mut state = self.state.lock();
        Ok(update_if(
            state.podcasts.get_mut(&id),
            |p| matches!(p.status, PodcastStatus::Writing | PodcastStatus::Generating),
            |p| {
                p.status = PodcastStatus::Failed;
                p.error_message = Some(message.to_string());
                p.audio_url = None;
                p.duration_seconds = None;
                p.updated_at = Utc::now();
            },
        ))
    }

    async fn add_podcast_item(
        &self,
        id: PodcastId,
        item_id: ItemId,
        position: Option<i32>,
    ) -> Result<PodcastItem> {
        let mut state = self.state.lock();
        if !state.podcasts.contains_key(&id) {
            return Err(anyhow!("podcast {} does not exist", id));
        }
        if !state.items.contains_key(&item_id) {
            return Err(anyhow!("item {} does not exist", item_id));
        }
        let members = state.memberships.entry(id).or_default();
        if members.contains(&item_id) {
            return Err(anyhow!("item {} is already part of podcast {}", item_id, id));
        }
        let position = clamp_position(position, members.len() as i64);
        members.insert(position as usize, item_id);
        Ok(PodcastItem {
            podcast_id: id,
            item_id,
            position,
        })
    }

    async fn remove_podcast_item(&self, id: PodcastId, item_id: ItemId) -> Result<MemberRemoval> {
        let mut state = self.state.lock();
        let Some(members) = state.memberships.get_mut(&id) else {
            return Ok(MemberRemoval::NotMember);
        };
        let Some(index) = members.iter().position(|m| *m == item_id) else {
            return Ok(MemberRemoval::NotMember);
        };
        if members.len() == 1 {
            return Ok(MemberRemoval::LastItem);
        }
        members.remove(index);
        Ok(MemberRemoval::Removed)
    }

    async fn delete_podcast(&self, id: PodcastId) -> Result<bool> {
        let mut state = self.state.lock();
        state.memberships.remove(&id);
        Ok(state.podcasts.remove(&id).is_some())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.state.lock().users.get(&id).cloned())
    }

    async fn users_with_email(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self
            .state
            .lock()
            .users
            .values()
            .filter(|u| u.has_email())
            .cloned()
            .collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }
}
