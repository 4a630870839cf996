//! Podcast generation: script, then audio.
//!
//! ```text
//! pending ──► writing ──► generating ──► completed
//!                │             │
//!                └──► failed ◄─┘
//! ```
//!
//! The pipeline owns the `failed` transition: once a stage has moved the
//! podcast into `writing` or `generating`, any error marks it failed with the
//! error text before the error is returned.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::models::{
    DialogueTurn, MemberRemoval, NewPodcast, Podcast, PodcastItem, PodcastStatus,
};
use super::voices::VoiceMap;
use crate::common::{CoreError, ItemId, PodcastId, Result, UserId};
use crate::domains::items::Item;
use crate::kernel::store::PodcastStore;
use crate::kernel::{BaseAudioStitcher, BaseBlobStorage, BaseScriptWriter, BaseSpeechSynthesizer};

pub const TRUNCATION_MARKER: &str = "... [truncated]";
pub const ITEM_DELIMITER: &str = "\n\n---\n\n";

#[derive(Debug, Clone)]
pub struct PodcastConfig {
    pub voices: VoiceMap,
    pub speech_speed: f32,
    /// Per-item content cap when building the script prompt
    pub max_item_chars: usize,
    /// Turns synthesized at the same time. Output order is unaffected.
    pub synthesis_concurrency: usize,
    pub audio_content_type: String,
    pub storage_prefix: String,
}

impl Default for PodcastConfig {
    fn default() -> Self {
        Self {
            voices: VoiceMap::default(),
            speech_speed: 1.0,
            max_item_chars: 2000,
            synthesis_concurrency: 4,
            audio_content_type: "audio/mpeg".to_string(),
            storage_prefix: "podcasts".to_string(),
        }
    }
}

/// Status snapshot used by pollers.
#[derive(Debug, Clone, Serialize)]
pub struct PodcastProgress {
    pub id: PodcastId,
    pub status: PodcastStatus,
    pub audio_url: Option<String>,
    pub duration_seconds: Option<i32>,
    pub error_message: Option<String>,
}

impl From<Podcast> for PodcastProgress {
    fn from(p: Podcast) -> Self {
        Self {
            id: p.id,
            status: p.status,
            audio_url: p.audio_url,
            duration_seconds: p.duration_seconds,
            error_message: p.error_message,
        }
    }
}

/// Cuts `text` to `max` characters, marking the cut.
pub fn truncate_content(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}{}", &text[..idx], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

/// Builds the script prompt body from items in podcast order.
pub fn build_script_content(items: &[Item], max_item_chars: usize) -> String {
    items
        .iter()
        .map(|item| {
            let mut block = format!("Title: {}", item.title);
            if let Some(summary) = item.summary.as_deref().filter(|s| !s.is_empty()) {
                block.push_str(&format!("\nSummary: {}", summary));
            }
            if let Some(content) = item.content.as_deref().filter(|c| !c.is_empty()) {
                block.push_str(&format!(
                    "\nContent: {}",
                    truncate_content(content, max_item_chars)
                ));
            }
            block
        })
        .collect::<Vec<_>>()
        .join(ITEM_DELIMITER)
}

fn whole_seconds(duration: f64) -> i32 {
    duration.round().clamp(0.0, i32::MAX as f64) as i32
}

pub struct PodcastPipeline {
    store: Arc<dyn PodcastStore>,
    script_writer: Arc<dyn BaseScriptWriter>,
    speech: Arc<dyn BaseSpeechSynthesizer>,
    stitcher: Arc<dyn BaseAudioStitcher>,
    storage: Arc<dyn BaseBlobStorage>,
    config: PodcastConfig,
}

impl PodcastPipeline {
    pub fn new(
        store: Arc<dyn PodcastStore>,
        script_writer: Arc<dyn BaseScriptWriter>,
        speech: Arc<dyn BaseSpeechSynthesizer>,
        stitcher: Arc<dyn BaseAudioStitcher>,
        storage: Arc<dyn BaseBlobStorage>,
        config: PodcastConfig,
    ) -> Self {
        Self {
            store,
            script_writer,
            speech,
            stitcher,
            storage,
            config,
        }
    }

    /// Creates a pending podcast over `item_ids`, in that order.
    pub async fn create_podcast(
        &self,
        user_id: UserId,
        title: &str,
        description: Option<&str>,
        item_ids: &[ItemId],
    ) -> Result<Podcast> {
        if item_ids.is_empty() {
            return Err(CoreError::Validation(
                "a podcast needs at least one item".into(),
            ));
        }
        let title = title.trim();
        if title.is_empty() {
            return Err(CoreError::Validation("podcast title is required".into()));
        }

        let mut new = NewPodcast::builder().user_id(user_id).title(title).build();
        new.description = description.map(str::to_string);

        let podcast = self.store.create_podcast(new, item_ids).await?;
        info!(podcast_id = %podcast.id, items = item_ids.len(), "Podcast created");
        Ok(podcast)
    }

    pub async fn podcast(&self, id: PodcastId) -> Result<Podcast> {
        self.store
            .find_podcast(id)
            .await?
            .ok_or_else(|| CoreError::not_found("podcast", id))
    }

    pub async fn status(&self, id: PodcastId) -> Result<PodcastProgress> {
        Ok(self.podcast(id).await?.into())
    }

    /// Writes the script from the podcast's items.
    pub async fn generate_script(&self, id: PodcastId) -> Result<Podcast> {
        let podcast = self.podcast(id).await?;
        let items = self.store.podcast_items(id).await?;
        if items.is_empty() {
            return Err(CoreError::NoItems(id));
        }

        self.advance(&podcast, PodcastStatus::Writing).await?;
        info!(podcast_id = %id, items = items.len(), "Writing podcast script");

        let result = self.write_script(id, &items).await;
        self.fail_on_error(id, result).await
    }

    async fn write_script(&self, id: PodcastId, items: &[Item]) -> Result<Podcast> {
        let content = build_script_content(items, self.config.max_item_chars);
        let script = self
            .script_writer
            .write_script(&content)
            .await
            .map_err(CoreError::generation)?;
        if script.is_empty() {
            return Err(CoreError::Generation("script writer returned no turns".into()));
        }

        let podcast = self
            .store
            .save_script(id, &script)
            .await?
            .ok_or_else(|| CoreError::transition("podcast", "unknown", "script saved"))?;
        debug!(podcast_id = %id, turns = script.len(), "Script saved");
        Ok(podcast)
    }

    /// Synthesizes, stitches and uploads the podcast audio.
    ///
    /// Every speaker is mapped to a voice before anything is synthesized, so
    /// a bad script fails without producing partial audio. Per-turn files
    /// live in a temporary directory removed when this returns.
    pub async fn generate_audio(&self, id: PodcastId) -> Result<Podcast> {
        let podcast = self.podcast(id).await?;
        if !podcast.has_script() {
            return Err(CoreError::Validation(format!(
                "podcast {} has no script yet",
                id
            )));
        }

        let voices: Vec<String> = match self.config.voices.resolve_script(podcast.turns()) {
            Ok(voices) => voices.into_iter().map(str::to_string).collect(),
            Err(e) => {
                // Can never succeed without a new script
                self.mark_failed(id, &e).await;
                return Err(e);
            }
        };

        self.advance(&podcast, PodcastStatus::Generating).await?;
        info!(podcast_id = %id, turns = voices.len(), "Generating podcast audio");

        let result = self.render_audio(id, podcast.turns(), &voices).await;
        self.fail_on_error(id, result).await
    }

    async fn render_audio(
        &self,
        id: PodcastId,
        turns: &[DialogueTurn],
        voices: &[String],
    ) -> Result<Podcast> {
        let workdir = tempfile::Builder::new()
            .prefix("podcast-")
            .tempdir()
            .map_err(|e| CoreError::Generation(format!("failed to create work dir: {}", e)))?;
        let dir = workdir.path().to_path_buf();

        let renders: Vec<BoxFuture<'_, Result<PathBuf>>> = turns
            .iter()
            .zip(voices)
            .enumerate()
            .map(|(index, (turn, voice))| self.render_turn(index, turn, voice, dir.clone()).boxed())
            .collect();

        // `buffered` yields in input order however the syntheses interleave
        let parts: Vec<PathBuf> = futures::stream::iter(renders)
            .buffered(self.config.synthesis_concurrency.max(1))
            .try_collect()
            .await?;

        let output = dir.join("podcast.mp3");
        let stitched = self
            .stitcher
            .stitch(&parts, &output)
            .await
            .map_err(CoreError::generation)?;

        let key = format!("{}/{}.mp3", self.config.storage_prefix, id);
        let audio_url = self
            .storage
            .upload(&key, stitched.bytes, &self.config.audio_content_type)
            .await
            .map_err(CoreError::generation)?;

        let duration = whole_seconds(stitched.duration_seconds);
        let podcast = self
            .store
            .complete_podcast(id, &audio_url, duration)
            .await?
            .ok_or_else(|| CoreError::transition("podcast", "unknown", PodcastStatus::Completed))?;

        info!(podcast_id = %id, audio_url = %audio_url, duration_seconds = duration, "Podcast completed");
        drop(workdir);
        Ok(podcast)
    }

    async fn render_turn(
        &self,
        index: usize,
        turn: &DialogueTurn,
        voice: &str,
        dir: PathBuf,
    ) -> Result<PathBuf> {
        let handle = self
            .speech
            .synthesize(&turn.content, voice, self.config.speech_speed)
            .await
            .map_err(|e| CoreError::generation(e.context(format!("turn {} synthesis failed", index))))?;
        let audio = self
            .speech
            .download(&handle)
            .await
            .map_err(|e| CoreError::generation(e.context(format!("turn {} download failed", index))))?;

        let path = dir.join(format!("turn-{:04}.mp3", index));
        tokio::fs::write(&path, &audio)
            .await
            .map_err(|e| CoreError::Generation(format!("failed to write turn {}: {}", index, e)))?;
        Ok(path)
    }

    /// Script then audio. The first error stops the run.
    pub async fn process_podcast(&self, id: PodcastId) -> Result<Podcast> {
        self.generate_script(id).await?;
        self.generate_audio(id).await
    }

    /// Adds an item at `position`, or at the end when `None`.
    pub async fn add_item(
        &self,
        id: PodcastId,
        item_id: ItemId,
        position: Option<i32>,
    ) -> Result<PodcastItem> {
        self.podcast(id).await?;
        Ok(self.store.add_podcast_item(id, item_id, position).await?)
    }

    /// Removes an item. A podcast keeps at least one item.
    pub async fn remove_item(&self, id: PodcastId, item_id: ItemId) -> Result<()> {
        match self.store.remove_podcast_item(id, item_id).await? {
            MemberRemoval::Removed => {
                debug!(podcast_id = %id, item_id = %item_id, "Item removed from podcast");
                Ok(())
            }
            MemberRemoval::NotMember => Err(CoreError::not_found("podcast item", item_id)),
            MemberRemoval::LastItem => Err(CoreError::Validation(
                "cannot remove the last item of a podcast".into(),
            )),
        }
    }

    pub async fn items(&self, id: PodcastId) -> Result<Vec<Item>> {
        Ok(self.store.podcast_items(id).await?)
    }

    /// Removes item associations, then the podcast.
    pub async fn delete(&self, id: PodcastId) -> Result<()> {
        if !self.store.delete_podcast(id).await? {
            return Err(CoreError::not_found("podcast", id));
        }
        info!(podcast_id = %id, "Podcast deleted");
        Ok(())
    }

    async fn advance(&self, podcast: &Podcast, to: PodcastStatus) -> Result<Podcast> {
        if !podcast.status.can_transition_to(to) {
            return Err(CoreError::transition("podcast", podcast.status, to));
        }
        match self
            .store
            .transition_podcast(podcast.id, podcast.status, to)
            .await?
        {
            Some(updated) => Ok(updated),
            None => {
                // Lost a race with another caller
                let current = self.podcast(podcast.id).await?;
                Err(CoreError::transition("podcast", current.status, to))
            }
        }
    }

    /// Records `cause` on a run whose caller stopped waiting for it.
    ///
    /// The run itself must already be stopped. A podcast that never left
    /// `pending` or already finished keeps its status.
    pub async fn abandon(&self, id: PodcastId, cause: &CoreError) {
        self.mark_failed(id, cause).await;
    }

    async fn fail_on_error(&self, id: PodcastId, result: Result<Podcast>) -> Result<Podcast> {
        if let Err(e) = &result {
            self.mark_failed(id, e).await;
        }
        result
    }

    async fn mark_failed(&self, id: PodcastId, cause: &CoreError) {
        warn!(podcast_id = %id, error = %cause, "Podcast generation failed");
        match self.store.fail_podcast(id, &cause.to_string()).await {
            Ok(Some(_)) => {}
            Ok(None) => debug!(podcast_id = %id, "Podcast not in an active stage, status left as is"),
            Err(e) => error!(podcast_id = %id, error = %e, "Failed to record podcast failure"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::items::NewItem;
    use chrono::Utc;

    fn item(title: &str, summary: Option<&str>, content: Option<&str>) -> Item {
        let mut item = Item::pending(
            NewItem::builder()
                .user_id(UserId::new())
                .url("https://example.com")
                .title(title)
                .build(),
            Utc::now(),
        );
        item.summary = summary.map(str::to_string);
        item.content = content.map(str::to_string);
        item
    }

    #[test]
    fn truncation_marks_the_cut() {
        assert_eq!(truncate_content("abcdef", 3), format!("abc{}", TRUNCATION_MARKER));
        assert_eq!(truncate_content("abc", 3), "abc");
    }

    #[test]
    fn script_content_keeps_item_order_and_delimits() {
        let items = vec![
            item("A", Some("sa"), Some("ca")),
            item("B", None, Some(&"x".repeat(50))),
            item("C", Some("sc"), None),
        ];
        let content = build_script_content(&items, 10);
        let blocks: Vec<&str> = content.split(ITEM_DELIMITER).collect();

        assert_eq!(blocks.len(), 3);
        assert!(blocks[0].starts_with("Title: A\nSummary: sa\nContent: ca"));
        assert!(blocks[1].ends_with(&format!("{}{}", "x".repeat(10), TRUNCATION_MARKER)));
        assert_eq!(blocks[2], "Title: C\nSummary: sc");
    }

    #[test]
    fn durations_round_to_whole_seconds() {
        assert_eq!(whole_seconds(12.4), 12);
        assert_eq!(whole_seconds(12.5), 13);
        assert_eq!(whole_seconds(-1.0), 0);
    }
}
