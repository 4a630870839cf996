use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use typed_builder::TypedBuilder;

use crate::common::{ItemId, PodcastId, UserId};
use crate::domains::items::Item;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "podcast_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PodcastStatus {
    #[default]
    Pending,
    Writing,
    Generating,
    Completed,
    Failed,
}

impl PodcastStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PodcastStatus::Pending => "pending",
            PodcastStatus::Writing => "writing",
            PodcastStatus::Generating => "generating",
            PodcastStatus::Completed => "completed",
            PodcastStatus::Failed => "failed",
        }
    }

    /// `failed -> writing` and `failed -> generating` are explicit
    /// regenerations requested by a caller; nothing retries automatically.
    pub fn can_transition_to(&self, next: PodcastStatus) -> bool {
        use PodcastStatus::*;
        matches!(
            (self, next),
            (Pending, Writing)
                | (Failed, Writing)
                | (Writing, Generating)
                | (Failed, Generating)
                | (Generating, Completed)
                | (Writing, Failed)
                | (Generating, Failed)
        )
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, PodcastStatus::Completed | PodcastStatus::Failed)
    }
}

impl std::fmt::Display for PodcastStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of a podcast script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueTurn {
    pub speaker: String,
    pub content: String,
}

impl DialogueTurn {
    pub fn new(speaker: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Podcast {
    pub id: PodcastId,
    pub user_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub status: PodcastStatus,
    pub script: Json<Vec<DialogueTurn>>,
    pub audio_url: Option<String>,
    pub duration_seconds: Option<i32>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct NewPodcast {
    #[builder(default = PodcastId::new())]
    pub id: PodcastId,
    pub user_id: UserId,
    pub title: String,
    #[builder(default, setter(strip_option))]
    pub description: Option<String>,
}

/// Ordered membership row. Positions are contiguous from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PodcastItem {
    pub podcast_id: PodcastId,
    pub item_id: ItemId,
    pub position: i32,
}

impl Podcast {
    pub fn pending(new: NewPodcast, now: DateTime<Utc>) -> Self {
        Self {
            id: new.id,
            user_id: new.user_id,
            title: new.title,
            description: new.description,
            status: PodcastStatus::Pending,
            script: Json(Vec::new()),
            audio_url: None,
            duration_seconds: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn turns(&self) -> &[DialogueTurn] {
        &self.script.0
    }

    pub fn has_script(&self) -> bool {
        !self.script.0.is_empty()
    }

    /// Audio URL and duration travel together and only on completed podcasts.
    pub fn audio_matches_status(&self) -> bool {
        let has_audio = self.audio_url.is_some() && self.duration_seconds.is_some();
        let no_audio = self.audio_url.is_none() && self.duration_seconds.is_none();
        if self.status == PodcastStatus::Completed {
            has_audio
        } else {
            no_audio
        }
    }
}

// =============================================================================
// SQL Queries
// =============================================================================

impl Podcast {
    /// Inserts the podcast and its ordered item rows in one transaction.
    pub async fn create_with_items(
        new: &NewPodcast,
        item_ids: &[ItemId],
        pool: &PgPool,
    ) -> Result<Self> {
        let mut tx = pool.begin().await?;

        let podcast = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO podcasts (id, user_id, title, description, status, script)
            VALUES ($1, $2, $3, $4, 'pending', '[]'::jsonb)
            RETURNING *
            "#,
        )
        .bind(new.id)
        .bind(new.user_id)
        .bind(&new.title)
        .bind(&new.description)
        .fetch_one(&mut *tx)
        .await?;

        for (position, item_id) in item_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO podcast_items (podcast_id, item_id, position) VALUES ($1, $2, $3)",
            )
            .bind(podcast.id)
            .bind(item_id)
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(podcast)
    }

    pub async fn find_by_id(id: PodcastId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM podcasts WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Moves `from -> to` only if the row is still in `from`.
    pub async fn transition(
        id: PodcastId,
        from: PodcastStatus,
        to: PodcastStatus,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE podcasts
            SET status = $3, error_message = NULL, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn save_script(
        id: PodcastId,
        script: &[DialogueTurn],
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE podcasts
            SET script = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'writing'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(Json(script))
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Status, audio URL and duration land in the same statement.
    pub async fn complete(
        id: PodcastId,
        audio_url: &str,
        duration_seconds: i32,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE podcasts
            SET status = 'completed',
                audio_url = $2,
                duration_seconds = $3,
                error_message = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'generating'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(audio_url)
        .bind(duration_seconds)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn fail(id: PodcastId, message: &str, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE podcasts
            SET status = 'failed',
                error_message = $2,
                audio_url = NULL,
                duration_seconds = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('writing', 'generating')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(message)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Items in script order.
    pub async fn items(id: PodcastId, pool: &PgPool) -> Result<Vec<Item>> {
        sqlx::query_as::<_, Item>(
            r#"
            SELECT i.*
            FROM items i
            INNER JOIN podcast_items pi ON pi.item_id = i.id
            WHERE pi.podcast_id = $1
            ORDER BY pi.position ASC
            "#,
        )
        .bind(id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Deletes join rows first, then the podcast, in one transaction.
    pub async fn delete(id: PodcastId, pool: &PgPool) -> Result<bool> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM podcast_items WHERE podcast_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM podcasts WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}

impl PodcastItem {
    pub async fn find_for_podcast(podcast_id: PodcastId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM podcast_items WHERE podcast_id = $1 ORDER BY position ASC",
        )
        .bind(podcast_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Inserts at `position` (clamped to the current count), shifting later
    /// rows down. `None` appends.
    pub async fn insert(
        podcast_id: PodcastId,
        item_id: ItemId,
        position: Option<i32>,
        pool: &PgPool,
    ) -> Result<Self> {
        let mut tx = pool.begin().await?;

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM podcast_items WHERE podcast_id = $1")
                .bind(podcast_id)
                .fetch_one(&mut *tx)
                .await?;
        let position = clamp_position(position, count);

        sqlx::query(
            "UPDATE podcast_items SET position = position + 1 WHERE podcast_id = $1 AND position >= $2",
        )
        .bind(podcast_id)
        .bind(position)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO podcast_items (podcast_id, item_id, position)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(podcast_id)
        .bind(item_id)
        .bind(position)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row)
    }

    /// Removes the row and closes the gap it leaves, unless it is the
    /// podcast's only item.
    ///
    /// The podcast row is locked first so concurrent removals on the same
    /// podcast see each other's deletes before counting.
    pub async fn remove(
        podcast_id: PodcastId,
        item_id: ItemId,
        pool: &PgPool,
    ) -> Result<MemberRemoval> {
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT id FROM podcasts WHERE id = $1 FOR UPDATE")
            .bind(podcast_id)
            .fetch_optional(&mut *tx)
            .await?;

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM podcast_items WHERE podcast_id = $1")
                .bind(podcast_id)
                .fetch_one(&mut *tx)
                .await?;

        let removed: Option<i32> = sqlx::query_scalar(
            "DELETE FROM podcast_items WHERE podcast_id = $1 AND item_id = $2 RETURNING position",
        )
        .bind(podcast_id)
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(position) = removed else {
            tx.rollback().await?;
            return Ok(MemberRemoval::NotMember);
        };
        if count <= 1 {
            tx.rollback().await?;
            return Ok(MemberRemoval::LastItem);
        }

        sqlx::query(
            "UPDATE podcast_items SET position = position - 1 WHERE podcast_id = $1 AND position > $2",
        )
        .bind(podcast_id)
        .bind(position)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(MemberRemoval::Removed)
    }
}

/// Result of taking one item out of a podcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRemoval {
    Removed,
    NotMember,
    /// Refused: a podcast keeps at least one item.
    LastItem,
}

/// Requested insert position bounded to `[0, count]`.
pub fn clamp_position(position: Option<i32>, count: i64) -> i32 {
    let count = i32::try_from(count).unwrap_or(i32::MAX);
    match position {
        Some(p) => p.clamp(0, count),
        None => count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_only_from_active_stages() {
        use PodcastStatus::*;
        assert!(Writing.can_transition_to(Failed));
        assert!(Generating.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Generating));
        assert!(!Completed.can_transition_to(Writing));
    }

    #[test]
    fn clamp_position_appends_by_default() {
        assert_eq!(clamp_position(None, 3), 3);
        assert_eq!(clamp_position(Some(1), 3), 1);
        assert_eq!(clamp_position(Some(10), 3), 3);
        assert_eq!(clamp_position(Some(-2), 3), 0);
    }

    #[test]
    fn pending_podcast_has_no_audio() {
        let podcast = Podcast::pending(
            NewPodcast::builder()
                .user_id(UserId::new())
                .title("Daily")
                .build(),
            Utc::now(),
        );
        assert_eq!(podcast.status, PodcastStatus::Pending);
        assert!(!podcast.has_script());
        assert!(podcast.audio_matches_status());
    }
}
