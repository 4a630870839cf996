use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use typed_builder::TypedBuilder;

use crate::common::{ItemId, UserId};

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "processing_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    /// Edges of the item state machine. `failed -> pending` is the manual retry.
    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Processing, Completed) | (Processing, Failed) | (Failed, Pending)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Item Model
// ============================================================================

/// One ingested URL and its enrichment state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Item {
    pub id: ItemId,
    pub user_id: UserId,
    pub url: String,
    pub title: String,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub content_type: Option<String>,
    pub platform: Option<String>,
    pub tags: Vec<String>,
    pub authors: Vec<String>,
    pub is_read: Option<bool>,
    pub processing_status: ProcessingStatus,
    pub processing_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied at enqueue time. Everything else starts empty.
#[derive(Debug, Clone, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct NewItem {
    #[builder(default = ItemId::new())]
    pub id: ItemId,
    pub user_id: UserId,
    pub url: String,
    #[builder(default)]
    pub title: String,
}

/// Output of the scrape -> extract -> summarize pipeline.
///
/// Carries no `is_read` or `url`: a completion can only write
/// the columns the pipeline owns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub title: Option<String>,
    pub content: String,
    pub summary: String,
    pub content_type: Option<String>,
    pub platform: Option<String>,
    pub tags: Vec<String>,
    pub authors: Vec<String>,
}

impl Enrichment {
    /// Tags and authors are sets: trimmed, empty entries dropped, deduplicated
    /// and sorted so two enrichments of the same page compare equal.
    pub fn normalized(mut self) -> Self {
        self.tags = normalize_set(self.tags);
        self.authors = normalize_set(self.authors);
        self
    }
}

pub fn normalize_set(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

impl Item {
    /// Builds the in-memory representation of a freshly enqueued item.
    pub fn pending(new: NewItem, now: DateTime<Utc>) -> Self {
        Self {
            id: new.id,
            user_id: new.user_id,
            url: new.url,
            title: new.title,
            content: None,
            summary: None,
            content_type: None,
            platform: None,
            tags: Vec::new(),
            authors: Vec::new(),
            is_read: None,
            processing_status: ProcessingStatus::Pending,
            processing_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies an enrichment the way `mark_completed` does in SQL.
    pub fn apply_enrichment(&mut self, enrichment: &Enrichment, now: DateTime<Utc>) {
        if let Some(title) = enrichment.title.as_ref().filter(|t| !t.trim().is_empty()) {
            self.title = title.clone();
        }
        self.content = Some(enrichment.content.clone());
        self.summary = Some(enrichment.summary.clone());
        self.content_type = enrichment.content_type.clone();
        self.platform = enrichment.platform.clone();
        self.tags = enrichment.tags.clone();
        self.authors = enrichment.authors.clone();
        self.processing_status = ProcessingStatus::Completed;
        self.processing_error = None;
        self.updated_at = now;
    }

    /// `processing_error` is present iff the item failed.
    pub fn error_matches_status(&self) -> bool {
        let has_error = self
            .processing_error
            .as_deref()
            .is_some_and(|e| !e.is_empty());
        has_error == (self.processing_status == ProcessingStatus::Failed)
    }
}

// =============================================================================
// SQL Queries
// =============================================================================

impl Item {
    pub async fn create(new: &NewItem, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO items (id, user_id, url, title, processing_status)
            VALUES ($1, $2, $3, $4, 'pending')
            RETURNING *
            "#,
        )
        .bind(new.id)
        .bind(new.user_id)
        .bind(&new.url)
        .bind(&new.title)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_id(id: ItemId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM items WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Claims up to `limit` pending items in one statement.
    ///
    /// Rows locked by a concurrent claimer are skipped, so two callers never
    /// see the same item. Results are returned oldest first.
    pub async fn claim_pending(limit: i64, pool: &PgPool) -> Result<Vec<Self>> {
        let mut items = sqlx::query_as::<_, Self>(
            r#"
            WITH next_items AS (
                SELECT id
                FROM items
                WHERE processing_status = 'pending'
                ORDER BY created_at ASC, id ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE items
            SET processing_status = 'processing',
                processing_error = NULL,
                updated_at = NOW()
            WHERE id IN (SELECT id FROM next_items)
            RETURNING *
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await?;

        // RETURNING has no defined order
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    /// Writes the enrichment columns only; `url` and `is_read` are untouched.
    pub async fn mark_completed(
        id: ItemId,
        enrichment: &Enrichment,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE items
            SET title = COALESCE(NULLIF(BTRIM($2), ''), title),
                content = $3,
                summary = $4,
                content_type = $5,
                platform = $6,
                tags = $7,
                authors = $8,
                processing_status = 'completed',
                processing_error = NULL,
                updated_at = NOW()
            WHERE id = $1 AND processing_status = 'processing'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&enrichment.title)
        .bind(&enrichment.content)
        .bind(&enrichment.summary)
        .bind(&enrichment.content_type)
        .bind(&enrichment.platform)
        .bind(&enrichment.tags)
        .bind(&enrichment.authors)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn mark_failed(id: ItemId, message: &str, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE items
            SET processing_status = 'failed',
                processing_error = $2,
                updated_at = NOW()
            WHERE id = $1 AND processing_status = 'processing'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(message)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn reset_failed(id: ItemId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE items
            SET processing_status = 'pending',
                processing_error = NULL,
                updated_at = NOW()
            WHERE id = $1 AND processing_status = 'failed'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn set_read(id: ItemId, is_read: Option<bool>, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "UPDATE items SET is_read = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(is_read)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_failed_since(since: DateTime<Utc>, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM items
            WHERE processing_status = 'failed' AND updated_at >= $1
            ORDER BY updated_at ASC
            "#,
        )
        .bind(since)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Completed items the user has not read, created in `[from, to)`.
    pub async fn find_unread_between(
        user_id: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        pool: &PgPool,
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM items
            WHERE user_id = $1
              AND processing_status = 'completed'
              AND is_read IS NOT TRUE
              AND created_at >= $2
              AND created_at < $3
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_state_machine_edges_are_allowed() {
        use ProcessingStatus::*;
        let all = [Pending, Processing, Completed, Failed];
        let allowed = [
            (Pending, Processing),
            (Processing, Completed),
            (Processing, Failed),
            (Failed, Pending),
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ProcessingStatus::Processing).unwrap(),
            "\"processing\""
        );
    }

    #[test]
    fn normalize_set_dedupes_and_trims() {
        let tags = vec![
            " rust ".to_string(),
            "async".to_string(),
            "".to_string(),
            "rust".to_string(),
        ];
        assert_eq!(normalize_set(tags), vec!["async", "rust"]);
    }

    #[test]
    fn apply_enrichment_keeps_read_flag_and_url() {
        let now = Utc::now();
        let new = NewItem::builder()
            .user_id(UserId::new())
            .url("https://example.com/a")
            .title("Original")
            .build();
        let mut item = Item::pending(new, now);
        item.is_read = Some(true);
        item.processing_status = ProcessingStatus::Processing;

        let enrichment = Enrichment {
            title: Some("  ".to_string()),
            content: "body".to_string(),
            summary: "short".to_string(),
            ..Default::default()
        };
        item.apply_enrichment(&enrichment, now);

        assert_eq!(item.is_read, Some(true));
        assert_eq!(item.url, "https://example.com/a");
        assert_eq!(item.title, "Original");
        assert_eq!(item.processing_status, ProcessingStatus::Completed);
        assert!(item.error_matches_status());
    }
}
