use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::common::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn has_email(&self) -> bool {
        !self.email.trim().is_empty()
    }

    /// Name used in greetings, falling back to the email's local part.
    pub fn greeting_name(&self) -> &str {
        match self.display_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => self.email.split('@').next().unwrap_or(&self.email),
        }
    }
}

// =============================================================================
// SQL Queries
// =============================================================================

impl User {
    pub async fn find_by_id(id: UserId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn find_with_email(pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM users WHERE BTRIM(email) <> '' ORDER BY created_at ASC",
        )
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn create(id: UserId, email: &str, display_name: Option<&str>, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO users (id, email, display_name) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(id)
        .bind(email)
        .bind(display_name)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str, name: Option<&str>) -> User {
        User {
            id: UserId::new(),
            email: email.to_string(),
            display_name: name.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn greeting_prefers_display_name() {
        assert_eq!(user("ada@example.com", Some("Ada")).greeting_name(), "Ada");
        assert_eq!(user("ada@example.com", Some("  ")).greeting_name(), "ada");
    }

    #[test]
    fn blank_email_does_not_count() {
        assert!(!user("   ", None).has_email());
    }
}
