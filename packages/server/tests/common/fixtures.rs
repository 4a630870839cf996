//! Test fixtures for creating test data.
//!
//! In-memory fixtures write straight into the MemoryStore so tests can set up
//! states (completed yesterday, already read) the queue would take a full
//! pipeline run to reach.

use std::future::Future;
use std::time::Duration;

use briefcast_core::common::UserId;
use briefcast_core::domains::items::{Item, NewItem, ProcessingStatus};
use briefcast_core::domains::users::User;
use briefcast_core::kernel::store::MemoryStore;
use chrono::{DateTime, Utc};

/// Create a user with the given address ("" for none)
pub fn create_user(store: &MemoryStore, email: &str) -> User {
    let user = User {
        id: UserId::new(),
        email: email.to_string(),
        display_name: Some("Test Reader".to_string()),
        created_at: Utc::now(),
    };
    store.put_user(user.clone());
    user
}

/// Create a completed, unread item saved at `created_at`
pub fn create_completed_item(
    store: &MemoryStore,
    user_id: UserId,
    url: &str,
    created_at: DateTime<Utc>,
) -> Item {
    let mut item = Item::pending(
        NewItem::builder()
            .user_id(user_id)
            .url(url)
            .title(format!("Saved {}", url))
            .build(),
        created_at,
    );
    item.processing_status = ProcessingStatus::Completed;
    item.summary = Some(format!("Summary of {}", url));
    item.content = Some(format!("Content of {}", url));
    store.put_item(item.clone());
    item
}

/// Noon of the previous UTC day, inside the digest window
pub fn yesterday() -> DateTime<Utc> {
    let (from, _) = briefcast_core::domains::digest::previous_day_window(Utc::now());
    from + chrono::Duration::hours(12)
}

/// Polls `check` every 10ms until it returns true or `timeout` passes.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
