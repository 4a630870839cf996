//! Integration tests for the item job queue.
//!
//! Covers the claim guarantees (no double claims under contention), the
//! status/error invariant, read-flag preservation through completion and
//! the retry transition rules.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use briefcast_core::common::{CoreError, UserId};
use briefcast_core::domains::items::{
    default_retry_window, Enrichment, ItemQueue, ItemUpdateHub, ProcessingStatus, UpdateType,
};
use briefcast_core::kernel::store::MemoryStore;
use chrono::Utc;

use crate::common::init_tracing;

fn queue() -> (ItemQueue, Arc<MemoryStore>) {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    (ItemQueue::new(store.clone(), ItemUpdateHub::new()), store)
}

fn enrichment(title: &str) -> Enrichment {
    Enrichment {
        title: Some(title.to_string()),
        content: "# Content".to_string(),
        summary: "A summary.".to_string(),
        content_type: Some("article".to_string()),
        platform: Some("web".to_string()),
        tags: vec!["b".to_string(), "a".to_string(), "a".to_string()],
        authors: vec!["Ada".to_string()],
    }
}

// =============================================================================
// Claiming
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_never_overlap() {
    let (queue, _) = queue();
    let user = UserId::new();
    for n in 0..60 {
        queue
            .enqueue(user, &format!("https://example.com/{}", n), "")
            .await
            .unwrap();
    }

    let claimers: Vec<_> = (0..8)
        .map(|_| {
            let queue = queue.clone();
            tokio::spawn(async move {
                let mut claimed = Vec::new();
                loop {
                    let batch = queue.claim_batch(4).await.unwrap();
                    if batch.is_empty() {
                        return claimed;
                    }
                    claimed.extend(batch.into_iter().map(|i| i.id));
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    let mut all = Vec::new();
    for claimer in claimers {
        all.extend(claimer.await.unwrap());
    }

    let unique: HashSet<_> = all.iter().copied().collect();
    assert_eq!(all.len(), 60, "every item claimed exactly once");
    assert_eq!(unique.len(), 60);
}

#[tokio::test]
async fn claim_moves_items_to_processing_oldest_first() {
    let (queue, store) = queue();
    let user = UserId::new();
    let first = queue.enqueue(user, "https://example.com/1", "").await.unwrap();
    let second = queue.enqueue(user, "https://example.com/2", "").await.unwrap();
    queue.enqueue(user, "https://example.com/3", "").await.unwrap();

    let batch = queue.claim_batch(2).await.unwrap();

    assert_eq!(batch.len(), 2);
    let claimed: HashSet<_> = batch.iter().map(|i| i.id).collect();
    assert!(claimed.contains(&first.id));
    assert!(claimed.contains(&second.id));
    assert!(batch
        .iter()
        .all(|i| i.processing_status == ProcessingStatus::Processing));

    let pending = store
        .items()
        .into_iter()
        .filter(|i| i.processing_status == ProcessingStatus::Pending)
        .count();
    assert_eq!(pending, 1);
}

#[tokio::test]
async fn claim_with_non_positive_limit_is_empty() {
    let (queue, _) = queue();
    queue
        .enqueue(UserId::new(), "https://example.com", "")
        .await
        .unwrap();

    assert!(queue.claim_batch(0).await.unwrap().is_empty());
    assert!(queue.claim_batch(-3).await.unwrap().is_empty());
}

// =============================================================================
// Completion and failure
// =============================================================================

#[tokio::test]
async fn completion_preserves_read_flag_and_url() {
    let (queue, _) = queue();
    let item = queue
        .enqueue(UserId::new(), "https://example.com/keep", "Original")
        .await
        .unwrap();
    queue.mark_read(item.id, Some(true)).await.unwrap();
    queue.claim_batch(1).await.unwrap();

    let done = queue.complete(item.id, enrichment("Enriched")).await.unwrap();

    assert_eq!(done.is_read, Some(true));
    assert_eq!(done.url, "https://example.com/keep");
    assert_eq!(done.title, "Enriched");
    assert_eq!(done.tags, vec!["a", "b"]);
    assert_eq!(done.processing_status, ProcessingStatus::Completed);
    assert!(done.processing_error.is_none());
}

#[tokio::test]
async fn blank_enriched_title_keeps_existing_title() {
    let (queue, _) = queue();
    let item = queue
        .enqueue(UserId::new(), "https://example.com", "Saved title")
        .await
        .unwrap();
    queue.claim_batch(1).await.unwrap();

    let done = queue.complete(item.id, enrichment("   ")).await.unwrap();
    assert_eq!(done.title, "Saved title");
}

#[tokio::test]
async fn error_is_present_exactly_when_failed() {
    let (queue, store) = queue();
    let user = UserId::new();
    let ok = queue.enqueue(user, "https://example.com/ok", "").await.unwrap();
    let bad = queue.enqueue(user, "https://example.com/bad", "").await.unwrap();
    queue.claim_batch(10).await.unwrap();

    queue.complete(ok.id, enrichment("Ok")).await.unwrap();
    let failed = queue.fail(bad.id, "HTTP 404").await.unwrap();
    assert_eq!(failed.processing_error.as_deref(), Some("HTTP 404"));

    let retried = queue.retry(bad.id).await.unwrap();
    assert_eq!(retried.processing_status, ProcessingStatus::Pending);
    assert!(retried.processing_error.is_none());

    for item in store.items() {
        assert!(item.error_matches_status(), "{:?}", item);
    }
}

#[tokio::test]
async fn blank_failure_message_gets_a_default() {
    let (queue, _) = queue();
    let item = queue
        .enqueue(UserId::new(), "https://example.com", "")
        .await
        .unwrap();
    queue.claim_batch(1).await.unwrap();

    let failed = queue.fail(item.id, "  ").await.unwrap();
    assert_eq!(failed.processing_error.as_deref(), Some("processing failed"));
}

#[tokio::test]
async fn complete_requires_processing() {
    let (queue, _) = queue();
    let item = queue
        .enqueue(UserId::new(), "https://example.com", "")
        .await
        .unwrap();

    let err = queue.complete(item.id, enrichment("x")).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidTransition { .. }), "{}", err);
}

#[tokio::test]
async fn unknown_items_are_not_found() {
    let (queue, _) = queue();
    let missing = briefcast_core::common::ItemId::new();

    assert!(queue.status_of(missing).await.unwrap_err().is_not_found());
    assert!(queue.fail(missing, "x").await.unwrap_err().is_not_found());
    assert!(queue.retry(missing).await.unwrap_err().is_not_found());
    assert!(queue.mark_read(missing, Some(true)).await.unwrap_err().is_not_found());
}

// =============================================================================
// Retry
// =============================================================================

#[tokio::test]
async fn retry_rejects_completed_items() {
    let (queue, store) = queue();
    let item = queue
        .enqueue(UserId::new(), "https://example.com", "")
        .await
        .unwrap();
    queue.claim_batch(1).await.unwrap();
    queue.complete(item.id, enrichment("Done")).await.unwrap();

    let err = queue.retry(item.id).await.unwrap_err();

    match err {
        CoreError::InvalidTransition { from, to, .. } => {
            assert_eq!(from, "completed");
            assert_eq!(to, "pending");
        }
        other => panic!("expected InvalidTransition, got {:?}", other),
    }
    let stored = store.items().pop().unwrap();
    assert_eq!(stored.processing_status, ProcessingStatus::Completed);
}

#[tokio::test]
async fn retry_sweep_requeues_recent_failures() {
    let (queue, _) = queue();
    let user = UserId::new();
    let a = queue.enqueue(user, "https://example.com/a", "").await.unwrap();
    let b = queue.enqueue(user, "https://example.com/b", "").await.unwrap();
    queue.claim_batch(10).await.unwrap();
    queue.fail(a.id, "timeout").await.unwrap();
    queue.complete(b.id, enrichment("B")).await.unwrap();

    let failed = queue.failed_for_retry(default_retry_window()).await.unwrap();
    assert_eq!(failed.len(), 1);

    let sweep = queue
        .retry_recent_failures(default_retry_window())
        .await
        .unwrap();
    assert_eq!(sweep.retried, 1);
    assert_eq!(sweep.skipped, 0);

    let view = queue.status_of(a.id).await.unwrap();
    assert!(!view.is_failed);
    assert_eq!(view.item.processing_status, ProcessingStatus::Pending);
}

#[tokio::test]
async fn old_failures_fall_outside_the_window() {
    let (queue, store) = queue();
    let item = queue
        .enqueue(UserId::new(), "https://example.com", "")
        .await
        .unwrap();
    queue.claim_batch(1).await.unwrap();
    let mut failed = queue.fail(item.id, "gone").await.unwrap();
    failed.updated_at = Utc::now() - chrono::Duration::days(3);
    store.put_item(failed);

    let recent = queue.failed_for_retry(default_retry_window()).await.unwrap();
    assert!(recent.is_empty());
}

// =============================================================================
// Status events
// =============================================================================

#[tokio::test]
async fn transitions_reach_the_owner() {
    let (queue, _) = queue();
    let owner = UserId::new();
    let mut owner_sub = queue.hub().subscribe(owner);
    let other_sub = queue.hub().subscribe(UserId::new());

    let item = queue.enqueue(owner, "https://example.com", "").await.unwrap();
    queue.claim_batch(1).await.unwrap();
    queue.complete(item.id, enrichment("Done")).await.unwrap();

    let mut seen = Vec::new();
    for _ in 0..3 {
        let update = tokio::time::timeout(std::time::Duration::from_secs(1), owner_sub.recv())
            .await
            .expect("update not delivered")
            .expect("subscription closed");
        assert_eq!(update.item_id, item.id);
        seen.push(update.update_type);
    }

    // Publishes are spawned, so only the set is guaranteed
    for expected in [UpdateType::Created, UpdateType::Processing, UpdateType::Completed] {
        assert!(seen.contains(&expected), "missing {:?} in {:?}", expected, seen);
    }
    drop(other_sub);
}
