//! Integration tests for the daily digest.
//!
//! The podcast is generated for real through the pipeline (over mocks), so
//! these cover the poll loop, its deadline and the fallback to a plain email.

mod common;

use std::time::Duration;

use briefcast_core::common::{CoreError, UserId};
use briefcast_core::domains::digest::{DigestConfig, DigestVariant};
use briefcast_core::domains::items::{ProcessingStatus, WorkerPoolConfig};
use briefcast_core::domains::podcasts::{PodcastConfig, PodcastStatus};
use briefcast_core::kernel::test_dependencies::{MockEmailSender, MockScriptWriter, MockSpeech};
use briefcast_core::kernel::TestDependencies;
use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::common::{
    create_completed_item, create_user, fast_worker_config, yesterday, TestHarness,
};

fn harness(deps: TestDependencies, digest: DigestConfig) -> TestHarness {
    TestHarness::with_config(deps, fast_worker_config(), PodcastConfig::default(), digest)
}

fn quick_polls() -> DigestConfig {
    DigestConfig {
        poll_interval: Duration::from_millis(10),
        poll_timeout: Duration::from_secs(10),
        ..Default::default()
    }
}

fn without_podcast() -> DigestConfig {
    DigestConfig {
        podcast_enabled: false,
        ..Default::default()
    }
}

// =============================================================================
// Happy paths
// =============================================================================

#[tokio::test]
async fn digest_links_the_generated_podcast() {
    let h = harness(TestDependencies::new(), quick_polls());
    let user = create_user(h.store(), "reader@example.com");
    create_completed_item(h.store(), user.id, "https://example.com/a", yesterday());
    create_completed_item(h.store(), user.id, "https://example.com/b", yesterday());

    let result = h
        .services
        .digest
        .send_for_user(user.id, &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.email_sent);
    assert_eq!(result.items_count, 2);
    assert_eq!(result.variant, DigestVariant::WithPodcast);
    assert!(result.error.is_none());
    let url = result.podcast_url.expect("podcast url");
    assert!(url.starts_with("https://cdn.test/podcasts/"));

    let sent = h.deps.email.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, vec!["reader@example.com"]);
    assert!(sent[0].subject.ends_with("2 items"), "{}", sent[0].subject);
    assert!(sent[0].html_body.contains(&url));
    assert!(sent[0].text_body.contains("https://example.com/a"));
}

#[tokio::test]
async fn plain_digest_when_podcasts_are_disabled() {
    let h = harness(TestDependencies::new(), without_podcast());
    let user = create_user(h.store(), "reader@example.com");
    create_completed_item(h.store(), user.id, "https://example.com/a", yesterday());

    let result = h
        .services
        .digest
        .send_for_user(user.id, &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.email_sent);
    assert_eq!(result.variant, DigestVariant::Plain);
    assert!(result.podcast_url.is_none());
    assert!(result.error.is_none());
    assert!(h.deps.script_writer.calls().is_empty());
    assert!(h.deps.email.was_sent_to("reader@example.com"));
}

#[tokio::test]
async fn backlog_is_yesterdays_unread_completed_items() {
    let h = harness(TestDependencies::new(), without_podcast());
    let user = create_user(h.store(), "reader@example.com");
    let other = create_user(h.store(), "other@example.com");

    let wanted = create_completed_item(h.store(), user.id, "https://example.com/keep", yesterday());

    let mut read = create_completed_item(h.store(), user.id, "https://example.com/read", yesterday());
    read.is_read = Some(true);
    h.store().put_item(read);

    create_completed_item(h.store(), user.id, "https://example.com/today", Utc::now());

    let mut failed = create_completed_item(h.store(), user.id, "https://example.com/failed", yesterday());
    failed.processing_status = ProcessingStatus::Failed;
    failed.processing_error = Some("HTTP 404".to_string());
    h.store().put_item(failed);

    create_completed_item(h.store(), other.id, "https://example.com/theirs", yesterday());

    let result = h
        .services
        .digest
        .send_for_user(user.id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.items_count, 1);
    let sent = h.deps.email.sent();
    assert!(sent[0].text_body.contains(&wanted.url));
    assert!(!sent[0].text_body.contains("https://example.com/read"));
    assert!(!sent[0].text_body.contains("https://example.com/today"));
}

#[tokio::test]
async fn empty_backlog_sends_nothing() {
    let h = harness(TestDependencies::new(), quick_polls());
    let user = create_user(h.store(), "reader@example.com");

    let result = h
        .services
        .digest
        .send_for_user(user.id, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!result.email_sent);
    assert_eq!(result.items_count, 0);
    assert!(result.podcast_url.is_none());
    assert!(h.deps.email.sent().is_empty());
    assert!(h.deps.script_writer.calls().is_empty());
}

// =============================================================================
// Degradation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn slow_podcast_times_out_into_plain_digest() {
    let h = harness(
        TestDependencies::new().mock_speech(MockSpeech::hanging()),
        DigestConfig::default(),
    );
    let user = create_user(h.store(), "reader@example.com");
    create_completed_item(h.store(), user.id, "https://example.com/a", yesterday());

    let started = Instant::now();
    let result = h
        .services
        .digest
        .send_for_user(user.id, &CancellationToken::new())
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(300));
    assert!(result.email_sent);
    assert!(result.podcast_url.is_none());
    assert_eq!(result.variant, DigestVariant::Plain);
    assert!(result.error.unwrap().contains("timed out"));
    assert_eq!(h.deps.email.sent().len(), 1);

    // The stalled generation is stopped and recorded, not left running
    let podcasts = h.store().podcasts();
    assert_eq!(podcasts.len(), 1);
    assert_eq!(podcasts[0].status, PodcastStatus::Failed);
    assert!(podcasts[0].error_message.as_deref().unwrap().contains("timed out"));

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(h.store().podcasts()[0].status, PodcastStatus::Failed);
}

#[tokio::test]
async fn failed_podcast_falls_back_to_plain_digest() {
    let h = harness(
        TestDependencies::new().mock_script_writer(MockScriptWriter::failing()),
        quick_polls(),
    );
    let user = create_user(h.store(), "reader@example.com");
    create_completed_item(h.store(), user.id, "https://example.com/a", yesterday());

    let result = h
        .services
        .digest
        .send_for_user(user.id, &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.email_sent);
    assert!(result.podcast_url.is_none());
    assert!(result.error.unwrap().contains("HTTP 500"));
    assert_eq!(h.deps.email.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_poll_sends_nothing() {
    let h = harness(
        TestDependencies::new().mock_speech(MockSpeech::hanging()),
        DigestConfig::default(),
    );
    let user = create_user(h.store(), "reader@example.com");
    create_completed_item(h.store(), user.id, "https://example.com/a", yesterday());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(12)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = h
        .services
        .digest
        .send_for_user(user.id, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(300));
    assert!(h.deps.email.sent().is_empty());

    let podcasts = h.store().podcasts();
    assert_eq!(podcasts.len(), 1);
    assert_eq!(podcasts[0].status, PodcastStatus::Failed);
    assert_eq!(podcasts[0].error_message.as_deref(), Some("operation cancelled"));
}

#[tokio::test(start_paused = true)]
async fn wait_reports_the_deadline() {
    let h = harness(
        TestDependencies::new().mock_speech(MockSpeech::hanging()),
        DigestConfig {
            poll_interval: Duration::from_secs(5),
            poll_timeout: Duration::from_secs(12),
            ..Default::default()
        },
    );
    let user = create_user(h.store(), "reader@example.com");
    let item = create_completed_item(h.store(), user.id, "https://example.com/a", yesterday());
    let podcast = h
        .services
        .pipeline
        .create_podcast(user.id, "Stuck", None, &[item.id])
        .await
        .unwrap();

    let err = h
        .services
        .digest
        .wait_for_podcast(podcast.id, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Timeout(d) if d == Duration::from_secs(12)));
    let stored = h.services.pipeline.podcast(podcast.id).await.unwrap();
    assert_eq!(stored.status, PodcastStatus::Pending);
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn delivery_failure_is_reported() {
    let h = harness(
        TestDependencies::new().mock_email(MockEmailSender::failing()),
        without_podcast(),
    );
    let user = create_user(h.store(), "reader@example.com");
    create_completed_item(h.store(), user.id, "https://example.com/a", yesterday());

    let err = h
        .services
        .digest
        .send_for_user(user.id, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Delivery(ref m) if m.contains("502")), "{}", err);
}

#[tokio::test]
async fn users_need_an_address() {
    let h = harness(TestDependencies::new(), without_podcast());
    let silent = create_user(h.store(), "   ");

    let err = h
        .services
        .digest
        .send_for_user(silent.id, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    let err = h
        .services
        .digest
        .send_for_user(UserId::new(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

// =============================================================================
// Batch
// =============================================================================

#[tokio::test]
async fn batch_covers_every_user_with_an_address() {
    let h = TestHarness::with_config(
        TestDependencies::new(),
        WorkerPoolConfig::default(),
        PodcastConfig::default(),
        without_podcast(),
    );
    let busy = create_user(h.store(), "busy@example.com");
    create_user(h.store(), "idle@example.com");
    let silent = create_user(h.store(), "");
    create_completed_item(h.store(), busy.id, "https://example.com/a", yesterday());
    create_completed_item(h.store(), silent.id, "https://example.com/b", yesterday());

    let report = h
        .services
        .digest
        .send_for_all_users(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.users, 2);
    assert_eq!(report.sent, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);
    assert!(h.deps.email.was_sent_to("busy@example.com"));
}

#[tokio::test]
async fn batch_isolates_user_failures() {
    let h = harness(
        TestDependencies::new().mock_email(MockEmailSender::failing()),
        without_podcast(),
    );
    for n in 0..3 {
        let user = create_user(h.store(), &format!("user{}@example.com", n));
        create_completed_item(h.store(), user.id, "https://example.com/a", yesterday());
    }

    let report = h
        .services
        .digest
        .send_for_all_users(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.users, 3);
    assert_eq!(report.failed, 3);
    assert_eq!(report.sent, 0);
}
