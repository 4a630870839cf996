// TestDependencies - mock implementations for testing
//
// Provides in-memory fakes for every collaborator trait plus a builder that
// wires them, with a MemoryStore, into ServerDeps.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::time::Instant;

use super::store::MemoryStore;
use super::{
    AudioHandle, BaseAudioStitcher, BaseBlobStorage, BaseContentExtractor, BaseEmailSender,
    BaseScriptWriter, BaseSpeechSynthesizer, BaseSummarizer, BaseWebScraper, ExtractedMetadata,
    OutboundEmail, PresignedUpload, ScrapedPage, ServerDeps, StitchedAudio, Summary,
};
use crate::domains::items::ItemUpdateHub;
use crate::domains::podcasts::DialogueTurn;

// =============================================================================
// Mock Web Scraper
// =============================================================================

pub struct MockWebScraper {
    pages: Arc<Mutex<HashMap<String, ScrapedPage>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    calls: Arc<Mutex<Vec<(String, Instant)>>>,
}

impl MockWebScraper {
    pub fn new() -> Self {
        Self {
            pages: Arc::new(Mutex::new(HashMap::new())),
            failing: Arc::new(Mutex::new(HashSet::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_page(self, url: &str, title: &str, markdown: &str) -> Self {
        self.pages.lock().unwrap().insert(
            url.to_string(),
            ScrapedPage {
                url: url.to_string(),
                title: Some(title.to_string()),
                markdown: markdown.to_string(),
            },
        );
        self
    }

    /// Every scrape of `url` errors.
    pub fn failing_for(self, url: &str) -> Self {
        self.failing.lock().unwrap().insert(url.to_string());
        self
    }

    /// All scraped URLs, in call order
    pub fn scrape_calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    /// When each scrape of `url` started (tokio clock)
    pub fn call_times(&self, url: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.call_times(url).len()
    }
}

impl Default for MockWebScraper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseWebScraper for MockWebScraper {
    async fn scrape(&self, url: &str) -> Result<ScrapedPage> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));

        if self.failing.lock().unwrap().contains(url) {
            return Err(anyhow!("HTTP 503 for {}", url));
        }

        let pages = self.pages.lock().unwrap();
        Ok(pages.get(url).cloned().unwrap_or_else(|| ScrapedPage {
            url: url.to_string(),
            title: Some("Mock Page".to_string()),
            markdown: format!("# Mock Content\n\nScraped from {}", url),
        }))
    }
}

// =============================================================================
// Mock AI (extraction + summarization)
// =============================================================================

pub struct MockContentExtractor {
    metadata: ExtractedMetadata,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockContentExtractor {
    pub fn new() -> Self {
        Self {
            metadata: ExtractedMetadata {
                title: None,
                authors: vec!["Mock Author".to_string()],
                tags: vec!["mock".to_string()],
                platform: Some("web".to_string()),
                content_type: Some("article".to_string()),
            },
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_metadata(mut self, metadata: ExtractedMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Default for MockContentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseContentExtractor for MockContentExtractor {
    async fn extract(&self, content: &str) -> Result<ExtractedMetadata> {
        self.calls.lock().unwrap().push(content.to_string());
        Ok(self.metadata.clone())
    }
}

pub struct MockSummarizer {
    summary: Summary,
    fail: bool,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockSummarizer {
    pub fn new() -> Self {
        Self {
            summary: Summary {
                overview: "Mock overview.".to_string(),
                key_points: vec!["First point.".to_string(), "Second point.".to_string()],
            },
            fail: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_summary(mut self, overview: &str, key_points: &[&str]) -> Self {
        self.summary = Summary {
            overview: overview.to_string(),
            key_points: key_points.iter().map(|p| p.to_string()).collect(),
        };
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Default for MockSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseSummarizer for MockSummarizer {
    async fn summarize(&self, content: &str) -> Result<Summary> {
        self.calls.lock().unwrap().push(content.to_string());
        if self.fail {
            return Err(anyhow!("summarizer unavailable"));
        }
        Ok(self.summary.clone())
    }
}

// =============================================================================
// Mock Script Writer
// =============================================================================

pub struct MockScriptWriter {
    script: Vec<DialogueTurn>,
    fail: bool,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockScriptWriter {
    pub fn new() -> Self {
        Self {
            script: vec![
                DialogueTurn::new("host", "Welcome to the briefing."),
                DialogueTurn::new("guest", "Lots to cover today."),
            ],
            fail: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_script(mut self, turns: Vec<DialogueTurn>) -> Self {
        self.script = turns;
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Content blobs the writer was asked to script
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockScriptWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseScriptWriter for MockScriptWriter {
    async fn write_script(&self, content: &str) -> Result<Vec<DialogueTurn>> {
        self.calls.lock().unwrap().push(content.to_string());
        if self.fail {
            return Err(anyhow!("script model returned HTTP 500"));
        }
        Ok(self.script.clone())
    }
}

// =============================================================================
// Mock Speech
// =============================================================================

/// Synthesizes `"<voice>:<text>"` as the audio bytes.
pub struct MockSpeech {
    delays: Arc<Mutex<HashMap<String, Duration>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    hang: bool,
    calls: Arc<Mutex<Vec<(String, String)>>>,
    completed: Arc<Mutex<Vec<String>>>,
}

impl MockSpeech {
    pub fn new() -> Self {
        Self {
            delays: Arc::new(Mutex::new(HashMap::new())),
            failing: Arc::new(Mutex::new(HashSet::new())),
            hang: false,
            calls: Arc::new(Mutex::new(Vec::new())),
            completed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Synthesis of `text` takes `delay` on the tokio clock.
    pub fn with_delay(self, text: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(text.to_string(), delay);
        self
    }

    pub fn failing_for(self, text: &str) -> Self {
        self.failing.lock().unwrap().insert(text.to_string());
        self
    }

    /// Synthesis never returns.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new()
        }
    }

    /// (text, voice) pairs in the order synthesis started
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// Texts in the order synthesis finished
    pub fn completion_order(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }
}

impl Default for MockSpeech {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseSpeechSynthesizer for MockSpeech {
    async fn synthesize(&self, text: &str, voice: &str, _speed: f32) -> Result<AudioHandle> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), voice.to_string()));

        if self.hang {
            std::future::pending::<()>().await;
        }

        let delay = self.delays.lock().unwrap().get(text).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(text) {
            return Err(anyhow!("voice service rejected input"));
        }

        self.completed.lock().unwrap().push(text.to_string());
        Ok(AudioHandle::Inline(Bytes::from(format!("{}:{}", voice, text))))
    }

    async fn download(&self, handle: &AudioHandle) -> Result<Bytes> {
        match handle {
            AudioHandle::Inline(bytes) => Ok(bytes.clone()),
            AudioHandle::Remote(url) => Ok(Bytes::from(format!("remote:{}", url))),
        }
    }
}

// =============================================================================
// Mock Stitcher
// =============================================================================

/// Joins part contents with `|` and reports 1.5 seconds per part.
pub struct MockStitcher {
    fail: bool,
    calls: Arc<Mutex<Vec<Vec<PathBuf>>>>,
}

impl MockStitcher {
    pub fn new() -> Self {
        Self {
            fail: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Part paths of every stitch call
    pub fn calls(&self) -> Vec<Vec<PathBuf>> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockStitcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseAudioStitcher for MockStitcher {
    async fn stitch(&self, parts: &[PathBuf], output: &Path) -> Result<StitchedAudio> {
        self.calls.lock().unwrap().push(parts.to_vec());
        if self.fail {
            return Err(anyhow!("ffmpeg exited with status 1"));
        }

        let mut contents = Vec::with_capacity(parts.len());
        for part in parts {
            contents.push(String::from_utf8(tokio::fs::read(part).await?)?);
        }
        let joined = contents.join("|");
        tokio::fs::write(output, &joined).await?;

        Ok(StitchedAudio {
            bytes: Bytes::from(joined),
            duration_seconds: parts.len() as f64 * 1.5,
        })
    }
}

// =============================================================================
// Mock Blob Storage
// =============================================================================

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub bytes: Bytes,
    pub content_type: String,
}

pub struct MockBlobStorage {
    fail: bool,
    uploads: Arc<Mutex<Vec<StoredObject>>>,
}

impl MockBlobStorage {
    pub fn new() -> Self {
        Self {
            fail: false,
            uploads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn uploads(&self) -> Vec<StoredObject> {
        self.uploads.lock().unwrap().clone()
    }
}

impl Default for MockBlobStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseBlobStorage for MockBlobStorage {
    async fn upload(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String> {
        if self.fail {
            return Err(anyhow!("storage quota exceeded"));
        }
        self.uploads.lock().unwrap().push(StoredObject {
            key: key.to_string(),
            bytes,
            content_type: content_type.to_string(),
        });
        Ok(format!("https://cdn.test/{}", key))
    }

    async fn presign_upload(
        &self,
        key: &str,
        _content_type: &str,
        ttl: Duration,
    ) -> Result<PresignedUpload> {
        let expires_at = Utc::now() + chrono::Duration::from_std(ttl)?;
        Ok(PresignedUpload {
            url: format!("https://upload.test/{}?signature=mock", key),
            expires_at,
        })
    }
}

// =============================================================================
// Mock Email Sender
// =============================================================================

pub struct MockEmailSender {
    fail: bool,
    sent: Arc<Mutex<Vec<OutboundEmail>>>,
}

impl MockEmailSender {
    pub fn new() -> Self {
        Self {
            fail: false,
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn was_sent_to(&self, address: &str) -> bool {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.to.iter().any(|t| t == address))
    }
}

impl Default for MockEmailSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseEmailSender for MockEmailSender {
    async fn send(&self, email: &OutboundEmail) -> Result<()> {
        if self.fail {
            return Err(anyhow!("mail API returned 502"));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

// =============================================================================
// TestDependencies - Builder for test dependencies
// =============================================================================

#[derive(Clone)]
pub struct TestDependencies {
    pub store: Arc<MemoryStore>,
    pub web_scraper: Arc<MockWebScraper>,
    pub extractor: Arc<MockContentExtractor>,
    pub summarizer: Arc<MockSummarizer>,
    pub script_writer: Arc<MockScriptWriter>,
    pub speech: Arc<MockSpeech>,
    pub stitcher: Arc<MockStitcher>,
    pub storage: Arc<MockBlobStorage>,
    pub email: Arc<MockEmailSender>,
    pub stream_hub: ItemUpdateHub,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            web_scraper: Arc::new(MockWebScraper::new()),
            extractor: Arc::new(MockContentExtractor::new()),
            summarizer: Arc::new(MockSummarizer::new()),
            script_writer: Arc::new(MockScriptWriter::new()),
            speech: Arc::new(MockSpeech::new()),
            stitcher: Arc::new(MockStitcher::new()),
            storage: Arc::new(MockBlobStorage::new()),
            email: Arc::new(MockEmailSender::new()),
            stream_hub: ItemUpdateHub::new(),
        }
    }

    pub fn mock_scraper(mut self, scraper: MockWebScraper) -> Self {
        self.web_scraper = Arc::new(scraper);
        self
    }

    pub fn mock_extractor(mut self, extractor: MockContentExtractor) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    pub fn mock_summarizer(mut self, summarizer: MockSummarizer) -> Self {
        self.summarizer = Arc::new(summarizer);
        self
    }

    pub fn mock_script_writer(mut self, writer: MockScriptWriter) -> Self {
        self.script_writer = Arc::new(writer);
        self
    }

    pub fn mock_speech(mut self, speech: MockSpeech) -> Self {
        self.speech = Arc::new(speech);
        self
    }

    pub fn mock_stitcher(mut self, stitcher: MockStitcher) -> Self {
        self.stitcher = Arc::new(stitcher);
        self
    }

    pub fn mock_storage(mut self, storage: MockBlobStorage) -> Self {
        self.storage = Arc::new(storage);
        self
    }

    pub fn mock_email(mut self, email: MockEmailSender) -> Self {
        self.email = Arc::new(email);
        self
    }

    /// Wires the fakes into ServerDeps. The mocks stay reachable through
    /// `self` for assertions.
    pub fn deps(&self) -> ServerDeps {
        ServerDeps {
            item_store: self.store.clone(),
            podcast_store: self.store.clone(),
            user_store: self.store.clone(),
            scraper: self.web_scraper.clone(),
            extractor: self.extractor.clone(),
            summarizer: self.summarizer.clone(),
            script_writer: self.script_writer.clone(),
            speech: self.speech.clone(),
            stitcher: self.stitcher.clone(),
            storage: self.storage.clone(),
            email: self.email.clone(),
            stream_hub: self.stream_hub.clone(),
        }
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
