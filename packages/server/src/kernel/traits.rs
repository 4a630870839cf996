// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// The enrichment, podcast and digest flows in domains/ compose them.
//
// Naming convention: Base* for trait names (e.g., BaseWebScraper, BaseEmailSender)

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domains::podcasts::DialogueTurn;

// =============================================================================
// Scraping
// =============================================================================

/// A fetched page reduced to readable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedPage {
    pub url: String,
    pub title: Option<String>,
    pub markdown: String,
}

#[async_trait]
pub trait BaseWebScraper: Send + Sync {
    async fn scrape(&self, url: &str) -> Result<ScrapedPage>;
}

// =============================================================================
// AI (Extraction, Summarization, Script Writing)
// =============================================================================

/// Structured metadata pulled out of page content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default, rename = "type")]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub overview: String,
    #[serde(default)]
    pub key_points: Vec<String>,
}

impl Summary {
    /// Overview followed by the key points, single-space separated.
    pub fn to_text(&self) -> String {
        std::iter::once(self.overview.trim())
            .chain(self.key_points.iter().map(|p| p.trim()))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
pub trait BaseContentExtractor: Send + Sync {
    async fn extract(&self, content: &str) -> Result<ExtractedMetadata>;
}

#[async_trait]
pub trait BaseSummarizer: Send + Sync {
    async fn summarize(&self, content: &str) -> Result<Summary>;
}

#[async_trait]
pub trait BaseScriptWriter: Send + Sync {
    /// Turns the combined item content into an ordered dialogue.
    async fn write_script(&self, content: &str) -> Result<Vec<DialogueTurn>>;
}

// =============================================================================
// Speech
// =============================================================================

/// Where synthesized audio can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioHandle {
    /// Provider returned the audio in the response body.
    Inline(Bytes),
    /// Provider returned a URL to fetch the audio from.
    Remote(String),
}

#[async_trait]
pub trait BaseSpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str, speed: f32) -> Result<AudioHandle>;

    async fn download(&self, handle: &AudioHandle) -> Result<Bytes>;
}

// =============================================================================
// Audio Stitching
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct StitchedAudio {
    pub bytes: Bytes,
    pub duration_seconds: f64,
}

#[async_trait]
pub trait BaseAudioStitcher: Send + Sync {
    /// Concatenates `parts` in the given order into `output`.
    async fn stitch(&self, parts: &[PathBuf], output: &Path) -> Result<StitchedAudio>;
}

// =============================================================================
// Storage
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresignedUpload {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait BaseBlobStorage: Send + Sync {
    /// Stores `bytes` under `key` and returns its public URL.
    async fn upload(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String>;

    async fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<PresignedUpload>;
}

// =============================================================================
// Email
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

#[async_trait]
pub trait BaseEmailSender: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_text_joins_with_single_spaces() {
        let summary = Summary {
            overview: "Rust 2024 ships. ".to_string(),
            key_points: vec![" Faster builds.".to_string(), "".to_string(), "New lints.".to_string()],
        };
        assert_eq!(summary.to_text(), "Rust 2024 ships. Faster builds. New lints.");
    }

    #[test]
    fn metadata_accepts_type_field() {
        let meta: ExtractedMetadata =
            serde_json::from_str(r#"{"title":"T","type":"article","tags":["a"]}"#).unwrap();
        assert_eq!(meta.content_type.as_deref(), Some("article"));
        assert!(meta.authors.is_empty());
    }
}
