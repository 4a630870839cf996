// Text-to-speech using the OpenAI audio API
//
// The speech endpoint streams the encoded audio back in the response body,
// so synthesis yields an inline handle. Remote handles are fetched over HTTP.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use super::{AudioHandle, BaseSpeechSynthesizer};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "tts-1";

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
    response_format: &'static str,
}

#[derive(Clone)]
pub struct OpenAiSpeech {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiSpeech {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl BaseSpeechSynthesizer for OpenAiSpeech {
    async fn synthesize(&self, text: &str, voice: &str, speed: f32) -> Result<AudioHandle> {
        // The API accepts 0.25..=4.0
        let speed = speed.clamp(0.25, 4.0);
        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice,
            speed,
            response_format: "mp3",
        };

        let response = self
            .http_client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send speech request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("speech API error ({}): {}", status, error_text);
        }

        let audio = response
            .bytes()
            .await
            .context("Failed to read speech audio")?;
        if audio.is_empty() {
            anyhow::bail!("speech API returned no audio");
        }

        debug!(voice = %voice, bytes = audio.len(), "Synthesized speech");
        Ok(AudioHandle::Inline(audio))
    }

    async fn download(&self, handle: &AudioHandle) -> Result<Bytes> {
        match handle {
            AudioHandle::Inline(bytes) => Ok(bytes.clone()),
            AudioHandle::Remote(url) => {
                let response = self
                    .http_client
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("Failed to download audio from {}", url))?;
                if !response.status().is_success() {
                    anyhow::bail!("HTTP {} downloading {}", response.status(), url);
                }
                response.bytes().await.context("Failed to read audio body")
            }
        }
    }
}
