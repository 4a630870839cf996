// AI implementation using the OpenAI chat completions API
//
// Infrastructure implementation of BaseContentExtractor, BaseSummarizer and
// BaseScriptWriter. Each call asks for a JSON object and deserializes it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{BaseContentExtractor, BaseScriptWriter, BaseSummarizer, ExtractedMetadata, Summary};
use crate::domains::podcasts::DialogueTurn;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Content longer than this is cut before it is sent.
const MAX_PROMPT_CHARS: usize = 24_000;

const EXTRACT_PROMPT: &str = "Extract metadata from the article below. Respond with a JSON object \
with keys: title (string or null), authors (array of strings), tags (array of up to 8 short \
lowercase topics), platform (publishing site or network, or null), type (one of article, video, \
podcast, paper, thread, other).";

const SUMMARIZE_PROMPT: &str = "Summarize the article below. Respond with a JSON object with keys: \
overview (two or three sentences) and key_points (array of short sentences).";

const SCRIPT_PROMPT: &str = "Write a conversational two-person podcast script covering every \
article below, in order. Respond with a JSON object with key turns: an array of objects with \
speaker (exactly \"host\" or \"guest\") and content (what they say).";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScriptResponse {
    turns: Vec<DialogueTurn>,
}

/// OpenAI-backed text collaborators.
#[derive(Clone)]
pub struct OpenAiClient {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Set a custom base URL (proxies, compatible providers).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn complete_json<T: DeserializeOwned>(&self, system: &str, user: &str) -> Result<T> {
        let start = std::time::Instant::now();
        let user = truncate_chars(user, MAX_PROMPT_CHARS);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            response_format: ResponseFormat {
                format_type: "json_object",
            },
            temperature: 0.3,
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send chat request to OpenAI")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "OpenAI API error");
            anyhow::bail!("OpenAI API error ({}): {}", status, error_text);
        }

        let chat: ChatResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI response")?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("OpenAI returned no content")?;

        debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis() as u64,
            "OpenAI chat completion"
        );

        parse_json_reply(&content)
    }
}

/// Deserializes a model reply, tolerating a surrounding Markdown code fence.
pub fn parse_json_reply<T: DeserializeOwned>(reply: &str) -> Result<T> {
    let trimmed = reply.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim()).context("AI reply was not the expected JSON")
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl BaseContentExtractor for OpenAiClient {
    async fn extract(&self, content: &str) -> Result<ExtractedMetadata> {
        self.complete_json(EXTRACT_PROMPT, content).await
    }
}

#[async_trait]
impl BaseSummarizer for OpenAiClient {
    async fn summarize(&self, content: &str) -> Result<Summary> {
        let summary: Summary = self.complete_json(SUMMARIZE_PROMPT, content).await?;
        if summary.overview.trim().is_empty() {
            anyhow::bail!("summary came back without an overview");
        }
        Ok(summary)
    }
}

#[async_trait]
impl BaseScriptWriter for OpenAiClient {
    async fn write_script(&self, content: &str) -> Result<Vec<DialogueTurn>> {
        let script: ScriptResponse = self.complete_json(SCRIPT_PROMPT, content).await?;
        let turns: Vec<DialogueTurn> = script
            .turns
            .into_iter()
            .filter(|t| !t.content.trim().is_empty())
            .collect();
        if turns.is_empty() {
            anyhow::bail!("script came back empty");
        }
        Ok(turns)
    }
}
