use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::domains::digest::DigestConfig;
use crate::domains::items::WorkerPoolConfig;
use crate::domains::podcasts::PodcastConfig;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub openai_api_key: String,
    pub worker_count: usize,
    pub worker_poll_interval: Duration,
    pub worker_batch_size: i64,
    pub worker_max_attempts: u32,
    pub podcast_enabled: bool,
    pub digest_cron: String,
    pub retry_cron: String,
    pub storage_endpoint: String,
    pub storage_bucket: String,
    pub storage_public_url: String,
    pub storage_access_token: String,
    pub storage_signing_secret: String,
    pub email_api_url: String,
    pub email_api_key: String,
    pub email_from: String,
    pub ffmpeg_path: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: parse_or("PORT", 8080)?,
            openai_api_key: env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?,
            worker_count: parse_or("WORKER_COUNT", 2)?,
            worker_poll_interval: Duration::from_secs(parse_or("WORKER_POLL_INTERVAL_SECS", 5)?),
            worker_batch_size: parse_or("WORKER_BATCH_SIZE", 10)?,
            worker_max_attempts: parse_or("WORKER_MAX_ATTEMPTS", 3)?,
            podcast_enabled: parse_or("PODCAST_ENABLED", true)?,
            digest_cron: env::var("DIGEST_CRON").unwrap_or_else(|_| "0 0 7 * * *".to_string()),
            retry_cron: env::var("RETRY_CRON").unwrap_or_else(|_| "0 30 * * * *".to_string()),
            storage_endpoint: env::var("STORAGE_ENDPOINT")
                .context("STORAGE_ENDPOINT must be set")?,
            storage_bucket: env::var("STORAGE_BUCKET").context("STORAGE_BUCKET must be set")?,
            storage_public_url: env::var("STORAGE_PUBLIC_URL")
                .context("STORAGE_PUBLIC_URL must be set")?,
            storage_access_token: env::var("STORAGE_ACCESS_TOKEN")
                .context("STORAGE_ACCESS_TOKEN must be set")?,
            storage_signing_secret: env::var("STORAGE_SIGNING_SECRET")
                .context("STORAGE_SIGNING_SECRET must be set")?,
            email_api_url: env::var("EMAIL_API_URL").context("EMAIL_API_URL must be set")?,
            email_api_key: env::var("EMAIL_API_KEY").context("EMAIL_API_KEY must be set")?,
            email_from: env::var("EMAIL_FROM").context("EMAIL_FROM must be set")?,
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
        })
    }

    pub fn worker_pool(&self) -> WorkerPoolConfig {
        WorkerPoolConfig {
            worker_count: self.worker_count,
            poll_interval: self.worker_poll_interval,
            batch_size: self.worker_batch_size,
            max_attempts: self.worker_max_attempts,
            ..Default::default()
        }
    }

    pub fn podcast(&self) -> PodcastConfig {
        PodcastConfig::default()
    }

    pub fn digest(&self) -> DigestConfig {
        DigestConfig {
            podcast_enabled: self.podcast_enabled,
            ..Default::default()
        }
    }
}

/// Reads an optional variable, falling back to `default` when unset.
fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid value, got '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}
