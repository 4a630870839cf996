//! Server dependencies for domain services
//!
//! Every external collaborator sits behind an `Arc<dyn Base*>` so tests can
//! swap in the fakes from `test_dependencies`.

use std::sync::Arc;

use anyhow::Result;
use sqlx::PgPool;

use super::store::{ItemStore, PgStore, PodcastStore, UserStore};
use super::{
    BaseAudioStitcher, BaseBlobStorage, BaseContentExtractor, BaseEmailSender, BaseScriptWriter,
    BaseSpeechSynthesizer, BaseSummarizer, BaseWebScraper, FfmpegStitcher, HttpBlobStorage,
    HttpEmailSender, HttpScraper, OpenAiClient, OpenAiSpeech,
};
use crate::config::Config;
use crate::domains::digest::{DigestConfig, DigestOrchestrator};
use crate::domains::items::{
    Enricher, ItemQueue, ItemUpdateHub, WorkerPool, WorkerPoolConfig,
};
use crate::domains::podcasts::{PodcastConfig, PodcastPipeline};

/// Shared infrastructure handed to every service.
#[derive(Clone)]
pub struct ServerDeps {
    pub item_store: Arc<dyn ItemStore>,
    pub podcast_store: Arc<dyn PodcastStore>,
    pub user_store: Arc<dyn UserStore>,
    pub scraper: Arc<dyn BaseWebScraper>,
    pub extractor: Arc<dyn BaseContentExtractor>,
    pub summarizer: Arc<dyn BaseSummarizer>,
    pub script_writer: Arc<dyn BaseScriptWriter>,
    pub speech: Arc<dyn BaseSpeechSynthesizer>,
    pub stitcher: Arc<dyn BaseAudioStitcher>,
    pub storage: Arc<dyn BaseBlobStorage>,
    pub email: Arc<dyn BaseEmailSender>,
    pub stream_hub: ItemUpdateHub,
}

impl ServerDeps {
    /// Production wiring: Postgres plus the HTTP-backed clients.
    pub fn from_config(config: &Config, pool: PgPool) -> Result<Self> {
        let store = Arc::new(PgStore::new(pool));
        let ai = Arc::new(OpenAiClient::new(config.openai_api_key.clone()));

        Ok(Self {
            item_store: store.clone(),
            podcast_store: store.clone(),
            user_store: store,
            scraper: Arc::new(HttpScraper::new()?),
            extractor: ai.clone(),
            summarizer: ai.clone(),
            script_writer: ai,
            speech: Arc::new(OpenAiSpeech::new(config.openai_api_key.clone())),
            stitcher: Arc::new(FfmpegStitcher::new(config.ffmpeg_path.clone())),
            storage: Arc::new(HttpBlobStorage::new(
                config.storage_endpoint.clone(),
                config.storage_bucket.clone(),
                config.storage_public_url.clone(),
                config.storage_access_token.clone(),
                config.storage_signing_secret.clone(),
            )),
            email: Arc::new(HttpEmailSender::new(
                config.email_api_url.clone(),
                config.email_api_key.clone(),
                config.email_from.clone(),
            )),
            stream_hub: ItemUpdateHub::new(),
        })
    }

    /// Builds the domain services on top of these dependencies.
    pub fn services(
        &self,
        workers: WorkerPoolConfig,
        podcasts: PodcastConfig,
        digest: DigestConfig,
    ) -> CoreServices {
        let queue = ItemQueue::new(self.item_store.clone(), self.stream_hub.clone());
        let enricher = Arc::new(Enricher::new(
            self.scraper.clone(),
            self.extractor.clone(),
            self.summarizer.clone(),
        ));
        let worker_pool = Arc::new(WorkerPool::new(queue.clone(), enricher, workers));
        let pipeline = Arc::new(PodcastPipeline::new(
            self.podcast_store.clone(),
            self.script_writer.clone(),
            self.speech.clone(),
            self.stitcher.clone(),
            self.storage.clone(),
            podcasts,
        ));
        let digest = Arc::new(DigestOrchestrator::new(
            self.item_store.clone(),
            self.user_store.clone(),
            pipeline.clone(),
            self.email.clone(),
            digest,
        ));

        CoreServices {
            queue,
            worker_pool,
            pipeline,
            digest,
        }
    }
}

/// The long-lived services the server runs.
#[derive(Clone)]
pub struct CoreServices {
    pub queue: ItemQueue,
    pub worker_pool: Arc<WorkerPool>,
    pub pipeline: Arc<PodcastPipeline>,
    pub digest: Arc<DigestOrchestrator>,
}
