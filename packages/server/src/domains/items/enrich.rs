//! Scrape -> extract -> summarize for a single item.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::models::{Enrichment, Item};
use crate::kernel::{BaseContentExtractor, BaseSummarizer, BaseWebScraper};

/// One attempt at enriching an item. The worker pool owns retries.
#[async_trait]
pub trait ItemPipeline: Send + Sync {
    async fn run(&self, item: &Item) -> Result<Enrichment>;
}

pub struct Enricher {
    scraper: Arc<dyn BaseWebScraper>,
    extractor: Arc<dyn BaseContentExtractor>,
    summarizer: Arc<dyn BaseSummarizer>,
}

impl Enricher {
    pub fn new(
        scraper: Arc<dyn BaseWebScraper>,
        extractor: Arc<dyn BaseContentExtractor>,
        summarizer: Arc<dyn BaseSummarizer>,
    ) -> Self {
        Self {
            scraper,
            extractor,
            summarizer,
        }
    }
}

#[async_trait]
impl ItemPipeline for Enricher {
    async fn run(&self, item: &Item) -> Result<Enrichment> {
        let page = self
            .scraper
            .scrape(&item.url)
            .await
            .with_context(|| format!("scrape of {} failed", item.url))?;

        let metadata = self
            .extractor
            .extract(&page.markdown)
            .await
            .context("metadata extraction failed")?;

        let summary = self
            .summarizer
            .summarize(&page.markdown)
            .await
            .context("summarization failed")?;

        debug!(item_id = %item.id, chars = page.markdown.len(), "Item enriched");

        Ok(Enrichment {
            title: metadata.title.or(page.title),
            content: page.markdown,
            summary: summary.to_text(),
            content_type: metadata.content_type,
            platform: metadata.platform,
            tags: metadata.tags,
            authors: metadata.authors,
        }
        .normalized())
    }
}
