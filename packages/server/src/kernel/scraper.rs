//! HTTP page fetcher for item enrichment.
//!
//! Fetches one URL with reqwest, picks the main content region with
//! `scraper`, and converts it to Markdown with `htmd`. No JavaScript
//! rendering, so single-page apps come back thin.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use super::{BaseWebScraper, ScrapedPage};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Regions tried in order when looking for the article body.
const MAIN_SELECTORS: [&str; 7] = [
    "article",
    "main",
    "[role='main']",
    "#content",
    ".post-content",
    ".entry-content",
    ".content",
];

/// Dropped from the body fallback.
const BOILERPLATE: [&str; 9] = [
    "nav", "header", "footer", "aside", "script", "style", "noscript", "iframe", "form",
];

/// Below this many characters a page is logged as suspiciously empty.
const MIN_CONTENT_CHARS: usize = 100;

pub struct HttpScraper {
    client: reqwest::Client,
}

impl HttpScraper {
    pub fn new() -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    async fn fetch_html(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("HTTP request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {} for {}", status, url);
        }

        response
            .text()
            .await
            .context("Failed to read response body")
    }
}

/// Parses a document into a title plus Markdown body.
pub fn html_to_page(url: &str, html: &str) -> ScrapedPage {
    let document = Html::parse_document(html);
    let title = page_title(&document);
    let body = main_content_html(&document);
    let markdown = htmd::convert(&body).unwrap_or_else(|_| {
        Html::parse_fragment(&body)
            .root_element()
            .text()
            .collect::<String>()
    });

    ScrapedPage {
        url: url.to_string(),
        title,
        markdown: markdown.trim().to_string(),
    }
}

fn page_title(document: &Html) -> Option<String> {
    let og = Selector::parse("meta[property='og:title']").ok()?;
    let from_og = document
        .select(&og)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|t| t.trim().to_string());

    let title = Selector::parse("title").ok()?;
    from_og
        .or_else(|| {
            document
                .select(&title)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
        })
        .filter(|t| !t.is_empty())
}

fn main_content_html(document: &Html) -> String {
    for selector in MAIN_SELECTORS.iter().filter_map(|s| Selector::parse(s).ok()) {
        if let Some(main) = document.select(&selector).next() {
            return main.html();
        }
    }

    match Selector::parse("body").ok().and_then(|s| document.select(&s).next()) {
        Some(body) => strip_boilerplate(body),
        None => document.html(),
    }
}

fn strip_boilerplate(body: ElementRef<'_>) -> String {
    let mut html = body.html();
    for selector in BOILERPLATE.iter().filter_map(|s| Selector::parse(s).ok()) {
        for element in body.select(&selector) {
            html = html.replace(&element.html(), "");
        }
    }
    html
}

#[async_trait]
impl BaseWebScraper for HttpScraper {
    async fn scrape(&self, url: &str) -> Result<ScrapedPage> {
        debug!(url = %url, "Scraping page");

        let html = self.fetch_html(url).await?;
        let page = html_to_page(url, &html);

        if page.markdown.chars().count() < MIN_CONTENT_CHARS {
            warn!(url = %url, "Page has minimal content");
        }
        if page.markdown.is_empty() {
            anyhow::bail!("no readable content at {}", url);
        }

        Ok(page)
    }
}
