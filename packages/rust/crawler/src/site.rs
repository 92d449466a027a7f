//! Whole-site extraction with the scrape fallback, and flattening into one document.

use std::collections::HashSet;

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use url::Url;

use voicebolt_shared::{Result, VoiceBoltError};

use crate::client::{CrawlOptions, FirecrawlClient, ScrapedPage};

/// How the content was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    /// Single-page scrape.
    Scrape,
    /// Multi-page crawl job.
    Crawl,
    /// Crawl was requested but failed; fell back to a single-page scrape.
    ScrapeFallback,
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Scrape => "scrape",
            Self::Crawl => "crawl",
            Self::ScrapeFallback => "scrape (crawl fallback)",
        })
    }
}

/// Extracted content of a website.
#[derive(Debug, Clone)]
pub struct SiteContent {
    pub root_url: Url,
    pub method: ExtractionMethod,
    pub pages: Vec<ScrapedPage>,
}

impl SiteContent {
    /// Flatten all pages into one Markdown document suitable for upload.
    ///
    /// Empty pages and pages whose body duplicates an earlier one are skipped.
    /// Fails if nothing usable remains.
    pub fn to_document_text(&self) -> Result<String> {
        let mut seen = HashSet::new();
        let mut sections = Vec::new();

        for page in &self.pages {
            let body = page.markdown.trim();
            if body.is_empty() || !seen.insert(compute_hash(body)) {
                continue;
            }

            let title = page.title.as_deref().unwrap_or(page.url.as_str());
            let mut section = format!("# {}\n", title.trim());
            if !page.url.is_empty() {
                section.push_str(&format!("Source: {}\n", page.url));
            }
            section.push('\n');
            section.push_str(body);
            sections.push(section);
        }

        if sections.is_empty() {
            return Err(VoiceBoltError::crawl(format!(
                "no readable content was extracted from {}",
                self.root_url
            )));
        }

        Ok(sections.join("\n\n---\n\n"))
    }
}

/// Extract a website's content.
///
/// With `deep` set, runs a crawl job and falls back to a single-page scrape
/// when the crawl fails, times out, or returns nothing. Authentication errors
/// and cancellation are never masked by the fallback.
#[instrument(skip_all, fields(url = %url, deep))]
pub async fn extract_site(
    client: &FirecrawlClient,
    url: &Url,
    deep: bool,
    opts: &CrawlOptions,
    cancel: &CancellationToken,
) -> Result<SiteContent> {
    if deep {
        match client.crawl(url, opts, cancel).await {
            Ok(pages) if !pages.is_empty() => {
                info!(pages = pages.len(), "site crawled");
                return Ok(SiteContent {
                    root_url: url.clone(),
                    method: ExtractionMethod::Crawl,
                    pages,
                });
            }
            Ok(_) => warn!("crawl returned no pages, falling back to single-page scrape"),
            Err(e) if e.is_fatal_auth() || matches!(e, VoiceBoltError::Cancelled) => {
                return Err(e);
            }
            Err(e) => warn!(error = %e, "crawl failed, falling back to single-page scrape"),
        }

        let page = client.scrape(url).await?;
        return Ok(SiteContent {
            root_url: url.clone(),
            method: ExtractionMethod::ScrapeFallback,
            pages: vec![page],
        });
    }

    let page = client.scrape(url).await?;
    Ok(SiteContent {
        root_url: url.clone(),
        method: ExtractionMethod::Scrape,
        pages: vec![page],
    })
}

/// Compute SHA-256 hash of content.
fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
