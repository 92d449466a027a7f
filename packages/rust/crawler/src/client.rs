//! HTTP client for the hosted content-extraction service (Firecrawl v1 API).
//!
//! The service fetches pages on our behalf and returns Markdown. Two modes:
//! a synchronous single-page scrape, and an asynchronous crawl job that is
//! polled until it reaches a terminal state.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use voicebolt_shared::{
    ApiKeySource, BackoffPolicy, CrawlConfig, FirecrawlConfig, Result, VoiceBoltError,
};

/// User-Agent string for extraction-service requests.
const USER_AGENT: &str = concat!("VoiceBolt/", env!("CARGO_PKG_VERSION"));

/// Service name used in error messages.
const SERVICE: &str = "firecrawl";

/// Upper bound on `next` links followed when collecting crawl results.
const MAX_RESULT_PAGES: usize = 50;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// One page of extracted content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedPage {
    /// Source URL reported by the service (falls back to the requested URL).
    pub url: String,
    pub title: Option<String>,
    pub markdown: String,
}

/// Options for a multi-page crawl job.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Maximum number of pages.
    pub limit: u32,
    /// Maximum link-following depth.
    pub max_depth: u32,
    pub include_paths: Vec<String>,
    pub exclude_paths: Vec<String>,
    /// Status polling schedule; `max_attempts` bounds the number of checks.
    pub poll: BackoffPolicy,
}

impl From<&CrawlConfig> for CrawlOptions {
    fn from(config: &CrawlConfig) -> Self {
        Self {
            limit: config.limit,
            max_depth: config.max_depth,
            include_paths: config.include_paths.clone(),
            exclude_paths: config.exclude_paths.clone(),
            poll: config.poll.clone(),
        }
    }
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self::from(&CrawlConfig::default())
    }
}

/// State of a crawl job as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Scraping,
    Completed,
    Failed,
    Cancelled,
}

impl CrawlState {
    fn parse(raw: &str) -> Self {
        match raw {
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            _ => Self::Scraping,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Scraping)
    }
}

/// Snapshot of a crawl job.
#[derive(Debug, Clone)]
pub struct CrawlStatus {
    pub state: CrawlState,
    pub total: u32,
    pub completed: u32,
    /// Pages collected so far (all pages once the job completed).
    pub pages: Vec<ScrapedPage>,
    /// Reason reported by the service for a failed or cancelled job.
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PageDoc {
    #[serde(default)]
    markdown: Option<String>,
    #[serde(default)]
    metadata: Option<PageMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageMetadata {
    #[serde(default)]
    title: Option<String>,
    #[serde(default, rename = "sourceURL")]
    source_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<PageDoc>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrawlStartResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrawlStatusResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    total: u32,
    #[serde(default)]
    completed: u32,
    #[serde(default)]
    data: Vec<PageDoc>,
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl PageDoc {
    fn into_page(self, fallback_url: &str) -> Option<ScrapedPage> {
        let markdown = self.markdown.filter(|m| !m.trim().is_empty())?;
        let meta = self.metadata.unwrap_or_default();
        Some(ScrapedPage {
            url: meta
                .source_url
                .or(meta.url)
                .unwrap_or_else(|| fallback_url.to_string()),
            title: meta.title.filter(|t| !t.trim().is_empty()),
            markdown,
        })
    }
}

// ---------------------------------------------------------------------------
// FirecrawlClient
// ---------------------------------------------------------------------------

/// Client for the content-extraction service.
pub struct FirecrawlClient {
    client: Client,
    base_url: String,
    keys: Arc<dyn ApiKeySource>,
    /// Allow localhost/private targets (for integration tests with mock servers).
    allow_private_targets: bool,
}

impl FirecrawlClient {
    /// Create a new client. The API key is resolved on every request.
    pub fn new(config: &FirecrawlConfig, keys: Arc<dyn ApiKeySource>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VoiceBoltError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            keys,
            allow_private_targets: false,
        })
    }

    /// Allow localhost/private target URLs (for integration tests).
    pub fn allow_private_targets(mut self) -> Self {
        self.allow_private_targets = true;
        self
    }

    /// Fetch one page's main content as Markdown.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn scrape(&self, url: &Url) -> Result<ScrapedPage> {
        self.check_target(url)?;

        let body = json!({
            "url": url.as_str(),
            "formats": ["markdown"],
            "onlyMainContent": true,
        });

        let value = self.post("/scrape", &body).await?;
        let response: ScrapeResponse = parse_body(value)?;

        if !response.success {
            return Err(VoiceBoltError::crawl(format!(
                "could not scrape {url}: {}",
                response
                    .error
                    .unwrap_or_else(|| "the service reported a failure".into())
            )));
        }

        let page = response
            .data
            .and_then(|doc| doc.into_page(url.as_str()))
            .ok_or_else(|| {
                VoiceBoltError::crawl(format!(
                    "no readable content found at {url}; check that the site is public and not blocking crawlers"
                ))
            })?;

        info!(chars = page.markdown.len(), "page scraped");
        Ok(page)
    }

    /// Submit a crawl job and return its identifier.
    #[instrument(skip_all, fields(url = %url, limit = opts.limit))]
    pub async fn start_crawl(&self, url: &Url, opts: &CrawlOptions) -> Result<String> {
        self.check_target(url)?;

        let mut body = json!({
            "url": url.as_str(),
            "limit": opts.limit,
            "maxDepth": opts.max_depth,
            "scrapeOptions": {
                "formats": ["markdown"],
                "onlyMainContent": true,
            },
        });
        if !opts.include_paths.is_empty() {
            body["includePaths"] = json!(opts.include_paths);
        }
        if !opts.exclude_paths.is_empty() {
            body["excludePaths"] = json!(opts.exclude_paths);
        }

        let value = self.post("/crawl", &body).await?;
        let response: CrawlStartResponse = parse_body(value)?;

        match (response.success, response.id) {
            (true, Some(id)) if !id.is_empty() => {
                info!(job_id = %id, "crawl job started");
                Ok(id)
            }
            (_, _) => Err(VoiceBoltError::crawl(format!(
                "could not start crawl of {url}: {}",
                response
                    .error
                    .unwrap_or_else(|| "no job id returned".into())
            ))),
        }
    }

    /// Fetch the current state of a crawl job.
    ///
    /// Once the job completed, follows `next` links so `pages` holds every result.
    #[instrument(skip(self))]
    pub async fn crawl_status(&self, job_id: &str) -> Result<CrawlStatus> {
        let first_url = format!("{}/crawl/{job_id}", self.base_url);
        let first: CrawlStatusResponse = parse_body(self.get_absolute(&first_url).await?)?;

        let state = CrawlState::parse(&first.status);
        let mut status = CrawlStatus {
            state,
            total: first.total,
            completed: first.completed,
            pages: Vec::new(),
            error: None,
        };

        if matches!(state, CrawlState::Failed | CrawlState::Cancelled) {
            if let Some(err) = &first.error {
                warn!(job_id, error = %err, "crawl job ended without completing");
            }
            status.error = first.error;
        }

        collect_pages(&mut status.pages, first.data);

        if state == CrawlState::Completed {
            let mut next = first.next;
            let mut followed = 0;
            while let Some(next_url) = next.take() {
                if followed >= MAX_RESULT_PAGES {
                    warn!(job_id, "stopping after {MAX_RESULT_PAGES} result pages");
                    break;
                }
                if !self.same_service(&next_url) {
                    warn!(job_id, %next_url, "not following result page on another host");
                    break;
                }
                followed += 1;
                debug!(%next_url, "following crawl result page");
                let page: CrawlStatusResponse = parse_body(self.get_absolute(&next_url).await?)?;
                collect_pages(&mut status.pages, page.data);
                next = page.next;
            }
        }

        Ok(status)
    }

    /// Run a crawl job to completion, polling on `opts.poll`.
    ///
    /// Fails with [`VoiceBoltError::Crawl`] when the job fails or is cancelled,
    /// and [`VoiceBoltError::Timeout`] when the poll budget runs out.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn crawl(
        &self,
        url: &Url,
        opts: &CrawlOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScrapedPage>> {
        let job_id = self.start_crawl(url, opts).await?;

        for attempt in 0..opts.poll.max_attempts {
            opts.poll.wait(attempt, cancel).await?;

            let status = self.crawl_status(&job_id).await?;
            debug!(
                attempt,
                completed = status.completed,
                total = status.total,
                "crawl status"
            );

            match status.state {
                CrawlState::Completed => {
                    info!(job_id = %job_id, pages = status.pages.len(), "crawl completed");
                    return Ok(status.pages);
                }
                CrawlState::Failed => {
                    return Err(VoiceBoltError::crawl(format!(
                        "crawl job {job_id} for {url} failed: {}",
                        failure_reason(status.error.as_deref())
                    )));
                }
                CrawlState::Cancelled => {
                    return Err(VoiceBoltError::crawl(format!(
                        "crawl job {job_id} for {url} was cancelled: {}",
                        failure_reason(status.error.as_deref())
                    )));
                }
                CrawlState::Scraping => {}
            }
        }

        Err(VoiceBoltError::Timeout(format!(
            "crawl job {job_id} for {url} did not finish after {} status checks",
            opts.poll.max_attempts
        )))
    }

    // -----------------------------------------------------------------------
    // Transport
    // -----------------------------------------------------------------------

    fn check_target(&self, url: &Url) -> Result<()> {
        if !self.allow_private_targets && is_private_target(url) {
            return Err(VoiceBoltError::validation(format!(
                "{url} is not a public website; the extraction service cannot reach it"
            )));
        }
        Ok(())
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let key = self.keys.api_key()?;
        let url = format!("{}{path}", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(body)
            .send()
            .await
            .map_err(|e| VoiceBoltError::Network(format!("{url}: {e}")))?;

        read_json(response).await
    }

    /// Whether `url` points at the configured service, so the key may be sent.
    fn same_service(&self, url: &str) -> bool {
        match (Url::parse(url), Url::parse(&self.base_url)) {
            (Ok(target), Ok(base)) => {
                target.host_str() == base.host_str()
                    && target.port_or_known_default() == base.port_or_known_default()
            }
            _ => false,
        }
    }

    async fn get_absolute(&self, url: &str) -> Result<Value> {
        let key = self.keys.api_key()?;

        let response = self
            .client
            .get(url)
            .bearer_auth(key)
            .send()
            .await
            .map_err(|e| VoiceBoltError::Network(format!("{url}: {e}")))?;

        read_json(response).await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn collect_pages(into: &mut Vec<ScrapedPage>, docs: Vec<PageDoc>) {
    into.extend(docs.into_iter().filter_map(|doc| doc.into_page("")));
}

fn failure_reason(error: Option<&str>) -> &str {
    error.unwrap_or("the extraction service gave no reason")
}

fn parse_body<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| VoiceBoltError::contract(format!("{SERVICE} response: {e}")))
}

async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| VoiceBoltError::Network(format!("failed to read body: {e}")))?;

    if !status.is_success() {
        return Err(map_error(status, &text));
    }

    serde_json::from_str(&text)
        .map_err(|e| VoiceBoltError::contract(format!("{SERVICE} returned invalid JSON: {e}")))
}

/// Map a non-2xx response from the extraction service to an error.
fn map_error(status: StatusCode, body: &str) -> VoiceBoltError {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .or_else(|| v.get("message"))
                .and_then(Value::as_str)
                .map(String::from)
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        });

    match status.as_u16() {
        401 | 403 => VoiceBoltError::auth(
            SERVICE,
            format!("{detail}. Check your Firecrawl API key."),
        ),
        402 => VoiceBoltError::Platform {
            service: SERVICE.into(),
            status: 402,
            message: format!("payment required: {detail}"),
        },
        400 | 422 => VoiceBoltError::validation(detail),
        429 => VoiceBoltError::RateLimited {
            service: SERVICE.into(),
        },
        code => VoiceBoltError::Platform {
            service: SERVICE.into(),
            status: code,
            message: detail,
        },
    }
}

/// True for targets the hosted service cannot reach (loopback, private ranges, local names).
fn is_private_target(url: &Url) -> bool {
    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}
