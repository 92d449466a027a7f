//! Web-content fetcher backed by a hosted content-extraction service.
//!
//! This crate provides:
//! - [`FirecrawlClient`]: single-page scrape and polled multi-page crawl jobs
//! - [`extract_site`]: deep/shallow extraction with the scrape fallback
//! - [`SiteContent`]: extracted pages, flattened into one knowledge document

pub mod client;
pub mod site;

pub use client::{CrawlOptions, CrawlState, CrawlStatus, FirecrawlClient, ScrapedPage};
pub use site::{ExtractionMethod, SiteContent, extract_site};
