use crate::fetch::FetchResult;
use crate::frontier::VisitRecord;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// What happened to one resource handed to the fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    pub url: String,
    pub depth: usize,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub response_time: Duration,
    pub local_path: Option<PathBuf>,
    pub references_found: usize,
    /// Downloaded inline while processing a stylesheet or style attribute.
    pub css_asset: bool,
    pub from_cache: bool,
    pub error: Option<String>,
}

impl CrawlResult {
    pub fn new(url: String, depth: usize) -> Self {
        Self {
            url,
            depth,
            status_code: 0,
            content_type: None,
            content_length: None,
            response_time: Duration::from_secs(0),
            local_path: None,
            references_found: 0,
            css_asset: false,
            from_cache: false,
            error: None,
        }
    }

    pub fn with_error(url: String, depth: usize, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::new(url, depth)
        }
    }

    pub fn from_fetch(fetched: &FetchResult, depth: usize, response_time: Duration) -> Self {
        Self {
            status_code: fetched.status,
            content_type: fetched.content_type().map(str::to_string),
            content_length: Some(fetched.body.len() as u64),
            response_time,
            from_cache: fetched.from_cache,
            ..Self::new(fetched.url.to_string(), depth)
        }
    }

    pub fn is_saved(&self) -> bool {
        self.local_path.is_some()
    }
}

/// Everything a finished crawl reports back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlSummary {
    pub seed: String,
    pub results: Vec<CrawlResult>,
    pub visited: Vec<VisitRecord>,
    pub fetched: usize,
    pub failed: usize,
    pub saved: usize,
    pub css_assets: usize,
    pub collisions: usize,
    pub rejected: usize,
    pub cancelled: bool,
}

impl CrawlSummary {
    pub fn failures(&self) -> impl Iterator<Item = &CrawlResult> {
        self.results.iter().filter(|r| r.error.is_some())
    }
}
