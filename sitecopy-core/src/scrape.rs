use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use sitecopy_scanner::result::{CrawlResult, CrawlSummary};
use sitecopy_scanner::target::{DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT, DEFAULT_WORKERS};
use sitecopy_scanner::{CrawlTarget, Crawler, ScanError};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use url::Url;

/// Options for configuring a scrape run
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub url: String,
    pub output_dir: PathBuf,
    pub cache_dir: Option<PathBuf>,
    /// 0 means unbounded
    pub max_depth: usize,
    pub user_agent: String,
    pub ignore_robots: bool,
    pub threads: usize,
    pub timeout_secs: u64,
    pub show_progress_bars: bool,
}

impl ScrapeOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            output_dir: PathBuf::from("sites"),
            cache_dir: None,
            max_depth: 0,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            ignore_robots: false,
            threads: DEFAULT_WORKERS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            show_progress_bars: false,
        }
    }

    pub fn to_target(&self) -> Result<CrawlTarget, ScanError> {
        Ok(CrawlTarget::new(&self.url, &self.output_dir)?
            .with_max_depth(self.max_depth)
            .with_user_agent(self.user_agent.clone())
            .with_cache_dir(self.cache_dir.clone())
            .with_ignore_robots(self.ignore_robots)
            .with_workers(self.threads)
            .with_timeout(Duration::from_secs(self.timeout_secs)))
    }
}

/// Callback for reporting scrape progress
pub type ScrapeProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Callback for reporting individual results as they come in
pub type ScrapeResultCallback = Arc<dyn Fn(CrawlResult) + Send + Sync>;

/// Extract the path component from a URL
pub fn extract_url_path(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|u| {
            let path = u.path().to_string();
            if path.is_empty() || path == "/" {
                "/".to_string()
            } else {
                path
            }
        })
        .unwrap_or_else(|| url.to_string())
}

/// Cancels `token` on the first Ctrl-C.
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => token.cancel(),
            Err(e) => warn!("Unable to listen for Ctrl-C: {}", e),
        }
    });
}

/// Execute a scrape with the given options and return its summary.
///
/// `cancel` is the stop signal: once it fires no new resources are started.
pub async fn execute_scrape(
    options: ScrapeOptions,
    progress_callback: Option<ScrapeProgressCallback>,
    result_callback: Option<ScrapeResultCallback>,
    cancel: CancellationToken,
) -> Result<CrawlSummary, String> {
    let target = options.to_target().map_err(|e| e.to_string())?;

    let progress_bar = if options.show_progress_bars {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(format!("Starting scrape of {}...", target.seed));
        Some(pb)
    } else {
        None
    };

    let processed_count = Arc::new(AtomicUsize::new(0));

    let pb_clone = progress_bar.clone();
    let count_clone = processed_count.clone();
    let outer_progress = progress_callback.clone();
    let internal_progress_callback: sitecopy_scanner::ProgressCallback =
        Arc::new(move |_worker_id: usize, url: String| {
            let count = count_clone.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(pb) = &pb_clone {
                pb.set_message(format!("{} fetched... {}", count, extract_url_path(&url)));
            }
            if let Some(callback) = &outer_progress {
                callback(url);
            }
        });

    let mut crawler = Crawler::new(target)
        .map_err(|e| e.to_string())?
        .with_progress_callback(internal_progress_callback)
        .with_cancellation(cancel);

    if let Some(cb) = result_callback {
        let result_cb: sitecopy_scanner::ResultCallback = Arc::new(move |result: CrawlResult| {
            cb(result);
        });
        crawler = crawler.with_result_callback(result_cb);
    }

    let outcome = crawler.crawl().await;

    if let Some(pb) = &progress_bar {
        match &outcome {
            Ok(summary) if summary.cancelled => pb.finish_with_message(format!(
                "Stopped early, {} resources processed",
                processed_count.load(Ordering::Relaxed)
            )),
            Ok(_) => pb.finish_with_message(format!(
                "Scrape complete! {} resources processed",
                processed_count.load(Ordering::Relaxed)
            )),
            Err(_) => pb.finish_and_clear(),
        }
    }

    outcome.map_err(|e| e.to_string())
}

fn status_label(status: u16) -> String {
    let text = status.to_string();
    match status {
        200..=299 => text.green().to_string(),
        300..=399 => text.cyan().to_string(),
        400..=499 => text.yellow().to_string(),
        500..=599 => text.red().to_string(),
        _ => text,
    }
}

/// Generate the end-of-run report from a summary
pub fn generate_scrape_report(summary: &CrawlSummary) -> String {
    let mut report = String::new();
    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
    report.push_str("# Summary:\n");
    report.push_str(&format!("  Seed: {}\n", summary.seed));
    report.push_str(&format!("  Resources fetched: {}\n", summary.fetched));
    report.push_str(&format!("  Files saved: {}\n", summary.saved));
    report.push_str(&format!("  CSS assets: {}\n", summary.css_assets));
    report.push_str(&format!("  Failed: {}\n", summary.failed));
    report.push_str(&format!("  Path collisions: {}\n", summary.collisions));
    report.push_str(&format!("  Skipped (out of scope): {}\n", summary.rejected));
    if summary.cancelled {
        report.push_str("  Stopped early on request\n");
    }

    report.push_str("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");

    let mut by_status: BTreeMap<u16, Vec<&CrawlResult>> = BTreeMap::new();
    for result in summary.results.iter().filter(|r| r.status_code != 0) {
        by_status.entry(result.status_code).or_default().push(result);
    }

    for (status, results) in by_status.iter() {
        report.push_str(&format!("## {}\n", status_label(*status)));
        report.push_str(&format!("  {} resources\n\n", results.len()));

        for result in results {
            let mut line = format!("  {}", extract_url_path(&result.url));

            if let Some(path) = &result.local_path {
                line.push_str(&format!(" -> {}", path.display()));
            }

            // Only show MIME type if it's not text/html
            if let Some(content_type) = &result.content_type
                && !content_type.starts_with("text/html")
            {
                line.push_str(&format!(" {}", content_type.bright_black()));
            }

            if let Some(error) = &result.error {
                line.push_str(&format!(" ({})", error.yellow()));
            }

            report.push_str(&line);
            report.push('\n');
        }
        report.push('\n');
    }

    let unreachable: Vec<&CrawlResult> = summary
        .results
        .iter()
        .filter(|r| r.status_code == 0)
        .collect();
    if !unreachable.is_empty() {
        report.push_str(&format!("## {}\n", "Failed".red()));
        report.push_str(&format!("  {} resources\n\n", unreachable.len()));
        for result in unreachable {
            report.push_str(&format!(
                "  {} {}\n",
                result.url,
                result.error.as_deref().unwrap_or("unknown error").bright_black()
            ));
        }
        report.push('\n');
    }

    report
}

/// Writes the summary as pretty-printed JSON, creating parent directories as needed.
pub fn write_summary_json(summary: &CrawlSummary, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
    }
    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| format!("Failed to serialize report: {}", e))?;
    fs::write(path, json).map_err(|e| format!("Failed to write {}: {}", path.display(), e))
}
