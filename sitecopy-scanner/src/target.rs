use crate::error::{Result, ScanError};
use crate::paths::host_key;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_USER_AGENT: &str = "sitecopy/0.1 (+https://github.com/sitecopy/sitecopy)";
pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Everything a crawl needs to know about where it starts and where it writes.
///
/// Built once before the crawl and shared read-only with every component.
#[derive(Debug, Clone)]
pub struct CrawlTarget {
    pub seed: Url,
    pub host: String,
    pub output_root: PathBuf,
    /// 0 means unbounded. The seed sits at depth 1.
    pub max_depth: usize,
    pub user_agent: String,
    pub cache_dir: Option<PathBuf>,
    pub ignore_robots: bool,
    pub workers: usize,
    pub timeout: Duration,
}

impl CrawlTarget {
    pub fn new(seed: &str, output_root: impl Into<PathBuf>) -> Result<Self> {
        let seed = Url::parse(seed).map_err(|e| ScanError::InvalidUrl(format!("{}: {}", seed, e)))?;

        if seed.scheme() != "http" && seed.scheme() != "https" {
            return Err(ScanError::InvalidUrl(format!(
                "{}: only http and https are supported",
                seed
            )));
        }

        let host = host_key(&seed)
            .ok_or_else(|| ScanError::InvalidUrl(format!("{}: URL has no host", seed)))?;

        Ok(Self {
            seed,
            host,
            output_root: output_root.into(),
            max_depth: 0,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cache_dir: None,
            ignore_robots: false,
            workers: DEFAULT_WORKERS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_cache_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.cache_dir = dir;
        self
    }

    pub fn with_ignore_robots(mut self, ignore: bool) -> Self {
        self.ignore_robots = ignore;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `<output_root>/<host>`, the directory every mirrored file lands under.
    pub fn site_root(&self) -> PathBuf {
        self.output_root.join(&self.host)
    }

    /// Creates the site root. Failing here is fatal: nothing has been fetched yet.
    pub fn prepare_output(&self) -> Result<PathBuf> {
        let root = self.site_root();
        ensure_dir(&root).map_err(|e| ScanError::OutputRoot {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(root)
    }
}

fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    // Probe writability the same way the materializer will write.
    tempfile::NamedTempFile::new_in(dir)?;
    Ok(())
}
