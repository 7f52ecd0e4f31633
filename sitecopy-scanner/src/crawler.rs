use crate::error::{Result, ScanError};
use crate::extract::{ReferenceKind, extract_document, extract_stylesheet};
use crate::fetch::{FetchResult, Fetcher, HttpFetcher};
use crate::frontier::{Frontier, FrontierEntry};
use crate::materialize::{Materializer, SaveOutcome};
use crate::result::{CrawlResult, CrawlSummary};
use crate::scope::{Admission, RejectReason, RobotsRules, ScopePolicy};
use crate::target::CrawlTarget;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;
pub type ResultCallback = Arc<dyn Fn(CrawlResult) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Idle,
    Running,
    /// No more work will be handed out; in-flight fetches are settling.
    Draining,
    Done,
}

#[derive(Default)]
struct CrawlStats {
    fetched: AtomicUsize,
    failed: AtomicUsize,
    saved: AtomicUsize,
    css_assets: AtomicUsize,
    collisions: AtomicUsize,
    rejected: AtomicUsize,
}

impl CrawlStats {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct Crawler {
    target: Arc<CrawlTarget>,
    fetcher: Arc<dyn Fetcher>,
    frontier: Arc<Frontier>,
    materializer: Arc<Materializer>,
    results: Arc<Mutex<Vec<CrawlResult>>>,
    stats: Arc<CrawlStats>,
    state: Arc<StdMutex<CrawlState>>,
    progress_callback: Option<ProgressCallback>,
    result_callback: Option<ResultCallback>,
    cancel: CancellationToken,
}

impl Crawler {
    pub fn new(target: CrawlTarget) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&target)?);
        Ok(Self::with_parts(target, fetcher))
    }

    fn with_parts(target: CrawlTarget, fetcher: Arc<dyn Fetcher>) -> Self {
        let materializer = Arc::new(Materializer::new(target.output_root.clone()));
        Self {
            target: Arc::new(target),
            fetcher,
            frontier: Arc::new(Frontier::new()),
            materializer,
            results: Arc::new(Mutex::new(Vec::new())),
            stats: Arc::new(CrawlStats::default()),
            state: Arc::new(StdMutex::new(CrawlState::Idle)),
            progress_callback: None,
            result_callback: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Swaps the transport, e.g. for a fetcher that never touches the network.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn with_result_callback(mut self, callback: ResultCallback) -> Self {
        self.result_callback = Some(callback);
        self
    }

    /// Ties the crawl to an external stop signal.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn target(&self) -> &CrawlTarget {
        &self.target
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> CrawlState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn crawl(&self) -> Result<CrawlSummary> {
        if !advance(&self.state, CrawlState::Idle, CrawlState::Running) {
            return Err(ScanError::Other("crawler has already run".to_string()));
        }

        let site_root = match self.target.prepare_output() {
            Ok(root) => root,
            Err(e) => {
                advance(&self.state, CrawlState::Running, CrawlState::Done);
                return Err(e);
            }
        };

        let workers = self.target.workers.max(1);
        info!(
            "Starting crawl of {} with {} workers into {}",
            self.target.seed,
            workers,
            site_root.display()
        );

        let robots = if self.target.ignore_robots {
            info!("Ignoring robots.txt");
            None
        } else {
            load_robots(self.fetcher.as_ref(), &self.target).await
        };

        let context = Arc::new(CrawlContext {
            policy: ScopePolicy::new(&self.target, robots),
            fetcher: self.fetcher.clone(),
            frontier: self.frontier.clone(),
            materializer: self.materializer.clone(),
            results: self.results.clone(),
            stats: self.stats.clone(),
            state: self.state.clone(),
            progress_callback: self.progress_callback.clone(),
            result_callback: self.result_callback.clone(),
            cancel: self.cancel.clone(),
        });

        if let Err(reason) = context.policy.check(&self.target.seed, 1) {
            warn!("Not crawling {}: {}", self.target.seed, reason);
            CrawlStats::bump(&self.stats.rejected);
            self.frontier.close();
            advance(&self.state, CrawlState::Running, CrawlState::Done);
            return Ok(self.summary().await);
        }
        self.frontier.enqueue(&self.target.seed, 1);

        let watcher = {
            let cancel = self.cancel.clone();
            let frontier = self.frontier.clone();
            let state = self.state.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                warn!("Stop requested, letting in-flight fetches finish");
                advance(&state, CrawlState::Running, CrawlState::Draining);
                frontier.close();
            })
        };

        let mut worker_handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let context = context.clone();
            worker_handles.push(tokio::spawn(async move {
                debug!("Worker {} started", worker_id);
                while let Some(entry) = context.frontier.next().await {
                    context.process(worker_id, entry).await;
                    context.frontier.complete();
                }
                advance(&context.state, CrawlState::Running, CrawlState::Draining);
                debug!("Worker {} finished", worker_id);
            }));
        }

        let joined = futures::future::join_all(worker_handles).await;
        watcher.abort();
        advance(&self.state, CrawlState::Draining, CrawlState::Done);
        advance(&self.state, CrawlState::Running, CrawlState::Done);

        for outcome in joined {
            outcome?;
        }

        let summary = self.summary().await;
        info!(
            "Crawl complete. Fetched {}, saved {}, failed {}",
            summary.fetched, summary.saved, summary.failed
        );
        Ok(summary)
    }

    async fn summary(&self) -> CrawlSummary {
        let results = self.results.lock().await.clone();
        CrawlSummary {
            seed: self.target.seed.to_string(),
            results,
            visited: self.frontier.records(),
            fetched: self.stats.fetched.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            saved: self.stats.saved.load(Ordering::Relaxed),
            css_assets: self.stats.css_assets.load(Ordering::Relaxed),
            collisions: self.stats.collisions.load(Ordering::Relaxed),
            rejected: self.stats.rejected.load(Ordering::Relaxed),
            cancelled: self.cancel.is_cancelled(),
        }
    }

    pub async fn get_results(&self) -> Vec<CrawlResult> {
        self.results.lock().await.clone()
    }

    pub fn get_visited_count(&self) -> usize {
        self.frontier.visited_count()
    }
}

/// Moves `state` from `from` to `to`. Returns false if it was somewhere else.
fn advance(state: &StdMutex<CrawlState>, from: CrawlState, to: CrawlState) -> bool {
    let mut current = state.lock().unwrap_or_else(PoisonError::into_inner);
    if *current == from {
        *current = to;
        true
    } else {
        false
    }
}

async fn load_robots(fetcher: &dyn Fetcher, target: &CrawlTarget) -> Option<RobotsRules> {
    let mut robots_url = target.seed.clone();
    robots_url.set_path("/robots.txt");
    robots_url.set_query(None);
    robots_url.set_fragment(None);

    match fetcher.fetch(&robots_url).await {
        Ok(response) => {
            info!("Loaded robots.txt from {}", robots_url);
            Some(RobotsRules::new(response.text(), target.user_agent.clone()))
        }
        Err(e) => {
            debug!("No usable robots.txt at {} ({}), allowing everything", robots_url, e);
            None
        }
    }
}

/// Per-crawl state shared by the workers.
struct CrawlContext {
    fetcher: Arc<dyn Fetcher>,
    frontier: Arc<Frontier>,
    materializer: Arc<Materializer>,
    policy: ScopePolicy,
    results: Arc<Mutex<Vec<CrawlResult>>>,
    stats: Arc<CrawlStats>,
    state: Arc<StdMutex<CrawlState>>,
    progress_callback: Option<ProgressCallback>,
    result_callback: Option<ResultCallback>,
    cancel: CancellationToken,
}

impl CrawlContext {
    /// dequeue → fetch → extract → scope-filter → enqueue → materialize, then any CSS-embedded
    /// assets the response referenced.
    async fn process(&self, worker_id: usize, entry: FrontierEntry) {
        let FrontierEntry { url, depth } = entry;
        if let Some(callback) = &self.progress_callback {
            callback(worker_id, url.to_string());
        }

        let started = Instant::now();
        let Some(fetched) = self.fetch(&url, depth).await else {
            return;
        };
        if fetched.final_url != fetched.url && self.frontier.claim(&fetched.final_url, depth) {
            debug!("[Worker {}] {} redirected to {}", worker_id, url, fetched.final_url);
        }
        let mut result = CrawlResult::from_fetch(&fetched, depth, started.elapsed());

        let references = if fetched.is_html() {
            extract_document(&fetched.text(), &fetched.final_url)
        } else if fetched.is_css() {
            extract_stylesheet(&fetched.text(), &fetched.final_url, ReferenceKind::CssUrl)
        } else {
            Vec::new()
        };
        result.references_found = references.len();

        let mut assets = Vec::new();
        for reference in references {
            let Some(target) = reference.resolve() else {
                continue;
            };

            let admission = if reference.kind.is_css_embedded() {
                self.policy.admit_asset(&target, depth, &self.frontier)
            } else {
                self.policy.admit(&target, depth, &self.frontier)
            };

            match admission {
                Admission::Allow { depth: child_depth } => {
                    debug!("[Worker {}] Admitted {} {} at depth {}", worker_id, reference.kind, target, child_depth);
                    if reference.kind.is_css_embedded() {
                        assets.push((target, child_depth));
                    }
                }
                Admission::Reject(RejectReason::AlreadyVisited) => {}
                Admission::Reject(reason) => {
                    debug!("[Worker {}] Skipping {}: {}", worker_id, target, reason);
                    CrawlStats::bump(&self.stats.rejected);
                }
            }
        }

        self.materialize(fetched, &mut result).await;
        self.record(result).await;

        for (asset, asset_depth) in assets {
            if self.cancel.is_cancelled() {
                debug!("[Worker {}] Stop requested, skipping remaining CSS assets", worker_id);
                break;
            }
            self.process_asset(worker_id, asset, asset_depth).await;
        }
    }

    /// Assets found in stylesheet text are fetched and written right away. They are media
    /// files, so nothing further is extracted from them.
    async fn process_asset(&self, worker_id: usize, url: Url, depth: usize) {
        if let Some(callback) = &self.progress_callback {
            callback(worker_id, url.to_string());
        }

        let started = Instant::now();
        let Some(fetched) = self.fetch(&url, depth).await else {
            return;
        };
        CrawlStats::bump(&self.stats.css_assets);

        let mut result = CrawlResult::from_fetch(&fetched, depth, started.elapsed());
        result.css_asset = true;
        self.materialize(fetched, &mut result).await;
        self.record(result).await;
    }

    async fn fetch(&self, url: &Url, depth: usize) -> Option<FetchResult> {
        match self.fetcher.fetch(url).await {
            Ok(fetched) => {
                CrawlStats::bump(&self.stats.fetched);
                Some(fetched)
            }
            Err(e) => {
                warn!("Crawl error for {}: {}", url, e);
                CrawlStats::bump(&self.stats.failed);
                self.record(CrawlResult::with_error(url.to_string(), depth, e.to_string()))
                    .await;
                None
            }
        }
    }

    async fn materialize(&self, fetched: FetchResult, result: &mut CrawlResult) {
        let Some(destination) = self.materializer.destination(&fetched.url) else {
            result.error = Some("URL has no host".to_string());
            CrawlStats::bump(&self.stats.failed);
            return;
        };

        match self.materializer.save(fetched, destination.clone()).await {
            Ok(SaveOutcome::Written { path, .. }) => {
                CrawlStats::bump(&self.stats.saved);
                result.local_path = Some(path);
            }
            Ok(SaveOutcome::Collision { path, owner }) => {
                warn!(
                    "{} maps to {} which already holds {}, not overwriting",
                    result.url,
                    path.display(),
                    owner
                );
                CrawlStats::bump(&self.stats.collisions);
                result.error = Some(format!("path collision with {}", owner));
            }
            Err(e) => {
                warn!("Error saving {} to {}: {}", result.url, destination.display(), e);
                CrawlStats::bump(&self.stats.failed);
                result.error = Some(e.to_string());
            }
        }
    }

    async fn record(&self, result: CrawlResult) {
        if let Some(callback) = &self.result_callback {
            callback(result.clone());
        }
        self.results.lock().await.push(result);
    }
}
