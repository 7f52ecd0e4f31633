use crate::frontier::Frontier;
use crate::paths::host_key;
use crate::target::CrawlTarget;
use robotstxt::DefaultMatcher;
use std::fmt;
use url::Url;

/// Parsed-on-demand robots.txt for the seed origin.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    body: String,
    user_agent: String,
}

impl RobotsRules {
    pub fn new(body: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            user_agent: user_agent.into(),
        }
    }

    pub fn allows(&self, url: &Url) -> bool {
        // Missing or empty robots.txt allows everything.
        if self.body.trim().is_empty() {
            return true;
        }
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.body, &self.user_agent, url.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    Unsupported,
    OffHost,
    TooDeep,
    Robots,
    AlreadyVisited,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            RejectReason::Unsupported => "unsupported scheme",
            RejectReason::OffHost => "off host",
            RejectReason::TooDeep => "beyond max depth",
            RejectReason::Robots => "disallowed by robots.txt",
            RejectReason::AlreadyVisited => "already visited",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow { depth: usize },
    Reject(RejectReason),
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allow { .. })
    }
}

/// Decides which discovered URLs are worth fetching.
#[derive(Debug, Clone)]
pub struct ScopePolicy {
    host: String,
    max_depth: usize,
    robots: Option<RobotsRules>,
}

impl ScopePolicy {
    /// `robots` is ignored when the target overrides robots.txt.
    pub fn new(target: &CrawlTarget, robots: Option<RobotsRules>) -> Self {
        Self {
            host: target.host.clone(),
            max_depth: target.max_depth,
            robots: if target.ignore_robots { None } else { robots },
        }
    }

    /// Host and robots checks shared by links and CSS-embedded assets.
    fn check_location(&self, url: &Url) -> Result<(), RejectReason> {
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(RejectReason::Unsupported);
        }
        if host_key(url).as_deref() != Some(self.host.as_str()) {
            return Err(RejectReason::OffHost);
        }
        if let Some(robots) = &self.robots
            && !robots.allows(url)
        {
            return Err(RejectReason::Robots);
        }
        Ok(())
    }

    /// Static checks for a candidate at `depth`, without touching the frontier.
    pub fn check(&self, url: &Url, depth: usize) -> Result<(), RejectReason> {
        self.check_location(url)?;
        if self.max_depth != 0 && depth > self.max_depth {
            return Err(RejectReason::TooDeep);
        }
        Ok(())
    }

    /// Full admission of a link found on a page at `parent_depth`. On success the URL is already
    /// queued in `frontier` at `parent_depth + 1`.
    pub fn admit(&self, url: &Url, parent_depth: usize, frontier: &Frontier) -> Admission {
        let depth = parent_depth + 1;
        if let Err(reason) = self.check(url, depth) {
            return Admission::Reject(reason);
        }
        if frontier.enqueue(url, depth) {
            Admission::Allow { depth }
        } else {
            Admission::Reject(RejectReason::AlreadyVisited)
        }
    }

    /// Admission of an asset referenced from stylesheet text. These ride along with the
    /// stylesheet, so the depth ceiling does not apply; the frontier only records them.
    pub fn admit_asset(&self, url: &Url, parent_depth: usize, frontier: &Frontier) -> Admission {
        if let Err(reason) = self.check_location(url) {
            return Admission::Reject(reason);
        }
        let depth = parent_depth + 1;
        if frontier.claim(url, depth) {
            Admission::Allow { depth }
        } else {
            Admission::Reject(RejectReason::AlreadyVisited)
        }
    }
}
