use crate::cache::ResponseCache;
use crate::error::{Result, ScanError};
use crate::paths::host_key;
use crate::target::CrawlTarget;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const REDIRECT_LIMIT: usize = 10;

/// A successful response, held only until it has been processed and written out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// The URL that was requested. The local path is derived from this one.
    pub url: Url,
    /// Where redirects ended up. Relative links resolve against this one.
    pub final_url: Url,
    pub status: u16,
    /// Lower-cased header names.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub from_cache: bool,
}

impl FetchResult {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE.as_str()).map(String::as_str)
    }

    pub fn is_html(&self) -> bool {
        self.content_type()
            .map(|ct| ct.contains("text/html") || ct.contains("application/xhtml+xml"))
            .unwrap_or(false)
    }

    pub fn is_css(&self) -> bool {
        self.content_type()
            .map(|ct| ct.contains("text/css"))
            .unwrap_or(false)
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchResult>;
}

/// `reqwest`-backed fetcher with an optional on-disk response cache in front of it.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    cache: Option<ResponseCache>,
}

/// Follows at most [`REDIRECT_LIMIT`] hops and only while they stay on `host`. A hop to any
/// other host is not taken; the 3xx itself comes back and is reported as a status error.
fn same_host_redirects(host: String) -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= REDIRECT_LIMIT {
            attempt.error("too many redirects")
        } else if host_key(attempt.url()).as_deref() != Some(host.as_str()) {
            debug!("Not following redirect off {} to {}", host, attempt.url());
            attempt.stop()
        } else {
            attempt.follow()
        }
    })
}

impl HttpFetcher {
    pub fn new(target: &CrawlTarget) -> Result<Self> {
        let client = Client::builder()
            .user_agent(target.user_agent.clone())
            .timeout(target.timeout)
            .connect_timeout(target.timeout / 2)
            .pool_max_idle_per_host(target.workers.max(1))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(same_host_redirects(target.host.clone()))
            .build()?;

        let cache = match &target.cache_dir {
            Some(dir) => Some(ResponseCache::new(dir)?),
            None => None,
        };

        Ok(Self { client, cache })
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    async fn load_cached(&self, url: &Url) -> Option<FetchResult> {
        let cache = self.cache.clone()?;
        let key_url = url.clone();
        match tokio::task::spawn_blocking(move || cache.load(&key_url)).await {
            Ok(Ok(hit)) => hit,
            Ok(Err(e)) => {
                warn!("Ignoring unreadable cache entry for {}: {}", url, e);
                None
            }
            Err(e) => {
                warn!("Cache lookup for {} failed: {}", url, e);
                None
            }
        }
    }

    async fn store_cached(&self, result: &FetchResult) {
        let Some(cache) = self.cache.clone() else {
            return;
        };
        let entry = result.clone();
        match tokio::task::spawn_blocking(move || cache.store(&entry)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Could not cache {}: {}", result.url, e),
            Err(e) => warn!("Cache write for {} failed: {}", result.url, e),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchResult> {
        if let Some(hit) = self.load_cached(url).await {
            return Ok(hit);
        }

        debug!("Fetching {}", url);
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        let result = FetchResult {
            url: url.clone(),
            final_url,
            status: status.as_u16(),
            headers,
            body,
            from_cache: false,
        };

        self.store_cached(&result).await;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    fn target(server: &MockServer) -> CrawlTarget {
        CrawlTarget::new(&server.uri(), "out").unwrap()
    }

    #[tokio::test]
    async fn test_fetch_returns_headers_and_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/about"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_bytes(b"<html>about</html>".as_slice()),
            )
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(&target(&mock_server)).unwrap();
        let url = Url::parse(&format!("{}/about", mock_server.uri())).unwrap();
        let result = fetcher.fetch(&url).await.unwrap();

        assert_eq!(result.status, 200);
        assert!(result.is_html());
        assert!(!result.is_css());
        assert_eq!(result.body, b"<html>about</html>");
        assert!(!result.from_cache);
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(&target(&mock_server)).unwrap();
        let url = Url::parse(&format!("{}/missing", mock_server.uri())).unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();

        assert!(matches!(err, ScanError::Status { status: 404, .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/css/site.css"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/css")
                    .set_body_bytes(b"body{}".as_slice()),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let cache_dir = tempfile::tempdir().unwrap();
        let target = target(&mock_server).with_cache_dir(Some(cache_dir.path().to_path_buf()));
        let fetcher = HttpFetcher::new(&target).unwrap();
        let url = Url::parse(&format!("{}/css/site.css", mock_server.uri())).unwrap();

        let first = fetcher.fetch(&url).await.unwrap();
        let second = fetcher.fetch(&url).await.unwrap();

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.body, second.body);
        assert!(second.is_css());
    }

    #[tokio::test]
    async fn test_redirect_keeps_requested_url() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301)
                    .insert_header("location", format!("{}/new/", mock_server.uri()).as_str()),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_bytes(b"<html>new</html>".as_slice()),
            )
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(&target(&mock_server)).unwrap();
        let url = Url::parse(&format!("{}/old", mock_server.uri())).unwrap();
        let result = fetcher.fetch(&url).await.unwrap();

        assert_eq!(result.url, url);
        assert_eq!(result.final_url.path(), "/new/");
    }

    #[tokio::test]
    async fn test_redirect_to_another_host_is_not_followed() {
        let mock_server = MockServer::start().await;
        let elsewhere = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/go"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("{}/landing", elsewhere.uri()).as_str()),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>elsewhere</p>"))
            .expect(0)
            .mount(&elsewhere)
            .await;

        let fetcher = HttpFetcher::new(&target(&mock_server)).unwrap();
        let url = Url::parse(&format!("{}/go", mock_server.uri())).unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();

        assert!(matches!(err, ScanError::Status { status: 302, .. }));
    }

    #[tokio::test]
    async fn test_redirect_loop_gives_up() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("{}/loop", mock_server.uri()).as_str()),
            )
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(&target(&mock_server)).unwrap();
        let url = Url::parse(&format!("{}/loop", mock_server.uri())).unwrap();

        assert!(fetcher.fetch(&url).await.is_err());
    }
}
