//! On-disk response cache.
//!
//! Entries are keyed by a SHA-256 of the normalized request and sharded by the first two hex
//! characters: `<dir>/ab/abcdef….json` holds the metadata and `….body` the raw bytes. The
//! metadata is written last, so an entry without it is treated as a miss.

use crate::error::Result;
use crate::fetch::FetchResult;
use crate::paths::normalize_url;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;
use url::Url;

#[derive(Debug, Serialize, Deserialize)]
struct CachedMeta {
    url: String,
    final_url: String,
    status: u16,
    headers: BTreeMap<String, String>,
    stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key(url: &Url) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"GET ");
        hasher.update(normalize_url(url).as_str().as_bytes());
        let digest = hasher.finalize();

        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest.iter() {
            let _ = write!(&mut hex, "{byte:02x}");
        }
        hex
    }

    fn entry_paths(&self, key: &str) -> (PathBuf, PathBuf) {
        let shard = self.dir.join(&key[..2]);
        (
            shard.join(format!("{}.json", key)),
            shard.join(format!("{}.body", key)),
        )
    }

    pub fn load(&self, url: &Url) -> Result<Option<FetchResult>> {
        let (meta_path, body_path) = self.entry_paths(&Self::key(url));
        if !meta_path.exists() || !body_path.exists() {
            return Ok(None);
        }

        let meta: CachedMeta = serde_json::from_slice(&fs::read(&meta_path)?)?;
        let body = fs::read(&body_path)?;
        let final_url = Url::parse(&meta.final_url).unwrap_or_else(|_| url.clone());

        debug!("Cache hit for {} ({})", url, meta_path.display());
        Ok(Some(FetchResult {
            url: url.clone(),
            final_url,
            status: meta.status,
            headers: meta.headers,
            body,
            from_cache: true,
        }))
    }

    pub fn store(&self, result: &FetchResult) -> Result<()> {
        let (meta_path, body_path) = self.entry_paths(&Self::key(&result.url));
        let shard = meta_path.parent().unwrap_or(&self.dir);
        fs::create_dir_all(shard)?;

        let meta = CachedMeta {
            url: result.url.to_string(),
            final_url: result.final_url.to_string(),
            status: result.status,
            headers: result.headers.clone(),
            stored_at: Utc::now(),
        };

        write_atomic(shard, &body_path, &result.body)?;
        write_atomic(shard, &meta_path, &serde_json::to_vec_pretty(&meta)?)?;
        Ok(())
    }
}

fn write_atomic(dir: &Path, target: &Path, content: &[u8]) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(url: &str) -> FetchResult {
        let url = Url::parse(url).unwrap();
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "text/css".to_string());
        FetchResult {
            url: url.clone(),
            final_url: url,
            status: 200,
            headers,
            body: b"body { color: red; }".to_vec(),
            from_cache: false,
        }
    }

    #[test]
    fn test_key_ignores_fragment() {
        let a = ResponseCache::key(&Url::parse("https://x.test/a#top").unwrap());
        let b = ResponseCache::key(&Url::parse("https://x.test/a").unwrap());
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_key_keeps_query() {
        let a = ResponseCache::key(&Url::parse("https://x.test/a?v=1").unwrap());
        let b = ResponseCache::key(&Url::parse("https://x.test/a?v=2").unwrap());
        assert_ne!(a, b);
    }

    #[test]
    fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path()).unwrap();
        let result = sample("https://x.test/css/site.css");

        assert!(cache.load(&result.url).unwrap().is_none());
        cache.store(&result).unwrap();

        let hit = cache.load(&result.url).unwrap().unwrap();
        assert!(hit.from_cache);
        assert_eq!(hit.body, result.body);
        assert_eq!(hit.content_type(), Some("text/css"));

        let key = ResponseCache::key(&result.url);
        assert!(dir.path().join(&key[..2]).join(format!("{}.json", key)).exists());
    }

    #[test]
    fn test_missing_metadata_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path()).unwrap();
        let result = sample("https://x.test/");
        cache.store(&result).unwrap();

        let key = ResponseCache::key(&result.url);
        fs::remove_file(dir.path().join(&key[..2]).join(format!("{}.json", key))).unwrap();
        assert!(cache.load(&result.url).unwrap().is_none());
    }
}
