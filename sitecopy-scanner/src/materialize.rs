use crate::error::{Result, ScanError};
use crate::fetch::FetchResult;
use crate::paths::local_path;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Written { path: PathBuf, bytes: u64 },
    /// Another URL already owns this path. Nothing was written.
    Collision { path: PathBuf, owner: String },
}

/// Writes fetched bodies into the mirror tree.
///
/// Each destination path is claimed by the first URL that maps to it, so two URLs that differ
/// only by query string never overwrite each other and no two writers share a path.
pub struct Materializer {
    output_root: PathBuf,
    claimed: Mutex<HashMap<PathBuf, String>>,
}

impl Materializer {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            claimed: Mutex::new(HashMap::new()),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn destination(&self, url: &Url) -> Option<PathBuf> {
        local_path(&self.output_root, url)
    }

    fn claim(&self, path: &Path, url: &str) -> Option<String> {
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        match claimed.entry(path.to_path_buf()) {
            Entry::Occupied(owner) if owner.get() != url => Some(owner.get().clone()),
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(url.to_string());
                None
            }
        }
    }

    /// Writes `result` to `destination`, creating missing directories first.
    pub async fn save(&self, result: FetchResult, destination: PathBuf) -> Result<SaveOutcome> {
        let url = result.url.to_string();
        if let Some(owner) = self.claim(&destination, &url) {
            return Ok(SaveOutcome::Collision {
                path: destination,
                owner,
            });
        }

        let bytes = result.body.len() as u64;
        let path = destination.clone();
        tokio::task::spawn_blocking(move || write_file(&path, &result.body)).await??;

        info!("Saved {} -> {}", url, destination.display());
        Ok(SaveOutcome::Written {
            path: destination,
            bytes,
        })
    }

    /// `save` at the path the URL maps to.
    pub async fn save_mapped(&self, result: FetchResult) -> Result<SaveOutcome> {
        let destination = self
            .destination(&result.url)
            .ok_or_else(|| ScanError::InvalidUrl(format!("{}: URL has no host", result.url)))?;
        self.save(result, destination).await
    }
}

/// Writes through a temp file in the destination directory and renames it into place, so a
/// reader sees either nothing or the whole file.
pub fn write_file(destination: &Path, body: &[u8]) -> io::Result<()> {
    let parent = destination
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent"))?;
    fs::create_dir_all(parent)?;
    debug!("Writing {}", destination.display());

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(body)?;
    tmp.flush()?;
    tmp.persist(destination).map_err(|e| e.error)?;
    Ok(())
}
