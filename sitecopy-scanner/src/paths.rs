//! URL to local path mapping.
//!
//! Everything here is pure: the same URL always maps to the same relative path, and nothing
//! touches the filesystem.

use std::path::{Path, PathBuf};
use url::Url;

pub const INDEX_FILE: &str = "index.html";
pub const DOCUMENT_SUFFIX: &str = ".html";

/// The directory name a site is mirrored under: the host, plus `:port` when the URL names a
/// non-default port.
pub fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Collapses empty, `.` and `..` segments. The result never starts with a separator and `..`
/// cannot climb above the root.
pub fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Maps a URL path to a path relative to the site root.
///
/// The root becomes `index.html`, and a final segment without an extension is treated as a
/// server-rendered route and gets `.html` appended.
pub fn map_path(url_path: &str) -> String {
    let cleaned = clean_path(url_path);
    if cleaned.is_empty() {
        return INDEX_FILE.to_string();
    }

    let last = cleaned.rsplit('/').next().unwrap_or(&cleaned);
    if last.contains('.') {
        cleaned
    } else {
        format!("{}{}", cleaned, DOCUMENT_SUFFIX)
    }
}

/// `<output_root>/<host>/<mapped path>` for an absolute URL. Query strings and fragments do not
/// take part in the mapping.
pub fn local_path(output_root: &Path, url: &Url) -> Option<PathBuf> {
    let host = host_key(url)?;
    Some(output_root.join(host).join(map_path(url.path())))
}

/// Canonical form used for deduplication: fragment dropped, everything else kept.
pub fn normalize_url(url: &Url) -> Url {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    normalized
}

/// Resolves an attribute value found in markup against the document it came from.
///
/// Returns `None` for in-page anchors, pseudo-schemes and anything that is not http(s).
pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let resolved = base.join(href).ok()?;
    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return None;
    }
    Some(normalize_url(&resolved))
}

/// Resolves a media reference found in stylesheet text against the document that contained it.
///
/// This follows how stylesheets are usually written rather than RFC 3986:
/// - each leading `../` walks one directory up from the document's directory
/// - a leading `/` is taken relative to the document's directory, not the site root
/// - a bare reference is relative to the document's directory
/// - a reference carrying a scheme is already absolute
/// - a reference starting with `//` is absolute under the document's scheme
pub fn resolve_css_reference(reference: &str, document: &Url) -> Option<Url> {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return Url::parse(reference).ok().map(|u| normalize_url(&u));
    }
    if reference.starts_with("//") {
        return Url::parse(&format!("{}:{}", document.scheme(), reference))
            .ok()
            .map(|u| normalize_url(&u));
    }

    let segments: Vec<&str> = document.path().split('/').collect();
    let directory = &segments[..segments.len().saturating_sub(1)];

    let mut rest = reference;
    let mut ups = 0;
    while let Some(stripped) = rest.strip_prefix("../") {
        rest = stripped;
        ups += 1;
    }

    let joined = if ups > 0 {
        let keep = directory.len().saturating_sub(ups);
        format!("{}/{}", directory[..keep].join("/"), rest)
    } else if rest.starts_with('/') {
        format!("{}{}", directory.join("/"), rest)
    } else {
        format!("{}/{}", directory.join("/"), rest)
    };

    let mut url = document.clone();
    url.set_path(&format!("/{}", clean_path(&joined)));
    url.set_query(None);
    url.set_fragment(None);
    Some(url)
}
