//! Static file server for a mirrored site.
//!
//! HTTP/1.1 GET and HEAD only, one response per connection.

use sitecopy_scanner::paths::{DOCUMENT_SUFFIX, INDEX_FILE, clean_path};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const MAX_REQUEST_HEAD: usize = 8 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Maps a request path onto a file under `site_root`.
///
/// Extension-less paths other than `/` get their trailing slashes trimmed and `.html` appended,
/// mirroring how pages were written. Anything else is taken as-is. `..` never climbs out of
/// `site_root`, and a directory resolves to its `index.html`.
pub fn resolve_request_path(site_root: &Path, request_path: &str) -> PathBuf {
    let path = request_path
        .split(['?', '#'])
        .next()
        .unwrap_or_default();

    let cleaned = clean_path(path);
    let last = cleaned.rsplit('/').next().unwrap_or_default();

    let resolved = if cleaned.is_empty() {
        site_root.to_path_buf()
    } else if last.contains('.') {
        site_root.join(&cleaned)
    } else {
        site_root.join(format!("{}{}", cleaned, DOCUMENT_SUFFIX))
    };

    if resolved.is_dir() {
        resolved.join(INDEX_FILE)
    } else {
        resolved
    }
}

/// Content-Type for a file, guessed from its extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "xml" => "application/xml",
        "txt" => "text/plain; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "eot" => "application/vnd.ms-fontobject",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "ogv" => "video/ogg",
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

pub struct PreviewServer {
    listener: TcpListener,
    site_root: Arc<PathBuf>,
}

impl PreviewServer {
    /// Binds `address:port`. Port 0 picks a free port; see [`PreviewServer::local_addr`].
    pub async fn bind(address: &str, port: u16, site_root: impl Into<PathBuf>) -> io::Result<Self> {
        let site_root = site_root.into();
        if !site_root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", site_root.display()),
            ));
        }

        let listener = TcpListener::bind((address, port)).await?;
        Ok(Self {
            listener,
            site_root: Arc::new(site_root),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn site_root(&self) -> &Path {
        &self.site_root
    }

    /// Accepts connections until `shutdown` fires.
    pub async fn serve(self, shutdown: CancellationToken) -> io::Result<()> {
        info!(
            "Serving {} on http://{}",
            self.site_root.display(),
            self.local_addr()?
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Preview server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("Accept failed: {}", e);
                            continue;
                        }
                    };
                    let site_root = self.site_root.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &site_root).await {
                            debug!("Connection from {} ended with error: {}", peer, e);
                        }
                    });
                }
            }
        }
    }
}

async fn read_request_head(stream: &mut TcpStream) -> io::Result<String> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = tokio::time::timeout(READ_TIMEOUT, stream.read(&mut chunk))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "request head timed out"))??;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") || buf.len() >= MAX_REQUEST_HEAD {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn handle_connection(mut stream: TcpStream, site_root: &Path) -> io::Result<()> {
    let head = read_request_head(&mut stream).await?;
    let mut parts = head.lines().next().unwrap_or_default().split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return write_response(&mut stream, 400, "Bad Request", "text/plain", b"bad request\n", true)
            .await;
    };

    let send_body = match method {
        "GET" => true,
        "HEAD" => false,
        _ => {
            debug!("{} {} -> 405", method, target);
            return write_response(
                &mut stream,
                405,
                "Method Not Allowed",
                "text/plain",
                b"method not allowed\n",
                true,
            )
            .await;
        }
    };

    let file = resolve_request_path(site_root, target);
    match tokio::fs::read(&file).await {
        Ok(body) => {
            debug!("{} {} -> 200 {}", method, target, file.display());
            write_response(&mut stream, 200, "OK", content_type_for(&file), &body, send_body).await
        }
        Err(e) => {
            debug!("{} {} -> 404 ({})", method, target, e);
            write_response(&mut stream, 404, "Not Found", "text/plain", b"not found\n", send_body)
                .await
        }
    }
}

async fn write_response(
    stream: &mut TcpStream,
    status: u16,
    reason: &str,
    content_type: &str,
    body: &[u8],
    send_body: bool,
) -> io::Result<()> {
    let mut response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        status,
        reason,
        content_type,
        body.len()
    );
    if status == 405 {
        response.push_str("Allow: GET, HEAD\r\n");
    }
    response.push_str("\r\n");

    stream.write_all(response.as_bytes()).await?;
    if send_body {
        stream.write_all(body).await?;
    }
    stream.flush().await?;
    stream.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_guessing() {
        assert_eq!(content_type_for(Path::new("a/index.html")), "text/html; charset=utf-8");
        assert_eq!(content_type_for(Path::new("img/logo.PNG")), "image/png");
        assert_eq!(content_type_for(Path::new("fonts/x.woff2")), "font/woff2");
        assert_eq!(content_type_for(Path::new("blob")), "application/octet-stream");
    }

    #[test]
    fn test_resolution_without_files() {
        let root = Path::new("/nonexistent-site-root");
        assert_eq!(resolve_request_path(root, "/about"), root.join("about.html"));
        assert_eq!(resolve_request_path(root, "/blog/post/"), root.join("blog/post.html"));
        assert_eq!(resolve_request_path(root, "/img/logo.png"), root.join("img/logo.png"));
        assert_eq!(resolve_request_path(root, "/about?x=1"), root.join("about.html"));
        assert_eq!(resolve_request_path(root, "/../../etc/passwd"), root.join("etc/passwd.html"));
    }
}
