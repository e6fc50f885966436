//! Static file server for the build output.
//!
//! A small `tiny_http` server bound to localhost. The audit harness runs it
//! as a child process (`sitepipe serve --port N --dir dist --spa`); it can
//! also be used directly to preview a build.
//!
//! - Automatic `index.html` resolution for directories
//! - Optional single-page-application fallback to the root `index.html`
//! - Paths containing `..` are rejected
//! - Graceful shutdown on Ctrl+C or SIGTERM

use crate::log;
use anyhow::{Context, Result, anyhow};
use std::{
    fs,
    io::Cursor,
    net::{Ipv4Addr, SocketAddr},
    path::{Component, Path, PathBuf},
    sync::Arc,
};
use tiny_http::{Header, Request, Response, Server, StatusCode};

// ============================================================================
// Server Entry Point
// ============================================================================

/// Serve `root` on `127.0.0.1:port` until Ctrl+C or SIGTERM.
pub fn serve_dir(root: &Path, port: u16, spa: bool) -> Result<()> {
    if !root.is_dir() {
        anyhow::bail!("Nothing to serve: {} is not a directory", root.display());
    }

    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let server = Server::http(addr).map_err(|err| anyhow!("Failed to bind {addr}: {err}"))?;
    let server = Arc::new(server);

    let server_for_signal = Arc::clone(&server);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        server_for_signal.unblock();
    })
    .context("Failed to set signal handler")?;

    let mode = if spa { " (spa)" } else { "" };
    log!("serve"; "http://{addr}{mode} → {}", root.display());

    for request in server.incoming_requests() {
        if let Err(e) = handle_request(request, root, spa) {
            log!("serve"; "request error: {e}");
        }
    }

    Ok(())
}

// ============================================================================
// Request Handling
// ============================================================================

/// Map a request URL to a file under `root`.
///
/// Resolution order:
/// 1. Exact file match
/// 2. Directory with `index.html`
/// 3. Root `index.html` when `spa` is set
///
/// Returns `None` for unknown paths and for any path containing `..`.
fn resolve(root: &Path, url: &str, spa: bool) -> Option<PathBuf> {
    let decoded = urlencoding::decode(url)
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_default();

    // Strip query string and fragment (e.g. cache-busting `?v=123`)
    let path = decoded.split(['?', '#']).next().unwrap_or_default();
    let request_path = Path::new(path.trim_matches('/'));

    if request_path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return None;
    }

    let local_path = root.join(request_path);
    if local_path.is_file() {
        return Some(local_path);
    }

    let index_path = local_path.join("index.html");
    if local_path.is_dir() && index_path.is_file() {
        return Some(index_path);
    }

    let fallback = root.join("index.html");
    (spa && fallback.is_file()).then_some(fallback)
}

fn handle_request(request: Request, root: &Path, spa: bool) -> Result<()> {
    match resolve(root, request.url(), spa) {
        Some(path) => serve_file(request, &path),
        None => serve_not_found(request),
    }
}

// ============================================================================
// Response Helpers
// ============================================================================

fn content_type_header(value: &str) -> Result<Header> {
    Header::from_bytes("Content-Type", value).map_err(|()| anyhow!("Invalid header: {value}"))
}

/// Serve a file with appropriate content type.
fn serve_file(request: Request, path: &Path) -> Result<()> {
    let content = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let response =
        Response::from_data(content).with_header(content_type_header(guess_content_type(path))?);

    request.respond(response)?;
    Ok(())
}

/// Serve 404 Not Found response.
fn serve_not_found(request: Request) -> Result<()> {
    let response = Response::new(
        StatusCode(404),
        vec![content_type_header("text/plain")?],
        Cursor::new("404 Not Found"),
        Some(13),
        None,
    );
    request.respond(response)?;
    Ok(())
}

// ============================================================================
// Content Type Detection
// ============================================================================

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        // Web content
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json" | "webmanifest") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",
        Some("csv") => "text/csv; charset=utf-8",

        // Images
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("ico") => "image/x-icon",

        // Fonts
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",

        // Documents
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain; charset=utf-8",

        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<p>home</p>").unwrap();
        fs::create_dir_all(dir.path().join("about")).unwrap();
        fs::write(dir.path().join("about/index.html"), "<p>about</p>").unwrap();
        fs::create_dir_all(dir.path().join("css")).unwrap();
        fs::write(dir.path().join("css/main.css"), "p{}").unwrap();
        dir
    }

    #[test]
    fn test_resolve_files_and_directories() {
        let dir = site();
        let root = dir.path();

        assert_eq!(resolve(root, "/", false), Some(root.join("index.html")));
        assert_eq!(resolve(root, "/about/", false), Some(root.join("about/index.html")));
        assert_eq!(resolve(root, "/css/main.css?v=2", false), Some(root.join("css/main.css")));
        assert_eq!(resolve(root, "/missing", false), None);
    }

    #[test]
    fn test_resolve_spa_fallback() {
        let dir = site();
        let root = dir.path();

        assert_eq!(resolve(root, "/app/route/42", true), Some(root.join("index.html")));
        assert_eq!(resolve(root, "/css/main.css", true), Some(root.join("css/main.css")));
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let dir = site();
        let root = dir.path().join("about");

        assert_eq!(resolve(&root, "/../index.html", true), None);
        assert_eq!(resolve(&root, "/%2e%2e/index.html", true), None);
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type(Path::new("a.html")), "text/html; charset=utf-8");
        assert_eq!(guess_content_type(Path::new("a.svg")), "image/svg+xml");
        assert_eq!(guess_content_type(Path::new("a.bin")), "application/octet-stream");
    }
}
