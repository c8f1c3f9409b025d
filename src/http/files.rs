//! Static file serving
//!
//! `StaticFiles` maps request paths onto a web root and answers with a file
//! reference. The file itself is streamed later by the server when the
//! response is sent, which is also where MIME types and byte ranges apply.

use super::message::{HttpMessage, HttpRequest, HttpResponse, Method, Status};
use super::server::Handler;
use super::{Connection, Result};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Extension to MIME type table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeTypes {
    types: HashMap<String, String>,
}

/// Type used when the extension is unknown
pub const DEFAULT_MIME_TYPE: &str = "text/plain";

impl MimeTypes {
    /// Create a table with the built-in types
    pub fn new() -> Self {
        let types = [
            ("css", "text/css"),
            ("gif", "image/gif"),
            ("htm", "text/html"),
            ("html", "text/html"),
            ("jpeg", "image/jpeg"),
            ("jpg", "image/jpeg"),
            ("js", "application/javascript"),
            ("json", "application/json"),
            ("png", "image/png"),
            ("txt", "text/plain"),
            ("xml", "text/xml"),
        ]
        .into_iter()
        .map(|(ext, ty)| (ext.to_string(), ty.to_string()))
        .collect();

        MimeTypes { types }
    }

    /// Add or replace the type of an extension
    pub fn insert(&mut self, extension: &str, mime_type: impl Into<String>) {
        self.types.insert(
            extension.trim_start_matches('.').to_ascii_lowercase(),
            mime_type.into(),
        );
    }

    /// Type registered for an extension
    pub fn get(&self, extension: &str) -> Option<&str> {
        self.types
            .get(&extension.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Type of a file, by extension, or the default type
    pub fn for_path(&self, path: &Path) -> &str {
        path.extension()
            .and_then(|ext| self.get(&ext.to_string_lossy()))
            .unwrap_or(DEFAULT_MIME_TYPE)
    }
}

impl Default for MimeTypes {
    fn default() -> Self {
        Self::new()
    }
}

/// True when a file modified at `modified` is unchanged since `if_modified_since`
///
/// HTTP dates have one-second resolution, so the comparison is made on whole
/// seconds. An unparsable date never matches.
pub fn not_modified_since(modified: SystemTime, if_modified_since: &str) -> bool {
    match httpdate::parse_http_date(if_modified_since.trim()) {
        Ok(since) => modified < since + Duration::from_secs(1),
        Err(_) => false,
    }
}

/// Outcome of evaluating a `Range` header against a file size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// No usable range: send the whole file
    Full,
    /// Send `[begin, end)`
    Partial(u64, u64),
    /// The range lies outside the file
    Unsatisfiable,
}

/// Evaluate a single `bytes=` range
///
/// Multiple ranges and other units are ignored and yield `Full`.
pub fn parse_range(value: &str, size: u64) -> ByteRange {
    let Some(ranges) = value.trim().strip_prefix("bytes=") else {
        return ByteRange::Full;
    };
    if ranges.contains(',') {
        return ByteRange::Full;
    }
    let Some((first, last)) = ranges.trim().split_once('-') else {
        return ByteRange::Full;
    };

    let (first, last) = (first.trim(), last.trim());
    match (first.parse::<u64>(), last.parse::<u64>()) {
        (Ok(begin), Ok(end)) if begin <= end => {
            if begin >= size {
                ByteRange::Unsatisfiable
            } else {
                ByteRange::Partial(begin, end.min(size - 1) + 1)
            }
        }
        (Ok(begin), Err(_)) if last.is_empty() => {
            if begin >= size {
                ByteRange::Unsatisfiable
            } else {
                ByteRange::Partial(begin, size)
            }
        }
        (Err(_), Ok(suffix)) if first.is_empty() => {
            if suffix == 0 || size == 0 {
                ByteRange::Unsatisfiable
            } else {
                ByteRange::Partial(size - suffix.min(size), size)
            }
        }
        _ => ByteRange::Full,
    }
}

/// Serves files below a web root
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    /// Serve files below `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        StaticFiles { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fill `response` for `request`
    pub fn serve(&self, request: &HttpRequest, response: &mut HttpResponse) {
        if *request.method() != Method::Get {
            response.set_status(Status::NOT_IMPLEMENTED);
            response.set_header("Content-Type", "text/html");
            response.put_text("<h1>Not implemented</h1>");
            return;
        }

        let mut path = request.path().to_string();
        if path.ends_with('/') {
            path.push_str("index.html");
        }

        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            response.set_status(Status::FORBIDDEN);
            response.set_header("Content-Type", "text/html");
            response.put_text("<h1>Forbidden</h1>");
            return;
        }

        let local = self.root.join(relative);
        let metadata = match std::fs::metadata(&local) {
            Ok(metadata) => metadata,
            Err(_) => {
                tracing::debug!(path = %local.display(), "file not found");
                response.set_status(Status::NOT_FOUND);
                response.set_header("Content-Type", "text/html");
                response.put_text("<h1>Not found</h1>");
                return;
            }
        };

        if metadata.is_dir() {
            let raw_path = request.resource().split('?').next().unwrap_or("/");
            let location = match request.headers().get("Host") {
                Some(host) => format!("http://{}{}/", host, raw_path),
                None => format!("{}/", raw_path),
            };
            response.set_status(Status::MOVED_PERMANENTLY);
            response.set_header("Location", location);
            return;
        }

        let modified = metadata.modified().ok();
        if let (Some(modified), Some(since)) = (modified, request.headers().get("If-Modified-Since")) {
            if not_modified_since(modified, since) {
                response.set_status(Status::NOT_MODIFIED);
                return;
            }
        }

        if let Some(modified) = modified {
            response.set_header("Last-Modified", httpdate::fmt_http_date(modified));
        }
        response.put_file_ref(local);
    }
}

impl Handler for StaticFiles {
    fn handle(&self, request: &mut HttpRequest, response: &mut HttpResponse, _conn: &mut Connection) -> Result<()> {
        self.serve(request, response);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn get(path: &str) -> HttpRequest {
        HttpRequest::new(Method::Get, path)
    }

    fn web_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs").join("index.html"), "docs").unwrap();
        fs::write(dir.path().join("hello world.txt"), "hi").unwrap();
        dir
    }

    #[test]
    fn test_mime_types() {
        let mut types = MimeTypes::new();
        assert_eq!(types.for_path(Path::new("a/b.HTML")), "text/html");
        assert_eq!(types.for_path(Path::new("x.js")), "application/javascript");
        assert_eq!(types.for_path(Path::new("noext")), DEFAULT_MIME_TYPE);
        assert_eq!(types.for_path(Path::new("a.svg")), DEFAULT_MIME_TYPE);

        types.insert(".svg", "image/svg+xml");
        assert_eq!(types.for_path(Path::new("a.svg")), "image/svg+xml");
    }

    #[test]
    fn test_not_modified_since() {
        let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let same = httpdate::fmt_http_date(modified);
        let earlier = httpdate::fmt_http_date(modified - Duration::from_secs(1));
        let later = httpdate::fmt_http_date(modified + Duration::from_secs(60));

        assert!(not_modified_since(modified, &same));
        assert!(not_modified_since(modified + Duration::from_millis(400), &same));
        assert!(not_modified_since(modified, &later));
        assert!(!not_modified_since(modified, &earlier));
        assert!(!not_modified_since(modified, "yesterday"));
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("bytes=0-4", 10), ByteRange::Partial(0, 5));
        assert_eq!(parse_range("bytes=5-", 10), ByteRange::Partial(5, 10));
        assert_eq!(parse_range("bytes=-3", 10), ByteRange::Partial(7, 10));
        assert_eq!(parse_range("bytes=8-100", 10), ByteRange::Partial(8, 10));
        assert_eq!(parse_range("bytes=10-", 10), ByteRange::Unsatisfiable);
        assert_eq!(parse_range("bytes=0-1,4-5", 10), ByteRange::Full);
        assert_eq!(parse_range("items=0-1", 10), ByteRange::Full);
        assert_eq!(parse_range("bytes=5-2", 10), ByteRange::Full);
    }

    #[test]
    fn test_parse_range_end_at_u64_max() {
        assert_eq!(
            parse_range("bytes=0-18446744073709551615", 10),
            ByteRange::Partial(0, 10)
        );
        assert_eq!(
            parse_range("bytes=9-18446744073709551615", 10),
            ByteRange::Partial(9, 10)
        );
        assert_eq!(
            parse_range("bytes=0-18446744073709551615", 0),
            ByteRange::Unsatisfiable
        );
    }

    #[test]
    fn test_index_and_file() {
        let root = web_root();
        let files = StaticFiles::new(root.path());

        let mut response = HttpResponse::new();
        files.serve(&get("/"), &mut response);
        assert_eq!(response.code(), 200);
        assert_eq!(response.file_body(), Some(root.path().join("index.html").as_path()));
        assert!(response.has_header("Last-Modified"));

        let mut response = HttpResponse::new();
        files.serve(&get("/hello%20world.txt"), &mut response);
        assert_eq!(response.code(), 200);
        assert!(response.contains_file());
    }

    #[test]
    fn test_directory_redirect() {
        let root = web_root();
        let files = StaticFiles::new(root.path());

        let mut request = get("/docs");
        request.set_header("Host", "example.com:8080");
        let mut response = HttpResponse::new();
        files.serve(&request, &mut response);

        assert_eq!(response.code(), 301);
        assert_eq!(response.header("Location"), "http://example.com:8080/docs/");
    }

    #[test]
    fn test_missing_and_forbidden() {
        let root = web_root();
        let files = StaticFiles::new(root.path());

        let mut response = HttpResponse::new();
        files.serve(&get("/nope.html"), &mut response);
        assert_eq!(response.code(), 404);
        assert_eq!(response.text(), "<h1>Not found</h1>");

        let mut response = HttpResponse::new();
        files.serve(&get("/docs/../../etc/passwd"), &mut response);
        assert_eq!(response.code(), 403);
    }

    #[test]
    fn test_only_get() {
        let root = web_root();
        let files = StaticFiles::new(root.path());

        let mut response = HttpResponse::new();
        files.serve(&HttpRequest::new(Method::Post, "/"), &mut response);
        assert_eq!(response.code(), 501);
        assert_eq!(response.header("Content-Type"), "text/html");
    }

    #[test]
    fn test_conditional_get() {
        let root = web_root();
        let files = StaticFiles::new(root.path());
        let modified = fs::metadata(root.path().join("index.html"))
            .unwrap()
            .modified()
            .unwrap();

        let mut request = get("/index.html");
        request.set_header("If-Modified-Since", httpdate::fmt_http_date(modified));
        let mut response = HttpResponse::new();
        files.serve(&request, &mut response);
        assert_eq!(response.code(), 304);
        assert!(!response.contains_file());

        let mut request = get("/index.html");
        request.set_header(
            "If-Modified-Since",
            httpdate::fmt_http_date(modified - Duration::from_secs(1)),
        );
        let mut response = HttpResponse::new();
        files.serve(&request, &mut response);
        assert_eq!(response.code(), 200);
        assert!(response.contains_file());
    }
}
