//! HTTP client implementation
//!
//! Every verb funnels into `HttpClient::request`, which opens one connection
//! per exchange, sends the request, reads the response and follows redirects.
//! Failures never escape as errors from `request`: a response with code 0 and
//! a socket error describes what went wrong.

use super::message::{
    Body, FileSink, HttpMessage, HttpRequest, HttpResponse, Method, ProgressFn, StatusClass,
};
use super::multipart::MultipartFile;
use super::tls::TlsTransport;
use super::transport::{Connection, TcpTransport};
use super::url::{parse_url, Url};
use super::{Error, Headers, Result, MAX_REDIRECTS};
use std::path::Path;
use std::time::Duration;

/// Default connect and I/O timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    max_redirects: u32,
    timeout: Option<Duration>,
    user_agent: String,
    verbose: bool,
}

impl ClientConfig {
    /// Default settings: 5 redirects, 30 second timeout
    pub fn new() -> Self {
        ClientConfig {
            max_redirects: MAX_REDIRECTS,
            timeout: Some(DEFAULT_TIMEOUT),
            user_agent: concat!("httpkit/", env!("CARGO_PKG_VERSION")).to_string(),
            verbose: false,
        }
    }

    /// Set how many redirects one request may follow
    pub fn with_max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = max;
        self
    }

    /// Set the connect and I/O timeout; `None` waits forever
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the `User-Agent` added to requests that lack one
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Log every exchange at info level
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn max_redirects(&self) -> u32 {
        self.max_redirects
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// What to do after a response head arrived
#[derive(Debug, PartialEq, Eq)]
enum Next {
    Done,
    Follow(String),
    TooManyRedirects,
}

/// HTTP client
///
/// Stateless apart from its configuration; one client can serve many
/// requests, from several threads.
#[derive(Debug, Clone, Default)]
pub struct HttpClient {
    config: ClientConfig,
}

impl HttpClient {
    /// Create a client with default settings
    pub fn new() -> Self {
        Self::with_config(ClientConfig::new())
    }

    /// Create a client with the given settings
    pub fn with_config(config: ClientConfig) -> Self {
        HttpClient { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Perform a request, following redirects
    ///
    /// Transport and protocol failures yield a response with code 0 whose
    /// `socket_error()` describes the failure.
    pub fn request(&self, request: &mut HttpRequest) -> HttpResponse {
        match self.try_request(request) {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(url = request.url(), error = %e, "request failed");
                HttpResponse::failed(e.to_string())
            }
        }
    }

    /// Perform a request, returning transport and protocol failures as errors
    ///
    /// Exceeding the redirect limit is not an error: the last redirect
    /// response is returned with a socket error naming the limit.
    pub fn try_request(&self, request: &mut HttpRequest) -> Result<HttpResponse> {
        loop {
            let (mut response, mut conn) = self.start(request)?;
            let next = self.next_step(request, &response);

            let message = response.message_mut();
            message.set_progress(request.message_mut().take_progress());
            message.set_delivery_status(request.delivery_status());
            if !matches!(next, Next::Follow(_)) {
                message.set_sink(request.message_mut().take_sink());
            }

            let read = response.read_body(&mut conn, request.method());
            let _ = conn.close();
            request
                .message_mut()
                .set_progress(response.message_mut().take_progress());
            read?;

            self.log_exchange(request, &response);

            match next {
                Next::Done => return Ok(response),
                Next::TooManyRedirects => {
                    let error = Error::TooManyRedirects(request.redirect_count());
                    tracing::warn!(url = request.url(), "{}", error);
                    response.set_socket_error(error.to_string());
                    return Ok(response);
                }
                Next::Follow(location) => self.redirect(request, &response, location),
            }
        }
    }

    /// Connect, send the request and read the final response head
    fn start(&self, request: &mut HttpRequest) -> Result<(HttpResponse, Connection)> {
        let url = parse_url(request.url());
        if url.is_empty() {
            return Err(Error::InvalidUrl(request.url().to_string()));
        }

        let mut conn = self.connect(&url)?;
        self.prepare(request, &url);
        request.send(&mut conn)?;

        loop {
            let response = HttpResponse::read_head(&mut conn)?;
            // Interim responses carry no body; the real one follows
            if response.is(StatusClass::Informational) && response.code() != 101 {
                tracing::trace!(code = response.code(), "skipping interim response");
                continue;
            }
            return Ok((response, conn));
        }
    }

    fn connect(&self, url: &Url) -> Result<Connection> {
        let tcp = TcpTransport::connect(&url.host, url.effective_port(), self.config.timeout)?;
        let mut conn = if url.is_secure() {
            Connection::new(TlsTransport::connect(tcp, &url.host)?)
        } else {
            Connection::new(tcp)
        };
        conn.set_timeout(self.config.timeout);
        Ok(conn)
    }

    /// Add the headers every request needs and wrap form uploads
    fn prepare(&self, request: &mut HttpRequest, url: &Url) {
        if !request.has_header("Host") {
            request.set_header("Host", url.authority());
        }
        if !request.has_header("User-Agent") {
            request.set_header("User-Agent", self.config.user_agent.as_str());
        }
        if !request.has_header("Connection") {
            request.set_header("Connection", "close");
        }

        let is_form = request
            .header("Content-Type")
            .to_ascii_lowercase()
            .starts_with("multipart/form-data");
        if *request.method() == Method::Post && is_form {
            if let Body::File(path) = request.message().body() {
                let part = MultipartFile::new(path.clone(), "file");
                request.set_header("Content-Type", part.content_type());
                request.put(Body::Multipart(part));
            }
        }
    }

    fn next_step(&self, request: &HttpRequest, response: &HttpResponse) -> Next {
        if !request.follow_redirects()
            || !response.is(StatusClass::Redirection)
            || response.code() == 304
        {
            return Next::Done;
        }

        let location = response.header("Location");
        if location.is_empty() {
            return Next::Done;
        }
        if request.redirect_count() >= self.config.max_redirects {
            return Next::TooManyRedirects;
        }

        let target = parse_url(request.url()).join(location);
        if parse_url(&target).is_empty() {
            tracing::debug!(location, "ignoring unusable redirect");
            return Next::Done;
        }
        Next::Follow(target)
    }

    /// Point `request` at the redirect target
    fn redirect(&self, request: &mut HttpRequest, response: &HttpResponse, location: String) {
        tracing::debug!(from = request.url(), to = %location, code = response.code(), "following redirect");

        request.set_redirect_count(request.redirect_count() + 1);
        if response.code() == 303 && *request.method() != Method::Head {
            request.set_method(Method::Get);
            request.put(Body::Empty);
            let headers = request.headers_mut();
            headers.remove("Content-Length");
            headers.remove("Content-Type");
            headers.remove("Transfer-Encoding");
        }
        if let Body::Multipart(part) = request.message().body() {
            // A fresh boundary is generated when the request goes out again
            let path = part.path().to_path_buf();
            request.put(Body::File(path));
            request.set_header("Content-Type", "multipart/form-data");
        }

        // The target may live on another host
        request.headers_mut().remove("Host");
        request.set_url(location);
    }

    fn log_exchange(&self, request: &HttpRequest, response: &HttpResponse) {
        let status = request.delivery_status();
        if self.config.verbose {
            tracing::info!(
                method = %request.method(),
                url = request.url(),
                code = response.code(),
                sent = status.bytes_sent,
                received = response.delivery_status().bytes_received,
                "exchange complete"
            );
        } else {
            tracing::debug!(
                method = %request.method(),
                url = request.url(),
                code = response.code(),
                "exchange complete"
            );
        }
    }

    fn call(&self, method: Method, url: &str, body: Body, headers: Headers) -> HttpResponse {
        let mut request = HttpRequest::builder()
            .method(method)
            .url(url)
            .headers(headers)
            .body(body)
            .build();
        self.request(&mut request)
    }

    /// GET `url`
    pub fn get(&self, url: &str, headers: Headers) -> HttpResponse {
        self.call(Method::Get, url, Body::Empty, headers)
    }

    /// DELETE `url`
    pub fn delete(&self, url: &str, headers: Headers) -> HttpResponse {
        self.call(Method::Delete, url, Body::Empty, headers)
    }

    /// PUT a body to `url`
    pub fn put(&self, url: &str, body: impl Into<Body>, headers: Headers) -> HttpResponse {
        self.call(Method::Put, url, body.into(), headers)
    }

    /// POST a body to `url`
    ///
    /// A file body with `Content-Type: multipart/form-data` is sent as a form
    /// file item.
    pub fn post(&self, url: &str, body: impl Into<Body>, headers: Headers) -> HttpResponse {
        self.call(Method::Post, url, body.into(), headers)
    }

    /// PATCH `url` with a body
    pub fn patch(&self, url: &str, body: impl Into<Body>, headers: Headers) -> HttpResponse {
        self.call(Method::Patch, url, body.into(), headers)
    }

    /// POST a JSON document
    pub fn post_json(&self, url: &str, value: &serde_json::Value, headers: Headers) -> HttpResponse {
        let mut request = HttpRequest::builder()
            .method(Method::Post)
            .url(url)
            .headers(headers)
            .json(value)
            .build();
        self.request(&mut request)
    }

    /// Stream the body of `url` into the file at `path`
    ///
    /// The file is removed again when the transfer fails or the final status
    /// is not 2xx.
    pub fn download(
        &self,
        url: &str,
        path: impl AsRef<Path>,
        headers: Headers,
        progress: Option<ProgressFn>,
    ) -> Result<()> {
        let path = path.as_ref();
        let mut request = HttpRequest::builder()
            .method(Method::Get)
            .url(url)
            .headers(headers)
            .build();
        request.message_mut().set_sink(Some(Box::new(FileSink::create(path)?)));
        request.message_mut().set_progress(progress);

        let result = self.try_request(&mut request).and_then(|response| {
            if response.ok() {
                Ok(())
            } else {
                Err(Error::UnexpectedStatus(response.code()))
            }
        });

        if let Err(e) = &result {
            tracing::debug!(url, path = %path.display(), error = %e, "download failed");
            let _ = std::fs::remove_file(path);
        }
        result
    }

    /// PUT the file at `path` to `url`, streamed from disk
    pub fn upload(
        &self,
        url: &str,
        path: impl AsRef<Path>,
        headers: Headers,
        progress: Option<ProgressFn>,
    ) -> Result<()> {
        let mut request = HttpRequest::builder()
            .method(Method::Put)
            .url(url)
            .headers(headers)
            .body(path.as_ref())
            .build();
        request.message_mut().set_progress(progress);

        let response = self.try_request(&mut request)?;
        if response.ok() {
            Ok(())
        } else {
            Err(Error::UnexpectedStatus(response.code()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::transport::mock;

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.max_redirects(), 5);
        assert_eq!(config.timeout(), Some(DEFAULT_TIMEOUT));
        assert!(config.user_agent().starts_with("httpkit/"));

        let config = config.with_max_redirects(2).with_timeout(None).with_user_agent("agent/2.0");
        assert_eq!(config.max_redirects(), 2);
        assert_eq!(config.timeout(), None);
        assert_eq!(config.user_agent(), "agent/2.0");
    }

    #[test]
    fn test_prepare_adds_headers() {
        let client = HttpClient::new();
        let mut request = HttpRequest::new(Method::Get, "http://[::1]:8080/a?b=1");
        request.set_header("Connection", "keep-alive");
        let url = parse_url(request.url());
        client.prepare(&mut request, &url);

        let (mut conn, output) = mock::connection(b"");
        request.send(&mut conn).unwrap();
        let wire = String::from_utf8(output.lock().unwrap().clone()).unwrap();

        assert!(wire.starts_with("GET /a?b=1 HTTP/1.1\r\n"));
        assert!(wire.contains("Host: [::1]:8080\r\n"));
        assert!(wire.contains("Connection: keep-alive\r\n"));
        assert!(wire.contains("User-Agent: httpkit/"));
    }

    #[test]
    fn test_prepare_wraps_form_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        std::fs::write(&path, b"PNG").unwrap();

        let client = HttpClient::new();
        let mut request = HttpRequest::builder()
            .method(Method::Post)
            .url("http://localhost/upload")
            .header("Content-Type", "multipart/form-data")
            .body(path.as_path())
            .build();
        let url = parse_url(request.url());
        client.prepare(&mut request, &url);

        assert!(request
            .header("Content-Type")
            .starts_with("multipart/form-data; boundary="));
        assert!(matches!(request.message().body(), Body::Multipart(_)));
        assert_eq!(request.file_body(), Some(path.as_path()));
    }

    #[test]
    fn test_next_step() {
        let client = HttpClient::with_config(ClientConfig::new().with_max_redirects(1));
        let mut request = HttpRequest::new(Method::Get, "http://example.com/dir/page");

        let mut response = HttpResponse::new();
        assert_eq!(client.next_step(&request, &response), Next::Done);

        response.set_code(302);
        assert_eq!(client.next_step(&request, &response), Next::Done);

        response.set_header("Location", "other");
        assert_eq!(
            client.next_step(&request, &response),
            Next::Follow("http://example.com/dir/other".to_string())
        );

        request.set_redirect_count(1);
        assert_eq!(client.next_step(&request, &response), Next::TooManyRedirects);

        request.set_follow_redirects(false);
        assert_eq!(client.next_step(&request, &response), Next::Done);
    }

    #[test]
    fn test_see_other_becomes_get() {
        let client = HttpClient::new();
        let mut request = HttpRequest::builder()
            .method(Method::Post)
            .url("http://example.com/form")
            .header("Content-Type", "text/plain")
            .header("Host", "example.com")
            .body("payload")
            .build();

        let mut response = HttpResponse::new();
        response.set_code(303);
        client.redirect(&mut request, &response, "http://other.example/done".to_string());

        assert_eq!(*request.method(), Method::Get);
        assert!(request.body().is_empty());
        assert!(!request.has_header("Content-Type"));
        assert!(!request.has_header("Host"));
        assert_eq!(request.redirect_count(), 1);
        assert_eq!(request.resource(), "/done");
    }

    #[test]
    fn test_invalid_url() {
        let client = HttpClient::new();
        let response = client.get("not a url", Headers::new());
        assert_eq!(response.code(), 0);
        assert!(response.socket_error().contains("Invalid URL"));
    }

    #[test]
    fn test_connection_refused() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let client = HttpClient::new();
        let response = client.get(&format!("http://127.0.0.1:{}/", port), Headers::new());
        assert_eq!(response.code(), 0);
        assert!(!response.ok());
        assert!(!response.socket_error().is_empty());
    }
}
