//! HTTP server implementation
//!
//! `HttpServer::serve` owns one accepted connection and answers requests on
//! it until the connection should close:
//!
//! ```text
//! AwaitRequest -> ReadRequest -> Dispatch -> AwaitRequest
//!                                         -> Close
//!                                         -> HandedOff (WebSocket)
//! ```
//!
//! Dispatch applies CORS, answers `OPTIONS` preflights, runs the handler and
//! streams file responses. `HttpServer::run` accepts connections and serves
//! each one on its own thread.

use super::files::{parse_range, ByteRange, MimeTypes, StaticFiles};
use super::message::{HttpMessage, HttpRequest, HttpResponse, Method, Status, Version};
use super::transport::{Connection, TcpTransport};
use super::{Error, Headers, Result};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

/// Methods advertised in `Allow` unless more are added
pub const DEFAULT_METHODS: [&str; 7] = ["GET", "POST", "OPTIONS", "PUT", "DELETE", "PATCH", "HEAD"];

/// Default idle time before a kept-alive connection is closed
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Fills the response for a request
///
/// A handler may stream its answer on `conn` itself (after
/// `send_headers`); whatever it leaves unsent is completed by the server.
/// An error closes the connection.
pub trait Handler: Send + Sync {
    fn handle(&self, request: &mut HttpRequest, response: &mut HttpResponse, conn: &mut Connection) -> Result<()>;
}

impl<F> Handler for F
where
    F: Fn(&mut HttpRequest, &mut HttpResponse, &mut Connection) -> Result<()> + Send + Sync,
{
    fn handle(&self, request: &mut HttpRequest, response: &mut HttpResponse, conn: &mut Connection) -> Result<()> {
        self(request, response, conn)
    }
}

/// Takes over a connection after an `Upgrade: websocket` request
pub trait WebSocketHandler: Send + Sync {
    fn process(&self, conn: Connection, headers: &Headers);
}

impl<F> WebSocketHandler for F
where
    F: Fn(Connection, &Headers) + Send + Sync,
{
    fn process(&self, conn: Connection, headers: &Headers) {
        self(conn, headers)
    }
}

/// Server settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    protocol_version: Version,
    cors: bool,
    web_root: Option<PathBuf>,
    keep_alive_timeout: Option<Duration>,
    methods: Vec<String>,
    verbose: bool,
}

impl ServerConfig {
    /// Start building a configuration
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder {
            config: ServerConfig::default(),
        }
    }

    pub fn protocol_version(&self) -> Version {
        self.protocol_version
    }

    pub fn cors(&self) -> bool {
        self.cors
    }

    pub fn web_root(&self) -> Option<&Path> {
        self.web_root.as_deref()
    }

    pub fn keep_alive_timeout(&self) -> Option<Duration> {
        self.keep_alive_timeout
    }

    /// Methods announced in `Allow` and CORS preflight answers
    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            protocol_version: Version::Http11,
            cors: false,
            web_root: None,
            keep_alive_timeout: Some(DEFAULT_KEEP_ALIVE),
            methods: DEFAULT_METHODS.iter().map(|m| m.to_string()).collect(),
            verbose: false,
        }
    }
}

/// Builder for `ServerConfig`
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Protocol spoken by the server; `HTTP/1.0` disables keep-alive
    pub fn protocol_version(mut self, version: Version) -> Self {
        self.config.protocol_version = version;
        self
    }

    /// Answer cross-origin requests with `Access-Control-Allow-Origin: *`
    pub fn cors(mut self, enable: bool) -> Self {
        self.config.cors = enable;
        self
    }

    /// Serve static files below `root` when no other handler is installed
    pub fn web_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.web_root = Some(root.into());
        self
    }

    /// Idle time allowed between requests; `None` waits forever
    pub fn keep_alive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.keep_alive_timeout = timeout;
        self
    }

    /// Replace the registered methods; duplicates are dropped
    pub fn methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.methods = dedupe(methods);
        self
    }

    /// Log every request at info level
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}

fn dedupe<I, S>(methods: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut unique: Vec<String> = Vec::new();
    for method in methods {
        let method = method.into();
        if !unique.contains(&method) {
            unique.push(method);
        }
    }
    unique
}

/// HTTP server
///
/// Configure with `&mut self` methods, then share through `Arc` while
/// serving.
pub struct HttpServer {
    config: ServerConfig,
    methods: Vec<String>,
    mime_types: MimeTypes,
    handler: Option<Box<dyn Handler>>,
    websocket: Option<Box<dyn WebSocketHandler>>,
    stop: AtomicBool,
}

impl HttpServer {
    /// Create a server; a configured web root installs static file serving
    pub fn new(config: ServerConfig) -> Self {
        let handler = config
            .web_root
            .as_ref()
            .map(|root| Box::new(StaticFiles::new(root.clone())) as Box<dyn Handler>);
        let methods = config.methods.clone();

        HttpServer {
            config,
            methods,
            mime_types: MimeTypes::new(),
            handler,
            websocket: None,
            stop: AtomicBool::new(false),
        }
    }

    /// Replace the request handler
    pub fn with_handler(mut self, handler: impl Handler + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Replace the request handler with a closure
    pub fn with_fn<F>(self, handler: F) -> Self
    where
        F: Fn(&mut HttpRequest, &mut HttpResponse, &mut Connection) -> Result<()> + Send + Sync + 'static,
    {
        self.with_handler(handler)
    }

    /// Hand `Upgrade: websocket` requests to `handler`
    pub fn with_websocket(mut self, handler: impl WebSocketHandler + 'static) -> Self {
        self.websocket = Some(Box::new(handler));
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Register an extra method for `Allow` and CORS discovery
    pub fn add_method(&mut self, method: &str) {
        if !self.methods.iter().any(|m| m == method) {
            self.methods.push(method.to_string());
        }
    }

    /// Replace the registered methods; duplicates are dropped
    pub fn set_methods<I, S>(&mut self, methods: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods = dedupe(methods);
    }

    /// Comma-separated list of registered methods
    pub fn allowed_methods(&self) -> String {
        self.methods.join(", ")
    }

    /// Map a file extension to a MIME type for file responses
    pub fn add_mime_type(&mut self, extension: &str, mime_type: &str) {
        self.mime_types.insert(extension, mime_type);
    }

    pub fn mime_types(&self) -> &MimeTypes {
        &self.mime_types
    }

    /// Ask `run` to return after the connection it is accepting
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Create a listening socket with `SO_REUSEADDR`
    pub fn bind(addr: impl ToSocketAddrs) -> Result<TcpListener> {
        let addr: SocketAddr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::Resolve("no address to bind".to_string()))?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&SockAddr::from(addr))?;
        socket.listen(128)?;
        Ok(socket.into())
    }

    /// Accept connections until `stop` is called, one thread per connection
    pub fn run(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        listener.set_nonblocking(true)?;
        tracing::info!(addr = ?listener.local_addr().ok(), "listening");

        while !self.is_stopped() {
            match listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nonblocking(false) {
                        tracing::warn!(%peer, error = %e, "cannot configure connection");
                        continue;
                    }

                    let server = Arc::clone(&self);
                    let spawned = thread::Builder::new()
                        .name(format!("http-{}", peer))
                        .spawn(move || server.serve(Connection::new(TcpTransport::new(stream))));
                    if let Err(e) = spawned {
                        tracing::warn!(%peer, error = %e, "cannot spawn connection thread");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(20));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    thread::sleep(Duration::from_millis(10));
                }
            }
        }

        tracing::info!("server stopped");
        Ok(())
    }

    /// Serve requests on one connection until it should close
    ///
    /// The connection is closed on return unless a WebSocket handler took
    /// it over.
    pub fn serve(&self, mut conn: Connection) {
        conn.set_timeout(self.config.keep_alive_timeout);
        let peer = conn.peer_addr();

        loop {
            match conn.wait_for_input() {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(?peer, "idle timeout");
                    break;
                }
                Err(e) => {
                    tracing::debug!(?peer, error = %e, "wait failed");
                    break;
                }
            }
            if conn.is_disconnected() {
                tracing::trace!(?peer, "peer closed");
                break;
            }

            let mut request = match HttpRequest::read(&mut conn) {
                Ok(request) => request,
                Err(e) => {
                    tracing::debug!(?peer, error = %e, "cannot read request");
                    break;
                }
            };

            if let Some(websocket) = &self.websocket {
                if request.header("Upgrade").eq_ignore_ascii_case("websocket") {
                    tracing::debug!(?peer, target = request.resource(), "handing over to websocket");
                    websocket.process(conn, request.headers());
                    return;
                }
            }

            match self.dispatch(&mut request, &mut conn) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    tracing::debug!(?peer, error = %e, "cannot send response");
                    break;
                }
            }
        }

        let _ = conn.close();
    }

    /// Answer one request; returns whether the connection stays open
    fn dispatch(&self, request: &mut HttpRequest, conn: &mut Connection) -> Result<bool> {
        let mut response = HttpResponse::for_request(request);
        if self.config.cors && request.has_header("Origin") {
            response.set_header("Access-Control-Allow-Origin", "*");
        }

        if *request.method() == Method::Options {
            self.handle_options(request, &mut response);
            response.send(conn)?;
        } else {
            if let Some(handler) = &self.handler {
                if let Err(e) = handler.handle(request, &mut response, conn) {
                    tracing::warn!(target = request.resource(), error = %e, "handler failed");
                    if response.headers_sent() {
                        return Err(e);
                    }
                    response = HttpResponse::for_request(request);
                    response.set_status(Status::INTERNAL_SERVER_ERROR);
                    response.set_header("Connection", "close");
                }
            }

            if response.code() == Status::METHOD_NOT_ALLOWED.code() {
                response.set_header("Allow", self.allowed_methods());
            }

            if response.contains_file() && !response.headers_sent() {
                self.send_file(request, &mut response, conn)?;
            } else {
                response.finish(conn)?;
            }
        }

        self.log_request(request, &response);
        Ok(self.keep_alive(request, &response))
    }

    /// Fill the answer to an `OPTIONS` request
    fn handle_options(&self, request: &HttpRequest, response: &mut HttpResponse) {
        let methods = self.allowed_methods();
        if request.has_header("Origin") {
            response.set_header("Access-Control-Allow-Methods", methods.as_str());
        }
        if let Some(headers) = request.headers().get("Access-Control-Request-Headers") {
            response.set_header("Access-Control-Allow-Headers", headers);
        }
        response.set_header("Allow", methods);
        response.set_header("Content-Length", "0");
        response.set_status(Status::OK);
    }

    /// Send a response whose body references a file
    fn send_file(&self, request: &HttpRequest, response: &mut HttpResponse, conn: &mut Connection) -> Result<()> {
        let Some(path) = response.file_body().map(Path::to_path_buf) else {
            return response.finish(conn);
        };

        let size = match std::fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            _ => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                tracing::debug!(path = %path.display(), "file body missing");
                response.set_status(Status::NOT_FOUND);
                response.set_header("Content-Type", "text/html");
                response.put_text(&format!("<h1>Error</h1><p>File <b>{}</b> not found</p>", name));
                return response.send(conn);
            }
        };

        response.set_header("Date", httpdate::fmt_http_date(SystemTime::now()));
        if !response.has_header("Content-Type") {
            response.set_header("Content-Type", self.mime_types.for_path(&path));
        }
        if !response.has_header("Cache-Control") {
            response.set_header("Cache-Control", "max-age=60, public");
        }

        let mut range = (0, size);
        if response.code() == Status::OK.code() && *request.method() == Method::Get {
            response.set_header("Accept-Ranges", "bytes");
            if let Some(value) = request.headers().get("Range") {
                match parse_range(value, size) {
                    ByteRange::Full => {}
                    ByteRange::Partial(begin, end) => {
                        response.set_status(Status::PARTIAL_CONTENT);
                        response.set_header("Content-Range", format!("bytes {}-{}/{}", begin, end - 1, size));
                        range = (begin, end);
                    }
                    ByteRange::Unsatisfiable => {
                        response.set_status(Status::RANGE_NOT_SATISFIABLE);
                        response.set_header("Content-Range", format!("bytes */{}", size));
                        response.put_bytes(Vec::new());
                        return response.send(conn);
                    }
                }
            }
        }

        if range.1 == 0 {
            // Empty file
            response.put_bytes(Vec::new());
            return response.send(conn);
        }
        response.put_file(conn, &path, range.0, range.1)
    }

    fn keep_alive(&self, request: &HttpRequest, response: &HttpResponse) -> bool {
        if self.config.protocol_version == Version::Http10 || request.version() == Version::Http10 {
            return false;
        }
        !request.header("Connection").eq_ignore_ascii_case("close")
            && !response.header("Connection").eq_ignore_ascii_case("close")
    }

    fn log_request(&self, request: &HttpRequest, response: &HttpResponse) {
        let peer = request.sender();
        if self.config.verbose {
            tracing::info!(
                ?peer,
                method = %request.method(),
                target = request.resource(),
                status = response.code(),
                sent = response.delivery_status().bytes_sent,
                "request served"
            );
        } else {
            tracing::debug!(
                ?peer,
                method = %request.method(),
                target = request.resource(),
                status = response.code(),
                "request served"
            );
        }
    }
}
