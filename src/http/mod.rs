//! HTTP/1.x implementation
//!
//! This module provides the HTTP/1.0 and HTTP/1.1 client and server engine.
//!
//! # Architecture
//!
//! All wire I/O goes through the `Transport` trait, so the same code drives
//! plain TCP and TLS connections:
//!
//! - `Transport` defines the byte-stream operations (poll, read, write, close)
//! - `Connection` wraps a transport with a read buffer and a timeout
//! - Messages never store the connection; every I/O call borrows it
//!
//! Requests and responses share their headers, body and delivery state
//! through `Message`, and the `HttpMessage` trait exposes the common API.
//!
//! # Examples
//!
//! ```no_run
//! use httpkit::http::{HttpClient, HttpMessage, Headers};
//!
//! let client = HttpClient::new();
//! let response = client.get("http://127.0.0.1:8080/", Headers::new());
//! if response.ok() {
//!     println!("{}", response.text());
//! } else {
//!     eprintln!("failed: {} {}", response.code(), response.socket_error());
//! }
//! ```
//!
//! ```no_run
//! use httpkit::http::{HttpServer, ServerConfig};
//! use std::sync::Arc;
//!
//! let config = ServerConfig::builder().web_root("./public").cors(true).build();
//! let server = Arc::new(HttpServer::new(config));
//! let listener = HttpServer::bind("127.0.0.1:8080").unwrap();
//! server.run(listener).unwrap();
//! ```

pub mod chunked;
pub mod client;
pub mod files;
pub mod headers;
pub mod message;
pub mod multipart;
pub mod parser;
pub mod server;
pub mod tls;
pub mod transport;
pub mod url;

pub use client::{ClientConfig, HttpClient};
pub use files::{MimeTypes, StaticFiles};
pub use headers::Headers;
pub use message::{
    Body, BodyMode, BodySink, DeliveryStatus, FileSink, HttpMessage, HttpRequest,
    HttpRequestBuilder, HttpResponse, Message, Method, ProgressFn, Status, StatusClass,
    Version,
};
pub use server::{Handler, HttpServer, ServerConfig, ServerConfigBuilder, WebSocketHandler};
pub use tls::TlsTransport;
pub use transport::{Connection, PollEvents, TcpTransport, Transport};
pub use url::{decode_url, encode_url, parse_url, Url};

/// Result type for HTTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP operation errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Ssl(#[from] openssl::error::ErrorStack),

    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid HTTP version: {0}")]
    InvalidVersion(String),

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Invalid HTTP status: {0}")]
    InvalidStatus(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Cannot resolve host: {0}")]
    Resolve(String),

    #[error("Too many redirects ({0})")]
    TooManyRedirects(u32),

    #[error("Unexpected status: {0}")]
    UnexpectedStatus(u16),

    #[error("Timeout")]
    Timeout,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Maximum number of headers per message
pub const MAX_HEADERS: usize = 100;

/// Maximum length of a start line or header line
pub const MAX_LINE_LENGTH: usize = 16 * 1024;

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Default HTTPS port
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// Default number of redirects the client follows before giving up
pub const MAX_REDIRECTS: u32 = 5;

/// Size of the buffers used when streaming bodies
pub const IO_CHUNK_SIZE: usize = 16 * 1024;

/// CRLF line ending
pub const CRLF: &str = "\r\n";
