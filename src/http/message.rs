//! HTTP message types
//!
//! This module defines the core types for HTTP requests and responses.
//!
//! Requests and responses share their headers, body and delivery state through
//! a composed `Message`. The `HttpMessage` trait gives both the same body and
//! I/O API; each type only supplies its start line and framing rules.
//!
//! Messages never own a transport. Every I/O method borrows the `Connection`
//! for the duration of the call.

use super::chunked::{ChunkedDecoder, ChunkedEncoder};
use super::multipart::MultipartFile;
use super::parser::{parse_request_line, parse_status_line, read_head};
use super::url::{decode_query_component, decode_url, parse_url};
use super::{Connection, Error, Headers, Result, CRLF, IO_CHUNK_SIZE};
use std::cell::OnceCell;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// HTTP methods
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
    /// Any other method token, e.g. `PROPFIND`
    Extension(String),
}

impl Method {
    /// Convert method to string
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
            Method::Extension(name) => name,
        }
    }

    /// Methods whose requests normally carry a body
    fn expects_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "CONNECT" => Method::Connect,
            "OPTIONS" => Method::Options,
            "TRACE" => Method::Trace,
            "PATCH" => Method::Patch,
            _ => {
                if s.is_empty() || !s.bytes().all(is_token_byte) {
                    return Err(Error::InvalidMethod(s.to_string()));
                }
                Method::Extension(s.to_string())
            }
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// HTTP version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Version {
    Http10,
    #[default]
    Http11,
}

impl Version {
    /// Convert version to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "HTTP/1.0" => Ok(Version::Http10),
            "HTTP/1.1" => Ok(Version::Http11),
            _ => Err(Error::InvalidVersion(s.to_string())),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status code classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 1xx
    Informational,
    /// 2xx
    Success,
    /// 3xx
    Redirection,
    /// 4xx
    ClientError,
    /// 5xx
    ServerError,
}

impl StatusClass {
    /// Class of a status code, if it has one
    pub fn of(code: u16) -> Option<Self> {
        match code / 100 {
            1 => Some(StatusClass::Informational),
            2 => Some(StatusClass::Success),
            3 => Some(StatusClass::Redirection),
            4 => Some(StatusClass::ClientError),
            5 => Some(StatusClass::ServerError),
            _ => None,
        }
    }
}

/// HTTP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status {
    code: u16,
}

impl Status {
    /// Create a new status code
    pub fn new(code: u16) -> Result<Self> {
        if (100..600).contains(&code) {
            Ok(Status { code })
        } else {
            Err(Error::InvalidStatus(format!("Invalid status code: {}", code)))
        }
    }

    /// Get the status code
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Get the status class
    pub fn class(&self) -> StatusClass {
        StatusClass::of(self.code).unwrap_or(StatusClass::ServerError)
    }

    /// Get the canonical reason phrase for this status code
    pub fn reason_phrase(&self) -> &'static str {
        reason_phrase(self.code)
    }

    // Common status codes as constants
    pub const OK: Status = Status { code: 200 };
    pub const PARTIAL_CONTENT: Status = Status { code: 206 };
    pub const MOVED_PERMANENTLY: Status = Status { code: 301 };
    pub const NOT_MODIFIED: Status = Status { code: 304 };
    pub const FORBIDDEN: Status = Status { code: 403 };
    pub const NOT_FOUND: Status = Status { code: 404 };
    pub const METHOD_NOT_ALLOWED: Status = Status { code: 405 };
    pub const RANGE_NOT_SATISFIABLE: Status = Status { code: 416 };
    pub const INTERNAL_SERVER_ERROR: Status = Status { code: 500 };
    pub const NOT_IMPLEMENTED: Status = Status { code: 501 };
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason_phrase())
    }
}

/// Canonical reason phrase for a status code
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        305 => "Use Proxy",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        417 => "Expectation Failed",
        426 => "Upgrade Required",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "Unknown",
    }
}

/// Snapshot of transfer progress, passed to progress callbacks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStatus {
    pub bytes_sent: u64,
    /// Known size of the outgoing body, 0 if unknown
    pub total_to_send: u64,
    pub bytes_received: u64,
    /// Known size of the incoming body, 0 if unknown
    pub total_to_receive: u64,
}

/// Progress callback
pub type ProgressFn = Box<dyn FnMut(DeliveryStatus) + Send>;

/// Destination for a received body that should not be kept in memory
pub trait BodySink: Send {
    /// Called once before the first byte, with the announced length if any
    fn init(&mut self, _total: Option<u64>) -> io::Result<()> {
        Ok(())
    }

    /// Accept the next piece of the body
    fn receive(&mut self, data: &[u8]) -> io::Result<()>;

    /// Called after the last byte
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BodySink for Vec<u8> {
    fn receive(&mut self, data: &[u8]) -> io::Result<()> {
        self.extend_from_slice(data);
        Ok(())
    }
}

/// Streams a received body into a local file
pub struct FileSink {
    file: BufWriter<File>,
}

impl FileSink {
    /// Create (or truncate) the file at `path`
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(FileSink {
            file: BufWriter::new(File::create(path)?),
        })
    }
}

impl BodySink for FileSink {
    fn receive(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Message body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Body {
    #[default]
    Empty,
    /// In-memory bytes
    Bytes(Vec<u8>),
    /// Local file streamed when the message is sent
    File(PathBuf),
    /// Local file wrapped as a `multipart/form-data` item
    Multipart(MultipartFile),
}

impl Body {
    /// Number of bytes this body puts on the wire (before chunk framing)
    pub fn len(&self) -> Result<u64> {
        Ok(match self {
            Body::Empty => 0,
            Body::Bytes(bytes) => bytes.len() as u64,
            Body::File(path) => std::fs::metadata(path)?.len(),
            Body::Multipart(part) => part.content_length()?,
        })
    }

    /// True for the empty body
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Bytes(bytes) => bytes.is_empty(),
            _ => false,
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<&[u8]> for Body {
    fn from(bytes: &[u8]) -> Self {
        Body::Bytes(bytes.to_vec())
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Bytes(text.as_bytes().to_vec())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Bytes(text.into_bytes())
    }
}

impl From<PathBuf> for Body {
    fn from(path: PathBuf) -> Self {
        Body::File(path)
    }
}

impl From<&Path> for Body {
    fn from(path: &Path) -> Self {
        Body::File(path.to_path_buf())
    }
}

/// How a message body is carried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    None,
    Buffer,
    FileReference,
    Chunked,
    Sink,
}

/// State shared by requests and responses
pub struct Message {
    version: Version,
    headers: Headers,
    body: Body,
    chunked: bool,
    chunks_finished: bool,
    headers_sent: bool,
    close_delimited: bool,
    progress: Option<ProgressFn>,
    sink: Option<Box<dyn BodySink>>,
    status: DeliveryStatus,
    socket_error: Option<String>,
}

impl Message {
    /// Create an empty message
    pub fn new(version: Version) -> Self {
        Message {
            version,
            headers: Headers::new(),
            body: Body::Empty,
            chunked: false,
            chunks_finished: false,
            headers_sent: false,
            close_delimited: false,
            progress: None,
            sink: None,
            status: DeliveryStatus::default(),
            socket_error: None,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    /// In-memory body bytes; empty for file bodies
    pub fn body_bytes(&self) -> &[u8] {
        match &self.body {
            Body::Bytes(bytes) => bytes,
            _ => &[],
        }
    }

    /// Current body mode
    pub fn body_mode(&self) -> BodyMode {
        if self.sink.is_some() {
            return BodyMode::Sink;
        }
        if self.chunked || self.is_chunked() {
            return BodyMode::Chunked;
        }
        match self.body {
            Body::Empty => BodyMode::None,
            Body::Bytes(_) => BodyMode::Buffer,
            Body::File(_) | Body::Multipart(_) => BodyMode::FileReference,
        }
    }

    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    pub fn delivery_status(&self) -> DeliveryStatus {
        self.status
    }

    pub fn socket_error(&self) -> Option<&str> {
        self.socket_error.as_deref()
    }

    pub fn set_socket_error(&mut self, error: impl Into<String>) {
        self.socket_error = Some(error.into());
    }

    pub(crate) fn set_progress(&mut self, progress: Option<ProgressFn>) {
        self.progress = progress;
    }

    pub(crate) fn take_progress(&mut self) -> Option<ProgressFn> {
        self.progress.take()
    }

    pub(crate) fn set_sink(&mut self, sink: Option<Box<dyn BodySink>>) {
        self.sink = sink;
    }

    pub(crate) fn take_sink(&mut self) -> Option<Box<dyn BodySink>> {
        self.sink.take()
    }

    pub(crate) fn set_delivery_status(&mut self, status: DeliveryStatus) {
        self.status = status;
    }

    /// Forget that the head was sent, so the message can go out again
    pub(crate) fn reset_delivery(&mut self) {
        self.headers_sent = false;
        self.chunked = false;
        self.chunks_finished = false;
        self.close_delimited = false;
        self.status = DeliveryStatus::default();
    }

    /// Prepare for a body streamed through `write` calls
    ///
    /// Without chunked coding or a `Content-Length` the length is unknown, so
    /// the body ends when the connection closes.
    pub(crate) fn open_stream(&mut self) {
        if self.headers_sent || self.is_chunked() || self.headers.contains("Content-Length") {
            return;
        }
        self.close_delimited = true;
        self.headers.set("Connection", "close");
    }

    fn is_chunked(&self) -> bool {
        self.headers
            .get("Transfer-Encoding")
            .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"))
    }

    fn report(&mut self) {
        if let Some(progress) = self.progress.as_mut() {
            progress(self.status);
        }
    }

    /// Decide the body framing right before the head goes out
    fn frame(&mut self, announce_empty: bool) -> Result<()> {
        if self.is_chunked() {
            self.chunked = true;
            self.headers.remove("Content-Length");
            self.status.total_to_send = 0;
            return Ok(());
        }
        if self.close_delimited {
            self.status.total_to_send = 0;
            return Ok(());
        }

        let len = self.body.len()?;
        if !self.headers.contains("Content-Length") && (len > 0 || announce_empty) {
            self.headers.set("Content-Length", len.to_string());
        }
        self.status.total_to_send = self
            .headers
            .get("Content-Length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(len);
        Ok(())
    }

    fn send_head(&mut self, start_line: &str, announce_empty: bool, conn: &mut Connection) -> Result<()> {
        if self.headers_sent {
            return Ok(());
        }

        self.frame(announce_empty)?;

        let mut head = String::with_capacity(256);
        head.push_str(start_line);
        head.push_str(CRLF);
        for (name, value) in self.headers.iter() {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str(CRLF);
        }
        head.push_str(CRLF);

        conn.write_all(head.as_bytes())?;
        self.headers_sent = true;
        Ok(())
    }

    fn write_raw(&mut self, conn: &mut Connection, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }

        if self.chunked {
            ChunkedEncoder::new(&mut *conn).write_chunk(data)?;
        } else {
            conn.write_all(data)?;
        }

        self.status.bytes_sent += data.len() as u64;
        self.report();
        Ok(data.len())
    }

    fn write_file_range(&mut self, conn: &mut Connection, path: &Path, begin: u64, end: u64) -> Result<u64> {
        let mut file = File::open(path)?;
        let size = file.metadata()?.len();
        let (begin, end) = resolve_range(size, begin, end);

        file.seek(SeekFrom::Start(begin))?;
        let mut reader = file.take(end - begin);
        let mut buf = vec![0u8; IO_CHUNK_SIZE];
        let mut sent = 0u64;

        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            self.write_raw(conn, &buf[..n])?;
            sent += n as u64;
        }

        Ok(sent)
    }

    fn send_body(&mut self, conn: &mut Connection) -> Result<()> {
        let body = std::mem::take(&mut self.body);
        let result = self.write_body(conn, &body);
        self.body = body;
        result
    }

    fn write_body(&mut self, conn: &mut Connection, body: &Body) -> Result<()> {
        match body {
            Body::Empty => {}
            Body::Bytes(bytes) => {
                for piece in bytes.chunks(IO_CHUNK_SIZE) {
                    self.write_raw(conn, piece)?;
                }
            }
            Body::File(path) => {
                self.write_file_range(conn, path, 0, 0)?;
            }
            Body::Multipart(part) => {
                self.write_raw(conn, part.prefix())?;
                self.write_file_range(conn, part.path(), 0, 0)?;
                self.write_raw(conn, part.suffix())?;
            }
        }
        Ok(())
    }

    fn finish_chunks(&mut self, conn: &mut Connection) -> Result<()> {
        if self.chunked && !self.chunks_finished {
            ChunkedEncoder::new(&mut *conn).finish()?;
            self.chunks_finished = true;
        }
        Ok(())
    }

    /// Read the body announced by the headers already stored on the message
    ///
    /// Without chunked framing or `Content-Length`, the body extends to the
    /// end of the connection when `until_close` is set and is empty otherwise.
    fn read_body(&mut self, conn: &mut Connection, until_close: bool) -> Result<()> {
        self.body = Body::Empty;

        let length = match self.headers.get("Content-Length") {
            Some(value) => Some(
                value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| Error::Parse(format!("Invalid Content-Length: {}", value)))?,
            ),
            None => None,
        };

        if self.is_chunked() {
            self.status.total_to_receive = 0;
            self.init_sink(None)?;
            self.read_chunked(conn)?;
        } else if let Some(length) = length {
            self.status.total_to_receive = length;
            self.init_sink(Some(length))?;
            self.read_exact(conn, length)?;
        } else if until_close {
            self.init_sink(None)?;
            self.read_to_close(conn)?;
        } else {
            return Ok(());
        }

        if let Some(sink) = self.sink.as_mut() {
            sink.finish()?;
        }
        Ok(())
    }

    fn init_sink(&mut self, total: Option<u64>) -> Result<()> {
        if let Some(sink) = self.sink.as_mut() {
            sink.init(total)?;
        }
        Ok(())
    }

    fn read_exact(&mut self, conn: &mut Connection, length: u64) -> Result<()> {
        let mut remaining = length;
        while remaining > 0 {
            if conn.buffered().is_empty() && conn.fill()? == 0 {
                return Err(Error::ConnectionClosed);
            }
            let data = conn.take_buffered(usize::try_from(remaining).unwrap_or(usize::MAX));
            remaining -= data.len() as u64;
            self.deliver(&data)?;
        }
        Ok(())
    }

    fn read_chunked(&mut self, conn: &mut Connection) -> Result<()> {
        let mut decoder = ChunkedDecoder::new();
        let mut decoded = Vec::with_capacity(IO_CHUNK_SIZE);

        loop {
            if conn.buffered().is_empty() && conn.fill()? == 0 {
                return Err(Error::ConnectionClosed);
            }

            let (consumed, complete) = decoder.decode(conn.buffered(), &mut decoded)?;
            conn.consume(consumed);

            if !decoded.is_empty() {
                self.deliver(&decoded)?;
                decoded.clear();
            }

            if complete {
                // Anything left in the buffer belongs to the next message
                return Ok(());
            }

            if consumed == 0 && conn.fill()? == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }

    fn read_to_close(&mut self, conn: &mut Connection) -> Result<()> {
        loop {
            if !conn.buffered().is_empty() {
                let data = conn.take_buffered(usize::MAX);
                self.deliver(&data)?;
            }
            if conn.fill()? == 0 {
                return Ok(());
            }
        }
    }

    fn deliver(&mut self, data: &[u8]) -> Result<()> {
        match self.sink.as_mut() {
            Some(sink) => sink.receive(data)?,
            None => match &mut self.body {
                Body::Bytes(bytes) => bytes.extend_from_slice(data),
                body => *body = Body::Bytes(data.to_vec()),
            },
        }

        self.status.bytes_received += data.len() as u64;
        self.report();
        Ok(())
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new(Version::default())
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("version", &self.version)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("headers_sent", &self.headers_sent)
            .field("status", &self.status)
            .field("socket_error", &self.socket_error)
            .finish_non_exhaustive()
    }
}

/// Clamp `[begin, end)` to a file of `size` bytes; `end == 0` means end of file
pub fn resolve_range(size: u64, begin: u64, end: u64) -> (u64, u64) {
    let end = if end == 0 || end > size { size } else { end };
    (begin.min(end), end)
}

/// Common API of requests and responses
pub trait HttpMessage {
    /// Shared message state
    fn message(&self) -> &Message;

    /// Mutable shared message state
    fn message_mut(&mut self) -> &mut Message;

    /// Request line or status line, without the line terminator
    fn start_line(&self) -> String;

    /// Whether an empty body is announced with `Content-Length: 0`
    fn announces_empty_body(&self) -> bool;

    /// Whether the body follows the head on the wire
    fn sends_body(&self) -> bool {
        true
    }

    fn version(&self) -> Version {
        self.message().version()
    }

    fn headers(&self) -> &Headers {
        self.message().headers()
    }

    fn headers_mut(&mut self) -> &mut Headers {
        self.message_mut().headers_mut()
    }

    /// Value of a header, or an empty string
    fn header(&self, name: &str) -> &str {
        self.headers().value(name)
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers().contains(name)
    }

    fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers_mut().set(name, value);
    }

    /// Body bytes held in memory
    fn body(&self) -> &[u8] {
        self.message().body_bytes()
    }

    /// Body as text (lossy UTF-8)
    fn text(&self) -> String {
        String::from_utf8_lossy(self.body()).into_owned()
    }

    /// Body parsed as JSON
    fn json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(self.body())?)
    }

    /// True when the body is a file reference
    fn contains_file(&self) -> bool {
        matches!(self.message().body(), Body::File(_) | Body::Multipart(_))
    }

    /// Path of a file-reference body
    fn file_body(&self) -> Option<&Path> {
        match self.message().body() {
            Body::File(path) => Some(path),
            Body::Multipart(part) => Some(part.path()),
            _ => None,
        }
    }

    /// Set the body from anything convertible to `Body`
    fn put(&mut self, body: impl Into<Body>) {
        self.message_mut().set_body(body.into());
    }

    /// Set the body as a binary blob
    fn put_bytes(&mut self, data: impl Into<Vec<u8>>) {
        self.message_mut().set_body(Body::Bytes(data.into()));
    }

    /// Set the body as text
    fn put_text(&mut self, text: &str) {
        self.put_bytes(text.as_bytes());
    }

    /// Set the body as a JSON document and the matching content type
    fn put_json(&mut self, value: &serde_json::Value) {
        self.put_bytes(value.to_string());
        self.set_header("Content-Type", "application/json");
    }

    /// Reference a local file to be streamed when the message is sent
    fn put_file_ref(&mut self, path: impl Into<PathBuf>) {
        self.message_mut().set_body(Body::File(path.into()));
    }

    /// Install a progress callback
    fn on_progress(&mut self, progress: impl FnMut(DeliveryStatus) + Send + 'static) {
        self.message_mut().set_progress(Some(Box::new(progress)));
    }

    /// Stream the received body into `sink` instead of memory
    fn use_sink(&mut self, sink: impl BodySink + 'static) {
        self.message_mut().set_sink(Some(Box::new(sink)));
    }

    fn body_mode(&self) -> BodyMode {
        self.message().body_mode()
    }

    fn headers_sent(&self) -> bool {
        self.message().headers_sent()
    }

    fn delivery_status(&self) -> DeliveryStatus {
        self.message().delivery_status()
    }

    fn set_socket_error(&mut self, error: impl Into<String>) {
        self.message_mut().set_socket_error(error);
    }

    /// Send the start line and headers, once
    fn send_headers(&mut self, conn: &mut Connection) -> Result<()> {
        let line = self.start_line();
        let announce = self.announces_empty_body();
        self.message_mut().send_head(&line, announce, conn)
    }

    /// Write bytes to the body stream, after the headers
    ///
    /// In chunked mode every call produces one chunk. Returns the number of
    /// body bytes written.
    fn write(&mut self, conn: &mut Connection, data: &[u8]) -> Result<usize> {
        self.message_mut().open_stream();
        self.send_headers(conn)?;
        self.message_mut().write_raw(conn, data)
    }

    /// Write text to the body stream
    fn write_text(&mut self, conn: &mut Connection, text: &str) -> Result<usize> {
        self.write(conn, text.as_bytes())
    }

    /// Stream bytes `[begin, end)` of a local file to the body stream
    ///
    /// `end == 0` means the end of the file.
    fn write_file(&mut self, conn: &mut Connection, path: &Path, begin: u64, end: u64) -> Result<u64> {
        self.message_mut().open_stream();
        self.send_headers(conn)?;
        self.message_mut().write_file_range(conn, path, begin, end)
    }

    /// Send a byte range of a file as the whole body, with its `Content-Length`
    fn put_file(&mut self, conn: &mut Connection, path: &Path, begin: u64, end: u64) -> Result<()> {
        let size = std::fs::metadata(path)?.len();
        let (begin, end) = resolve_range(size, begin, end);

        self.set_header("Content-Length", (end - begin).to_string());
        self.send_headers(conn)?;
        if self.sends_body() {
            self.message_mut().write_file_range(conn, path, begin, end)?;
            self.message_mut().finish_chunks(conn)?;
        }
        Ok(())
    }

    /// Send the head and the whole body
    fn send(&mut self, conn: &mut Connection) -> Result<()> {
        self.send_headers(conn)?;
        if self.sends_body() {
            self.message_mut().send_body(conn)?;
            self.message_mut().finish_chunks(conn)?;
        }
        Ok(())
    }

    /// Complete the message: send it if nothing went out yet, otherwise
    /// terminate a chunked body
    fn finish(&mut self, conn: &mut Connection) -> Result<()> {
        if !self.headers_sent() {
            return self.send(conn);
        }
        if self.sends_body() {
            self.message_mut().finish_chunks(conn)?;
        }
        Ok(())
    }
}

/// HTTP request
#[derive(Debug)]
pub struct HttpRequest {
    message: Message,
    method: Method,
    url: String,
    resource: String,
    path: String,
    query_string: String,
    fragment: String,
    query: OnceCell<Headers>,
    sender: Option<SocketAddr>,
    redirect_count: u32,
    follow_redirects: bool,
}

impl HttpRequest {
    /// Create a new HTTP request
    ///
    /// `url` is absolute for client requests and a request target
    /// (`/path?query`) for requests read by a server.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        let mut request = HttpRequest {
            message: Message::default(),
            method,
            url: String::new(),
            resource: String::new(),
            path: String::new(),
            query_string: String::new(),
            fragment: String::new(),
            query: OnceCell::new(),
            sender: None,
            redirect_count: 0,
            follow_redirects: true,
        };
        request.set_url(url);
        request
    }

    /// Create a builder for constructing requests
    pub fn builder() -> HttpRequestBuilder {
        HttpRequestBuilder::default()
    }

    /// Read one request (head and body) from a connection
    ///
    /// Answers `Expect: 100-continue` before reading the body.
    pub fn read(conn: &mut Connection) -> Result<Self> {
        let (line, headers) = read_head(conn)?;
        let (method, uri, version) = parse_request_line(&line)?;

        let mut request = HttpRequest::new(method, uri);
        request.message.version = version;
        request.message.headers = headers;
        request.sender = conn.peer_addr();

        if version == Version::Http11
            && request.header("Expect").eq_ignore_ascii_case("100-continue")
        {
            conn.write_all(b"HTTP/1.1 100 Continue\r\n\r\n")?;
        }

        request.message.read_body(conn, false)?;
        Ok(request)
    }

    /// Get the request method
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    /// Get the request URL as given
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Point the request at a new URL, so it can be sent again
    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
        self.message.reset_delivery();

        let target = if self.url.contains("://") {
            parse_url(&self.url).target().to_string()
        } else {
            self.url.clone()
        };

        let (resource, fragment) = match target.split_once('#') {
            Some((resource, fragment)) => (resource.to_string(), fragment.to_string()),
            None => (target, String::new()),
        };
        let (path, query_string) = match resource.split_once('?') {
            Some((path, query)) => (path.to_string(), query.to_string()),
            None => (resource.clone(), String::new()),
        };

        self.path = decode_url(&path);
        self.resource = resource;
        self.query_string = query_string;
        self.fragment = fragment;
        self.query = OnceCell::new();
    }

    /// Request target as sent on the request line (`/path?query`)
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Percent-decoded path, without the query
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string after `?`
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    /// Query parameters, decoded, parsed on first use
    pub fn query(&self) -> &Headers {
        self.query.get_or_init(|| {
            self.query_string
                .split('&')
                .filter(|pair| !pair.is_empty())
                .map(|pair| {
                    let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                    (decode_query_component(key), decode_query_component(value))
                })
                .collect()
        })
    }

    /// Decoded value of one query parameter, or an empty string
    pub fn query_value(&self, key: &str) -> &str {
        self.query().value(key)
    }

    /// Non-empty path segments
    pub fn parts(&self) -> Vec<&str> {
        self.path.split('/').filter(|s| !s.is_empty()).collect()
    }

    /// Match the path against a pattern
    ///
    /// A pattern ending in `*` matches any path with that prefix and yields
    /// the remainder; other patterns must match exactly and yield `""`.
    pub fn matches(&self, pattern: &str) -> Option<&str> {
        match pattern.strip_suffix('*') {
            Some(prefix) => self.path.strip_prefix(prefix),
            None => (self.path == pattern).then_some(""),
        }
    }

    /// True if the method is `method` and the path matches `pattern`
    pub fn is(&self, method: &str, pattern: &str) -> bool {
        self.method.as_str() == method && self.matches(pattern).is_some()
    }

    /// Address of the client that sent the request
    pub fn sender(&self) -> Option<SocketAddr> {
        self.sender
    }

    /// Number of redirects followed so far
    pub fn redirect_count(&self) -> u32 {
        self.redirect_count
    }

    pub fn set_redirect_count(&mut self, count: u32) {
        self.redirect_count = count;
    }

    pub fn follow_redirects(&self) -> bool {
        self.follow_redirects
    }

    /// Enable or disable automatic redirect following
    pub fn set_follow_redirects(&mut self, enable: bool) {
        self.follow_redirects = enable;
    }
}

impl HttpMessage for HttpRequest {
    fn message(&self) -> &Message {
        &self.message
    }

    fn message_mut(&mut self) -> &mut Message {
        &mut self.message
    }

    fn start_line(&self) -> String {
        let resource = if self.resource.is_empty() { "/" } else { &self.resource };
        format!("{} {} {}", self.method, resource, self.message.version)
    }

    fn announces_empty_body(&self) -> bool {
        self.method.expects_body()
    }
}

/// Builder for HTTP requests
#[derive(Debug, Default)]
pub struct HttpRequestBuilder {
    method: Option<Method>,
    url: Option<String>,
    version: Option<Version>,
    headers: Headers,
    body: Body,
    follow_redirects: Option<bool>,
}

impl HttpRequestBuilder {
    /// Set the HTTP method
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Set the URL
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the HTTP version
    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Set a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Set all headers
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers.extend(headers.iter());
        self
    }

    /// Set the body
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a JSON body and its content type
    pub fn json(mut self, value: &serde_json::Value) -> Self {
        self.body = Body::Bytes(value.to_string().into_bytes());
        self.headers.set("Content-Type", "application/json");
        self
    }

    /// Enable or disable redirect following
    pub fn follow_redirects(mut self, enable: bool) -> Self {
        self.follow_redirects = Some(enable);
        self
    }

    /// Build the request
    pub fn build(self) -> HttpRequest {
        let mut request = HttpRequest::new(
            self.method.unwrap_or(Method::Get),
            self.url.unwrap_or_else(|| "/".to_string()),
        );
        request.message.version = self.version.unwrap_or_default();
        request.message.headers = self.headers;
        request.message.body = self.body;
        request.follow_redirects = self.follow_redirects.unwrap_or(true);
        request
    }
}

/// HTTP response
#[derive(Debug)]
pub struct HttpResponse {
    message: Message,
    code: u16,
    reason: String,
    head_only: bool,
}

impl HttpResponse {
    /// Create a `200 OK` response
    pub fn new() -> Self {
        Self::with_status(Status::OK)
    }

    /// Create a response with the given status
    pub fn with_status(status: Status) -> Self {
        HttpResponse {
            message: Message::default(),
            code: status.code(),
            reason: status.reason_phrase().to_string(),
            head_only: false,
        }
    }

    /// Create the response to `request`, using its protocol version
    ///
    /// Responses to `HEAD` carry headers only.
    pub fn for_request(request: &HttpRequest) -> Self {
        let mut response = Self::new();
        response.message.version = request.version();
        response.head_only = *request.method() == Method::Head;
        response
    }

    /// A response standing for an exchange that failed before a status arrived
    pub fn failed(error: impl Into<String>) -> Self {
        let mut response = Self::new();
        response.code = 0;
        response.reason.clear();
        response.message.set_socket_error(error);
        response
    }

    /// Read a response head from a connection
    pub fn read_head(conn: &mut Connection) -> Result<Self> {
        let (line, headers) = read_head(conn)?;
        let (version, code, reason) = parse_status_line(&line)?;

        let mut response = Self::new();
        response.message.version = version;
        response.message.headers = headers;
        response.code = code;
        response.reason = reason;
        Ok(response)
    }

    /// Read the body that follows the head, given the request method
    pub fn read_body(&mut self, conn: &mut Connection, request_method: &Method) -> Result<()> {
        if self.has_body_for(request_method) {
            self.message.read_body(conn, true)?;
        }
        Ok(())
    }

    /// Read a complete response to a request with `request_method`
    pub fn read(conn: &mut Connection, request_method: &Method) -> Result<Self> {
        let mut response = Self::read_head(conn)?;
        response.read_body(conn, request_method)?;
        Ok(response)
    }

    fn has_body_for(&self, request_method: &Method) -> bool {
        *request_method != Method::Head && self.allows_body()
    }

    fn allows_body(&self) -> bool {
        !(100..200).contains(&self.code) && self.code != 204 && self.code != 304
    }

    /// Get the status code; 0 when no response was received
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Set the status code and its canonical reason phrase
    pub fn set_code(&mut self, code: u16) {
        self.code = code;
        self.reason = reason_phrase(code).to_string();
    }

    /// Set the status
    pub fn set_status(&mut self, status: Status) {
        self.set_code(status.code());
    }

    /// Get the status, if the code is valid
    pub fn status(&self) -> Option<Status> {
        Status::new(self.code).ok()
    }

    /// Get the reason phrase
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// True if the status code belongs to `class`
    pub fn is(&self, class: StatusClass) -> bool {
        StatusClass::of(self.code) == Some(class)
    }

    /// True for a 2xx response
    pub fn ok(&self) -> bool {
        self.is(StatusClass::Success)
    }

    /// Description of the transport failure, or an empty string
    pub fn socket_error(&self) -> &str {
        self.message.socket_error().unwrap_or("")
    }

    pub fn set_version(&mut self, version: Version) {
        self.message.version = version;
    }

    /// True when only the head is sent
    pub fn is_head_only(&self) -> bool {
        self.head_only
    }

    pub fn set_head_only(&mut self, head_only: bool) {
        self.head_only = head_only;
    }
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpMessage for HttpResponse {
    fn message(&self) -> &Message {
        &self.message
    }

    fn message_mut(&mut self) -> &mut Message {
        &mut self.message
    }

    fn start_line(&self) -> String {
        format!("{} {} {}", self.message.version, self.code, self.reason)
    }

    fn announces_empty_body(&self) -> bool {
        self.allows_body()
    }

    fn sends_body(&self) -> bool {
        !self.head_only && self.allows_body()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::transport::mock;
    use std::sync::{Arc, Mutex};

    fn written(output: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8_lossy(&output.lock().unwrap()).into_owned()
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!("GET".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("POST".parse::<Method>().unwrap(), Method::Post);
        assert_eq!(
            "PURGE".parse::<Method>().unwrap(),
            Method::Extension("PURGE".to_string())
        );
        assert!("BAD METHOD".parse::<Method>().is_err());
        assert!("".parse::<Method>().is_err());
    }

    #[test]
    fn test_version_from_str() {
        assert_eq!("HTTP/1.0".parse::<Version>().unwrap(), Version::Http10);
        assert_eq!("HTTP/1.1".parse::<Version>().unwrap(), Version::Http11);
        assert!("HTTP/2.0".parse::<Version>().is_err());
    }

    #[test]
    fn test_status() {
        let status = Status::new(200).unwrap();
        assert_eq!(status.code(), 200);
        assert_eq!(status.reason_phrase(), "OK");
        assert_eq!(status.class(), StatusClass::Success);
        assert!(Status::new(99).is_err());
        assert_eq!(StatusClass::of(0), None);
    }

    #[test]
    fn test_request_builder() {
        let req = HttpRequest::builder()
            .method(Method::Post)
            .url("http://example.com/test?a=1")
            .header("Content-Type", "text/plain")
            .body("Hello")
            .build();

        assert_eq!(*req.method(), Method::Post);
        assert_eq!(req.url(), "http://example.com/test?a=1");
        assert_eq!(req.resource(), "/test?a=1");
        assert_eq!(req.body(), b"Hello");
        assert_eq!(req.header("content-type"), "text/plain");
        assert!(req.follow_redirects());
    }

    #[test]
    fn test_request_send() {
        let mut req = HttpRequest::builder()
            .method(Method::Post)
            .url("http://example.com/submit")
            .header("Host", "example.com")
            .body("data")
            .build();

        let (mut conn, output) = mock::connection(b"");
        req.send(&mut conn).unwrap();
        // Headers go out once
        req.send_headers(&mut conn).unwrap();

        assert_eq!(
            written(&output),
            "POST /submit HTTP/1.1\r\nHost: example.com\r\nContent-Length: 4\r\n\r\ndata"
        );
    }

    #[test]
    fn test_get_request_has_no_length() {
        let mut req = HttpRequest::new(Method::Get, "http://example.com");
        let (mut conn, output) = mock::connection(b"");
        req.send(&mut conn).unwrap();

        assert_eq!(written(&output), "GET / HTTP/1.1\r\n\r\n");
    }

    #[test]
    fn test_response_send_empty_and_not_modified() {
        let mut resp = HttpResponse::new();
        let (mut conn, output) = mock::connection(b"");
        resp.send(&mut conn).unwrap();
        assert_eq!(written(&output), "HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");

        let mut resp = HttpResponse::with_status(Status::NOT_MODIFIED);
        let (mut conn, output) = mock::connection(b"");
        resp.send(&mut conn).unwrap();
        assert_eq!(written(&output), "HTTP/1.1 304 Not Modified\r\n\r\n");
    }

    #[test]
    fn test_chunked_response() {
        let mut resp = HttpResponse::new();
        resp.set_header("Transfer-Encoding", "chunked");
        resp.set_header("Content-Length", "99");

        let (mut conn, output) = mock::connection(b"");
        resp.send_headers(&mut conn).unwrap();
        assert_eq!(resp.body_mode(), BodyMode::Chunked);
        assert_eq!(resp.write_text(&mut conn, "Hello").unwrap(), 5);
        assert_eq!(resp.write(&mut conn, b" World").unwrap(), 6);
        resp.finish(&mut conn).unwrap();
        resp.finish(&mut conn).unwrap();

        assert_eq!(
            written(&output),
            "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nHello\r\n6\r\n World\r\n0\r\n\r\n"
        );
    }

    #[test]
    fn test_head_response_omits_body() {
        let request = HttpRequest::new(Method::Head, "/");
        let mut resp = HttpResponse::for_request(&request);
        resp.put_text("hidden");

        let (mut conn, output) = mock::connection(b"");
        resp.send(&mut conn).unwrap();
        assert_eq!(written(&output), "HTTP/1.1 200 OK\r\nContent-Length: 6\r\n\r\n");
    }

    #[test]
    fn test_put_variants() {
        let mut resp = HttpResponse::new();
        assert_eq!(resp.body_mode(), BodyMode::None);

        resp.put_json(&serde_json::json!({"a": 1}));
        assert_eq!(resp.header("Content-Type"), "application/json");
        assert_eq!(resp.json().unwrap()["a"], 1);
        assert_eq!(resp.body_mode(), BodyMode::Buffer);

        resp.put_file_ref("/tmp/some-file.txt");
        assert!(resp.contains_file());
        assert_eq!(resp.file_body(), Some(Path::new("/tmp/some-file.txt")));
        assert_eq!(resp.body_mode(), BodyMode::FileReference);
        assert!(resp.body().is_empty());
    }

    #[test]
    fn test_read_request_with_body() {
        let (mut conn, _) = mock::connection(
            b"POST /form?name=J%C3%BCrgen&x=a+b HTTP/1.1\r\nContent-Length: 5\r\n\r\nhelloGET / HTTP/1.1\r\n\r\n",
        );

        let req = HttpRequest::read(&mut conn).unwrap();
        assert_eq!(*req.method(), Method::Post);
        assert_eq!(req.path(), "/form");
        assert_eq!(req.query_string(), "name=J%C3%BCrgen&x=a+b");
        assert_eq!(req.query_value("name"), "Jürgen");
        assert_eq!(req.query_value("x"), "a b");
        assert_eq!(req.query_value("missing"), "");
        assert_eq!(req.body(), b"hello");

        // The next pipelined request is still buffered
        let next = HttpRequest::read(&mut conn).unwrap();
        assert_eq!(*next.method(), Method::Get);
    }

    #[test]
    fn test_read_chunked_request() {
        let (mut conn, _) = mock::connection(
            b"PUT /up HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n",
        );

        let req = HttpRequest::read(&mut conn).unwrap();
        assert_eq!(req.text(), "Wikipedia");
        assert!(conn.buffered().is_empty());
    }

    #[test]
    fn test_read_bad_chunk_size() {
        let (mut conn, _) = mock::connection(
            b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nxyz\r\nabc\r\n0\r\n\r\n",
        );
        assert!(matches!(
            HttpRequest::read(&mut conn),
            Err(Error::InvalidChunkSize(_))
        ));
    }

    #[test]
    fn test_expect_continue() {
        let (mut conn, output) = mock::connection(
            b"PUT /x HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 2\r\n\r\nok",
        );
        let req = HttpRequest::read(&mut conn).unwrap();
        assert_eq!(req.body(), b"ok");
        assert_eq!(written(&output), "HTTP/1.1 100 Continue\r\n\r\n");
    }

    #[test]
    fn test_read_response_until_close() {
        let (mut conn, _) = mock::connection(b"HTTP/1.0 200 OK\r\nServer: test\r\n\r\nall the rest");
        let resp = HttpResponse::read(&mut conn, &Method::Get).unwrap();
        assert_eq!(resp.code(), 200);
        assert_eq!(resp.version(), Version::Http10);
        assert_eq!(resp.text(), "all the rest");
    }

    #[test]
    fn test_read_response_truncated() {
        let (mut conn, _) = mock::connection(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort");
        assert!(matches!(
            HttpResponse::read(&mut conn, &Method::Get),
            Err(Error::ConnectionClosed)
        ));
    }

    #[test]
    fn test_head_response_has_no_body() {
        let (mut conn, _) = mock::connection(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n");
        let resp = HttpResponse::read(&mut conn, &Method::Head).unwrap();
        assert!(resp.body().is_empty());
    }

    #[test]
    fn test_sink_and_progress() {
        let (mut conn, _) = mock::connection(b"HTTP/1.1 200 OK\r\nContent-Length: 6\r\n\r\nabcdef");
        let mut resp = HttpResponse::read_head(&mut conn).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        resp.on_progress(move |s| seen_cb.lock().unwrap().push(s));
        resp.use_sink(Vec::<u8>::new());
        assert_eq!(resp.body_mode(), BodyMode::Sink);

        resp.read_body(&mut conn, &Method::Get).unwrap();
        assert!(resp.body().is_empty());

        let seen = seen.lock().unwrap();
        let last = seen.last().unwrap();
        assert_eq!(last.bytes_received, 6);
        assert_eq!(last.total_to_receive, 6);
    }

    #[test]
    fn test_write_file_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, "0123456789").unwrap();

        let mut resp = HttpResponse::new();
        let (mut conn, output) = mock::connection(b"");
        resp.put_file(&mut conn, &path, 2, 5).unwrap();
        assert_eq!(
            written(&output),
            "HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\n234"
        );

        let mut resp = HttpResponse::new();
        resp.set_header("Content-Length", "4");
        let (mut conn, output) = mock::connection(b"");
        assert_eq!(resp.write_file(&mut conn, &path, 6, 0).unwrap(), 4);
        assert!(written(&output).ends_with("\r\n\r\n6789"));

        assert_eq!(resolve_range(10, 20, 0), (10, 10));
    }

    #[test]
    fn test_write_without_framing_closes() {
        let mut resp = HttpResponse::new();
        let (mut conn, output) = mock::connection(b"");
        resp.write_text(&mut conn, "hello").unwrap();
        resp.write_text(&mut conn, " again").unwrap();
        resp.finish(&mut conn).unwrap();

        assert_eq!(
            written(&output),
            "HTTP/1.1 200 OK\r\nConnection: close\r\n\r\nhello again"
        );
        assert_eq!(resp.delivery_status().bytes_sent, 11);
    }

    #[test]
    fn test_send_file_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(&path, "<p>hi</p>").unwrap();

        let mut resp = HttpResponse::new();
        resp.put_file_ref(&path);
        let (mut conn, output) = mock::connection(b"");
        resp.send(&mut conn).unwrap();

        assert_eq!(
            written(&output),
            "HTTP/1.1 200 OK\r\nContent-Length: 9\r\n\r\n<p>hi</p>"
        );
        assert_eq!(resp.delivery_status().bytes_sent, 9);
        assert_eq!(resp.delivery_status().total_to_send, 9);
    }

    #[test]
    fn test_path_matching() {
        let req = HttpRequest::new(Method::Get, "/api/clients/42/orders?x=1#frag");
        assert_eq!(req.path(), "/api/clients/42/orders");
        assert_eq!(req.fragment(), "frag");
        assert_eq!(req.parts(), vec!["api", "clients", "42", "orders"]);
        assert_eq!(req.matches("/api/clients/*"), Some("42/orders"));
        assert_eq!(req.matches("/api/clients/42/orders"), Some(""));
        assert_eq!(req.matches("/api/users/*"), None);
        assert!(req.is("GET", "/api/*"));
        assert!(!req.is("POST", "/api/*"));
    }

    #[test]
    fn test_set_url_resets_delivery() {
        let mut req = HttpRequest::new(Method::Get, "http://a.example/one");
        let (mut conn, _) = mock::connection(b"");
        req.send(&mut conn).unwrap();
        assert!(req.headers_sent());

        req.set_url("http://a.example/two");
        assert!(!req.headers_sent());
        assert_eq!(req.resource(), "/two");
    }

    #[test]
    fn test_failed_response() {
        let resp = HttpResponse::failed("Connection refused");
        assert_eq!(resp.code(), 0);
        assert!(!resp.ok());
        assert_eq!(resp.socket_error(), "Connection refused");
    }
}
