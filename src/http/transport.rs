//! Transport abstraction
//!
//! The HTTP engine performs all I/O through the `Transport` trait, which lets
//! plain TCP and TLS connections share the same code. `Connection` adds the
//! read buffer and timeout handling the message parser needs.
//!
//! A `Connection` is owned by whoever drives the exchange (the client engine
//! for one request, the server dispatch loop for one accepted socket). HTTP
//! messages only borrow it for the duration of a single call.

use super::{Error, Result, IO_CHUNK_SIZE, MAX_LINE_LENGTH};
use bytes::{Bytes, BytesMut};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

/// Byte-stream transport operations
pub trait Transport: Send {
    /// Poll the transport for events
    ///
    /// Returns true if the transport is ready for the requested operation,
    /// false if the timeout expired first.
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool>;

    /// Read data from the transport
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write data to the transport
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// True once the peer has closed its side
    fn is_disconnected(&self) -> bool;

    /// Address of the remote peer, if known
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// Close the transport
    fn close(&mut self) -> Result<()>;
}

/// Poll events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvents {
    Read,
    Write,
    Both,
}

/// Poll a raw descriptor
pub(crate) fn poll_fd(fd: RawFd, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
    use libc::{poll, pollfd, POLLIN, POLLOUT};

    let mut pfd = pollfd {
        fd,
        events: match events {
            PollEvents::Read => POLLIN,
            PollEvents::Write => POLLOUT,
            PollEvents::Both => POLLIN | POLLOUT,
        },
        revents: 0,
    };

    let timeout_ms = timeout
        .map(|d| d.as_millis().min(i32::MAX as u128) as i32)
        .unwrap_or(-1); // -1 = infinite

    loop {
        let result = unsafe { poll(&mut pfd as *mut pollfd, 1, timeout_ms) };

        if result < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(Error::Io(err));
        }

        return Ok(result > 0);
    }
}

/// Check whether the peer closed a socket without consuming any data
pub(crate) fn peer_closed(fd: RawFd) -> bool {
    let mut byte = 0u8;
    let n = unsafe {
        libc::recv(
            fd,
            &mut byte as *mut u8 as *mut libc::c_void,
            1,
            libc::MSG_PEEK | libc::MSG_DONTWAIT,
        )
    };

    if n == 0 {
        return true;
    }
    if n < 0 {
        let err = io::Error::last_os_error();
        return !matches!(
            err.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
        );
    }
    false
}

/// Plain TCP transport
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Wrap an accepted or connected TCP stream
    pub fn new(stream: TcpStream) -> Self {
        TcpTransport { stream }
    }

    /// Resolve `host` and connect to the first address that accepts
    pub fn connect(host: &str, port: u16, timeout: Option<Duration>) -> Result<Self> {
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|e| Error::Resolve(format!("{}: {}", host, e)))?
            .collect();

        let mut last_error = None;
        for addr in addrs {
            match Self::connect_addr(addr, timeout) {
                Ok(stream) => {
                    tracing::trace!(%addr, "connected");
                    return Ok(TcpTransport { stream });
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Resolve(host.to_string())))
    }

    fn connect_addr(addr: SocketAddr, timeout: Option<Duration>) -> Result<TcpStream> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nodelay(true)?;

        let target = SockAddr::from(addr);
        match timeout {
            Some(t) => socket.connect_timeout(&target, t)?,
            None => socket.connect(&target)?,
        }

        Ok(socket.into())
    }

    /// Get a reference to the underlying stream
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    /// Consume the transport and return the underlying stream
    pub fn into_stream(self) -> TcpStream {
        self.stream
    }
}

impl Transport for TcpTransport {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        poll_fd(self.stream.as_raw_fd(), events, timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.stream.read(buf).map_err(Error::from)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.stream.write(buf).map_err(Error::from)
    }

    fn is_disconnected(&self) -> bool {
        peer_closed(self.stream.as_raw_fd())
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.peer_addr().ok()
    }

    fn close(&mut self) -> Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(Error::from(e)),
            _ => Ok(()),
        }
    }
}

/// Buffered HTTP connection over a transport
pub struct Connection {
    transport: Box<dyn Transport>,
    buffer: BytesMut,
    timeout: Option<Duration>,
}

impl Connection {
    /// Create a connection over a transport, with no timeout
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::from_boxed(Box::new(transport))
    }

    /// Create a connection over an already boxed transport
    pub fn from_boxed(transport: Box<dyn Transport>) -> Self {
        Connection {
            transport,
            buffer: BytesMut::with_capacity(IO_CHUNK_SIZE),
            timeout: None,
        }
    }

    /// Set the timeout applied to every wait for input or output
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Get the timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Address of the remote peer
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.transport.peer_addr()
    }

    /// Block until input is available
    ///
    /// Returns false when the timeout expires first. Buffered bytes count
    /// as available input.
    pub fn wait_for_input(&mut self) -> Result<bool> {
        if !self.buffer.is_empty() {
            return Ok(true);
        }
        self.transport.poll(PollEvents::Read, self.timeout)
    }

    /// True when nothing is buffered and the peer has closed
    pub fn is_disconnected(&self) -> bool {
        self.buffer.is_empty() && self.transport.is_disconnected()
    }

    /// Bytes received but not yet consumed
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Discard `n` buffered bytes
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.buffer.len());
        let _ = self.buffer.split_to(n);
    }

    /// Take up to `max` buffered bytes
    pub fn take_buffered(&mut self, max: usize) -> Bytes {
        let n = max.min(self.buffer.len());
        self.buffer.split_to(n).freeze()
    }

    /// Read more data from the transport into the buffer
    ///
    /// Returns the number of bytes added; 0 means the peer closed.
    pub fn fill(&mut self) -> Result<usize> {
        if !self.transport.poll(PollEvents::Read, self.timeout)? {
            return Err(Error::Timeout);
        }

        let mut temp = [0u8; IO_CHUNK_SIZE];
        let n = self.transport.read(&mut temp)?;
        self.buffer.extend_from_slice(&temp[..n]);
        Ok(n)
    }

    /// Read one line, without its line terminator
    ///
    /// Lines end with CRLF; a bare LF is accepted as well.
    pub fn read_line(&mut self) -> Result<String> {
        let mut searched = 0;
        loop {
            if let Some(i) = self.buffer[searched..].iter().position(|&b| b == b'\n') {
                let end = searched + i;
                let line = self.buffer.split_to(end + 1);
                let line = &line[..end];
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                return Ok(String::from_utf8_lossy(line).into_owned());
            }

            searched = self.buffer.len();
            if searched > MAX_LINE_LENGTH {
                return Err(Error::Parse("Line too long".to_string()));
            }

            if self.fill()? == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }

    /// Write all of `buf`, waiting for the transport as needed
    pub fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            if !self.transport.poll(PollEvents::Write, self.timeout)? {
                return Err(Error::Timeout);
            }

            let n = self.transport.write(buf)?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            buf = &buf[n..];
        }

        Ok(())
    }

    /// Close the transport
    pub fn close(&mut self) -> Result<()> {
        self.transport.close()
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_all(buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_tcp_transport_read() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"Hello").unwrap();
        });

        let mut transport = TcpTransport::connect("127.0.0.1", addr.port(), None).unwrap();

        assert!(transport
            .poll(PollEvents::Read, Some(Duration::from_secs(1)))
            .unwrap());

        let mut buf = [0u8; 5];
        let n = transport.read(&mut buf).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"Hello");

        handle.join().unwrap();
    }

    #[test]
    fn test_connection_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let _handle = thread::spawn(move || {
            let (_stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_secs(2));
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut conn = Connection::new(TcpTransport::new(stream));
        conn.set_timeout(Some(Duration::from_millis(100)));

        assert!(!conn.wait_for_input().unwrap());
        assert!(matches!(conn.read_line(), Err(Error::Timeout)));
    }

    #[test]
    fn test_disconnect_detected() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut conn = Connection::new(TcpTransport::new(stream));
        handle.join().unwrap();

        conn.set_timeout(Some(Duration::from_secs(1)));
        assert!(conn.wait_for_input().unwrap());
        assert!(conn.is_disconnected());
    }

    #[test]
    fn test_read_line_endings() {
        let (mut conn, _) = mock::connection(b"first\r\nsecond\nthird");

        assert_eq!(conn.read_line().unwrap(), "first");
        assert_eq!(conn.read_line().unwrap(), "second");
        assert!(matches!(conn.read_line(), Err(Error::ConnectionClosed)));
        assert_eq!(conn.buffered(), b"third");
    }

    #[test]
    fn test_take_and_consume() {
        let (mut conn, output) = mock::connection(b"abcdef");
        conn.fill().unwrap();

        assert_eq!(&conn.take_buffered(2)[..], b"ab");
        conn.consume(1);
        assert_eq!(conn.buffered(), b"def");

        conn.write_all(b"out").unwrap();
        assert_eq!(output.lock().unwrap().as_slice(), b"out");
    }
}
