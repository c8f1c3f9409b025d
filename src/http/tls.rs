//! TLS client transport
//!
//! Wraps an OpenSSL stream so `https` URLs go through the same `Transport`
//! interface as plain TCP. Peer certificates are not verified: the connection
//! is encrypted, but the server's identity is not checked.

use super::transport::{peer_closed, poll_fd, PollEvents, TcpTransport, Transport};
use super::{Error, Result};
use openssl::ssl::{SslConnector, SslMethod, SslStream, SslVerifyMode};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::fd::AsRawFd;
use std::time::Duration;

/// TLS transport (client side)
pub struct TlsTransport {
    stream: SslStream<TcpStream>,
}

impl TlsTransport {
    /// Perform a client handshake over a connected TCP transport
    ///
    /// `servername` is sent as SNI unless it is an IP address.
    pub fn connect(tcp: TcpTransport, servername: &str) -> Result<Self> {
        let mut builder = SslConnector::builder(SslMethod::tls_client())?;
        builder.set_verify(SslVerifyMode::NONE);
        let connector = builder.build();

        let mut config = connector.configure()?;
        config.set_verify_hostname(false);

        let stream = config
            .connect(servername, tcp.into_stream())
            .map_err(|e| Error::Handshake(e.to_string()))?;

        tracing::trace!(
            servername,
            version = stream.ssl().version_str(),
            "TLS handshake complete"
        );

        Ok(TlsTransport { stream })
    }
}

impl Transport for TlsTransport {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        // Decrypted bytes may already be waiting inside OpenSSL
        if events != PollEvents::Write && self.stream.ssl().pending() > 0 {
            return Ok(true);
        }
        poll_fd(self.stream.get_ref().as_raw_fd(), events, timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.stream.read(buf).map_err(Error::from)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.stream.write(buf).map_err(Error::from)
    }

    fn is_disconnected(&self) -> bool {
        self.stream.ssl().pending() == 0 && peer_closed(self.stream.get_ref().as_raw_fd())
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.get_ref().peer_addr().ok()
    }

    fn close(&mut self) -> Result<()> {
        // close_notify is best effort; the socket is shut down regardless
        let _ = self.stream.shutdown();
        let _ = self.stream.get_ref().shutdown(Shutdown::Both);
        Ok(())
    }
}
