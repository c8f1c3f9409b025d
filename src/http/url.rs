//! URL parsing and percent-encoding
//!
//! `parse_url` splits an absolute URL into its protocol, host, port and path.
//! It never fails: malformed input produces an empty `Url`, which callers
//! detect with `Url::is_empty`.

use super::{DEFAULT_HTTPS_PORT, DEFAULT_HTTP_PORT};
use std::fmt;

/// Components of an absolute URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Url {
    /// Scheme without the `://` separator, e.g. `http`
    pub protocol: String,
    /// Host name or address; IPv6 literals are stored without brackets
    pub host: String,
    /// Explicit port, or 0 when the URL has none
    pub port: u16,
    /// Path including any query and fragment, or empty
    pub path: String,
}

impl Url {
    /// True when parsing failed
    pub fn is_empty(&self) -> bool {
        self.protocol.is_empty() || self.host.is_empty()
    }

    /// True for schemes carried over TLS
    pub fn is_secure(&self) -> bool {
        self.protocol.eq_ignore_ascii_case("https") || self.protocol.eq_ignore_ascii_case("wss")
    }

    /// The explicit port, or the scheme default
    pub fn effective_port(&self) -> u16 {
        match self.port {
            0 if self.is_secure() => DEFAULT_HTTPS_PORT,
            0 => DEFAULT_HTTP_PORT,
            port => port,
        }
    }

    /// Host and explicit port as they appear in a `Host` header
    pub fn authority(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        match self.port {
            0 => host,
            port => format!("{}:{}", host, port),
        }
    }

    /// The request target sent on the request line (fragment removed)
    pub fn target(&self) -> &str {
        let target = self.path.split('#').next().unwrap_or("");
        if target.is_empty() {
            "/"
        } else {
            target
        }
    }

    /// Resolve a `Location` value against this URL
    pub fn join(&self, location: &str) -> String {
        if has_scheme(location) {
            return location.to_string();
        }
        if let Some(rest) = location.strip_prefix("//") {
            return format!("{}://{}", self.protocol, rest);
        }

        let origin = format!("{}://{}", self.protocol, self.authority());
        if location.starts_with('/') {
            return format!("{}{}", origin, location);
        }

        let path = self.target().split('?').next().unwrap_or("/");
        if location.starts_with('?') {
            return format!("{}{}{}", origin, path, location);
        }
        let dir = match path.rfind('/') {
            Some(i) => &path[..=i],
            None => "/",
        };
        format!("{}{}{}", origin, dir, location)
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.protocol, self.authority(), self.path)
    }
}

/// True when `s` starts with `scheme://`
fn has_scheme(s: &str) -> bool {
    match s.find("://") {
        Some(0) | None => false,
        Some(i) => s[..i]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')),
    }
}

/// Parse an absolute URL of the form `scheme://host[:port][/path]`
///
/// IPv6 hosts are written in brackets (`http://[::1]:8080/`). The port is 0
/// when not given; callers apply scheme defaults. Returns an empty `Url` when
/// the input is malformed.
pub fn parse_url(url: &str) -> Url {
    let Some(sep) = url.find("://") else {
        return Url::default();
    };
    let protocol = &url[..sep];
    let rest = &url[sep + 3..];

    let end = rest.find(&['/', '?', '#'][..]).unwrap_or(rest.len());
    let (authority, path) = rest.split_at(end);
    // Credentials are not used
    let authority = authority.rsplit_once('@').map_or(authority, |(_, a)| a);

    let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
        let Some(close) = bracketed.find(']') else {
            return Url::default();
        };
        let after = &bracketed[close + 1..];
        let port = if after.is_empty() {
            None
        } else if let Some(port) = after.strip_prefix(':') {
            Some(port)
        } else {
            return Url::default();
        };
        (&bracketed[..close], port)
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    let port = match port {
        None | Some("") => 0,
        Some(p) => match p.parse::<u16>() {
            Ok(port) => port,
            Err(_) => return Url::default(),
        },
    };

    if protocol.is_empty() || host.is_empty() {
        return Url::default();
    }

    let path = if path.starts_with('?') || path.starts_with('#') {
        format!("/{}", path)
    } else {
        path.to_string()
    };

    Url {
        protocol: protocol.to_string(),
        host: host.to_string(),
        port,
        path,
    }
}

/// Percent-encode a string for use in a URL component
///
/// Unreserved characters (`A-Z a-z 0-9 - _ . ~`) pass through; every other
/// byte becomes `%XX`.
pub fn encode_url(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Decode a percent-encoded string
///
/// Malformed escapes are kept literally and invalid UTF-8 is replaced.
pub fn decode_url(s: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(s.as_bytes())).into_owned()
}

/// Decode a query-string component, where `+` stands for a space
pub fn decode_query_component(s: &str) -> String {
    decode_url(&s.replace('+', " "))
}
