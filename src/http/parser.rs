//! HTTP message head parsing
//!
//! This module parses request lines, status lines and header blocks.

use super::{Connection, Error, Headers, Method, Result, Version, MAX_HEADERS};

/// Parse HTTP request line
///
/// Format: METHOD URI VERSION
/// Example: GET /index.html HTTP/1.1
pub fn parse_request_line(line: &str) -> Result<(Method, String, Version)> {
    let parts: Vec<&str> = line.split_whitespace().collect();

    if parts.len() != 3 {
        return Err(Error::Parse(format!(
            "Invalid request line: expected 3 parts, got {}",
            parts.len()
        )));
    }

    let method: Method = parts[0].parse()?;
    let uri = parts[1].to_string();
    let version: Version = parts[2].parse()?;

    Ok((method, uri, version))
}

/// Parse HTTP response status line
///
/// Format: VERSION STATUS [REASON]
/// Example: HTTP/1.1 200 OK
pub fn parse_status_line(line: &str) -> Result<(Version, u16, String)> {
    let parts: Vec<&str> = line.splitn(3, ' ').collect();

    if parts.len() < 2 {
        return Err(Error::Parse(format!(
            "Invalid status line: expected at least 2 parts, got {}",
            parts.len()
        )));
    }

    let version: Version = parts[0].parse()?;
    let code = parts[1]
        .parse::<u16>()
        .ok()
        .filter(|c| parts[1].len() == 3 && (100..1000).contains(c))
        .ok_or_else(|| Error::InvalidStatus(parts[1].to_string()))?;
    let reason = parts.get(2).map(|r| r.trim().to_string()).unwrap_or_default();

    Ok((version, code, reason))
}

/// Parse a header line into name and value
pub fn parse_header_line(line: &str) -> Result<(String, String)> {
    let Some((name, value)) = line.split_once(':') else {
        return Err(Error::InvalidHeader(format!("No colon in header: {}", line)));
    };

    if name.is_empty() || name.trim() != name {
        return Err(Error::InvalidHeader(format!("Invalid header name: {:?}", name)));
    }

    Ok((name.to_string(), value.trim().to_string()))
}

/// Read a message head: the start line and the header block
///
/// Empty lines before the start line are skipped. Folded continuation lines
/// are joined to the previous header value.
pub fn read_head(conn: &mut Connection) -> Result<(String, Headers)> {
    let mut start = conn.read_line()?;
    while start.is_empty() {
        start = conn.read_line()?;
    }

    let mut headers = Headers::new();
    let mut last: Option<String> = None;
    let mut lines = 0usize;

    loop {
        let line = conn.read_line()?;
        if line.is_empty() {
            break;
        }

        // Every field line counts, repeats and continuations included
        lines += 1;
        if lines > MAX_HEADERS {
            return Err(Error::Parse(format!("More than {} header lines", MAX_HEADERS)));
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            let Some(name) = last.as_deref() else {
                return Err(Error::InvalidHeader("Continuation without header".to_string()));
            };
            let joined = format!("{} {}", headers.value(name), line.trim());
            headers.set(name, joined);
            continue;
        }

        let (name, value) = parse_header_line(&line)?;

        // Repeated fields are folded into one comma-separated value
        let value = match headers.get(&name) {
            Some(existing) => format!("{}, {}", existing, value),
            None => value,
        };
        headers.set(name.as_str(), value);
        last = Some(name);
    }

    Ok((start, headers))
}
