//! Minimal HTTP/1.1 wire handling for the forward proxy.
//!
//! Request heads are parsed by hand from the raw client socket, one byte at a
//! time up to the blank line, so no body bytes are ever over-read into a
//! buffer — the body can then be streamed straight off the socket. Response
//! heads are serialised back the same way. Only what a forward proxy needs is
//! implemented: request line, header fields, content length, and the
//! hop-by-hop filter.

use std::io::{self, Read, Write};
use std::net::SocketAddr;

/// Response body stream handed through the response hook chain. Hooks may
/// replace it with a wrapping reader; dropping it closes the underlying
/// upstream body.
pub type Body = Box<dyn Read + Send>;

/// Upper bound on a request head (request line + headers).
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

// ── Request ──────────────────────────────────────────────────────────────────

/// A parsed client request as seen by request hooks.
pub struct Request {
    /// Method verb, uppercase as received (`GET`, `POST`, `CONNECT`, ...).
    pub method: String,
    /// Absolute URL for ordinary requests; `host:port` authority for CONNECT.
    pub url: String,
    /// Origin host: the `Host` header when present, else the URL authority.
    pub host: String,
    /// Header fields in arrival order.
    pub headers: Vec<(String, String)>,
    /// Declared body length. `None` when no `Content-Length` was sent.
    pub content_length: Option<u64>,
    /// Client socket address.
    pub peer: SocketAddr,
    /// `1` for HTTP/1.1, `0` for HTTP/1.0.
    pub minor_version: u8,
}

impl Request {
    /// Case-insensitive header lookup; first occurrence wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// A response flowing back to the client, either relayed from upstream or
/// synthesized by a request hook.
pub struct Response {
    pub status: u16,
    pub reason: String,
    /// Header fields already filtered of hop-by-hop entries.
    pub headers: Vec<(String, String)>,
    /// Declared body length. `None` means close-delimited.
    pub content_length: Option<u64>,
    pub body: Body,
}

impl Response {
    /// Case-insensitive header lookup; first occurrence wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Builds a synthesized plain-text response.
    pub fn synthetic(status: u16, reason: &str, content_type: &str, body: &str) -> Self {
        let bytes = body.as_bytes().to_vec();
        Self {
            status,
            reason: reason.to_string(),
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            content_length: Some(bytes.len() as u64),
            body: Box::new(io::Cursor::new(bytes)),
        }
    }

    /// The rejection response served once a flow crosses the block threshold.
    pub fn forbidden(body: &str) -> Self {
        Self::synthetic(403, "Forbidden", "text/plain", body)
    }
}

// ── Head parsing ─────────────────────────────────────────────────────────────

/// An unvalidated request head straight off the wire.
pub struct RequestHead {
    pub method: String,
    pub target: String,
    pub minor_version: u8,
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Declared `Content-Length`, if present and well-formed.
    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length").and_then(|v| v.trim().parse().ok())
    }
}

/// Reads a request head (through the terminating blank line) from `stream`.
///
/// Returns `Ok(None)` on a clean EOF before any byte arrives — the client
/// simply closed a kept-alive connection. Reads one byte at a time so the
/// socket is positioned exactly at the start of the body afterwards.
pub fn read_head(stream: &mut impl Read, max: usize) -> io::Result<Option<Vec<u8>>> {
    let mut head = Vec::with_capacity(512);
    let mut byte = [0u8; 1];
    loop {
        match stream.read(&mut byte) {
            Ok(0) => {
                if head.is_empty() {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-head",
                ));
            }
            Ok(_) => {
                head.push(byte[0]);
                if head.ends_with(b"\r\n\r\n") {
                    return Ok(Some(head));
                }
                if head.len() > max {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "request head too large",
                    ));
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Parses raw head bytes into a [`RequestHead`].
pub fn parse_request_head(raw: &[u8]) -> Result<RequestHead, String> {
    let text = std::str::from_utf8(raw).map_err(|_| "head is not valid UTF-8".to_string())?;
    let mut lines = text.split("\r\n");

    let request_line = lines.next().ok_or("empty head")?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or("missing method")?.to_string();
    let target = parts.next().ok_or("missing request target")?.to_string();
    let version = parts.next().ok_or("missing HTTP version")?;
    let minor_version = match version {
        "HTTP/1.1" => 1,
        "HTTP/1.0" => 0,
        other => return Err(format!("unsupported version {other}")),
    };

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| format!("malformed header line {line:?}"))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    Ok(RequestHead { method, target, minor_version, headers })
}

/// Turns a request target into an absolute URL.
///
/// Forward-proxy clients send absolute-form targets already; origin-form
/// targets (a bare path) are resolved against the `Host` header.
pub fn absolutize(target: &str, host: Option<&str>) -> Result<String, String> {
    if target.starts_with("http://") || target.starts_with("https://") {
        return Ok(target.to_string());
    }
    match host {
        Some(h) if !h.is_empty() => Ok(format!("http://{h}{target}")),
        _ => Err("origin-form request without Host header".to_string()),
    }
}

/// Extracts the authority (`host[:port]`) from an absolute URL.
pub fn url_authority(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))?;
    let end = rest.find('/').unwrap_or(rest.len());
    Some(&rest[..end])
}

// ── Hop-by-hop filtering ─────────────────────────────────────────────────────

/// Headers that describe a single transport hop and must not be forwarded.
const HOP_BY_HOP: [&str; 7] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

// ── Response serialisation ───────────────────────────────────────────────────

/// Writes the head of `resp` to the client.
///
/// Emits `Content-Length` when the length is known, otherwise marks the body
/// close-delimited with `Connection: close`.
pub fn write_response_head(w: &mut impl Write, resp: &Response) -> io::Result<()> {
    write!(w, "HTTP/1.1 {} {}\r\n", resp.status, resp.reason)?;
    for (name, value) in &resp.headers {
        if is_hop_by_hop(name) || name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        write!(w, "{name}: {value}\r\n")?;
    }
    match resp.content_length {
        Some(n) => write!(w, "Content-Length: {n}\r\n")?,
        None => write!(w, "Connection: close\r\n")?,
    }
    write!(w, "\r\n")?;
    w.flush()
}

/// Writes a short fixed error response (used for 400/502 before a proper
/// [`Response`] exists).
pub fn write_error_response(w: &mut impl Write, status_line: &str, body: &str) -> io::Result<()> {
    write!(
        w,
        "HTTP/1.1 {status_line}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len(),
    )?;
    w.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_head_stops_at_blank_line() {
        let wire = b"GET http://x/ HTTP/1.1\r\nHost: x\r\n\r\nBODY";
        let mut cur = Cursor::new(&wire[..]);
        let head = read_head(&mut cur, MAX_HEAD_BYTES)
            .expect("read")
            .expect("head present");
        assert!(head.ends_with(b"\r\n\r\n"));
        // Body bytes stay unread on the stream.
        let mut rest = Vec::new();
        cur.read_to_end(&mut rest).expect("read rest");
        assert_eq!(rest, b"BODY");
    }

    #[test]
    fn read_head_reports_clean_eof() {
        let mut cur = Cursor::new(&b""[..]);
        assert!(read_head(&mut cur, MAX_HEAD_BYTES).expect("read").is_none());
    }

    #[test]
    fn read_head_rejects_oversized() {
        let wire = vec![b'a'; 128];
        let mut cur = Cursor::new(wire);
        let err = read_head(&mut cur, 64).expect_err("should overflow");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn parse_absolute_form() {
        let head = parse_request_head(
            b"POST http://origin/a?b=1 HTTP/1.1\r\nHost: origin\r\nContent-Length: 12\r\n\r\n",
        )
        .expect("parse");
        assert_eq!(head.method, "POST");
        assert_eq!(head.target, "http://origin/a?b=1");
        assert_eq!(head.minor_version, 1);
        assert_eq!(head.content_length(), Some(12));
        assert_eq!(head.header("HOST"), Some("origin"));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_request_head(b"not http\r\n\r\n").is_err());
        assert!(parse_request_head(b"GET / HTTP/2.0\r\n\r\n").is_err());
    }

    #[test]
    fn absolutize_origin_form() {
        assert_eq!(
            absolutize("/p", Some("origin:8080")).expect("absolutize"),
            "http://origin:8080/p"
        );
        assert!(absolutize("/p", None).is_err());
    }

    #[test]
    fn authority_extraction() {
        assert_eq!(url_authority("http://a.example:81/x/y"), Some("a.example:81"));
        assert_eq!(url_authority("http://a.example"), Some("a.example"));
        assert_eq!(url_authority("ftp://a"), None);
    }

    #[test]
    fn hop_by_hop_headers_are_dropped_on_write() {
        let mut resp = Response::synthetic(200, "OK", "text/plain", "hi");
        resp.headers.push(("Connection".into(), "keep-alive".into()));
        resp.headers.push(("Transfer-Encoding".into(), "chunked".into()));
        let mut out = Vec::new();
        write_response_head(&mut out, &resp).expect("write");
        let text = String::from_utf8(out).expect("utf8");
        assert!(!text.to_lowercase().contains("transfer-encoding"));
        assert!(text.contains("Content-Length: 2"));
    }

    #[test]
    fn forbidden_response_shape() {
        let mut resp = Response::forbidden("SSH tunnel detected");
        assert_eq!(resp.status, 403);
        assert_eq!(resp.header("content-type"), Some("text/plain"));
        assert_eq!(resp.content_length, Some(19));
        let mut body = Vec::new();
        resp.body.read_to_end(&mut body).expect("read body");
        assert_eq!(body, b"SSH tunnel detected");
    }
}
