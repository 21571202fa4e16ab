//! Threaded HTTP/1.1 forward proxy with ordered inspection hooks.
//!
//! The accept loop hands each client connection to its own thread. Per
//! request, the registered request hooks run in order — any of them may
//! short-circuit by returning a synthesized response — then the request is
//! forwarded upstream, the response hooks run in order (each may replace the
//! body with a wrapping reader), and the response is relayed back. `CONNECT`
//! requests pass through the request hooks and then become a raw byte relay.
//!
//! The listener runs nonblocking with a short poll so the shutdown flag is
//! honored promptly; in-flight connection threads finish their current
//! exchange on their own time.

pub mod http;
pub mod rewind;

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::engine::types::{SharedStats, ShutdownFlag};
use crate::logger::{Event, SharedLogger};
use crate::proxy::http::{
    absolutize, is_hop_by_hop, parse_request_head, read_head, url_authority,
    write_error_response, write_response_head, Request, RequestHead, Response, MAX_HEAD_BYTES,
};

/// A request hook. Returning `Some` short-circuits upstream forwarding; the
/// synthesized response is written to the client as-is.
pub type RequestHook = Box<dyn Fn(&mut Request) -> Option<Response> + Send + Sync>;

/// A response hook. Runs before the response is relayed; may mutate headers
/// or replace the body with a wrapping reader.
pub type ResponseHook = Box<dyn Fn(&Request, &mut Response) + Send + Sync>;

pub struct Proxy {
    request_hooks: Vec<RequestHook>,
    response_hooks: Vec<ResponseHook>,
    upstream: reqwest::blocking::Client,
    logger: SharedLogger,
    stats: SharedStats,
    verbose: bool,
}

impl Proxy {
    pub fn new(logger: SharedLogger, stats: SharedStats, verbose: bool) -> Result<Self, String> {
        // Redirects are relayed to the client, not followed, and environment
        // proxy settings are ignored — this process IS the proxy.
        let upstream = reqwest::blocking::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .connect_timeout(Duration::from_secs(10))
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| format!("upstream client: {e}"))?;
        Ok(Self {
            request_hooks: Vec::new(),
            response_hooks: Vec::new(),
            upstream,
            logger,
            stats,
            verbose,
        })
    }

    /// Appends a request hook. Hooks run in registration order.
    pub fn on_request<F>(&mut self, hook: F)
    where
        F: Fn(&mut Request) -> Option<Response> + Send + Sync + 'static,
    {
        self.request_hooks.push(Box::new(hook));
    }

    /// Appends a response hook. Hooks run in registration order.
    pub fn on_response<F>(&mut self, hook: F)
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        self.response_hooks.push(Box::new(hook));
    }

    /// Runs the request chain; the first synthesized response wins.
    pub fn apply_request_hooks(&self, req: &mut Request) -> Option<Response> {
        for hook in &self.request_hooks {
            if let Some(resp) = hook(req) {
                return Some(resp);
            }
        }
        None
    }

    /// Runs the full response chain.
    pub fn apply_response_hooks(&self, req: &Request, resp: &mut Response) {
        for hook in &self.response_hooks {
            hook(req, resp);
        }
    }

    /// Accept loop. Returns on shutdown, or with the bind error on startup
    /// failure.
    pub fn serve(self: Arc<Self>, addr: &str, shutdown: ShutdownFlag) -> io::Result<()> {
        let addr = normalize_addr(addr);
        let listener = TcpListener::bind(&addr)?;
        listener.set_nonblocking(true)?;

        loop {
            if shutdown.load(Ordering::Relaxed) {
                return Ok(());
            }
            match listener.accept() {
                Ok((stream, _)) => {
                    let proxy = Arc::clone(&self);
                    thread::spawn(move || proxy.handle_connection(stream));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    // Wake periodically so the shutdown flag is checked.
                    thread::sleep(Duration::from_millis(200));
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => thread::sleep(Duration::from_millis(200)),
            }
        }
    }

    // ── Per-connection handling ──────────────────────────────────────────────

    fn handle_connection(&self, mut stream: TcpStream) {
        let peer = match stream.peer_addr() {
            Ok(p) => p,
            Err(_) => return,
        };
        let _ = stream.set_nonblocking(false);

        loop {
            let head_bytes = match read_head(&mut stream, MAX_HEAD_BYTES) {
                Ok(Some(bytes)) => bytes,
                Ok(None) => return, // clean close between requests
                Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => return,
                Err(_) => {
                    let _ = write_error_response(
                        &mut stream,
                        "400 Bad Request",
                        "malformed request head",
                    );
                    return;
                }
            };
            let head = match parse_request_head(&head_bytes) {
                Ok(head) => head,
                Err(_) => {
                    let _ = write_error_response(
                        &mut stream,
                        "400 Bad Request",
                        "unparseable request",
                    );
                    return;
                }
            };

            self.stats.requests_total.fetch_add(1, Ordering::Relaxed);

            if head.method.eq_ignore_ascii_case("CONNECT") {
                self.handle_connect(stream, head, peer);
                return;
            }

            let keep_alive = self.handle_exchange(&mut stream, head, peer);
            if !keep_alive {
                return;
            }
        }
    }

    /// One request/response exchange. Returns whether the connection may be
    /// reused for another request.
    fn handle_exchange(
        &self,
        stream: &mut TcpStream,
        head: RequestHead,
        peer: std::net::SocketAddr,
    ) -> bool {
        let url = match absolutize(&head.target, head.header("host")) {
            Ok(url) => url,
            Err(_) => {
                let _ = write_error_response(
                    stream,
                    "400 Bad Request",
                    "request target must be absolute or carry a Host header",
                );
                return false;
            }
        };
        let host = head
            .header("host")
            .map(str::to_string)
            .filter(|h| !h.is_empty())
            .or_else(|| url_authority(&url).map(str::to_string))
            .unwrap_or_default();
        let content_length = head.content_length();

        let mut req = Request {
            method: head.method.to_ascii_uppercase(),
            url,
            host,
            headers: head.headers,
            content_length,
            peer,
            minor_version: head.minor_version,
        };

        if self.verbose {
            self.logger.log(&Event::Request {
                method: &req.method,
                url: &req.url,
                peer: &peer.to_string(),
            });
        }

        let client_wants_close = req.minor_version == 0
            || req
                .header("connection")
                .map(|v| v.eq_ignore_ascii_case("close"))
                .unwrap_or(false);

        // Short-circuit path: a hook synthesized the response. The unread
        // request body is drained so the next head parses at the right spot.
        if let Some(mut resp) = self.apply_request_hooks(&mut req) {
            let pending = req.content_length.unwrap_or(0);
            if drain(stream, pending).is_err() {
                return false;
            }
            if self.relay_response(stream, &req, &mut resp).is_err() {
                return false;
            }
            return !client_wants_close;
        }

        // Forward path: stream the body straight off the socket.
        let body: Box<dyn Read + Send> = match req.content_length {
            Some(n) if n > 0 => match stream.try_clone() {
                Ok(reader) => Box::new(reader.take(n)),
                Err(_) => {
                    let _ = write_error_response(stream, "502 Bad Gateway", "proxy error");
                    return false;
                }
            },
            _ => Box::new(io::empty()),
        };

        let mut resp = match self.forward(&req, body) {
            Ok(resp) => resp,
            Err(msg) => {
                self.logger.log(&Event::Info { message: &msg });
                let _ = write_error_response(stream, "502 Bad Gateway", "upstream failure");
                return false;
            }
        };
        self.stats.responses_total.fetch_add(1, Ordering::Relaxed);

        self.apply_response_hooks(&req, &mut resp);

        let close_delimited = resp.content_length.is_none();
        if self.relay_response(stream, &req, &mut resp).is_err() {
            return false;
        }
        !close_delimited && !client_wants_close
    }

    /// Sends the request upstream and adapts the reply into a [`Response`]
    /// whose body streams from the upstream connection.
    fn forward(&self, req: &Request, body: Box<dyn Read + Send>) -> Result<Response, String> {
        let method = reqwest::Method::from_bytes(req.method.as_bytes())
            .map_err(|e| format!("bad method {:?}: {e}", req.method))?;

        let mut builder = self.upstream.request(method, &req.url);
        for (name, value) in &req.headers {
            // The URL carries the authority and reqwest frames the body.
            if is_hop_by_hop(name)
                || name.eq_ignore_ascii_case("host")
                || name.eq_ignore_ascii_case("content-length")
            {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(n) = req.content_length {
            if n > 0 {
                builder = builder.body(reqwest::blocking::Body::sized(body, n));
            }
        }

        let upstream = builder
            .send()
            .map_err(|e| format!("upstream request failed: {e}"))?;

        let status = upstream.status();
        let mut headers = Vec::new();
        for (name, value) in upstream.headers() {
            if is_hop_by_hop(name.as_str()) {
                continue;
            }
            if let Ok(v) = value.to_str() {
                headers.push((name.as_str().to_string(), v.to_string()));
            }
        }
        let content_length = upstream.content_length();

        Ok(Response {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            content_length,
            body: Box::new(upstream),
        })
    }

    /// Writes head and body to the client with the right framing.
    fn relay_response(
        &self,
        stream: &mut TcpStream,
        req: &Request,
        resp: &mut Response,
    ) -> io::Result<()> {
        write_response_head(stream, resp)?;

        let bodyless = req.method == "HEAD"
            || resp.status == 204
            || resp.status == 304
            || resp.status < 200;
        if !bodyless {
            match resp.content_length {
                Some(n) => {
                    io::copy(&mut (&mut resp.body).take(n), stream)?;
                }
                None => {
                    io::copy(&mut resp.body, stream)?;
                }
            }
        }
        stream.flush()
    }

    /// `CONNECT` handling: request hooks first (the gate may refuse the
    /// tunnel), then a raw bidirectional relay.
    fn handle_connect(&self, mut stream: TcpStream, head: RequestHead, peer: std::net::SocketAddr) {
        let authority = head.target.clone();
        let host = head
            .header("host")
            .map(str::to_string)
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| authority.clone());

        let mut req = Request {
            method: "CONNECT".to_string(),
            url: authority.clone(),
            host,
            headers: head.headers,
            content_length: None,
            peer,
            minor_version: head.minor_version,
        };

        if self.verbose {
            self.logger.log(&Event::Request {
                method: "CONNECT",
                url: &req.url,
                peer: &peer.to_string(),
            });
        }

        if let Some(mut resp) = self.apply_request_hooks(&mut req) {
            let _ = self.relay_response(&mut stream, &req, &mut resp);
            return;
        }

        let target = if authority.contains(':') {
            authority
        } else {
            format!("{authority}:443")
        };
        let upstream = match TcpStream::connect(&target) {
            Ok(upstream) => upstream,
            Err(_) => {
                let _ = write_error_response(
                    &mut stream,
                    "502 Bad Gateway",
                    "upstream connect failed",
                );
                return;
            }
        };

        if stream
            .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
            .is_err()
        {
            return;
        }

        tunnel(stream, upstream);
    }
}

/// Relays bytes in both directions until either side closes.
fn tunnel(client: TcpStream, upstream: TcpStream) {
    let (mut client_read, mut upstream_write) = match (client.try_clone(), upstream.try_clone()) {
        (Ok(c), Ok(u)) => (c, u),
        _ => return,
    };
    let forward = thread::spawn(move || {
        let _ = io::copy(&mut client_read, &mut upstream_write);
        let _ = upstream_write.shutdown(Shutdown::Write);
    });

    let mut upstream_read = upstream;
    let mut client_write = client;
    let _ = io::copy(&mut upstream_read, &mut client_write);
    let _ = client_write.shutdown(Shutdown::Write);
    let _ = forward.join();
}

/// Discards exactly `n` unread body bytes from the client socket.
fn drain(stream: &mut TcpStream, n: u64) -> io::Result<()> {
    if n > 0 {
        io::copy(&mut std::io::Read::by_ref(stream).take(n), &mut io::sink())?;
    }
    Ok(())
}

/// Accepts bare `:port` listen addresses by binding all interfaces.
pub fn normalize_addr(addr: &str) -> String {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    }
}
