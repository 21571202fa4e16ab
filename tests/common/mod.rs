//! Shared builders for the integration tests.
//!
//! All tests drive the engine through the proxy's public hook-chain API with
//! synthetic requests and responses; nothing here touches the network, so
//! every harness disables the replay validator.
#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;

use tunwatch::engine::types::{ProxyStats, SharedStats, Tuning};
use tunwatch::engine::SuspicionEngine;
use tunwatch::logger::Logger;
use tunwatch::proxy::http::{Request, Response};
use tunwatch::proxy::Proxy;

pub struct Harness {
    pub engine: Arc<SuspicionEngine>,
    pub proxy: Proxy,
    pub stats: SharedStats,
}

pub fn harness() -> Harness {
    harness_with(Tuning { replay_limit: 0, ..Tuning::default() })
}

pub fn harness_with(tuning: Tuning) -> Harness {
    let logger = Arc::new(Logger::new(false, None).expect("logger"));
    let stats = ProxyStats::new();
    let engine = Arc::new(
        SuspicionEngine::new(tuning, Arc::clone(&logger), Arc::clone(&stats)).expect("engine"),
    );
    let mut proxy = Proxy::new(logger, Arc::clone(&stats), false).expect("proxy");
    Arc::clone(&engine).register(&mut proxy);
    Harness { engine, proxy, stats }
}

pub fn request(
    method: &str,
    host: &str,
    ip: &str,
    content_length: Option<u64>,
    headers: &[(&str, &str)],
) -> Request {
    Request {
        method: method.to_string(),
        url: format!("http://{host}/"),
        host: host.to_string(),
        headers: headers
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect(),
        content_length,
        peer: format!("{ip}:40000").parse().expect("peer addr"),
        minor_version: 1,
    }
}

pub fn response(
    status: u16,
    content_length: Option<u64>,
    headers: &[(&str, &str)],
    body: Vec<u8>,
) -> Response {
    Response {
        status,
        reason: "OK".to_string(),
        headers: headers
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect(),
        content_length,
        body: Box::new(Cursor::new(body)),
    }
}

/// A plain-text response whose declared type matches what the sniffer will
/// detect, so length-based scenarios stay free of sniffer noise.
pub fn text_response(content_length: Option<u64>, body: &[u8]) -> Response {
    response(
        200,
        content_length,
        &[("Content-Type", "text/plain; charset=utf-8")],
        body.to_vec(),
    )
}

/// Current score of the `(host, ip)` flow.
pub fn score(harness: &Harness, host: &str, ip: &str) -> i64 {
    let probe = request("GET", host, ip, None, &[]);
    let session = harness.engine.session(&probe);
    let score = session.lock().expect("session lock").score;
    score
}

/// A user agent every classifier path treats as benign.
pub const BROWSER_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                              (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
