//! Per-flow suspicion engine.
//!
//! Requests and responses enter through two ordered hook chains registered
//! with the proxy substrate. Each detector derives the flow key from the
//! event, fetches (or lazily creates) the session for that key, updates its
//! own state on the session under the session mutex, and adds points when its
//! condition fires. A background decay loop forgets stale evidence, a reaper
//! drops idle sessions, and the enforcement gate — the last request hook —
//! turns a high score into a synthesized rejection.

pub mod config;
pub mod decay;
pub mod handshake;
pub mod replay;
pub mod request;
pub mod response;
pub mod scanner;
pub mod sniff;
pub mod store;
pub mod types;
pub mod ua;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use woothee::parser::Parser;

use crate::engine::replay::ReplayValidator;
use crate::engine::store::SessionStore;
use crate::engine::types::{FlowKey, Session, SharedStats, ShutdownFlag, Tuning};
use crate::logger::SharedLogger;
use crate::proxy::http::Request;
use crate::proxy::Proxy;

pub struct SuspicionEngine {
    store: Arc<SessionStore>,
    tuning: Tuning,
    logger: SharedLogger,
    stats: SharedStats,
    ua_parser: Parser,
    replay: Option<ReplayValidator>,
}

impl SuspicionEngine {
    pub fn new(
        tuning: Tuning,
        logger: SharedLogger,
        stats: SharedStats,
    ) -> Result<Self, String> {
        let replay = if tuning.replay_limit > 0 {
            Some(ReplayValidator::new()?)
        } else {
            None
        };
        Ok(Self {
            store: Arc::new(SessionStore::new()),
            tuning,
            logger,
            stats,
            ua_parser: Parser::new(),
            replay,
        })
    }

    /// Registers every detector with the substrate, in fixed order.
    ///
    /// Request chain: user-agent classifier, volume/method counters, client
    /// handshake matcher, keystroke ladder, and finally the enforcement gate
    /// (so the gate sees what this request itself contributed). Response
    /// chain: server handshake matcher, keystroke detector, body-length
    /// rules, content-type sniffer, banner scanner, replay validator — the
    /// sniffer installs its rewound reader before the scanner wraps it, so
    /// the scanner sees every byte the client will receive.
    pub fn register(self: Arc<Self>, proxy: &mut Proxy) {
        let e = Arc::clone(&self);
        proxy.on_request(move |req| {
            e.classify_user_agent(req);
            None
        });
        let e = Arc::clone(&self);
        proxy.on_request(move |req| {
            e.track_volume(req);
            None
        });
        let e = Arc::clone(&self);
        proxy.on_request(move |req| {
            e.track_handshake_request(req);
            None
        });
        let e = Arc::clone(&self);
        proxy.on_request(move |req| {
            e.track_keystroke_request(req);
            None
        });
        let e = Arc::clone(&self);
        proxy.on_request(move |req| e.enforce(req));

        let e = Arc::clone(&self);
        proxy.on_response(move |req, resp| e.track_handshake_response(req, resp));
        let e = Arc::clone(&self);
        proxy.on_response(move |req, resp| e.track_keystroke_response(req, resp));
        let e = Arc::clone(&self);
        proxy.on_response(move |req, resp| e.track_body_lengths(req, resp));
        let e = Arc::clone(&self);
        proxy.on_response(move |req, resp| e.sniff_content_type(req, resp));
        let e = Arc::clone(&self);
        proxy.on_response(move |req, resp| e.install_banner_scanner(req, resp));
        let e = Arc::clone(&self);
        proxy.on_response(move |req, resp| e.validate_replay(req, resp));
    }

    /// Starts the decay loop and the idle-session reaper.
    pub fn start(&self, shutdown: ShutdownFlag) -> Vec<JoinHandle<()>> {
        vec![
            decay::spawn_decay_thread(
                Arc::clone(&self.store),
                self.tuning.decay_amount,
                self.tuning.decay_interval,
                Arc::clone(&shutdown),
            ),
            decay::spawn_reaper_thread(
                Arc::clone(&self.store),
                self.tuning.session_timeout,
                self.tuning.evict_interval,
                Arc::clone(&shutdown),
                Arc::clone(&self.logger),
            ),
        ]
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub(crate) fn logger(&self) -> &SharedLogger {
        &self.logger
    }

    pub(crate) fn stats(&self) -> &SharedStats {
        &self.stats
    }

    pub(crate) fn ua_parser(&self) -> &Parser {
        &self.ua_parser
    }

    pub(crate) fn replay_validator(&self) -> Option<&ReplayValidator> {
        self.replay.as_ref()
    }

    /// Fetches the session for a request's flow, creating it on first sight.
    pub fn session(&self, req: &Request) -> Arc<Mutex<Session>> {
        let key = FlowKey::new(&req.host, &req.peer);
        let limit = self.tuning.replay_limit;
        let (session, created) = self
            .store
            .get_or_create(key, || Session::new(Instant::now(), limit));
        if created {
            self.stats.sessions_created.fetch_add(1, Ordering::Relaxed);
        }
        session
    }

    pub(crate) fn bump_alert(&self) {
        self.stats.alerts_emitted.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared builders for the engine unit tests.

    use std::io::Cursor;
    use std::sync::Arc;

    use crate::engine::types::{ProxyStats, Tuning};
    use crate::engine::SuspicionEngine;
    use crate::logger::Logger;
    use crate::proxy::http::{Request, Response};

    /// An engine with the replay validator disabled so tests never touch the
    /// network.
    pub fn quiet_engine() -> Arc<SuspicionEngine> {
        let tuning = Tuning { replay_limit: 0, ..Tuning::default() };
        let logger = Arc::new(Logger::new(false, None).expect("logger"));
        Arc::new(SuspicionEngine::new(tuning, logger, ProxyStats::new()).expect("engine"))
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
}
