//! Request-side detectors and the enforcement gate.
//!
//! Every hook here holds the session mutex for the full read-then-write
//! update, so overlapping requests on one flow serialise cleanly. Detectors
//! only ever add to the score; the single subtraction lives in the decay
//! loop. The gate is a pure read.

use crate::engine::config::*;
use crate::engine::ua;
use crate::engine::SuspicionEngine;
use crate::logger::Event;
use crate::proxy::http::{Request, Response};
use std::sync::atomic::Ordering;
use std::time::Instant;

impl SuspicionEngine {
    /// One-shot user-agent classification.
    ///
    /// An empty browser string is worth more than a known-suspicious one: no
    /// agent at all is rarer in legitimate traffic than a library default.
    /// Recognized, unsuspicious browsers leave the one-shot flag unset so a
    /// later request with a worse agent can still be scored.
    pub fn classify_user_agent(&self, req: &Request) {
        let session = self.session(req);
        let mut session = session.lock().expect("session mutex poisoned");
        if session.seen_user_agent_score {
            return;
        }

        let raw = req.header("user-agent").unwrap_or("");
        let browser = ua::browser_name(self.ua_parser(), raw);

        let delta = if browser.is_empty() {
            SCORE_MISSING_AGENT
        } else if ua::is_suspicious(&browser) {
            SCORE_SUSPICIOUS_AGENT
        } else {
            return;
        };

        session.score += delta;
        session.seen_user_agent_score = true;
        drop(session);

        self.bump_alert();
        self.logger().log(&Event::AgentFlagged {
            host: &req.host,
            ip: &req.peer.ip().to_string(),
            browser: &browser,
            delta,
        });
    }

    /// Per-request volume and method bookkeeping.
    ///
    /// Counters are monotone; the threshold penalties re-fire on every
    /// request for as long as their condition holds, but each alert is logged
    /// only at the crossing so the log stays readable while the score keeps
    /// climbing.
    pub fn track_volume(&self, req: &Request) {
        let ip = req.peer.ip().to_string();
        let session = self.session(req);
        let mut session = session.lock().expect("session mutex poisoned");
        session.last_seen = Instant::now();

        session.http_requests += 1;
        if session.http_requests > REQUEST_FLOOD_THRESHOLD {
            session.score += SCORE_REQUEST_FLOOD;
            if session.http_requests == REQUEST_FLOOD_THRESHOLD + 1 {
                self.bump_alert();
                self.logger().log(&Event::RequestFlood {
                    host: &req.host,
                    ip: &ip,
                    requests: session.http_requests,
                });
            }
        }

        match req.method.as_str() {
            "GET" => session.http_gets += 1,
            "POST" => {
                session.http_posts += 1;
                // A POST that carries nothing is a poll, not a submission.
                if req.content_length.unwrap_or(0) == 0 {
                    session.score += SCORE_EMPTY_POST;
                }
            }
            "CONNECT" => session.http_connects += 1,
            _ => {}
        }

        if session.http_posts > session.http_gets + POST_IMBALANCE_MARGIN {
            session.score += SCORE_POST_IMBALANCE;
            if session.http_posts == session.http_gets + POST_IMBALANCE_MARGIN + 1 {
                self.bump_alert();
                self.logger().log(&Event::MethodImbalance {
                    host: &req.host,
                    ip: &ip,
                    posts: session.http_posts,
                    gets: session.http_gets,
                });
            }
        }

        if session.http_connects > CONNECT_FLOOD_THRESHOLD {
            session.score += SCORE_CONNECT_FLOOD;
            if session.http_connects == CONNECT_FLOOD_THRESHOLD + 1 {
                self.bump_alert();
                self.logger().log(&Event::ConnectFlood {
                    host: &req.host,
                    ip: &ip,
                    connects: session.http_connects,
                });
            }
        }
    }

    /// Client-side SSH key-exchange size matching.
    ///
    /// A request without a body cannot be a key-exchange packet, so
    /// zero-length (and bodyless) requests skip evaluation entirely.
    pub fn track_handshake_request(&self, req: &Request) {
        let len = req.content_length.unwrap_or(0);
        if len == 0 {
            return;
        }

        let session = self.session(req);
        let mut session = session.lock().expect("session mutex poisoned");
        if session.handshake.saw_request(len) {
            session.score += SCORE_HANDSHAKE;
            let first = !session.handshake_logged_client;
            session.handshake_logged_client = true;
            drop(session);
            if first {
                self.bump_alert();
                self.logger().log(&Event::HandshakeComplete {
                    host: &req.host,
                    ip: &req.peer.ip().to_string(),
                    direction: "client",
                });
            }
        }
    }

    /// Request side of the keystroke-framing ladder.
    ///
    /// The ladder's first rungs demand response, then request, then response
    /// before the counter free-runs; the exact rule set encodes the observed
    /// traffic shape of the tunnels being targeted, so it is treated as a
    /// fixed algorithm rather than something to smooth over.
    pub fn track_keystroke_request(&self, req: &Request) {
        let len = req.content_length.unwrap_or(0);
        if !KEYSTROKE_SIZES.contains(&len) {
            return;
        }
        let session = self.session(req);
        let mut session = session.lock().expect("session mutex poisoned");
        if session.lssh_conns == 1 {
            session.lssh_conns = 2;
        }
        if session.lssh_conns >= 3 {
            session.lssh_conns += 1;
        }
    }

    /// The enforcement gate. Registered last so it sees the contributions of
    /// every detector ahead of it, including this request's own.
    ///
    /// Enforcement is per-request, not sticky: once decay brings the flow
    /// back under the threshold, requests pass again.
    pub fn enforce(&self, req: &Request) -> Option<Response> {
        let session = self.session(req);
        let score = session.lock().expect("session mutex poisoned").score;
        if score < self.tuning().block_threshold {
            return None;
        }

        self.stats().blocked_total.fetch_add(1, Ordering::Relaxed);
        self.logger().log(&Event::Blocked {
            host: &req.host,
            ip: &req.peer.ip().to_string(),
            score,
        });
        Some(Response::forbidden(BLOCK_BODY))
    }
}
