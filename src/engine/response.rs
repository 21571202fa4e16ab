//! Response-side detectors.
//!
//! These hooks run in registration order on every relayed response. The two
//! body-reading detectors (content-type sniffer, banner scanner) work as
//! side-channels on the forwarded stream: the sniffer peeks through a
//! rewindable reader and puts every byte back, the scanner forwards reads
//! unchanged while looking at them. Neither buffers, delays, or reorders the
//! payload the client receives.

use std::io::{self, Read};
use std::mem;

use crate::engine::config::*;
use crate::engine::scanner::BannerScanner;
use crate::engine::sniff;
use crate::engine::SuspicionEngine;
use crate::logger::Event;
use crate::proxy::http::{Request, Response};
use crate::proxy::rewind::RewindReader;

impl SuspicionEngine {
    /// Server-side SSH key-exchange size matching.
    ///
    /// Zero-length responses skip evaluation; responses of unknown length are
    /// evaluated (they can never match an expected size, but once the
    /// sequence has drained they still re-trigger the completion bonus).
    pub fn track_handshake_response(&self, req: &Request, resp: &mut Response) {
        if resp.content_length == Some(0) {
            return;
        }
        let len = resp.content_length.unwrap_or(u64::MAX);

        let session = self.session(req);
        let mut session = session.lock().expect("session mutex poisoned");
        if session.handshake.saw_response(len) {
            session.score += SCORE_HANDSHAKE;
            let first = !session.handshake_logged_server;
            session.handshake_logged_server = true;
            drop(session);
            if first {
                self.bump_alert();
                self.logger().log(&Event::HandshakeComplete {
                    host: &req.host,
                    ip: &req.peer.ip().to_string(),
                    direction: "server",
                });
            }
        }
    }

    /// Response side of the keystroke-framing ladder, and its score rule.
    ///
    /// Interactive SSH over a tunnel produces long runs of 36- and 76-byte
    /// bodies (channel-data framing around single keystrokes). Once the
    /// ladder has reached its minimum height, every larger response — screen
    /// output following keystrokes — is scored.
    pub fn track_keystroke_response(&self, req: &Request, resp: &mut Response) {
        let session = self.session(req);
        let mut session = session.lock().expect("session mutex poisoned");

        if let Some(len) = resp.content_length {
            if KEYSTROKE_SIZES.contains(&len) {
                if session.lssh_conns == 0 {
                    session.lssh_conns = 1;
                }
                if session.lssh_conns >= 2 {
                    session.lssh_conns += 1;
                }
            }

            if len > KEYSTROKE_LARGE_RESPONSE && session.lssh_conns >= KEYSTROKE_MIN_RUNG {
                session.score += SCORE_KEYSTROKE;
                let rung = session.lssh_conns;
                drop(session);
                self.bump_alert();
                self.logger().log(&Event::Keystroke {
                    host: &req.host,
                    ip: &req.peer.ip().to_string(),
                    rung,
                });
            }
        }
    }

    /// Zero-length and echo rules over declared body lengths.
    ///
    /// A response that exactly echoes the request's body length suggests raw
    /// byte-for-byte relaying underneath; empty responses (and the empty-POST
    /// rule on the request side) catch the polling half of a tunnel. Unknown
    /// lengths on either side never fire the echo rule.
    pub fn track_body_lengths(&self, req: &Request, resp: &mut Response) {
        let session = self.session(req);
        match resp.content_length {
            Some(0) => {
                session.lock().expect("session mutex poisoned").score += SCORE_EMPTY_RESPONSE;
            }
            Some(len) if req.content_length == Some(len) => {
                session.lock().expect("session mutex poisoned").score += SCORE_ECHO;
                self.bump_alert();
                self.logger().log(&Event::Echo {
                    host: &req.host,
                    ip: &req.peer.ip().to_string(),
                    length: len,
                });
            }
            _ => {}
        }
    }

    /// Declared-versus-sniffed content-type comparison.
    ///
    /// Peeks at the leading bytes through a rewindable reader, rewinds, and
    /// installs the reader as the new body, so the client-visible stream is
    /// byte-identical to the original. Responses of unknown length are
    /// skipped. A peek read error abandons the sniff; the recorded prefix is
    /// still replayed and the error resurfaces on the next body read.
    pub fn sniff_content_type(&self, req: &Request, resp: &mut Response) {
        let declared_len = match resp.content_length {
            Some(n) if n > 0 => n,
            _ => return,
        };

        let body = mem::replace(&mut resp.body, Box::new(io::empty()));
        let mut reader = RewindReader::new(body);

        let want = SNIFF_PEEK_LEN.min(declared_len as usize);
        let mut peek = vec![0u8; want];
        let mut filled = 0;
        while filled < want {
            match reader.read(&mut peek[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(_) => break,
            }
        }
        reader.rewind();
        resp.body = Box::new(reader);

        let sniffed = sniff::detect_content_type(&peek[..filled]);
        let declared = resp.header("content-type").unwrap_or("");
        let sniffed_main = sniff::strip_parameters(sniffed);
        let declared_main = sniff::strip_parameters(declared);

        if !sniffed_main.eq_ignore_ascii_case(declared_main) {
            let session = self.session(req);
            session.lock().expect("session mutex poisoned").score += SCORE_CONTENT_TYPE_MISMATCH;
        }
    }

    /// Wraps the body in the streaming banner scanner.
    ///
    /// Installed after the sniffer so the scanner sits outermost and sees the
    /// replayed prefix along with everything after it.
    pub fn install_banner_scanner(&self, req: &Request, resp: &mut Response) {
        let session = self.session(req);
        let body = mem::replace(&mut resp.body, Box::new(io::empty()));
        resp.body = Box::new(BannerScanner::new(
            body,
            session,
            self.logger().clone(),
            self.stats().clone(),
            req.host.clone(),
            req.peer.ip().to_string(),
        ));
    }

    /// Replays GETs and compares status codes.
    ///
    /// The budget is decremented under the session lock, but the network call
    /// runs with the lock released so a slow replay never stalls concurrent
    /// detectors on the same flow. Replay failure is a non-signal.
    pub fn validate_replay(&self, req: &Request, resp: &mut Response) {
        let validator = match self.replay_validator() {
            Some(v) => v,
            None => return,
        };
        if req.method != "GET" {
            return;
        }

        let session = self.session(req);
        {
            let mut session = session.lock().expect("session mutex poisoned");
            if session.replays_left == 0 {
                return;
            }
            session.replays_left -= 1;
        }

        let replayed = match validator.replay_status(&req.url) {
            Some(status) => status,
            None => return,
        };

        if replayed != resp.status {
            session.lock().expect("session mutex poisoned").score += SCORE_REPLAY_MISMATCH;
            self.bump_alert();
            self.logger().log(&Event::ReplayMismatch {
                host: &req.host,
                ip: &req.peer.ip().to_string(),
                observed: resp.status,
                replayed,
            });
        }
    }
}
