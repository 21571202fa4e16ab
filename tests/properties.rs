//! Property-based tests for the scoring engine's round-trip and
//! monotonicity guarantees.

mod common;

use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use proptest::prelude::*;

use common::*;
use tunwatch::engine::handshake::HandshakeMatcher;
use tunwatch::engine::scanner::BannerScanner;
use tunwatch::engine::types::{ProxyStats, Session};
use tunwatch::logger::Logger;
use tunwatch::proxy::rewind::RewindReader;

fn quiet_scanner(payload: Vec<u8>) -> BannerScanner<Cursor<Vec<u8>>> {
    let session = Arc::new(Mutex::new(Session::new(Instant::now(), 0)));
    let logger = Arc::new(Logger::new(false, None).expect("logger"));
    BannerScanner::new(
        Cursor::new(payload),
        session,
        logger,
        ProxyStats::new(),
        "x".into(),
        "1.1.1.1".into(),
    )
}

proptest! {
    /// The banner scanner forwards bytes byte-identical to the unwrapped
    /// body, whatever the payload and however reads are chunked.
    #[test]
    fn scanner_forwarding_is_lossless(
        payload in prop::collection::vec(any::<u8>(), 0..2048),
        chunk in 1usize..64,
    ) {
        let mut scanner = quiet_scanner(payload.clone());
        let mut out = Vec::new();
        let mut buf = vec![0u8; chunk];
        loop {
            let n = scanner.read(&mut buf).expect("scan read");
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        prop_assert_eq!(out, payload);
    }

    /// After peeking and rewinding, a full read of the wrapper yields bytes
    /// identical to an unwrapped read, for any peek length.
    #[test]
    fn rewind_round_trips(
        payload in prop::collection::vec(any::<u8>(), 0..2048),
        peek in 0usize..600,
    ) {
        let mut reader = RewindReader::new(Cursor::new(payload.clone()));
        let mut scratch = vec![0u8; peek];
        let mut filled = 0;
        while filled < peek {
            match reader.read(&mut scratch[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) => panic!("peek read failed: {e}"),
            }
        }
        reader.rewind();

        let mut out = Vec::new();
        reader.read_to_end(&mut out).expect("full read");
        prop_assert_eq!(out, payload);
    }

    /// Handshake queues never grow, whatever sizes are observed.
    #[test]
    fn handshake_queues_are_monotonically_non_growing(
        sizes in prop::collection::vec(any::<u64>(), 0..64),
    ) {
        let mut matcher = HandshakeMatcher::new();
        let mut server = matcher.server_pending();
        let mut client = matcher.client_pending();
        for size in sizes {
            matcher.saw_response(size);
            matcher.saw_request(size);
            prop_assert!(matcher.server_pending() <= server);
            prop_assert!(matcher.client_pending() <= client);
            server = matcher.server_pending();
            client = matcher.client_pending();
        }
    }
}

proptest! {
    // Engine-backed properties construct a full harness per case; keep the
    // case count modest.
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Request and method counters only ever move forward, and the score
    /// never decreases through the request hook chain (only decay subtracts).
    #[test]
    fn request_hooks_never_decrease_counters_or_score(
        methods in prop::collection::vec(0u8..4, 1..40),
        lengths in prop::collection::vec(prop::option::of(0u64..100), 1..40),
    ) {
        let h = harness();
        let mut last_requests = 0u64;
        let mut last_score = 0i64;

        for (m, len) in methods.iter().zip(lengths.iter().cycle()) {
            let method = match m {
                0 => "GET",
                1 => "POST",
                2 => "CONNECT",
                _ => "PUT",
            };
            let mut req = request(method, "x", "1.1.1.1", *len, &[]);
            h.proxy.apply_request_hooks(&mut req);

            let session = h.engine.session(&request("GET", "x", "1.1.1.1", None, &[]));
            let s = session.lock().expect("lock");
            prop_assert_eq!(s.http_requests, last_requests + 1);
            prop_assert!(s.score >= last_score);
            last_requests = s.http_requests;
            last_score = s.score;
        }
    }
}
