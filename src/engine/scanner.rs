//! Streaming scan of response bodies for the SSH banner.
//!
//! [`BannerScanner`] wraps a response body and forwards every read unchanged
//! while checking each buffer for the literal `SSH-` sequence. The scan is
//! per-buffer and stateless: a banner split across two reads is not detected.
//! An acknowledged trade-off — the wrapper carries no state between reads,
//! and the four-byte banner sits at the very front of real SSH streams.
//!
//! On the first hit anywhere on the flow the session's banner flag is set and
//! the banner score is awarded, exactly once per session. Errors from the
//! underlying body pass through untouched, and dropping the scanner drops
//! (closes) the underlying body.

use std::io::{self, Read};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use crate::engine::config::{SCORE_BANNER, SSH_BANNER};
use crate::engine::types::{Session, SharedStats};
use crate::logger::{Event, SharedLogger};

pub struct BannerScanner<R> {
    inner: R,
    session: Arc<Mutex<Session>>,
    logger: SharedLogger,
    stats: SharedStats,
    host: String,
    ip: String,
}

impl<R: Read> BannerScanner<R> {
    pub fn new(
        inner: R,
        session: Arc<Mutex<Session>>,
        logger: SharedLogger,
        stats: SharedStats,
        host: String,
        ip: String,
    ) -> Self {
        Self { inner, session, logger, stats, host, ip }
    }

    fn mark_banner(&self) {
        let mut session = self.session.lock().expect("session mutex poisoned");
        if session.seen_ssh_banner {
            return;
        }
        session.seen_ssh_banner = true;
        session.score += SCORE_BANNER;
        drop(session);

        self.stats.alerts_emitted.fetch_add(1, Ordering::Relaxed);
        self.logger.log(&Event::Banner { host: &self.host, ip: &self.ip });
    }
}

impl<R: Read> Read for BannerScanner<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if contains(&buf[..n], SSH_BANNER) {
            self.mark_banner();
        }
        Ok(n)
    }
}

/// Naive subslice search; the needle is four bytes, so nothing fancier is
/// warranted.
fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.len() >= needle.len() && haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::ProxyStats;
    use crate::logger::Logger;
    use std::io::Cursor;
    use std::time::Instant;

    fn scanner(body: &[u8]) -> (BannerScanner<Cursor<Vec<u8>>>, Arc<Mutex<Session>>) {
        let session = Arc::new(Mutex::new(Session::new(Instant::now(), 0)));
        let logger = Arc::new(Logger::new(false, None).expect("logger"));
        let s = BannerScanner::new(
            Cursor::new(body.to_vec()),
            Arc::clone(&session),
            logger,
            ProxyStats::new(),
            "x".into(),
            "1.1.1.1".into(),
        );
        (s, session)
    }

    #[test]
    fn forwards_bytes_unchanged() {
        let payload = b"no banner here, just bytes \x00\xff\x7f";
        let (mut s, _) = scanner(payload);
        let mut out = Vec::new();
        s.read_to_end(&mut out).expect("read");
        assert_eq!(out, payload);
    }

    #[test]
    fn banner_scores_exactly_once() {
        let (mut s, session) = scanner(b"SSH-2.0-OpenSSH_9.6 and later SSH-2.0 again");
        let mut out = Vec::new();
        s.read_to_end(&mut out).expect("read");
        let locked = session.lock().expect("lock");
        assert!(locked.seen_ssh_banner);
        assert_eq!(locked.score, SCORE_BANNER);
    }

    #[test]
    fn second_body_with_banner_adds_nothing() {
        let session = {
            let (mut s, session) = scanner(b"SSH-2.0-OpenSSH");
            io::copy(&mut s, &mut io::sink()).expect("copy");
            session
        };
        assert_eq!(session.lock().expect("lock").score, SCORE_BANNER);

        // A second scanner sharing the session sees the flag already set.
        let logger = Arc::new(Logger::new(false, None).expect("logger"));
        let mut again = BannerScanner::new(
            Cursor::new(b"SSH-2.0-OpenSSH".to_vec()),
            Arc::clone(&session),
            logger,
            ProxyStats::new(),
            "x".into(),
            "1.1.1.1".into(),
        );
        io::copy(&mut again, &mut io::sink()).expect("copy");
        assert_eq!(session.lock().expect("lock").score, SCORE_BANNER);
    }

    #[test]
    fn banner_split_across_reads_is_missed() {
        // The per-buffer scan is stateless on purpose; pin that behavior.
        let (mut s, session) = scanner(b"SSH-");
        let mut half = [0u8; 2];
        s.read_exact(&mut half).expect("first half");
        s.read_exact(&mut half).expect("second half");
        assert!(!session.lock().expect("lock").seen_ssh_banner);
    }

    #[test]
    fn subslice_search() {
        assert!(contains(b"xxSSH-yy", b"SSH-"));
        assert!(contains(b"SSH-", b"SSH-"));
        assert!(!contains(b"SSH", b"SSH-"));
        assert!(!contains(b"", b"SSH-"));
    }
}
