//! Background score decay and idle-session eviction.
//!
//! Two housekeeping threads run for the lifetime of the process:
//!
//! - the **decay loop** subtracts a fixed amount from every session's score
//!   on a wall-clock interval, so one-off anomalies are forgotten instead of
//!   accumulating forever. Scores are not clamped and may go negative.
//! - the **reaper** removes sessions whose last request-side activity is
//!   older than the idle timeout. Score is no indicator of liveness (decay
//!   drives it arbitrarily negative), so eviction keys on `last_seen`.
//!
//! Both threads sleep in one-second slices so the shutdown flag is honored
//! promptly, and both take the store snapshot/retain path: shard locks are
//! held only briefly, session mutexes one at a time.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::engine::store::SessionStore;
use crate::engine::types::ShutdownFlag;
use crate::logger::{Event, SharedLogger};

/// Applies one decay tick: every session loses `amount` points.
pub fn decay_all(store: &SessionStore, amount: i64) {
    for session in store.snapshot() {
        session.lock().expect("session mutex poisoned").score -= amount;
    }
}

/// Removes sessions idle longer than `timeout`. Returns how many were evicted.
pub fn evict_idle(store: &SessionStore, timeout: Duration, now: Instant) -> usize {
    let before = store.len();
    store.retain(|_, session| {
        let session = session.lock().expect("session mutex poisoned");
        now.duration_since(session.last_seen) < timeout
    });
    before - store.len()
}

/// Spawns the decay loop thread.
pub fn spawn_decay_thread(
    store: Arc<SessionStore>,
    amount: i64,
    interval: Duration,
    shutdown: ShutdownFlag,
) -> thread::JoinHandle<()> {
    thread::spawn(move || loop {
        if sleep_interruptible(interval, &shutdown) {
            return;
        }
        decay_all(&store, amount);
    })
}

/// Spawns the idle-session reaper thread.
pub fn spawn_reaper_thread(
    store: Arc<SessionStore>,
    timeout: Duration,
    interval: Duration,
    shutdown: ShutdownFlag,
    logger: SharedLogger,
) -> thread::JoinHandle<()> {
    thread::spawn(move || loop {
        if sleep_interruptible(interval, &shutdown) {
            return;
        }
        let evicted = evict_idle(&store, timeout, Instant::now());
        if evicted > 0 {
            logger.log(&Event::Evicted { count: evicted, remaining: store.len() });
        }
    })
}

/// Sleeps for `total` in one-second slices. Returns `true` when shutdown was
/// requested during the wait.
fn sleep_interruptible(total: Duration, shutdown: &ShutdownFlag) -> bool {
    let mut slept = Duration::ZERO;
    while slept < total {
        if shutdown.load(Ordering::Relaxed) {
            return true;
        }
        let slice = Duration::from_secs(1).min(total - slept);
        thread::sleep(slice);
        slept += slice;
    }
    shutdown.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{FlowKey, Session};

    fn key(host: &str, ip: &str) -> FlowKey {
        FlowKey { host: host.into(), client_ip: ip.into() }
    }

    #[test]
    fn decay_subtracts_exactly_once_per_session() {
        let store = SessionStore::new();
        let (a, _) = store.get_or_create(key("a", "1.1.1.1"), || {
            let mut s = Session::new(Instant::now(), 0);
            s.score = 120;
            s
        });
        let (b, _) = store.get_or_create(key("b", "1.1.1.1"), || Session::new(Instant::now(), 0));

        decay_all(&store, 20);
        assert_eq!(a.lock().expect("lock").score, 100);
        assert_eq!(b.lock().expect("lock").score, -20);

        decay_all(&store, 20);
        assert_eq!(a.lock().expect("lock").score, 80);
        // Not clamped: scores go negative.
        assert_eq!(b.lock().expect("lock").score, -40);
    }

    #[test]
    fn reaper_removes_only_idle_sessions() {
        let store = SessionStore::new();
        let old = Instant::now();
        store.get_or_create(key("stale", "1.1.1.1"), || Session::new(old, 0));
        store.get_or_create(key("live", "1.1.1.1"), || Session::new(old, 0));

        // Refresh one session, then sweep from a point past the timeout.
        let later = old + Duration::from_secs(100);
        {
            let (live, _) = store.get_or_create(key("live", "1.1.1.1"), || unreachable!());
            live.lock().expect("lock").last_seen = later;
        }
        let evicted = evict_idle(&store, Duration::from_secs(60), later);
        assert_eq!(evicted, 1);
        assert_eq!(store.len(), 1);

        let (survivor, created) = store.get_or_create(key("live", "1.1.1.1"), || unreachable!());
        assert!(!created);
        assert!(survivor.lock().expect("lock").last_seen == later);
    }
}
