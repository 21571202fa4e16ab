//! Core data structures shared across the suspicion engine.
//!
//! Defines the flow key, the per-flow session record, the runtime-tunable
//! enforcement settings, and the process-wide statistics counters. Sessions
//! are shared as `Arc<Mutex<Session>>` so that every detector serialises its
//! read-then-write updates against concurrent requests on the same flow.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::engine::config::*;
use crate::engine::handshake::HandshakeMatcher;

// ── Shutdown signal ──────────────────────────────────────────────────────────

/// Shared flag set by the ctrl-c handler; background threads and the accept
/// loop exit on their next iteration once it is `true`.
pub type ShutdownFlag = Arc<AtomicBool>;

// ── Process statistics ───────────────────────────────────────────────────────

/// Atomically-updated counters accumulated over a proxy run.
///
/// Lock-free so the accept loop, detector hooks, and body-read wrappers can
/// all bump them without contention. Reported in the shutdown summary.
pub struct ProxyStats {
    /// Requests received from clients (including CONNECT and rejected ones).
    pub requests_total: AtomicU64,
    /// Responses relayed from upstream.
    pub responses_total: AtomicU64,
    /// Requests rejected by the enforcement gate.
    pub blocked_total: AtomicU64,
    /// Running total of sessions ever created.
    pub sessions_created: AtomicU64,
    /// Detector alert events emitted.
    pub alerts_emitted: AtomicU64,
}

impl ProxyStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            requests_total:   AtomicU64::new(0),
            responses_total:  AtomicU64::new(0),
            blocked_total:    AtomicU64::new(0),
            sessions_created: AtomicU64::new(0),
            alerts_emitted:   AtomicU64::new(0),
        })
    }
}

/// Shared alias used throughout the codebase.
pub type SharedStats = Arc<ProxyStats>;

// ── Runtime tuning ───────────────────────────────────────────────────────────

/// Enforcement and housekeeping settings resolved from CLI arguments.
#[derive(Debug, Clone)]
pub struct Tuning {
    /// Score at or above which the gate rejects requests.
    pub block_threshold: i64,
    /// Amount subtracted from every session per decay tick.
    pub decay_amount: i64,
    /// Interval between decay ticks.
    pub decay_interval: Duration,
    /// Idle time before a session is evicted.
    pub session_timeout: Duration,
    /// Interval between reaper sweeps.
    pub evict_interval: Duration,
    /// Replayed GETs allowed per session; 0 disables the replay validator.
    pub replay_limit: u32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            block_threshold: DEFAULT_BLOCK_THRESHOLD,
            decay_amount:    DEFAULT_DECAY_AMOUNT,
            decay_interval:  DEFAULT_DECAY_INTERVAL,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            evict_interval:  DEFAULT_EVICT_INTERVAL,
            replay_limit:    DEFAULT_REPLAY_LIMIT,
        }
    }
}

// ── Flow key ─────────────────────────────────────────────────────────────────

/// Identifier of one logical client→origin conversation.
///
/// The pair of origin host (from the `Host` header or request target) and the
/// client IP with the port stripped. Many requests — and many TCP
/// connections — share a key. Keys are opaque strings compared byte-exactly;
/// behind NAT several users may share one key, and a client that pools
/// connections across source addresses splits into several.
#[derive(Hash, Eq, PartialEq, Debug, Clone)]
pub struct FlowKey {
    pub host: String,
    pub client_ip: String,
}

impl FlowKey {
    pub fn new(host: &str, peer: &SocketAddr) -> Self {
        Self {
            host:      host.to_string(),
            client_ip: peer.ip().to_string(),
        }
    }
}

// ── Per-flow session ─────────────────────────────────────────────────────────

/// The stateful record of one flow inside the scoring engine.
///
/// Every field other than `score` is written only by the detector that owns
/// it; `score` is increased by detectors and decreased only by the decay
/// loop. All mutation happens under the session's mutex.
pub struct Session {
    /// Per-direction SSH key-exchange size matcher.
    pub handshake: HandshakeMatcher,
    /// Set once the `SSH-` banner was seen in any response body on this flow.
    pub seen_ssh_banner: bool,
    /// Set once the user-agent penalty has been awarded.
    pub seen_user_agent_score: bool,
    /// GET requests observed. Monotonically non-decreasing.
    pub http_gets: u64,
    /// POST requests observed. Monotonically non-decreasing.
    pub http_posts: u64,
    /// CONNECT requests observed. Monotonically non-decreasing.
    pub http_connects: u64,
    /// Total requests observed on this flow.
    pub http_requests: u64,
    /// Keystroke-framing ladder counter (see the keystroke detector).
    pub lssh_conns: u32,
    /// Suspicion score. Signed: decay may drive it negative.
    pub score: i64,
    /// Remaining replay-validator budget for this flow.
    pub replays_left: u32,
    /// Whether the server handshake completion has been logged yet.
    /// The score keeps refiring; only the log line is one-shot.
    pub handshake_logged_server: bool,
    /// Same, for the client direction.
    pub handshake_logged_client: bool,
    /// Last request-side activity; drives idle eviction.
    pub last_seen: Instant,
}

impl Session {
    pub fn new(now: Instant, replay_limit: u32) -> Self {
        Self {
            handshake:               HandshakeMatcher::new(),
            seen_ssh_banner:         false,
            seen_user_agent_score:   false,
            http_gets:               0,
            http_posts:              0,
            http_connects:           0,
            http_requests:           0,
            lssh_conns:              0,
            score:                   0,
            replays_left:            replay_limit,
            handshake_logged_server: false,
            handshake_logged_client: false,
            last_seen:               now,
        }
    }
}
