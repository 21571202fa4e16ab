use std::time::Duration;

// ── Score weights ─────────────────────────────────────────────────────────────

/// Points added when a response body contains the SSH protocol banner prefix.
///
/// The `SSH-` version exchange string is the single strongest signal this
/// engine has: legitimate HTTP bodies almost never begin a line with it, while
/// every SSH connection starts with one. Fires once per flow.
pub const SCORE_BANNER: i64 = 50;

/// Points added each time a handshake size sequence reports completion.
///
/// Awarded per direction (client and server sequences are tracked
/// independently), and re-awarded on every subsequent evaluation once a
/// sequence has drained. See [`crate::engine::handshake::HandshakeMatcher`].
pub const SCORE_HANDSHAKE: i64 = 25;

/// Points added when the sniffed media type disagrees with the declared one.
///
/// Deliberately small: mislabelled content is common on the open web, so this
/// only tips the scale when it happens on every response of a flow.
pub const SCORE_CONTENT_TYPE_MISMATCH: i64 = 1;

/// Points for a request whose user agent parses to an empty browser string.
pub const SCORE_MISSING_AGENT: i64 = 10;

/// Points for a request whose browser string matches the suspicious set.
pub const SCORE_SUSPICIOUS_AGENT: i64 = 5;

/// Points added while POST requests outnumber GETs beyond the margin.
pub const SCORE_POST_IMBALANCE: i64 = 15;

/// Points added per request while the CONNECT count exceeds its threshold.
pub const SCORE_CONNECT_FLOOD: i64 = 10;

/// Points added per qualifying response once the keystroke ladder is climbed.
pub const SCORE_KEYSTROKE: i64 = 20;

/// Points added when a replayed GET returns a different status code.
pub const SCORE_REPLAY_MISMATCH: i64 = 5;

/// Points for a POST request carrying no body.
pub const SCORE_EMPTY_POST: i64 = 5;

/// Points for a response carrying no body.
pub const SCORE_EMPTY_RESPONSE: i64 = 5;

/// Points when a response body length exactly echoes the request body length.
pub const SCORE_ECHO: i64 = 20;

/// Points added per request beyond the request-volume threshold.
pub const SCORE_REQUEST_FLOOD: i64 = 5;

// ── Detection thresholds ──────────────────────────────────────────────────────

/// Total requests on one flow before the volume penalty starts accruing.
pub const REQUEST_FLOOD_THRESHOLD: u64 = 300;

/// POSTs may exceed GETs by this many before the imbalance penalty accrues.
pub const POST_IMBALANCE_MARGIN: u64 = 10;

/// CONNECT requests tolerated on one flow before the flood penalty accrues.
pub const CONNECT_FLOOD_THRESHOLD: u64 = 5;

// ── SSH wire constants ────────────────────────────────────────────────────────

/// Byte sequence that opens every SSH version exchange.
pub const SSH_BANNER: &[u8] = b"SSH-";

/// Expected server-side (response) content lengths of an SSH key exchange
/// tunneled request-per-packet over HTTP, in order of arrival.
pub const SERVER_HANDSHAKE_SIZES: [u64; 3] = [21, 1080, 452];

/// Expected client-side (request) content lengths of the same key exchange.
pub const CLIENT_HANDSHAKE_SIZES: [u64; 4] = [21, 1392, 48, 16];

/// Body sizes produced by single keystrokes on an interactive SSH channel
/// once the channel-data framing overhead is added.
pub const KEYSTROKE_SIZES: [u64; 2] = [36, 76];

/// Ladder height the keystroke counter must reach before large responses
/// start scoring. The first rungs require a strict response/request/response
/// alternation; above this height the counter free-runs.
pub const KEYSTROKE_MIN_RUNG: u32 = 10;

/// Body length above which a response counts as "large" for the keystroke
/// detector. Anything bigger than a keystroke frame qualifies.
pub const KEYSTROKE_LARGE_RESPONSE: u64 = 36;

// ── Sniffing ──────────────────────────────────────────────────────────────────

/// How many leading body bytes the content-type sniffer may peek at.
pub const SNIFF_PEEK_LEN: usize = 500;

// ── Enforcement and decay defaults (CLI-tunable) ──────────────────────────────

/// Score at or above which requests on a flow are rejected.
pub const DEFAULT_BLOCK_THRESHOLD: i64 = 100;

/// Wall-clock interval between decay ticks.
pub const DEFAULT_DECAY_INTERVAL: Duration = Duration::from_secs(30);

/// Amount subtracted from every session score on each decay tick.
pub const DEFAULT_DECAY_AMOUNT: i64 = 20;

/// Idle time after which a session is eligible for eviction.
///
/// Decay can drive scores arbitrarily negative, so score alone never marks a
/// flow inactive; the reaper keys on the last request-side event instead.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(900);

/// How often the reaper sweeps the session table.
pub const DEFAULT_EVICT_INTERVAL: Duration = Duration::from_secs(60);

/// Replayed GETs allowed per session. Every replay doubles egress for that
/// request, so the budget bounds the amplification a single flow can cause.
pub const DEFAULT_REPLAY_LIMIT: u32 = 32;

/// Body text of the synthesized rejection response.
pub const BLOCK_BODY: &str = "SSH tunnel detected";
