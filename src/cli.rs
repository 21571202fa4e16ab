use clap::Parser;

/// tunwatch — intercepting HTTP proxy that detects SSH-over-HTTP tunnels.
///
/// Terminates client TCP connections, relays requests upstream as a normal
/// forward proxy, and scores every client→origin flow against a set of
/// tunnel heuristics. Flows whose score crosses the block threshold receive
/// a synthesized 403 until decay brings them back under it.
#[derive(Parser, Debug, Clone)]
#[command(
    name    = "tunwatch",
    version = "0.2.0",
    about   = "HTTP forward proxy with SSH-tunnel detection",
    long_about = None,
)]
pub struct Cli {
    // ── Listener ─────────────────────────────────────────────────────────────

    /// Proxy listen address. A bare `:port` binds all interfaces.
    #[arg(long = "addr", value_name = "ADDR", default_value = ":3128")]
    pub addr: String,

    // ── Logging ──────────────────────────────────────────────────────────────

    /// Log every proxied request, not just detector events.
    #[arg(
        short = 'v',
        long = "verbose",
        value_name = "BOOL",
        default_value_t = true,
        action = clap::ArgAction::Set,
    )]
    pub verbose: bool,

    /// Write log output to this file in addition to stdout.
    ///
    /// The file is created if it does not exist and appended to if it does.
    /// JSON mode (--json) affects the format written to this file as well.
    #[arg(short = 'o', long = "log-file", value_name = "PATH")]
    pub log_file: Option<String>,

    /// Emit log entries as newline-delimited JSON (NDJSON).
    ///
    /// Each event is a self-contained JSON object on its own line, suitable
    /// for ingestion by log shippers or SIEM platforms.
    #[arg(short = 'j', long = "json")]
    pub json: bool,

    // ── Enforcement ──────────────────────────────────────────────────────────

    /// Suspicion score at which requests on a flow start being rejected.
    #[arg(long = "block-threshold", value_name = "N", default_value_t = 100)]
    pub block_threshold: i64,

    // ── Decay ────────────────────────────────────────────────────────────────

    /// Seconds between decay ticks.
    #[arg(long = "decay-interval", value_name = "SECS", default_value_t = 30)]
    pub decay_interval: u64,

    /// Points subtracted from every flow's score on each decay tick.
    #[arg(long = "decay-amount", value_name = "N", default_value_t = 20)]
    pub decay_amount: i64,

    // ── Eviction ─────────────────────────────────────────────────────────────

    /// Seconds of inactivity after which a flow's session is discarded.
    #[arg(long = "session-timeout", value_name = "SECS", default_value_t = 900)]
    pub session_timeout: u64,

    /// How often (in seconds) the idle-session reaper runs.
    #[arg(long = "evict-interval", value_name = "SECS", default_value_t = 60)]
    pub evict_interval: u64,

    // ── Replay validation ────────────────────────────────────────────────────

    /// Maximum GETs re-issued per flow by the replay validator.
    ///
    /// Each replay doubles egress for that request, so the budget bounds the
    /// amplification a single flow can cause. 0 disables replay validation.
    #[arg(long = "replay-limit", value_name = "N", default_value_t = 32)]
    pub replay_limit: u32,
}
