//! Structured logging for tunwatch.
//!
//! Provides a [`Logger`] that writes events to stdout and optionally to a log
//! file, either as human-readable text or as newline-delimited JSON (NDJSON)
//! for ingestion by log shippers and SIEM platforms.

use chrono::Local;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::sync::{Arc, Mutex};

// ── Event types ──────────────────────────────────────────────────────────────

/// All distinct event kinds tunwatch can emit.
///
/// The `#[serde(tag = "event")]` attribute gives JSON output an `"event"` key
/// so consumers can filter by type without inspecting structure.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event<'a> {
    /// Informational startup / status message.
    Info { message: &'a str },

    /// A proxied request, emitted when verbose logging is on.
    Request {
        method: &'a str,
        url:    &'a str,
        peer:   &'a str,
    },

    /// A response body contained the SSH version-exchange banner.
    Banner { host: &'a str, ip: &'a str },

    /// One direction of the SSH key-exchange size sequence completed.
    HandshakeComplete {
        host:      &'a str,
        ip:        &'a str,
        direction: &'a str,
    },

    /// A flow's user agent was empty or matched the suspicious set.
    AgentFlagged {
        host:    &'a str,
        ip:      &'a str,
        browser: &'a str,
        delta:   i64,
    },

    /// POSTs on a flow pulled ahead of GETs beyond the allowed margin.
    MethodImbalance {
        host:  &'a str,
        ip:    &'a str,
        posts: u64,
        gets:  u64,
    },

    /// A flow crossed the CONNECT-count threshold.
    ConnectFlood {
        host:     &'a str,
        ip:       &'a str,
        connects: u64,
    },

    /// A flow crossed the total-request-volume threshold.
    RequestFlood {
        host:     &'a str,
        ip:       &'a str,
        requests: u64,
    },

    /// Keystroke-sized framing kept recurring on an established ladder.
    Keystroke {
        host: &'a str,
        ip:   &'a str,
        rung: u32,
    },

    /// A replayed GET came back with a different status code.
    ReplayMismatch {
        host:     &'a str,
        ip:       &'a str,
        observed: u16,
        replayed: u16,
    },

    /// A response body length exactly echoed the request body length.
    Echo {
        host:   &'a str,
        ip:     &'a str,
        length: u64,
    },

    /// A request was rejected because the flow score crossed the threshold.
    Blocked {
        host:  &'a str,
        ip:    &'a str,
        score: i64,
    },

    /// Idle sessions were removed by the reaper.
    Evicted { count: usize, remaining: usize },

    /// Session summary emitted on graceful shutdown.
    SessionSummary {
        duration_secs:    u64,
        requests_total:   u64,
        responses_total:  u64,
        blocked_total:    u64,
        sessions_created: u64,
        alerts_emitted:   u64,
    },
}

// ── Logger ───────────────────────────────────────────────────────────────────

/// Shared, thread-safe structured logger.
///
/// Constructed once in `main` and passed as an `Arc<Logger>` everywhere an
/// event is emitted. The internal `Mutex` serialises file writes so lines are
/// never interleaved across threads.
pub struct Logger {
    /// Whether to format events as NDJSON instead of plain text.
    json: bool,
    /// Optional buffered file writer. `None` when `--log-file` was not given.
    file: Option<Mutex<BufWriter<std::fs::File>>>,
}

/// Type alias used throughout the codebase.
pub type SharedLogger = Arc<Logger>;

impl Logger {
    /// Creates a new logger.
    ///
    /// # Errors
    /// Returns an `io::Error` if the log file cannot be opened or created.
    pub fn new(json: bool, log_path: Option<&str>) -> io::Result<Self> {
        let file = match log_path {
            Some(path) => {
                let f = OpenOptions::new().create(true).append(true).open(path)?;
                Some(Mutex::new(BufWriter::new(f)))
            }
            None => None,
        };
        Ok(Self { json, file })
    }

    /// Logs a single [`Event`] to stdout and, when configured, the log file.
    pub fn log(&self, event: &Event) {
        let timestamp = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string();

        let line = if self.json {
            // Serialise to a Value first so the timestamp can be injected.
            let mut val = serde_json::to_value(event).unwrap_or_default();
            if let Some(obj) = val.as_object_mut() {
                obj.insert(
                    "timestamp".to_string(),
                    serde_json::Value::String(timestamp.clone()),
                );
            }
            serde_json::to_string(&val).unwrap_or_default()
        } else {
            format!("[{}] {}", timestamp, self.plain_text(event))
        };

        println!("{}", line);

        if let Some(mutex) = &self.file {
            if let Ok(mut writer) = mutex.lock() {
                let _ = writeln!(writer, "{}", line);
                let _ = writer.flush();
            }
        }
    }

    /// Formats an [`Event`] as human-readable text (no timestamp).
    fn plain_text(&self, event: &Event) -> String {
        match event {
            Event::Info { message } =>
                format!("[INFO] {}", message),

            Event::Request { method, url, peer } =>
                format!("[REQ] {} {} {}", peer, method, url),

            Event::Banner { host, ip } =>
                format!("[BANNER] SSH banner in response body on {} from {}", host, ip),

            Event::HandshakeComplete { host, ip, direction } =>
                format!("[HANDSHAKE] {} key-exchange sizes completed on {} from {}", direction, host, ip),

            Event::AgentFlagged { host, ip, browser, delta } => {
                if browser.is_empty() {
                    format!("[AGENT] no identifiable browser on {} from {} (+{})", host, ip, delta)
                } else {
                    format!("[AGENT] suspicious agent {:?} on {} from {} (+{})", browser, host, ip, delta)
                }
            }

            Event::MethodImbalance { host, ip, posts, gets } =>
                format!("[IMBALANCE] {} posts vs {} gets on {} from {}", posts, gets, host, ip),

            Event::ConnectFlood { host, ip, connects } =>
                format!("[CONNECT FLOOD] {} CONNECTs on {} from {}", connects, host, ip),

            Event::RequestFlood { host, ip, requests } =>
                format!("[VOLUME] {} requests on {} from {}", requests, host, ip),

            Event::Keystroke { host, ip, rung } =>
                format!("[KEYSTROKE] framing ladder at {} on {} from {}", rung, host, ip),

            Event::ReplayMismatch { host, ip, observed, replayed } =>
                format!("[REPLAY] observed {} but replay got {} on {} from {}", observed, replayed, host, ip),

            Event::Echo { host, ip, length } =>
                format!("[ECHO] request and response both {} bytes on {} from {}", length, host, ip),

            Event::Blocked { host, ip, score } =>
                format!("[BLOCKED] score {} on {} from {}", score, host, ip),

            Event::Evicted { count, remaining } =>
                format!("[EVICT] removed {} idle sessions ({} live)", count, remaining),

            Event::SessionSummary {
                duration_secs,
                requests_total,
                responses_total,
                blocked_total,
                sessions_created,
                alerts_emitted,
            } => format!(
                "[SUMMARY] duration={}s requests={} responses={} blocked={} sessions={} alerts={}",
                duration_secs, requests_total, responses_total, blocked_total,
                sessions_created, alerts_emitted
            ),
        }
    }
}
