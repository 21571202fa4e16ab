//! GET replay validation.
//!
//! A tunneled endpoint masquerading as a web server tends to answer the same
//! GET differently on each attempt (it is not actually serving content).
//! The validator re-issues an observed GET directly — no proxying — and
//! reports the replayed status code so the caller can compare it against the
//! observed one. Transport failures are a non-signal: the replay exists to
//! gather evidence, never to break proxying.

use std::time::Duration;

pub struct ReplayValidator {
    client: reqwest::blocking::Client,
}

impl ReplayValidator {
    /// Builds the direct-egress client. Redirects are disabled so the
    /// replayed status is the same unredirected status the proxy observed,
    /// and environment proxy settings are ignored so a replay can never loop
    /// back through this process.
    pub fn new() -> Result<Self, String> {
        let client = reqwest::blocking::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| format!("replay client: {e}"))?;
        Ok(Self { client })
    }

    /// Replays a GET against `url`. Returns the replayed status code, or
    /// `None` when the replay could not be completed. The response body is
    /// dropped (closed) without being read.
    pub fn replay_status(&self, url: &str) -> Option<u16> {
        match self.client.get(url).send() {
            Ok(response) => Some(response.status().as_u16()),
            Err(_) => None,
        }
    }
}
