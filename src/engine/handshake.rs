//! Per-direction SSH key-exchange size matcher.
//!
//! An SSH key exchange tunneled packet-per-request through HTTP produces a
//! characteristic sequence of body sizes in each direction. Each direction is
//! tracked as a queue of expected sizes: observing the expected next size
//! pops the head, any other size is a no-op (the queue never resets).
//!
//! `saw_response` / `saw_request` report whether the full sequence has been
//! observed — i.e. whether the queue is empty once the current observation
//! has been applied. The call that drains a queue already reports completion,
//! and every later call on that direction keeps reporting it, so the caller's
//! score bonus re-fires on each subsequent evaluation. That refire is kept on
//! purpose: sustained matching-size traffic after a recognized key exchange
//! is treated as continued evidence, not a one-off.

use std::collections::VecDeque;

use crate::engine::config::{CLIENT_HANDSHAKE_SIZES, SERVER_HANDSHAKE_SIZES};

pub struct HandshakeMatcher {
    server: VecDeque<u64>,
    client: VecDeque<u64>,
}

impl HandshakeMatcher {
    pub fn new() -> Self {
        Self {
            server: SERVER_HANDSHAKE_SIZES.into_iter().collect(),
            client: CLIENT_HANDSHAKE_SIZES.into_iter().collect(),
        }
    }

    /// Feed a response content length. Returns `true` iff the server-side
    /// sequence has been fully observed.
    pub fn saw_response(&mut self, len: u64) -> bool {
        if self.server.front() == Some(&len) {
            self.server.pop_front();
        }
        self.server.is_empty()
    }

    /// Feed a request content length. Returns `true` iff the client-side
    /// sequence has been fully observed.
    pub fn saw_request(&mut self, len: u64) -> bool {
        if self.client.front() == Some(&len) {
            self.client.pop_front();
        }
        self.client.is_empty()
    }

    /// Remaining unmatched sizes on the server side.
    pub fn server_pending(&self) -> usize {
        self.server.len()
    }

    /// Remaining unmatched sizes on the client side.
    pub fn client_pending(&self) -> usize {
        self.client.len()
    }
}

impl Default for HandshakeMatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_sequence_completes_in_order() {
        let mut m = HandshakeMatcher::new();
        assert!(!m.saw_response(21));
        assert!(!m.saw_response(1080));
        // The draining observation itself reports completion.
        assert!(m.saw_response(452));
    }

    #[test]
    fn unexpected_size_is_a_no_op() {
        let mut m = HandshakeMatcher::new();
        assert!(!m.saw_response(21));
        let pending = m.server_pending();
        assert!(!m.saw_response(9999));
        // No reset, no advance.
        assert_eq!(m.server_pending(), pending);
        assert!(!m.saw_response(1080));
        assert!(m.saw_response(452));
    }

    #[test]
    fn out_of_order_head_does_not_pop() {
        let mut m = HandshakeMatcher::new();
        // 452 is expected last, not first.
        assert!(!m.saw_response(452));
        assert_eq!(m.server_pending(), 3);
    }

    #[test]
    fn completion_refires_on_any_later_size() {
        let mut m = HandshakeMatcher::new();
        m.saw_response(21);
        m.saw_response(1080);
        assert!(m.saw_response(452));
        // Drained: every subsequent observation keeps reporting completion.
        assert!(m.saw_response(99));
        assert!(m.saw_response(21));
    }

    #[test]
    fn client_sequence_is_independent() {
        let mut m = HandshakeMatcher::new();
        assert!(!m.saw_request(21));
        assert!(!m.saw_request(1392));
        assert!(!m.saw_request(48));
        assert!(m.saw_request(16));
        // Server side untouched.
        assert_eq!(m.server_pending(), 3);
    }

    #[test]
    fn queues_never_grow() {
        let mut m = HandshakeMatcher::new();
        let mut last = m.server_pending();
        for len in [21u64, 7, 1080, 1080, 0, 452, 452, 21] {
            m.saw_response(len);
            assert!(m.server_pending() <= last);
            last = m.server_pending();
        }
    }
}
