//! Peek-without-consume over a non-seekable body stream.
//!
//! [`RewindReader`] records everything read from the underlying stream.
//! Calling [`RewindReader::rewind`] arms a replay: subsequent reads first
//! re-deliver the recorded prefix, then continue from the underlying stream
//! where recording stopped. This lets a detector inspect the first bytes of a
//! response body and still hand the client a byte-identical stream.

use std::io::{self, Read};

#[derive(Clone, Copy)]
enum Phase {
    /// Reads pass through and are appended to the record.
    Recording,
    /// Reads are served from the record starting at this offset.
    Replaying(usize),
    /// The record is exhausted; reads pass through without recording.
    Passthrough,
}

pub struct RewindReader<R> {
    inner: R,
    recorded: Vec<u8>,
    phase: Phase,
}

impl<R: Read> RewindReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            recorded: Vec::new(),
            phase: Phase::Recording,
        }
    }

    /// Arms replay of everything recorded so far. Recording stops: bytes read
    /// after the replay drains are no longer retained.
    pub fn rewind(&mut self) {
        self.phase = Phase::Replaying(0);
    }

    /// Bytes recorded so far.
    pub fn recorded(&self) -> &[u8] {
        &self.recorded
    }
}

impl<R: Read> Read for RewindReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.phase {
            Phase::Recording => {
                let n = self.inner.read(buf)?;
                self.recorded.extend_from_slice(&buf[..n]);
                Ok(n)
            }
            Phase::Replaying(pos) => {
                let remaining = &self.recorded[pos..];
                if remaining.is_empty() {
                    self.phase = Phase::Passthrough;
                    return self.inner.read(buf);
                }
                let n = remaining.len().min(buf.len());
                buf[..n].copy_from_slice(&remaining[..n]);
                self.phase = Phase::Replaying(pos + n);
                Ok(n)
            }
            Phase::Passthrough => self.inner.read(buf),
        }
    }
}
