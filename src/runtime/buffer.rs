//! Per-connection outbound buffering.
//!
//! Frames produced by a handler are appended to an `OutboundQueue` and
//! drained as the socket accepts them. A non-blocking write may take only a
//! prefix of the pending bytes; the unsent suffix stays queued, in order, for
//! the next writable event.

use bytes::{Buf, BytesMut};
use std::io::{self, Write};

/// Initial capacity of a connection's outbound queue.
const INITIAL_CAPACITY: usize = 256;

/// Outcome of a flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    /// Queue is empty. Carries the bytes written by this attempt.
    Drained(usize),
    /// Transport stopped accepting bytes before the queue emptied.
    Pending(usize),
}

/// FIFO of bytes awaiting transmission.
#[derive(Debug)]
pub struct OutboundQueue {
    pending: BytesMut,
}

impl OutboundQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            pending: BytesMut::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Append bytes to the back of the queue.
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Bytes not yet confirmed sent.
    #[cfg(test)]
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop `n` bytes from the front after the transport confirmed them.
    fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.pending.len(), "consumed more than queued");
        self.pending.advance(n);
    }

    /// Write as much of the queue as `writer` accepts.
    ///
    /// Stops at `WouldBlock` and keeps the unsent suffix. Any other error is
    /// returned with the queue left as it was before the failing write.
    pub fn flush_to<W: Write>(&mut self, writer: &mut W) -> io::Result<Flush> {
        let mut written = 0;

        while !self.pending.is_empty() {
            match writer.write(&self.pending) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
                }
                Ok(n) => {
                    self.consume(n);
                    written += n;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(Flush::Pending(written));
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(Flush::Drained(written))
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts at most `budget` bytes in total, then reports `WouldBlock`.
    struct Throttled {
        accepted: Vec<u8>,
        budget: usize,
        max_per_write: usize,
    }

    impl Write for Throttled {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(self.budget).min(self.max_per_write);
            self.accepted.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = OutboundQueue::new();
        queue.push(b"200:Connection established.");
        queue.push(b"200:Ok.");

        assert_eq!(queue.pending(), b"200:Connection established.200:Ok.");
        assert_eq!(queue.len(), 34);
    }

    #[test]
    fn test_partial_write_retains_suffix() {
        let frame = b"200:You guessed too low.".to_vec();
        for k in 0..frame.len() {
            let mut queue = OutboundQueue::new();
            queue.push(&frame);

            let mut sink = Throttled {
                accepted: Vec::new(),
                budget: k,
                max_per_write: 3,
            };
            assert_eq!(queue.flush_to(&mut sink).unwrap(), Flush::Pending(k));
            assert_eq!(queue.pending(), &frame[k..]);
            assert_eq!(sink.accepted, &frame[..k]);
        }
    }

    #[test]
    fn test_resume_after_would_block() {
        let mut queue = OutboundQueue::new();
        queue.push(b"400:Goodbye!");

        let mut sink = Throttled {
            accepted: Vec::new(),
            budget: 4,
            max_per_write: 64,
        };
        assert_eq!(queue.flush_to(&mut sink).unwrap(), Flush::Pending(4));

        queue.push(b"tail");
        sink.budget = 64;
        assert_eq!(queue.flush_to(&mut sink).unwrap(), Flush::Drained(12));
        assert!(queue.is_empty());
        assert_eq!(sink.accepted, b"400:Goodbye!tail");
    }

    #[test]
    fn test_write_zero_is_an_error() {
        struct Zero;
        impl Write for Zero {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Ok(0)
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut queue = OutboundQueue::new();
        queue.push(b"200:x");
        let err = queue.flush_to(&mut Zero).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
        assert_eq!(queue.pending(), b"200:x");
    }

    #[test]
    fn test_empty_queue_drains_immediately() {
        let mut queue = OutboundQueue::default();
        let mut sink = Throttled {
            accepted: Vec::new(),
            budget: 0,
            max_per_write: 1,
        };
        assert_eq!(queue.flush_to(&mut sink).unwrap(), Flush::Drained(0));
    }
}
