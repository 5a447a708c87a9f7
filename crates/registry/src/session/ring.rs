//! Bounded PTY output buffer keyed by an absolute, never-reused cursor
//! (§4.4, §9 open question 2: default retention 2 MiB per session). Old
//! bytes are evicted from the head once the cap is hit; the cursor of the
//! oldest remaining byte is tracked so `pty.attach` can report `truncated`
//! honestly instead of silently replaying from zero.

const DEFAULT_CAPACITY: usize = 2 * 1024 * 1024;

pub struct OutputRing {
    capacity: usize,
    buffer: Vec<u8>,
    /// Absolute cursor of `buffer[0]`. Advances as bytes are evicted.
    base_cursor: i64,
    /// Absolute cursor one past the last byte appended so far.
    next_cursor: i64,
}

impl OutputRing {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            buffer: Vec::new(),
            base_cursor: 0,
            next_cursor: 0,
        }
    }

    /// Appends `chunk`, returning the cursor assigned to its first byte.
    pub fn push(&mut self, chunk: &[u8]) -> i64 {
        let cursor = self.next_cursor;
        self.buffer.extend_from_slice(chunk);
        self.next_cursor += chunk.len() as i64;
        if self.buffer.len() > self.capacity {
            let overflow = self.buffer.len() - self.capacity;
            self.buffer.drain(0..overflow);
            self.base_cursor += overflow as i64;
        }
        cursor
    }

    /// Bytes observed at or after `since`, plus whether the ring had
    /// already evicted part of the requested range.
    pub fn replay_since(&self, since: i64) -> (Vec<u8>, bool) {
        if since <= self.base_cursor {
            return (self.buffer.clone(), since < self.base_cursor);
        }
        let offset = (since - self.base_cursor) as usize;
        if offset >= self.buffer.len() {
            return (Vec::new(), false);
        }
        (self.buffer[offset..].to_vec(), false)
    }

    pub fn latest_cursor(&self) -> i64 {
        self.next_cursor
    }
}

impl Default for OutputRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_assigns_increasing_cursors() {
        let mut ring = OutputRing::new();
        let c1 = ring.push(b"abc");
        let c2 = ring.push(b"de");
        assert_eq!(c1, 0);
        assert_eq!(c2, 3);
        assert_eq!(ring.latest_cursor(), 5);
    }

    #[test]
    fn replay_since_zero_returns_everything() {
        let mut ring = OutputRing::new();
        ring.push(b"hello");
        let (bytes, truncated) = ring.replay_since(0);
        assert_eq!(bytes, b"hello");
        assert!(!truncated);
    }

    #[test]
    fn eviction_reports_truncation_for_stale_cursors() {
        let mut ring = OutputRing::with_capacity(4);
        ring.push(b"abcdef");
        let (bytes, truncated) = ring.replay_since(0);
        assert!(truncated);
        assert_eq!(bytes, b"cdef");

        let (bytes, truncated) = ring.replay_since(2);
        assert!(!truncated);
        assert_eq!(bytes, b"cdef");
    }
}
