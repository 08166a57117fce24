//! Per-connection sliding-window byte buffer.
//!
//! The transport delivers arbitrarily-chunked byte runs; the session
//! always knows exactly how many bytes it is waiting for (the fixed
//! header size, or a body size taken from the last parsed header). This
//! buffer accumulates raw bytes and hands back exactly-sized reads,
//! left-shifting ("chopping") the unread remainder to offset 0 after
//! every extraction so unread payload always starts at the front.

use bytes::Bytes;

/// Initial buffer capacity per connection.
pub const DEFAULT_BUFFER_CAPACITY: usize = 8 * 1024 * 1024;

/// Increment the buffer grows by when a single expected read would not
/// fit the remaining capacity.
pub const BUFFER_GROWTH_STEP: usize = 24 * 1024;

/// Growable byte store with a write index.
///
/// Invariant: bytes `[0, write_index)` are unread payload; everything at
/// and past `write_index` is garbage. `write_index <= capacity` always.
#[derive(Debug)]
pub struct ConnectionBuffer {
    data: Vec<u8>,
    write_index: usize,
}

impl ConnectionBuffer {
    /// Allocate with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    /// Allocate with an explicit capacity (tests use small buffers).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            write_index: 0,
        }
    }

    /// Append incoming bytes, growing capacity in fixed steps if needed.
    pub fn feed(&mut self, incoming: &[u8]) {
        let needed = self.write_index + incoming.len();
        if needed > self.data.len() {
            let shortfall = needed - self.data.len();
            let steps = shortfall.div_ceil(BUFFER_GROWTH_STEP);
            self.data.resize(self.data.len() + steps * BUFFER_GROWTH_STEP, 0);
        }
        self.data[self.write_index..needed].copy_from_slice(incoming);
        self.write_index = needed;
    }

    /// Remove exactly `expected` bytes from the front, if available.
    ///
    /// On success the remainder is chopped back to offset 0. With fewer
    /// than `expected` bytes buffered, returns `None` and leaves the
    /// buffer untouched — a partial read is never surfaced. An
    /// `expected` of zero succeeds trivially (zero-length bodies).
    pub fn try_extract(&mut self, expected: usize) -> Option<Bytes> {
        if self.write_index < expected {
            return None;
        }
        let out = Bytes::copy_from_slice(&self.data[..expected]);
        self.data.copy_within(expected..self.write_index, 0);
        self.write_index -= expected;
        Some(out)
    }

    /// Count of buffered unread bytes.
    pub fn len(&self) -> usize {
        self.write_index
    }

    pub fn is_empty(&self) -> bool {
        self.write_index == 0
    }

    /// Current allocation size.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl Default for ConnectionBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_exact() {
        let mut buf = ConnectionBuffer::with_capacity(64);
        buf.feed(&[1, 2, 3, 4, 5]);
        let out = buf.try_extract(3).unwrap();
        assert_eq!(&out[..], &[1, 2, 3]);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn chop_left_shifts_remainder() {
        let mut buf = ConnectionBuffer::with_capacity(64);
        buf.feed(&[10, 20, 30, 40, 50, 60]);
        buf.try_extract(2).unwrap();
        // remainder must now start at offset 0
        let rest = buf.try_extract(4).unwrap();
        assert_eq!(&rest[..], &[30, 40, 50, 60]);
        assert!(buf.is_empty());
    }

    #[test]
    fn short_buffer_returns_none_and_keeps_bytes() {
        let mut buf = ConnectionBuffer::with_capacity(64);
        buf.feed(&[1, 2]);
        assert!(buf.try_extract(3).is_none());
        assert_eq!(buf.len(), 2);
        buf.feed(&[3]);
        assert_eq!(&buf.try_extract(3).unwrap()[..], &[1, 2, 3]);
    }

    #[test]
    fn zero_extract_always_succeeds() {
        let mut buf = ConnectionBuffer::with_capacity(64);
        let out = buf.try_extract(0).unwrap();
        assert!(out.is_empty());
        buf.feed(&[9]);
        assert!(buf.try_extract(0).unwrap().is_empty());
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn grows_in_steps() {
        let mut buf = ConnectionBuffer::with_capacity(16);
        let big = vec![0xAB; 100];
        buf.feed(&big);
        assert_eq!(buf.len(), 100);
        assert!(buf.capacity() >= 100);
        assert_eq!((buf.capacity() - 16) % BUFFER_GROWTH_STEP, 0);
        assert_eq!(&buf.try_extract(100).unwrap()[..], &big[..]);
    }

    #[test]
    fn byte_at_a_time_feed_matches_whole_feed() {
        let payload: Vec<u8> = (0..=255).collect();

        let mut whole = ConnectionBuffer::with_capacity(512);
        whole.feed(&payload);

        let mut trickle = ConnectionBuffer::with_capacity(512);
        for b in &payload {
            trickle.feed(std::slice::from_ref(b));
        }

        assert_eq!(
            whole.try_extract(payload.len()),
            trickle.try_extract(payload.len())
        );
    }
}
