// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed-capacity circular byte buffer with a monotonic absolute offset,
//! used as each session's output ring for attach/reattach.

/// A pre-sized circular byte buffer. `total_written` is a monotonic count
/// of all bytes ever written, independent of wraparound, so callers can
/// address output by absolute offset across reattaches.
#[derive(Debug)]
pub struct RingBuffer {
    buf: Vec<u8>,
    capacity: usize,
    write_pos: usize,
    total_written: u64,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity.max(1)],
            capacity: capacity.max(1),
            write_pos: 0,
            total_written: 0,
        }
    }

    /// Appends `data`, overwriting the oldest bytes once capacity is
    /// exceeded. Handles chunks larger than capacity by keeping only the
    /// trailing `capacity` bytes.
    pub fn write(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let data = if data.len() > self.capacity {
            &data[data.len() - self.capacity..]
        } else {
            data
        };

        let first_len = (self.capacity - self.write_pos).min(data.len());
        self.buf[self.write_pos..self.write_pos + first_len].copy_from_slice(&data[..first_len]);
        let remaining = &data[first_len..];
        if !remaining.is_empty() {
            self.buf[..remaining.len()].copy_from_slice(remaining);
        }

        self.write_pos = (self.write_pos + data.len()) % self.capacity;
        self.total_written += data.len() as u64;
    }

    /// Returns the readable bytes from `offset` (an absolute
    /// `total_written`-scale offset) to the current write position, as up
    /// to two slices (to straddle the wraparound point without copying).
    ///
    /// Returns `None` if `offset` is beyond what has been written, or
    /// before the oldest byte still retained in the buffer.
    pub fn read_from(&self, offset: u64) -> Option<(&[u8], &[u8])> {
        if offset > self.total_written {
            return None;
        }
        let oldest = self.total_written.saturating_sub(self.capacity as u64);
        if offset < oldest {
            return None;
        }

        let available = (self.total_written - offset) as usize;
        if available == 0 {
            return Some((&[], &[]));
        }

        let start = (self.write_pos + self.capacity - available) % self.capacity;
        if start + available <= self.capacity {
            Some((&self.buf[start..start + available], &[]))
        } else {
            let first_len = self.capacity - start;
            Some((&self.buf[start..], &self.buf[..available - first_len]))
        }
    }

    /// Number of bytes available to read starting at `offset`, or `None`
    /// if `offset` is out of the retained window.
    pub fn available_from(&self, offset: u64) -> Option<u64> {
        self.read_from(offset).map(|(a, b)| (a.len() + b.len()) as u64)
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn flatten(pair: (&[u8], &[u8])) -> Vec<u8> {
        let mut v = pair.0.to_vec();
        v.extend_from_slice(pair.1);
        v
    }

    #[test]
    fn read_from_zero_returns_all_written_bytes_under_capacity() {
        let mut ring = RingBuffer::new(16);
        ring.write(b"hello");
        assert_eq!(flatten(ring.read_from(0).unwrap()), b"hello");
        assert_eq!(ring.total_written(), 5);
    }

    #[test]
    fn wraparound_keeps_only_trailing_capacity_bytes() {
        let mut ring = RingBuffer::new(4);
        ring.write(b"abcdefgh");
        assert_eq!(flatten(ring.read_from(4).unwrap()), b"efgh");
        assert_eq!(ring.total_written(), 8);
    }

    #[test]
    fn offset_before_retained_window_returns_none() {
        let mut ring = RingBuffer::new(4);
        ring.write(b"abcdefgh");
        assert!(ring.read_from(0).is_none());
    }

    #[test]
    fn offset_past_total_written_returns_none() {
        let mut ring = RingBuffer::new(16);
        ring.write(b"abc");
        assert!(ring.read_from(100).is_none());
    }

    #[test]
    fn incremental_writes_are_readable_as_a_continuous_stream() {
        let mut ring = RingBuffer::new(64);
        ring.write(b"abc");
        let offset_after_first = ring.total_written();
        ring.write(b"def");
        assert_eq!(flatten(ring.read_from(0).unwrap()), b"abcdef");
        assert_eq!(flatten(ring.read_from(offset_after_first).unwrap()), b"def");
    }

    #[test]
    fn available_from_matches_read_from_length() {
        let mut ring = RingBuffer::new(8);
        ring.write(b"abcdefgh");
        assert_eq!(ring.available_from(4), Some(4));
        assert_eq!(ring.available_from(0), None);
    }

    proptest! {
        /// Whatever `capacity` and sequence of chunks are written, `total_written`
        /// tracks the sum of chunk lengths and the bytes readable from the oldest
        /// retained offset always match the trailing `min(total, capacity)` bytes
        /// of the full input — regardless of how the writes were chunked.
        #[test]
        fn retains_exactly_the_trailing_capacity_bytes(
            capacity in 1usize..64,
            chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..20), 0..20),
        ) {
            let mut ring = RingBuffer::new(capacity);
            let mut all = Vec::new();
            for chunk in &chunks {
                ring.write(chunk);
                all.extend_from_slice(chunk);
            }

            prop_assert_eq!(ring.total_written(), all.len() as u64);

            let oldest = ring.total_written().saturating_sub(capacity as u64);
            let (a, b) = ring.read_from(oldest).unwrap_or((&[], &[]));
            let retained: Vec<u8> = a.iter().chain(b.iter()).copied().collect();
            let expected_start = all.len().saturating_sub(capacity);
            prop_assert_eq!(retained, &all[expected_start..]);
        }
    }
}
