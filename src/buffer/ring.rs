//! Fixed-capacity ring buffer with explicit reserve/commit staging.
//!
//! Unlike a `Read`/`Write` abstraction, callers never hand the buffer an
//! arbitrary-size payload. They ask for the contiguous free span, fill as
//! much of it as a kernel `recv` actually returned, then commit that
//! count; symmetrically on the way out. The buffer never grows and never
//! errors on overflow: writing past the free space silently commits only
//! what fits.

/// A fixed-size byte buffer with monotonic `head`/`tail` cursors.
///
/// Invariant: `0 <= head <= tail <= capacity()` at every observable point.
pub struct RingBuffer {
    data: Box<[u8]>,
    head: usize,
    tail: usize,
}

impl RingBuffer {
    /// Create a new buffer with the given fixed capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
        }
    }

    /// Total fixed capacity; never changes for the lifetime of the buffer.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of unread bytes currently held.
    pub fn occupancy(&self) -> usize {
        self.tail - self.head
    }

    /// Free space available for a subsequent write, without compacting.
    pub fn free_space(&self) -> usize {
        self.data.len() - self.tail
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        self.tail == self.data.len()
    }

    /// The writable span at the tail: `(slice, len)`. Fill at most `len`
    /// bytes from the front of the slice, then call [`Self::commit_write`].
    pub fn reserve_write(&mut self) -> &mut [u8] {
        &mut self.data[self.tail..]
    }

    /// Advance `tail` by `n`, which must not exceed the last
    /// `reserve_write()` span length.
    pub fn commit_write(&mut self, n: usize) {
        debug_assert!(self.tail + n <= self.data.len(), "commit_write overflow");
        self.tail += n;
    }

    /// The readable span at the head: `(slice, len)`. Consume at most
    /// `len` bytes from the front of the slice, then call
    /// [`Self::commit_read`].
    pub fn reserve_read(&self) -> &[u8] {
        &self.data[self.head..self.tail]
    }

    /// Advance `head` by `n`, which must not exceed the last
    /// `reserve_read()` span length.
    pub fn commit_read(&mut self, n: usize) {
        debug_assert!(self.head + n <= self.tail, "commit_read overflow");
        self.head += n;
    }

    /// Copy-writes up to `data.len()` bytes, short-writing on overflow
    /// instead of failing. Returns the number of bytes actually written.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let free = self.free_space();
        let n = data.len().min(free);
        self.data[self.tail..self.tail + n].copy_from_slice(&data[..n]);
        self.tail += n;
        n
    }

    /// Copy-reads up to `out.len()` bytes. Returns the number of bytes
    /// actually read.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.occupancy());
        out[..n].copy_from_slice(&self.data[self.head..self.head + n]);
        self.head += n;
        n
    }

    /// Shift the live region down to index 0, so that a subsequent
    /// `reserve_write()` sees the full remaining capacity. A no-op unless
    /// both cursors have moved off zero.
    pub fn compact(&mut self) {
        if self.head > 0 && self.tail > 0 {
            self.data.copy_within(self.head..self.tail, 0);
            self.tail -= self.head;
            self.head = 0;
        }
    }

    /// Reset both cursors to zero, discarding any unread content. Used
    /// when a buffer is returned to the pool.
    pub fn reset(&mut self) {
        self.head = 0;
        self.tail = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_round_trip() {
        let mut rb = RingBuffer::new(16);
        assert_eq!(rb.write(b"hello"), 5);
        assert_eq!(rb.occupancy(), 5);
        let mut out = [0u8; 5];
        assert_eq!(rb.read(&mut out), 5);
        assert_eq!(&out, b"hello");
        assert!(rb.is_empty());
    }

    #[test]
    fn overflow_is_a_short_write_not_an_error() {
        let mut rb = RingBuffer::new(4);
        let n = rb.write(b"hello world");
        assert_eq!(n, 4);
        assert!(rb.is_full());
    }

    #[test]
    fn compact_preserves_live_bytes_and_resets_head() {
        let mut rb = RingBuffer::new(8);
        rb.write(b"abcdefg");
        let mut out = [0u8; 3];
        rb.read(&mut out);
        assert_eq!(&out, b"abc");
        rb.compact();
        assert_eq!(rb.reserve_read(), b"defg");
        assert_eq!(rb.free_space(), 4);
    }

    #[test]
    fn reserve_commit_cycle_matches_direct_write_read() {
        let mut rb = RingBuffer::new(32);
        {
            let span = rb.reserve_write();
            span[..3].copy_from_slice(b"xyz");
        }
        rb.commit_write(3);
        assert_eq!(rb.occupancy(), 3);
        assert_eq!(rb.reserve_read(), b"xyz");
        rb.commit_read(3);
        assert!(rb.is_empty());
    }

    #[test]
    fn interleaved_writes_and_reads_preserve_fifo_order() {
        let mut rb = RingBuffer::new(64);
        let mut produced = Vec::new();
        let mut consumed = Vec::new();
        for round in 0u8..5 {
            let chunk = vec![round; 3];
            rb.write(&chunk);
            produced.extend_from_slice(&chunk);
            rb.compact();
            if round % 2 == 1 {
                let mut buf = vec![0u8; 4];
                let n = rb.read(&mut buf);
                consumed.extend_from_slice(&buf[..n]);
                rb.compact();
            }
        }
        let mut rest = vec![0u8; rb.occupancy()];
        rb.read(&mut rest);
        consumed.extend_from_slice(&rest);
        assert_eq!(produced, consumed);
    }

    #[test]
    fn reset_discards_content_and_zeroes_cursors() {
        let mut rb = RingBuffer::new(8);
        rb.write(b"abc");
        rb.reset();
        assert!(rb.is_empty());
        assert_eq!(rb.free_space(), 8);
    }
}
