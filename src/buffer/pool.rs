//! Recycles [`RingBuffer`] ownership across connection lifetimes.
//!
//! Buffers move *into* the pool and back *out* as owned values, rather
//! than being referenced by index into a shared table: a connection that
//! holds a handle from [`BufferPool::allocate`] is the sole owner of that
//! buffer until it calls [`BufferPool::release`].

use super::ring::RingBuffer;

/// A LIFO free list of recycled ring buffers, all of the same capacity.
pub struct BufferPool {
    free: Vec<RingBuffer>,
    buffer_capacity: usize,
}

impl BufferPool {
    /// Create an empty pool sized for buffers of `buffer_capacity` bytes.
    pub fn new(buffer_capacity: usize) -> Self {
        Self {
            free: Vec::new(),
            buffer_capacity,
        }
    }

    /// Construct `n` buffers up front, avoiding first-use allocation
    /// latency.
    pub fn prepool(&mut self, n: usize) {
        self.free.reserve(n);
        for _ in 0..n {
            self.free.push(RingBuffer::new(self.buffer_capacity));
        }
    }

    /// Take ownership of a buffer, reusing a recycled one if available.
    pub fn allocate(&mut self) -> RingBuffer {
        self.free
            .pop()
            .unwrap_or_else(|| RingBuffer::new(self.buffer_capacity))
    }

    /// Return a buffer to the pool. The buffer is reset before being
    /// recycled so the next `allocate()` sees it empty.
    pub fn release(&mut self, mut buffer: RingBuffer) {
        buffer.reset();
        self.free.push(buffer);
    }

    /// Number of buffers currently sitting in the free list.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_without_prepool_still_produces_a_usable_buffer() {
        let mut pool = BufferPool::new(1024);
        let buf = pool.allocate();
        assert_eq!(buf.capacity(), 1024);
    }

    #[test]
    fn released_buffers_are_reused_lifo_and_reset() {
        let mut pool = BufferPool::new(64);
        pool.prepool(2);
        assert_eq!(pool.available(), 2);

        let mut a = pool.allocate();
        let b = pool.allocate();
        assert_eq!(pool.available(), 0);

        a.write(b"dirty");
        pool.release(a);
        assert_eq!(pool.available(), 1);

        let reused = pool.allocate();
        assert!(reused.is_empty(), "released buffer must come back reset");

        pool.release(b);
        pool.release(reused);
        assert_eq!(pool.available(), 2);
    }
}
