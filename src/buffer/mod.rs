//! Fixed-capacity buffering: the [`ring::RingBuffer`] itself and the
//! [`pool::BufferPool`] that recycles buffer ownership across connection
//! lifetimes.

pub mod pool;
pub mod ring;
