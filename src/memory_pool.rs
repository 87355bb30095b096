//! Process-wide RT memory pool.
//!
//! The audio thread must never call the system allocator (spec'd as an
//! invariant of the concurrency model, §5). Every block-sized allocation
//! made while processing audio — a `ReceivedBlock`'s data buffer, a
//! `DataPacket` payload — is instead drawn from here and returned on drop.
//! Implemented as a freelist of same-sized byte buffers behind a
//! `parking_lot::Mutex`, matching the crate's general preference for
//! `parking_lot` over the stdlib lock types; contention is rare because
//! allocation happens once per block, not once per sample.

use parking_lot::Mutex;
use std::sync::Arc;

struct Inner {
    free: Mutex<Vec<Vec<u8>>>,
    block_size: usize,
    capacity: usize,
}

#[derive(Clone)]
pub struct MemoryPool {
    inner: Arc<Inner>,
}

impl MemoryPool {
    pub fn new(block_size: usize, capacity: usize) -> Self {
        let block_size = block_size.max(1);
        let free = (0..capacity).map(|_| vec![0u8; block_size]).collect();
        Self {
            inner: Arc::new(Inner {
                free: Mutex::new(free),
                block_size,
                capacity,
            }),
        }
    }

    pub fn block_size(&self) -> usize {
        self.inner.block_size
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn available(&self) -> usize {
        self.inner.free.lock().len()
    }

    /// Check out a zeroed block of at least `needed` bytes. Fails (rather
    /// than falling back to the system allocator) if the pool is
    /// exhausted or `needed` exceeds the pool's block size.
    pub fn acquire(&self, needed: usize) -> Option<PoolBlock> {
        if needed > self.inner.block_size {
            return None;
        }
        let mut buf = self.inner.free.lock().pop()?;
        buf.iter_mut().for_each(|b| *b = 0);
        buf.truncate(needed);
        Some(PoolBlock {
            pool: self.clone(),
            buf: Some(buf),
        })
    }
}

/// A checked-out block. Returned to the owning pool's freelist on drop
/// instead of being deallocated.
pub struct PoolBlock {
    pool: MemoryPool,
    buf: Option<Vec<u8>>,
}

impl std::ops::Deref for PoolBlock {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap()
    }
}

impl std::ops::DerefMut for PoolBlock {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap()
    }
}

impl Drop for PoolBlock {
    fn drop(&mut self) {
        if let Some(mut buf) = self.buf.take() {
            buf.resize(self.pool.inner.block_size, 0);
            let mut free = self.pool.inner.free.lock();
            if free.len() < self.pool.inner.capacity {
                free.push(buf);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_drop_returns_block_to_pool() {
        let pool = MemoryPool::new(64, 2);
        assert_eq!(pool.available(), 2);
        {
            let _block = pool.acquire(32).unwrap();
            assert_eq!(pool.available(), 1);
        }
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn acquire_fails_when_exhausted() {
        let pool = MemoryPool::new(16, 1);
        let first = pool.acquire(16);
        assert!(first.is_some());
        assert!(pool.acquire(16).is_none());
    }

    #[test]
    fn acquire_fails_for_oversized_request() {
        let pool = MemoryPool::new(16, 1);
        assert!(pool.acquire(17).is_none());
    }

    #[test]
    fn acquired_block_starts_zeroed() {
        let pool = MemoryPool::new(16, 1);
        let block = pool.acquire(8).unwrap();
        assert!(block.iter().all(|&b| b == 0));
    }
}
