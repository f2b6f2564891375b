//! A process-wide pool of reusable copy buffers (spec §5: "Buffers used
//! by C3 come from a process-wide pool"). Default buffer size 128 KiB
//! (spec §4.3).

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;

pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

struct Inner {
    buffer_size: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

/// Cloneable handle to a shared buffer pool. Cheap to clone (an `Arc`
/// underneath); pass one into every relay call site.
#[derive(Clone)]
pub struct BufferPool(Arc<Inner>);

impl BufferPool {
    pub fn new(buffer_size: usize) -> Self {
        Self(Arc::new(Inner {
            buffer_size,
            free: Mutex::new(Vec::new()),
        }))
    }

    /// Borrow a buffer, allocating a fresh one if the pool is empty. The
    /// buffer returns to the pool when the guard drops.
    pub fn acquire(&self) -> PooledBuffer {
        let buf = self
            .0
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| vec![0u8; self.0.buffer_size]);
        PooledBuffer {
            buf: Some(buf),
            pool: self.0.clone(),
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

pub struct PooledBuffer {
    buf: Option<Vec<u8>>,
    pool: Arc<Inner>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().expect("buffer taken before drop")
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().expect("buffer taken before drop")
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            let mut free = self.pool.free.lock();
            // Bound the pool so a burst of concurrent relays doesn't pin
            // an unbounded amount of memory once traffic subsides.
            if free.len() < 256 {
                free.push(buf);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquired_buffer_has_configured_size() {
        let pool = BufferPool::new(4096);
        let buf = pool.acquire();
        assert_eq!(buf.len(), 4096);
    }

    #[test]
    fn buffer_is_reused_after_drop() {
        let pool = BufferPool::new(1024);
        let ptr_before = {
            let buf = pool.acquire();
            buf.as_ptr()
        };
        let buf2 = pool.acquire();
        assert_eq!(buf2.as_ptr(), ptr_before);
    }
}
