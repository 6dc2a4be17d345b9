use parking_lot::Mutex;
use std::sync::atomic;
use std::sync::Arc;

/// A reference-managed byte buffer owned by the transport,
/// which must be released exactly once after its bytes are consumed.
///
/// `release` takes the buffer by value, so a buffer cannot be released twice.
pub trait NetBuf: 'static + Send {
    /// The readable bytes of this buffer.
    fn readable(&self) -> &[u8];

    /// Give the buffer back to whoever owns its storage.
    fn release(self);
}

/// Storage handed back to the pool is shrunk to this capacity.
const MAX_POOLED_CAPACITY: usize = 1024 * 64;

/// Never keep more than this many idle buffers around.
const MAX_POOLED_COUNT: usize = 128;

struct BufPoolInner {
    free: Mutex<Vec<Vec<u8>>>,
    outstanding: atomic::AtomicUsize,
    released: atomic::AtomicU64,
}

/// A pool of recycled byte buffers for incoming network payloads.
#[derive(Clone)]
pub struct BufPool(Arc<BufPoolInner>);

impl Default for BufPool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BufPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufPool")
            .field("outstanding", &self.outstanding())
            .field("released", &self.released())
            .finish()
    }
}

impl BufPool {
    /// Construct a new, empty pool.
    pub fn new() -> Self {
        Self(Arc::new(BufPoolInner {
            free: Mutex::new(Vec::new()),
            outstanding: atomic::AtomicUsize::new(0),
            released: atomic::AtomicU64::new(0),
        }))
    }

    /// Acquire an empty buffer, recycled if one is available.
    pub fn acquire(&self) -> PoolBuf {
        let data = self.0.free.lock().pop().unwrap_or_default();
        self.0.outstanding.fetch_add(1, atomic::Ordering::Relaxed);
        PoolBuf {
            data: Some(data),
            pool: self.clone(),
        }
    }

    /// Acquire a buffer filled with a copy of `bytes`.
    pub fn acquire_from(&self, bytes: &[u8]) -> PoolBuf {
        let mut buf = self.acquire();
        buf.extend_from_slice(bytes);
        buf
    }

    /// Buffers handed out and not yet released.
    pub fn outstanding(&self) -> usize {
        self.0.outstanding.load(atomic::Ordering::Relaxed)
    }

    /// Total number of releases this pool has seen.
    pub fn released(&self) -> u64 {
        self.0.released.load(atomic::Ordering::Relaxed)
    }

    fn put_back(&self, mut data: Vec<u8>) {
        self.0.outstanding.fetch_sub(1, atomic::Ordering::Relaxed);
        self.0.released.fetch_add(1, atomic::Ordering::Relaxed);
        data.clear();
        data.shrink_to(MAX_POOLED_CAPACITY);
        let mut free = self.0.free.lock();
        if free.len() < MAX_POOLED_COUNT {
            free.push(data);
        }
    }
}

/// A buffer checked out of a [`BufPool`].
/// Goes back to the pool on [`NetBuf::release`], or on drop if never released.
pub struct PoolBuf {
    data: Option<Vec<u8>>,
    pool: BufPool,
}

impl std::fmt::Debug for PoolBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolBuf").field("len", &self.len()).finish()
    }
}

impl PoolBuf {
    /// Append bytes to this buffer.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        if let Some(data) = self.data.as_mut() {
            data.extend_from_slice(bytes);
        }
    }

    /// Readable length.
    pub fn len(&self) -> usize {
        self.readable().len()
    }

    /// Is the buffer empty?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NetBuf for PoolBuf {
    fn readable(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }

    fn release(mut self) {
        if let Some(data) = self.data.take() {
            self.pool.put_back(data);
        }
    }
}

impl Drop for PoolBuf {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            tracing::trace!(len = data.len(), "PoolBuf dropped without release");
            self.pool.put_back(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn release_returns_storage_once() {
        let pool = BufPool::new();
        let buf = pool.acquire_from(b"hello");
        assert_eq!(b"hello", buf.readable());
        assert_eq!(1, pool.outstanding());

        buf.release();
        assert_eq!(0, pool.outstanding());
        assert_eq!(1, pool.released());

        // the recycled storage comes back empty
        let buf = pool.acquire();
        assert!(buf.is_empty());
        drop(buf);
        assert_eq!(0, pool.outstanding());
        assert_eq!(2, pool.released());
    }
}
