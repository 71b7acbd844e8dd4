//! Record-sized buffer pooling: a mutex-guarded `BufferPool` shared across
//! the connections on a thread pool, plus a lock-free `ThreadLocalPool`
//! fast path for a single owning thread.

use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;

struct Slot {
    data: Vec<u8>,
    in_use: bool,
    generation: u32,
}

struct Inner {
    slots: Vec<Slot>,
    hits: u64,
    misses: u64,
    deallocations: u64,
    active_buffers: usize,
    peak_buffers: usize,
}

/// Point-in-time accounting snapshot of pool usage.
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferPoolStats {
    pub hits: u64,
    pub misses: u64,
    pub deallocations: u64,
    pub active_buffers: usize,
    pub peak_buffers: usize,
}

/// A fixed-buffer-size pool of record-sized byte slabs. `acquire`/`release`
/// are O(number of slots) / O(1) amortized and guarded by a single
/// `parking_lot::Mutex`. Ordering under contention is first-free-wins, not
/// LRU.
pub struct BufferPool {
    buffer_size: usize,
    inner: Mutex<Inner>,
}

impl BufferPool {
    pub fn new(buffer_size: usize) -> Arc<Self> {
        Arc::new(Self {
            buffer_size,
            inner: Mutex::new(Inner {
                slots: Vec::new(),
                hits: 0,
                misses: 0,
                deallocations: 0,
                active_buffers: 0,
                peak_buffers: 0,
            }),
        })
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Scans for a free slot; if none is free, grows the pool by one slot.
    /// Never blocks on I/O — the only wait is the mutex itself.
    pub fn acquire(self: &Arc<Self>) -> PooledBuffer {
        let mut inner = self.inner.lock();

        let slot_index = match inner.slots.iter().position(|s| !s.in_use) {
            Some(i) => {
                inner.hits += 1;
                i
            }
            None => {
                inner.slots.push(Slot {
                    data: vec![0u8; self.buffer_size],
                    in_use: false,
                    generation: 0,
                });
                inner.misses += 1;
                inner.slots.len() - 1
            }
        };

        let slot = &mut inner.slots[slot_index];
        slot.in_use = true;
        slot.generation = slot.generation.wrapping_add(1);
        let generation = slot.generation;
        let ptr = slot.data.as_mut_ptr();
        let len = slot.data.len();

        inner.active_buffers += 1;
        if inner.active_buffers > inner.peak_buffers {
            inner.peak_buffers = inner.active_buffers;
        }

        PooledBuffer {
            pool: self.clone(),
            generation,
            ptr,
            len,
        }
    }

    pub fn stats(&self) -> BufferPoolStats {
        let inner = self.inner.lock();
        BufferPoolStats {
            hits: inner.hits,
            misses: inner.misses,
            deallocations: inner.deallocations,
            active_buffers: inner.active_buffers,
            peak_buffers: inner.peak_buffers,
        }
    }

    /// Locates the slot owning `ptr` by pointer identity and releases it,
    /// asserting the generation matches: a released handle whose
    /// generation does not match the pool entry signals a double release.
    fn release(&self, ptr: *mut u8, len: usize, generation: u32) {
        let mut inner = self.inner.lock();
        assert_eq!(len, self.buffer_size, "released buffer size does not match this pool");

        let slot_index = inner
            .slots
            .iter()
            .position(|s| s.data.as_ptr() as *mut u8 == ptr)
            .expect("released buffer does not belong to this pool");

        let slot = &mut inner.slots[slot_index];
        assert!(slot.in_use, "double release: slot already free");
        assert_eq!(slot.generation, generation, "double release: generation mismatch");

        slot.in_use = false;
        inner.deallocations += 1;
        inner.active_buffers -= 1;
    }
}

/// RAII handle to a buffer checked out of a [`BufferPool`]. `Drop` returns
/// it, so a panicking caller can never leak a slot. The `generation` field
/// exists purely for debug-time double-release detection: a production
/// build could elide the assertion but the field stays part of the
/// handle's shape.
pub struct PooledBuffer {
    pool: Arc<BufferPool>,
    generation: u32,
    ptr: *mut u8,
    len: usize,
}

// SAFETY: a `PooledBuffer` exclusively owns the slice `[ptr, ptr+len)` for
// its lifetime — the pool hands out a given slot to exactly one live
// handle at a time (enforced by the `in_use` flag under the pool's mutex),
// and the slot's backing `Vec<u8>` never reallocates or moves once
// created, so the pointer stays valid for as long as the owning `Arc` is
// held.
unsafe impl Send for PooledBuffer {}

impl PooledBuffer {
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::ops::Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.release(self.ptr, self.len, self.generation);
    }
}

/// Single-threaded fast path: a stack of up to 8 cached buffers with no
/// locking. `!Send`/`!Sync` by construction — sharing one
/// across threads would race the stack top without any synchronization.
pub struct ThreadLocalPool {
    buffer_size: usize,
    cache: Vec<Vec<u8>>,
    _not_shareable: PhantomData<*const ()>,
}

const THREAD_LOCAL_POOL_CAPACITY: usize = 8;

impl ThreadLocalPool {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            cache: Vec::with_capacity(THREAD_LOCAL_POOL_CAPACITY),
            _not_shareable: PhantomData,
        }
    }

    pub fn acquire(&mut self) -> Vec<u8> {
        self.cache.pop().unwrap_or_else(|| vec![0u8; self.buffer_size])
    }

    pub fn release(&mut self, buf: Vec<u8>) {
        assert_eq!(buf.len(), self.buffer_size, "released buffer size does not match this pool");
        if self.cache.len() < THREAD_LOCAL_POOL_CAPACITY {
            self.cache.push(buf);
        }
        // else: drop it, letting the allocator reclaim it.
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_release_cycle_balances_active_buffers() {
        let pool = BufferPool::new(128);

        let a = pool.acquire();
        let b = pool.acquire();
        drop(a);
        drop(b);

        let stats = pool.stats();
        assert_eq!(stats.active_buffers, 0);
        assert_eq!(stats.hits + stats.misses, 2);
    }

    #[test]
    fn reuse_after_release_counts_as_a_hit_and_bumps_generation() {
        let pool = BufferPool::new(64);

        let a = pool.acquire();
        let gen1 = a.generation();
        drop(a);

        let b = pool.acquire();
        assert_ne!(b.generation(), gen1);

        let stats = pool.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    #[should_panic(expected = "double release")]
    fn double_release_with_stale_generation_panics() {
        let pool = BufferPool::new(32);
        let handle = pool.acquire();
        let ptr = handle.ptr;
        let len = handle.len;
        let generation = handle.generation;
        std::mem::forget(handle);

        pool.release(ptr, len, generation);
        // Second release with the same (now-stale) generation must panic:
        // the slot is already free.
        pool.release(ptr, len, generation);
    }

    #[test]
    fn pool_grows_to_six_slots_and_reuses_on_the_seventh_acquire() {
        let pool = BufferPool::new(16);

        let handles: Vec<_> = (0..6).map(|_| pool.acquire()).collect();
        drop(handles);

        let hits_before = pool.stats().hits;
        let _one_more = pool.acquire();
        let stats = pool.stats();

        assert!(stats.hits > hits_before);
        assert_eq!(stats.active_buffers, 1);
        assert_eq!(stats.peak_buffers, 6);
    }

    #[test]
    fn thread_local_pool_caches_up_to_capacity() {
        let mut pool = ThreadLocalPool::new(16);
        let bufs: Vec<_> = (0..10).map(|_| pool.acquire()).collect();
        for b in bufs {
            pool.release(b);
        }
        assert_eq!(pool.cached_count(), THREAD_LOCAL_POOL_CAPACITY);
    }
}
