//! Grow-only arena allocator for handshake-scoped state. The data plane
//! never touches this module directly — it exists so the
//! (out-of-scope) handshake subsystem has somewhere to put its transient
//! allocations without touching the global allocator per message. Kept in
//! this crate because the handshake subsystem is expected to acquire and
//! release arenas around the same connection lifetime the data plane
//! manages.

use std::sync::Arc;

use parking_lot::Mutex;

const DEFAULT_ARENA_CAPACITY: usize = 64 * 1024;

struct ArenaSlot {
    arena: Arena,
    in_use: bool,
}

/// A single bump-allocation region, stored as a list of chunks rather than
/// one `Vec<u8>` that gets `reserve`d in place: growing past a chunk's
/// capacity appends a new chunk instead of reallocating, so a pointer
/// returned by an earlier `alloc` call stays valid for the arena's whole
/// lifetime rather than only until the next allocation. `reset` (called by
/// the pool on release) drops every chunk but the last and retained one,
/// so a busy arena still avoids the system allocator between handshakes in
/// the common case where usage doesn't grow round over round.
pub struct Arena {
    chunks: Vec<Vec<u8>>,
    used_in_last: usize,
    initial_capacity: usize,
}

impl Arena {
    fn new(capacity: usize) -> Self {
        Self {
            chunks: vec![Vec::with_capacity(capacity)],
            used_in_last: 0,
            initial_capacity: capacity,
        }
    }

    /// Bumps the arena forward by `len` bytes (rounded up to `align`) and
    /// returns a mutable view into them. Grows from the parent allocator by
    /// appending a new chunk if the current one is exhausted: this never
    /// fragments existing allocations since everything is freed together
    /// on release, and never invalidates them either since a chunk, once
    /// allocated, is never moved or resized down.
    pub fn alloc(&mut self, len: usize, align: usize) -> &mut [u8] {
        let align = align.max(1);
        let aligned = align_up(self.used_in_last, align);

        if aligned + len > self.chunks.last().unwrap().capacity() {
            let next_capacity = (self.chunks.last().unwrap().capacity() * 2).max(len).max(self.initial_capacity);
            self.chunks.push(Vec::with_capacity(next_capacity));
            self.used_in_last = 0;
            return self.alloc(len, align);
        }

        let chunk = self.chunks.last_mut().unwrap();
        let end = aligned + len;
        if end > chunk.len() {
            chunk.resize(end, 0);
        }
        self.used_in_last = end;
        &mut chunk[aligned..end]
    }

    /// Total bytes handed out across every chunk so far. Earlier chunks are
    /// closed off for good once a new one is pushed, so their contribution
    /// is their final `len()` (the high-water mark reached while they were
    /// still being allocated into), not their capacity.
    pub fn used(&self) -> usize {
        let earlier: usize = self.chunks[..self.chunks.len() - 1].iter().map(|c| c.len()).sum();
        earlier + self.used_in_last
    }

    pub fn capacity(&self) -> usize {
        self.chunks.iter().map(|c| c.capacity()).sum()
    }

    fn reset(&mut self) {
        let last = self.chunks.pop().unwrap();
        self.chunks.clear();
        self.chunks.push(last);
        self.chunks[0].clear();
        self.used_in_last = 0;
    }
}

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}

/// A mutex-guarded vector of arenas, matching `BufferPool`'s locking style
/// for consistency within the crate.
pub struct ArenaPool {
    default_capacity: usize,
    slots: Mutex<Vec<ArenaSlot>>,
}

impl ArenaPool {
    pub fn new() -> Arc<Self> {
        Self::with_capacity(DEFAULT_ARENA_CAPACITY)
    }

    pub fn with_capacity(default_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            default_capacity,
            slots: Mutex::new(Vec::new()),
        })
    }

    /// Returns the first non-in-use arena after resetting it (capacity
    /// retained), or appends a new one.
    pub fn acquire(self: &Arc<Self>) -> ScopedArena {
        let mut slots = self.slots.lock();

        let index = match slots.iter().position(|s| !s.in_use) {
            Some(i) => {
                slots[i].arena.reset();
                i
            }
            None => {
                slots.push(ArenaSlot {
                    arena: Arena::new(self.default_capacity),
                    in_use: false,
                });
                slots.len() - 1
            }
        };

        slots[index].in_use = true;

        ScopedArena {
            pool: self.clone(),
            index,
        }
    }

    fn release(&self, index: usize) {
        let mut slots = self.slots.lock();
        slots[index].in_use = false;
    }
}

/// A handle carrying the pool and the arena's slot index; releases (marks
/// the slot free again) on scope exit. This is the only supported way to
/// touch an arena — the handshake subsystem must not hold arena memory
/// across its own scope, let alone hand it to the data plane.
pub struct ScopedArena {
    pool: Arc<ArenaPool>,
    index: usize,
}

impl ScopedArena {
    pub fn alloc(&self, len: usize, align: usize) -> *mut u8 {
        // `Mutex` access here is intentionally re-entered per call rather
        // than held across the handle's lifetime, matching how `BufferPool`
        // only holds its lock for the duration of a single acquire/release.
        let mut slots = self.pool.slots.lock();
        slots[self.index].arena.alloc(len, align).as_mut_ptr()
    }

    pub fn used(&self) -> usize {
        self.pool.slots.lock()[self.index].arena.used()
    }

    pub fn capacity(&self) -> usize {
        self.pool.slots.lock()[self.index].arena.capacity()
    }
}

impl Drop for ScopedArena {
    fn drop(&mut self) {
        self.pool.release(self.index);
    }
}
