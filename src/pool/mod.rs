//! Pooled-memory subsystems: a shared, mutex-guarded `BufferPool` (with a
//! lock-free per-thread cache) for record-sized buffers used by the data
//! plane, and an `ArenaPool` for the handshake subsystem's transient
//! allocations. Neither pool is shared across the boundary the other
//! serves — the data plane never borrows from an arena.

pub mod arena;
pub mod buffer_pool;

pub use arena::{ArenaPool, ScopedArena};
pub use buffer_pool::{BufferPool, PooledBuffer, ThreadLocalPool};
