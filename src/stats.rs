//! Allocation statistics counters.
//!
//! Counters are loaded and bumped with `Relaxed` ordering; they observe
//! the allocator, they never synchronize it. Correctness ordering comes
//! from the tiers' own locks.
//!
//! Obtain a [`Snapshot`] with [`snapshot()`]. Individual counter loads are
//! each atomic, but the snapshot as a whole is not globally consistent.

use core::sync::atomic::{AtomicU64, Ordering};

pub(crate) struct Stats {
    // ---- Public surface ----
    /// Total calls to `allocate`.
    pub alloc_count: AtomicU64,
    /// Total calls to `deallocate`.
    pub dealloc_count: AtomicU64,
    /// Sum of all requested byte sizes passed to `allocate`.
    pub alloc_bytes: AtomicU64,
    /// Requests above `MAX_BYTES` forwarded to the system allocator.
    pub large_allocs: AtomicU64,

    // ---- Tier traffic ----
    /// Allocations served by a thread-cache free list (no lock taken).
    pub thread_cache_hits: AtomicU64,
    /// Thread-cache misses that fell through to the central cache.
    pub thread_cache_misses: AtomicU64,
    /// Batches handed out by the central cache.
    pub central_fetches: AtomicU64,
    /// Chains returned to the central cache.
    pub central_returns: AtomicU64,
    /// Thread-cache lists trimmed back to the central cache.
    pub spills: AtomicU64,

    // ---- Page cache / OS ----
    /// Calls to `platform::page_alloc`.
    pub os_alloc_count: AtomicU64,
    /// Bytes requested from the OS.
    pub os_alloc_bytes: AtomicU64,
    /// Free spans split to satisfy a smaller request.
    pub span_splits: AtomicU64,
    /// Released spans merged with a free right neighbour.
    pub span_coalesces: AtomicU64,
}

impl Stats {
    const fn new() -> Self {
        Self {
            alloc_count: AtomicU64::new(0),
            dealloc_count: AtomicU64::new(0),
            alloc_bytes: AtomicU64::new(0),
            large_allocs: AtomicU64::new(0),
            thread_cache_hits: AtomicU64::new(0),
            thread_cache_misses: AtomicU64::new(0),
            central_fetches: AtomicU64::new(0),
            central_returns: AtomicU64::new(0),
            spills: AtomicU64::new(0),
            os_alloc_count: AtomicU64::new(0),
            os_alloc_bytes: AtomicU64::new(0),
            span_splits: AtomicU64::new(0),
            span_coalesces: AtomicU64::new(0),
        }
    }
}

pub(crate) static STATS: Stats = Stats::new();

/// A point-in-time snapshot of all allocation statistics.
#[derive(Clone, Copy, Debug, Default)]
pub struct Snapshot {
    /// Total calls to `allocate`.
    pub alloc_count: u64,
    /// Total calls to `deallocate`.
    pub dealloc_count: u64,
    /// Sum of all requested byte sizes passed to `allocate`.
    pub alloc_bytes: u64,
    /// Requests above `MAX_BYTES` forwarded to the system allocator.
    pub large_allocs: u64,
    /// Allocations served by a thread-cache free list (no lock taken).
    pub thread_cache_hits: u64,
    /// Thread-cache misses that fell through to the central cache.
    pub thread_cache_misses: u64,
    /// Batches handed out by the central cache.
    pub central_fetches: u64,
    /// Chains returned to the central cache.
    pub central_returns: u64,
    /// Thread-cache lists trimmed back to the central cache.
    pub spills: u64,
    /// Calls to `platform::page_alloc`.
    pub os_alloc_count: u64,
    /// Bytes requested from the OS.
    pub os_alloc_bytes: u64,
    /// Free spans split to satisfy a smaller request.
    pub span_splits: u64,
    /// Released spans merged with a free right neighbour.
    pub span_coalesces: u64,
}

/// Load all counters with `Relaxed` ordering and return a [`Snapshot`].
pub fn snapshot() -> Snapshot {
    let s = &STATS;
    Snapshot {
        alloc_count: s.alloc_count.load(Ordering::Relaxed),
        dealloc_count: s.dealloc_count.load(Ordering::Relaxed),
        alloc_bytes: s.alloc_bytes.load(Ordering::Relaxed),
        large_allocs: s.large_allocs.load(Ordering::Relaxed),
        thread_cache_hits: s.thread_cache_hits.load(Ordering::Relaxed),
        thread_cache_misses: s.thread_cache_misses.load(Ordering::Relaxed),
        central_fetches: s.central_fetches.load(Ordering::Relaxed),
        central_returns: s.central_returns.load(Ordering::Relaxed),
        spills: s.spills.load(Ordering::Relaxed),
        os_alloc_count: s.os_alloc_count.load(Ordering::Relaxed),
        os_alloc_bytes: s.os_alloc_bytes.load(Ordering::Relaxed),
        span_splits: s.span_splits.load(Ordering::Relaxed),
        span_coalesces: s.span_coalesces.load(Ordering::Relaxed),
    }
}
