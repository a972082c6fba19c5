//! Central cache (middle tier): per-size-class shared free lists.
//!
//! One free-list head and one spin lock per size class; classes never
//! contend with each other. An empty class refills itself by taking a span
//! from the page cache and carving it into objects. Once a span has been
//! carved its objects circulate between here and the thread caches for the
//! rest of the process; the span itself is never reassembled.

use crate::page_cache::PageCache;
use crate::size_class::{self, NUM_FREE_LISTS};
use crate::span::FreeObject;
use crate::stat_inc;
use crate::sync::SpinLock;
use crate::PAGE_SIZE;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

/// Pages per span carved for classes that fit inside it (32 KiB). Larger
/// classes get exactly as many pages as one object needs.
pub const SPAN_PAGES: usize = 8;

pub struct CentralCache {
    /// Free-list head per class. Stores use release ordering and loads in
    /// the fetch path use acquire, so a chain published by one thread's
    /// return is fully linked before another thread walks it.
    heads: [AtomicPtr<FreeObject>; NUM_FREE_LISTS],
    /// Per-class lock, held across the whole of a fetch or return,
    /// including the call down into the page cache.
    locks: [SpinLock; NUM_FREE_LISTS],
}

impl Default for CentralCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CentralCache {
    pub const fn new() -> Self {
        Self {
            heads: [const { AtomicPtr::new(ptr::null_mut()) }; NUM_FREE_LISTS],
            locks: [const { SpinLock::new() }; NUM_FREE_LISTS],
        }
    }

    /// Remove a chain of up to `batch_size(class)` objects for the given
    /// class. The chain is null-terminated and disconnected from the
    /// cache; the caller learns its length by traversal. Returns null only
    /// when the class index is out of range or the page cache is
    /// exhausted.
    ///
    /// # Safety
    ///
    /// The returned objects are uninitialized storage of exactly
    /// `class_to_size(class)` bytes each; the caller must hand them out
    /// for that size only.
    pub unsafe fn fetch_range(&self, class: usize, page_cache: &PageCache) -> *mut FreeObject {
        if class >= NUM_FREE_LISTS {
            return ptr::null_mut();
        }

        let _guard = self.locks[class].lock();
        stat_inc!(central_fetches);

        let head = self.heads[class].load(Ordering::Acquire);
        if !head.is_null() {
            let (chain, rest) = unsafe { Self::cut_chain(head, size_class::batch_size(class)) };
            self.heads[class].store(rest, Ordering::Release);
            return chain;
        }

        unsafe { self.carve_span(class, page_cache) }
    }

    /// Prepend a null-terminated chain to the class's free list.
    /// `total_bytes` declares the chain's size (element count times class
    /// size); the splice walk is capped by it.
    ///
    /// # Safety
    ///
    /// Every node in the chain must be a free object of exactly
    /// `class_to_size(class)` bytes, reachable from no other list.
    pub unsafe fn return_range(&self, chain: *mut FreeObject, total_bytes: usize, class: usize) {
        if chain.is_null() || class >= NUM_FREE_LISTS {
            return;
        }
        let declared = (total_bytes / size_class::class_to_size(class)).max(1);

        let _guard = self.locks[class].lock();
        stat_inc!(central_returns);

        let mut tail = chain;
        let mut walked = 1;
        unsafe {
            while walked < declared && !(*tail).next.is_null() {
                tail = (*tail).next;
                walked += 1;
            }
            (*tail).next = self.heads[class].load(Ordering::Relaxed);
        }
        self.heads[class].store(chain, Ordering::Release);
    }

    /// Take a span from the page cache and carve it into class-sized
    /// objects: the caller's batch off the front, the remainder published
    /// as the new class head. Called with the class lock held.
    unsafe fn carve_span(&self, class: usize, page_cache: &PageCache) -> *mut FreeObject {
        let size = size_class::class_to_size(class);
        let pages = if size <= SPAN_PAGES * PAGE_SIZE {
            SPAN_PAGES
        } else {
            size.div_ceil(PAGE_SIZE)
        };

        let base = page_cache.allocate_span(pages);
        if base.is_null() {
            return ptr::null_mut();
        }

        // floor(span bytes / size) objects; the tail residue, if any, is
        // forfeited to internal fragmentation.
        let count = (pages * PAGE_SIZE) / size;
        let mut chain: *mut FreeObject = ptr::null_mut();
        unsafe {
            for i in (0..count).rev() {
                let obj = base.add(i * size) as *mut FreeObject;
                (*obj).next = chain;
                chain = obj;
            }
        }

        let (chain, rest) = unsafe { Self::cut_chain(chain, size_class::batch_size(class)) };
        self.heads[class].store(rest, Ordering::Release);
        chain
    }

    /// Cut up to `count` nodes off the front of a non-null chain. Returns
    /// the detached front and the remainder.
    unsafe fn cut_chain(
        chain: *mut FreeObject,
        count: usize,
    ) -> (*mut FreeObject, *mut FreeObject) {
        let mut tail = chain;
        let mut taken = 1;
        let rest;
        unsafe {
            while taken < count && !(*tail).next.is_null() {
                tail = (*tail).next;
                taken += 1;
            }
            rest = (*tail).next;
            (*tail).next = ptr::null_mut();
        }
        (chain, rest)
    }
}
