//! Thread cache (front end): per-thread free lists, one per size class.
//!
//! All state is private to the owning thread, so the hot paths (pop on
//! allocate, push on deallocate) run with zero synchronization. An empty
//! list refills with a batch from the central cache; a list that grows
//! past the spill threshold returns three quarters of itself. Requests
//! above [`MAX_BYTES`] never touch the tiers and go straight to the
//! system allocator.

use crate::central_cache::CentralCache;
use crate::page_cache::PageCache;
use crate::size_class::{self, class_of, NUM_FREE_LISTS};
use crate::span::FreeObject;
use crate::stat_inc;
use crate::MAX_BYTES;
use core::ptr;
use std::alloc::Layout;

/// High-water mark: a free list longer than this spills to the central
/// cache. One constant across all classes.
const SPILL_THRESHOLD: u32 = 64;

/// Per-thread cache holding one free list per size class.
pub struct ThreadCache {
    /// Free-list head per class, null when empty.
    free_list: Box<[*mut FreeObject]>,
    /// Length of each list. Always equals the number of reachable nodes.
    list_size: Box<[u32]>,
}

impl Default for ThreadCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadCache {
    pub fn new() -> Self {
        Self {
            free_list: vec![ptr::null_mut(); NUM_FREE_LISTS].into_boxed_slice(),
            list_size: vec![0u32; NUM_FREE_LISTS].into_boxed_slice(),
        }
    }

    /// Return a writable region of at least `size` bytes, 8-aligned, or
    /// null if memory is exhausted. A `size` of zero is served as the
    /// smallest class; a size above [`MAX_BYTES`] is delegated to the
    /// system allocator.
    pub fn allocate(
        &mut self,
        size: usize,
        central: &CentralCache,
        page_cache: &PageCache,
    ) -> *mut u8 {
        if size > MAX_BYTES {
            return system_alloc(size);
        }

        let class = class_of(size);
        let head = self.free_list[class];
        if !head.is_null() {
            stat_inc!(thread_cache_hits);
            self.free_list[class] = unsafe { (*head).next };
            self.list_size[class] -= 1;
            return head as *mut u8;
        }

        unsafe { self.refill(class, central, page_cache) }
    }

    /// Release a region previously returned by [`allocate`] for this same
    /// `size`.
    ///
    /// # Safety
    ///
    /// `ptr` must have come from [`allocate`] with this same `size` and
    /// must not be freed again or used afterwards. A wrong size, double
    /// free, or foreign pointer is undefined behavior; none of them is
    /// detected.
    ///
    /// [`allocate`]: ThreadCache::allocate
    pub unsafe fn deallocate(&mut self, ptr: *mut u8, size: usize, central: &CentralCache) {
        if size > MAX_BYTES {
            system_dealloc(ptr, size);
            return;
        }

        let class = class_of(size);
        let obj = ptr as *mut FreeObject;
        unsafe { (*obj).next = self.free_list[class] };
        self.free_list[class] = obj;
        self.list_size[class] += 1;

        if self.list_size[class] > SPILL_THRESHOLD {
            unsafe { self.spill(class, central) };
        }
    }

    /// Slow path: pull a batch from the central cache. The first node is
    /// the caller's; the rest become the new list. The chain length is
    /// whatever the central cache chose, counted here by traversal.
    #[cold]
    unsafe fn refill(
        &mut self,
        class: usize,
        central: &CentralCache,
        page_cache: &PageCache,
    ) -> *mut u8 {
        stat_inc!(thread_cache_misses);

        let chain = unsafe { central.fetch_range(class, page_cache) };
        if chain.is_null() {
            return ptr::null_mut();
        }

        let mut received = 0u32;
        let mut node = chain;
        while !node.is_null() {
            received += 1;
            node = unsafe { (*node).next };
        }

        self.free_list[class] = unsafe { (*chain).next };
        self.list_size[class] += received - 1;
        chain as *mut u8
    }

    /// Return the tail of an over-long list to the central cache, keeping
    /// roughly a quarter (at least one node) at the head.
    unsafe fn spill(&mut self, class: usize, central: &CentralCache) {
        let len = self.list_size[class] as usize;
        if len <= 1 {
            return;
        }
        stat_inc!(spills);

        let keep = (len / 4).max(1);
        let mut split = self.free_list[class];
        let mut kept = 1usize;
        while kept < keep {
            let next = unsafe { (*split).next };
            if next.is_null() {
                break;
            }
            split = next;
            kept += 1;
        }

        let tail = unsafe { (*split).next };
        unsafe { (*split).next = ptr::null_mut() };
        self.list_size[class] = kept as u32;

        if !tail.is_null() {
            let returned = len - kept;
            unsafe {
                central.return_range(tail, returned * size_class::class_to_size(class), class)
            };
        }
    }

    /// Hand every cached node back to the central cache. Called when the
    /// owning thread exits so its capacity is not stranded.
    pub fn drain(&mut self, central: &CentralCache) {
        for class in 0..NUM_FREE_LISTS {
            let head = self.free_list[class];
            if head.is_null() {
                continue;
            }
            let len = self.list_size[class] as usize;
            unsafe {
                central.return_range(head, len * size_class::class_to_size(class), class)
            };
            self.free_list[class] = ptr::null_mut();
            self.list_size[class] = 0;
        }
    }
}

/// Forward a request above `MAX_BYTES` to the system allocator. This is
/// the allocator's boundary, not a failure.
pub(crate) fn system_alloc(size: usize) -> *mut u8 {
    stat_inc!(large_allocs);
    match Layout::from_size_align(size, crate::ALIGNMENT) {
        Ok(layout) => unsafe { std::alloc::alloc(layout) },
        Err(_) => ptr::null_mut(),
    }
}

pub(crate) fn system_dealloc(ptr: *mut u8, size: usize) {
    if let Ok(layout) = Layout::from_size_align(size, crate::ALIGNMENT) {
        unsafe { std::alloc::dealloc(ptr, layout) };
    }
}
