//! Top-level surface: ties the tiers together behind three operations.
//!
//! The central cache and page cache are process-wide const-initialized
//! statics; each thread lazily builds its own [`ThreadCache`] in a
//! `thread_local!` slot. When a thread exits, the slot's guard drains its
//! free lists back to the central cache so the capacity is not stranded.
//! During thread teardown (the slot already destroyed) operations fall
//! back to the central cache directly.

use crate::central_cache::CentralCache;
use crate::page_cache::PageCache;
use crate::size_class::{class_of, class_to_size};
use crate::span::FreeObject;
use crate::thread_cache::{self, ThreadCache};
use crate::{stat_add, stat_inc};
use crate::MAX_BYTES;
use core::cell::UnsafeCell;
use core::ptr;

pub(crate) static CENTRAL_CACHE: CentralCache = CentralCache::new();
pub(crate) static PAGE_CACHE: PageCache = PageCache::new();

struct CacheSlot {
    cache: UnsafeCell<ThreadCache>,
}

impl Drop for CacheSlot {
    fn drop(&mut self) {
        self.cache.get_mut().drain(&CENTRAL_CACHE);
    }
}

thread_local! {
    static THREAD_CACHE: CacheSlot = CacheSlot {
        cache: UnsafeCell::new(ThreadCache::new()),
    };
}

/// Eagerly construct the calling thread's cache. Optional: the first
/// allocation on a thread initializes it lazily, and the global tiers are
/// const-initialized statics.
pub fn initialize() {
    let _ = THREAD_CACHE.try_with(|_| {});
}

/// Allocate at least `size` bytes, 8-aligned. `size == 0` is served as the
/// smallest class; sizes above [`MAX_BYTES`] come from the system
/// allocator. Returns null only when memory is exhausted.
pub fn allocate(size: usize) -> *mut u8 {
    stat_inc!(alloc_count);
    stat_add!(alloc_bytes, size as u64);

    THREAD_CACHE
        .try_with(|slot| {
            let tc = unsafe { &mut *slot.cache.get() };
            tc.allocate(size, &CENTRAL_CACHE, &PAGE_CACHE)
        })
        .unwrap_or_else(|_| allocate_from_central(size))
}

/// Release a region obtained from [`allocate`], passing back the same
/// `size`.
///
/// # Safety
///
/// `ptr` must have come from [`allocate`] with this same `size` and must
/// not be freed again or used afterwards. A wrong size, double free, or
/// foreign pointer is undefined behavior; none of them is detected.
pub unsafe fn deallocate(ptr: *mut u8, size: usize) {
    stat_inc!(dealloc_count);

    let handled = THREAD_CACHE.try_with(|slot| {
        let tc = unsafe { &mut *slot.cache.get() };
        unsafe { tc.deallocate(ptr, size, &CENTRAL_CACHE) };
    });
    if handled.is_err() {
        unsafe { deallocate_to_central(ptr, size) };
    }
}

/// Thread-teardown path: the thread cache is gone, so take exactly one
/// object from the central cache and hand any batch surplus straight back.
#[cold]
fn allocate_from_central(size: usize) -> *mut u8 {
    if size > MAX_BYTES {
        return thread_cache::system_alloc(size);
    }

    let class = class_of(size);
    let chain = unsafe { CENTRAL_CACHE.fetch_range(class, &PAGE_CACHE) };
    if chain.is_null() {
        return ptr::null_mut();
    }

    let rest = unsafe { (*chain).next };
    if !rest.is_null() {
        let mut count = 0usize;
        let mut node = rest;
        while !node.is_null() {
            count += 1;
            node = unsafe { (*node).next };
        }
        unsafe { CENTRAL_CACHE.return_range(rest, count * class_to_size(class), class) };
        unsafe { (*chain).next = ptr::null_mut() };
    }
    chain as *mut u8
}

#[cold]
unsafe fn deallocate_to_central(ptr: *mut u8, size: usize) {
    if size > MAX_BYTES {
        thread_cache::system_dealloc(ptr, size);
        return;
    }

    let class = class_of(size);
    let obj = ptr as *mut FreeObject;
    unsafe {
        (*obj).next = ptr::null_mut();
        CENTRAL_CACHE.return_range(obj, class_to_size(class), class);
    }
}
