//! Page cache (back end): spans of contiguous pages.
//!
//! Owns every byte the allocator has ever obtained from the OS. Serves
//! span-sized requests best-fit from per-page-count free lists, splitting
//! larger spans, and coalesces a released span with its right neighbour.
//! Nothing is ever returned to the OS; the footprint is monotone.
//!
//! All state sits behind one mutex. Unlike the central cache's spin locks
//! this one may block, so the page cache must not be entered from contexts
//! that forbid blocking.

use crate::platform;
use crate::span::{self, Span};
use crate::{stat_add, stat_inc};
use crate::PAGE_SIZE;
use core::ptr;
use parking_lot::Mutex;
use std::collections::BTreeMap;

struct PageCacheInner {
    /// Page count -> head of a singly-linked list of free spans of exactly
    /// that page count. Ordered keys make best-fit a range scan.
    free_spans: BTreeMap<usize, *mut Span>,
    /// Base address -> span record, for every span whose base has been
    /// handed out. Consulted on release to recover the record and to find
    /// the right neighbour.
    span_map: BTreeMap<usize, *mut Span>,
}

// Raw pointers to OS-owned pages and heap records; exclusive access is
// provided by the enclosing Mutex.
unsafe impl Send for PageCacheInner {}

pub struct PageCache {
    inner: Mutex<PageCacheInner>,
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PageCache {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(PageCacheInner {
                free_spans: BTreeMap::new(),
                span_map: BTreeMap::new(),
            }),
        }
    }

    /// Allocate a span of exactly `pages` contiguous pages. Returns the
    /// page-aligned base address, or null if the OS refuses memory.
    ///
    /// The region is zero-filled only when freshly obtained from the OS;
    /// a reused span carries whatever was last written through it.
    pub fn allocate_span(&self, pages: usize) -> *mut u8 {
        debug_assert!(pages > 0);
        let mut inner = self.inner.lock();

        // Best fit: smallest free span of at least `pages` pages.
        if let Some((&count, &head)) = inner.free_spans.range(pages..).next() {
            let next = unsafe { (*head).next };
            if next.is_null() {
                inner.free_spans.remove(&count);
            } else {
                inner.free_spans.insert(count, next);
            }
            unsafe { (*head).next = ptr::null_mut() };

            if count > pages {
                // Split: the high-address tail becomes a new free span.
                stat_inc!(span_splits);
                let residue_base = unsafe { (*head).base.add(pages * PAGE_SIZE) };
                let residue = Span::record(residue_base, count - pages);
                unsafe { Self::push_free(&mut inner.free_spans, residue) };
                unsafe { (*head).pages = pages };
            }

            let base = unsafe { (*head).base };
            inner.span_map.insert(base as usize, head);
            return base;
        }

        // Nothing fits; grow from the OS.
        let bytes = pages * PAGE_SIZE;
        let base = unsafe { platform::page_alloc(bytes) };
        if base.is_null() {
            return ptr::null_mut();
        }
        stat_inc!(os_alloc_count);
        stat_add!(os_alloc_bytes, bytes as u64);

        let span = Span::record(base, pages);
        inner.span_map.insert(base as usize, span);
        base
    }

    /// Return a span previously obtained from [`allocate_span`]. A pointer
    /// the page cache never handed out is ignored. If the span ending at
    /// `ptr + pages * PAGE_SIZE` is currently free, the two are merged
    /// before insertion.
    ///
    /// Only the right neighbour is considered; adjacent free spans still
    /// merge once the left one is the one being released.
    ///
    /// [`allocate_span`]: PageCache::allocate_span
    pub fn deallocate_span(&self, ptr: *mut u8, pages: usize) {
        let mut inner = self.inner.lock();

        let Some(&span) = inner.span_map.get(&(ptr as usize)) else {
            return;
        };

        let neighbour_base = ptr as usize + pages * PAGE_SIZE;
        if let Some(&neighbour) = inner.span_map.get(&neighbour_base) {
            // The neighbour may be checked out to the central cache; merge
            // only if it is actually sitting in a free list.
            let neighbour_pages = unsafe { (*neighbour).pages };
            if unsafe { Self::unlink_free(&mut inner.free_spans, neighbour_pages, neighbour) } {
                stat_inc!(span_coalesces);
                unsafe { (*span).pages += neighbour_pages };
                inner.span_map.remove(&neighbour_base);
                unsafe { span::release_record(neighbour) };
            }
        }

        unsafe { Self::push_free(&mut inner.free_spans, span) };
    }

    /// Head-insert a span into the free list for its exact page count.
    ///
    /// # Safety
    ///
    /// `span` must be a valid record not currently in any free list.
    unsafe fn push_free(free_spans: &mut BTreeMap<usize, *mut Span>, span: *mut Span) {
        let pages = unsafe { (*span).pages };
        let head = free_spans.get(&pages).copied().unwrap_or(ptr::null_mut());
        unsafe { (*span).next = head };
        free_spans.insert(pages, span);
    }

    /// Unlink `target` from the free list for `pages`, if present. Linear
    /// search from the head; the per-count lists stay short.
    ///
    /// # Safety
    ///
    /// Every span reachable from the list head must be a valid record.
    unsafe fn unlink_free(
        free_spans: &mut BTreeMap<usize, *mut Span>,
        pages: usize,
        target: *mut Span,
    ) -> bool {
        let Some(&head) = free_spans.get(&pages) else {
            return false;
        };

        if head == target {
            let next = unsafe { (*target).next };
            if next.is_null() {
                free_spans.remove(&pages);
            } else {
                free_spans.insert(pages, next);
            }
            unsafe { (*target).next = ptr::null_mut() };
            return true;
        }

        let mut prev = head;
        loop {
            let next = unsafe { (*prev).next };
            if next.is_null() {
                return false;
            }
            if next == target {
                unsafe {
                    (*prev).next = (*target).next;
                    (*target).next = ptr::null_mut();
                }
                return true;
            }
            prev = next;
        }
    }

    /// Number of spans whose base is currently handed out or was handed
    /// out and released (coalesced-away neighbours excluded).
    #[cfg(test)]
    pub(crate) fn span_count(&self) -> usize {
        self.inner.lock().span_map.len()
    }

    /// Snapshot of the free-span index as (page count, spans in list).
    #[cfg(test)]
    pub(crate) fn free_span_shape(&self) -> Vec<(usize, usize)> {
        let inner = self.inner.lock();
        inner
            .free_spans
            .iter()
            .map(|(&pages, &head)| {
                let mut len = 0;
                let mut cur = head;
                while !cur.is_null() {
                    len += 1;
                    cur = unsafe { (*cur).next };
                }
                (pages, len)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_span_is_zeroed() {
        let cache = PageCache::new();
        let base = cache.allocate_span(8);
        assert!(!base.is_null());
        assert_eq!(base as usize % PAGE_SIZE, 0);
        for i in 0..8 * PAGE_SIZE {
            assert_eq!(unsafe { *base.add(i) }, 0, "byte {} not zero", i);
        }
        cache.deallocate_span(base, 8);
    }

    #[test]
    fn test_reuse_freed_span() {
        let cache = PageCache::new();
        let a = cache.allocate_span(4);
        assert!(!a.is_null());
        cache.deallocate_span(a, 4);

        // Exact-fit reuse hands back the same base.
        let b = cache.allocate_span(4);
        assert_eq!(a, b);
        assert_eq!(cache.span_count(), 1);
        cache.deallocate_span(b, 4);
    }

    #[test]
    fn test_best_fit_split() {
        let cache = PageCache::new();
        let base = cache.allocate_span(16);
        assert!(!base.is_null());
        cache.deallocate_span(base, 16);

        // 5 pages out of the 16-page span: low half, residue of 11 free.
        let low = cache.allocate_span(5);
        assert_eq!(low, base);
        assert_eq!(cache.free_span_shape(), vec![(11, 1)]);

        // The residue is served next.
        let high = cache.allocate_span(11);
        assert_eq!(high as usize, base as usize + 5 * PAGE_SIZE);
        assert!(cache.free_span_shape().is_empty());

        cache.deallocate_span(high, 11);
        cache.deallocate_span(low, 5);
    }

    #[test]
    fn test_no_fit_grows_from_os() {
        let cache = PageCache::new();
        let small = cache.allocate_span(2);
        cache.deallocate_span(small, 2);
        assert_eq!(cache.free_span_shape(), vec![(2, 1)]);

        // A 2-page span cannot satisfy 8 pages; the free list is untouched.
        let big = cache.allocate_span(8);
        assert!(!big.is_null());
        assert_eq!(cache.free_span_shape(), vec![(2, 1)]);
        cache.deallocate_span(big, 8);
    }

    #[test]
    fn test_coalesce_right_neighbour() {
        let cache = PageCache::new();

        // Carve two deterministically adjacent 8-page spans out of one
        // 16-page region.
        let base = cache.allocate_span(16);
        assert!(!base.is_null());
        cache.deallocate_span(base, 16);
        let low = cache.allocate_span(8);
        let high = cache.allocate_span(8);
        assert_eq!(low, base);
        assert_eq!(high as usize, low as usize + 8 * PAGE_SIZE);

        // Release the right span first, then the left: the left release
        // finds its right neighbour free and absorbs it.
        cache.deallocate_span(high, 8);
        cache.deallocate_span(low, 8);

        assert_eq!(cache.free_span_shape(), vec![(16, 1)]);
        assert_eq!(cache.span_count(), 1);

        // The merged span is allocatable as one 16-page unit.
        let again = cache.allocate_span(16);
        assert_eq!(again, base);
        cache.deallocate_span(again, 16);
    }

    #[test]
    fn test_no_left_coalescing() {
        let cache = PageCache::new();
        let base = cache.allocate_span(16);
        cache.deallocate_span(base, 16);
        let low = cache.allocate_span(8);
        let high = cache.allocate_span(8);

        // Released left-to-right: when the left span is freed its right
        // neighbour is still in use, and the right release looks only
        // rightward. The two spans stay separate.
        cache.deallocate_span(low, 8);
        cache.deallocate_span(high, 8);

        assert_eq!(cache.free_span_shape(), vec![(8, 2)]);
    }

    #[test]
    fn test_foreign_pointer_ignored() {
        let cache = PageCache::new();
        let base = cache.allocate_span(1);
        assert!(!base.is_null());

        // Never handed out by this cache: silently ignored.
        cache.deallocate_span(0xDEAD_B000 as *mut u8, 1);
        assert!(cache.free_span_shape().is_empty());
        assert_eq!(cache.span_count(), 1);

        cache.deallocate_span(base, 1);
        assert_eq!(cache.free_span_shape(), vec![(1, 1)]);
    }

    #[test]
    fn test_many_spans() {
        let cache = PageCache::new();
        let mut spans = Vec::new();
        for _ in 0..100 {
            let base = cache.allocate_span(1);
            assert!(!base.is_null());
            spans.push(base);
        }
        // All distinct.
        let mut sorted: Vec<_> = spans.iter().map(|p| *p as usize).collect();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 100);

        for base in spans {
            cache.deallocate_span(base, 1);
        }
    }
}
