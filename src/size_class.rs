//! Size class mapping: user sizes to free-list indices and back.
//!
//! Every size up to [`MAX_BYTES`] is bucketed into one of
//! [`NUM_FREE_LISTS`] classes at 8-byte granularity: class `i` holds
//! objects of exactly `(i + 1) * ALIGNMENT` bytes. These are the only
//! functions that convert between user sizes and class indices; every
//! other tier calls them.

/// Object alignment, and the size granularity of the classes. Must be at
/// least the size of a pointer so the free-list link fits in a free object.
pub const ALIGNMENT: usize = 8;

/// Largest size served by the size classes. Anything above goes to the
/// system allocator.
pub const MAX_BYTES: usize = 256 * 1024;

/// Number of size classes.
pub const NUM_FREE_LISTS: usize = MAX_BYTES / ALIGNMENT;

const _: () = assert!(ALIGNMENT >= core::mem::size_of::<*mut u8>());

/// Map a request size to its class index. Sizes below `ALIGNMENT`
/// (including 0) land in class 0; `MAX_BYTES` lands in the last class.
/// The caller must have rejected sizes above `MAX_BYTES`.
#[inline]
pub fn class_of(size: usize) -> usize {
    let size = size.max(ALIGNMENT);
    (size + ALIGNMENT - 1) / ALIGNMENT - 1
}

/// The object size for a class index.
#[inline]
pub const fn class_to_size(class: usize) -> usize {
    (class + 1) * ALIGNMENT
}

/// Number of objects the central cache hands to a thread cache per refill:
/// `min(4096 / size, base)`, with the base shrinking as objects grow so a
/// single refill never moves more than a few pages' worth of memory.
#[inline]
pub fn batch_size(class: usize) -> usize {
    let size = class_to_size(class);
    let base = match size {
        ..=32 => 64,
        ..=64 => 32,
        ..=128 => 16,
        ..=256 => 8,
        ..=512 => 4,
        ..=1024 => 2,
        _ => 1,
    };
    base.min((4096 / size).max(1))
}
