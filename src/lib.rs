//! tieralloc: a tiered small-object memory allocator.
//!
//! Serves allocations up to 256 KiB from three tiers:
//! - Thread caches (fast path, no locks)
//! - Central cache (per-size-class spin locking)
//! - Page cache (span management, OS interface)
//!
//! Larger requests are forwarded to the system allocator.
//!
//! Deallocation is *sized*: the caller passes back the size it allocated
//! with. Object sizes are never recorded inside the objects themselves;
//! a freed object stores nothing but the link word of its free list.
//!
//! # Usage
//!
//! ```
//! let p = tieralloc::allocate(64);
//! assert!(!p.is_null());
//! unsafe {
//!     p.write_bytes(0xAB, 64);
//!     tieralloc::deallocate(p, 64);
//! }
//! ```

pub mod allocator;
pub mod central_cache;
mod macros;
pub mod page_cache;
pub mod platform;
pub mod size_class;
pub mod span;
#[cfg(feature = "stats")]
pub mod stats;
pub mod sync;
pub mod thread_cache;

/// Page size used by the page cache (4 KiB).
pub const PAGE_SHIFT: usize = 12;
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

// Re-export the public surface at the crate root.
pub use allocator::{allocate, deallocate, initialize};
pub use size_class::{ALIGNMENT, MAX_BYTES};
