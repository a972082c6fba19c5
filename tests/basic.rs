//! Basic integration tests for the public allocate/deallocate surface.

use tieralloc::{allocate, deallocate, initialize, ALIGNMENT, MAX_BYTES};

#[test]
fn test_boundary_sizes() {
    initialize();

    // One object of each boundary size. The last is beyond the tiers and
    // comes from the system allocator; all six are usable and distinct.
    let sizes = [0, 1, 8, 512, MAX_BYTES, MAX_BYTES + 1];
    let ptrs: Vec<*mut u8> = sizes.iter().map(|&s| allocate(s)).collect();

    for (&size, &ptr) in sizes.iter().zip(&ptrs) {
        assert!(!ptr.is_null(), "allocate({}) returned null", size);
    }
    // The five in-range pointers are 8-aligned.
    for (&size, &ptr) in sizes.iter().zip(&ptrs).take(5) {
        assert_eq!(
            ptr as usize % ALIGNMENT,
            0,
            "allocate({}) misaligned: {:?}",
            size,
            ptr
        );
    }

    let mut unique: Vec<usize> = ptrs.iter().map(|&p| p as usize).collect();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), sizes.len(), "duplicate pointers");

    for (&size, &ptr) in sizes.iter().zip(&ptrs) {
        unsafe { deallocate(ptr, size) };
    }
}

#[test]
fn test_zero_size_is_writable() {
    let ptr = allocate(0);
    assert!(!ptr.is_null());
    assert_eq!(ptr as usize % ALIGNMENT, 0);
    // At least one aligned word of real storage.
    unsafe {
        ptr.write_bytes(0xA5, ALIGNMENT);
        for i in 0..ALIGNMENT {
            assert_eq!(*ptr.add(i), 0xA5);
        }
        deallocate(ptr, 0);
    }
}

#[test]
fn test_write_read_back() {
    for size in [1, 7, 8, 24, 100, 512, 1024, 4096, 32 * 1024, MAX_BYTES] {
        let ptr = allocate(size);
        assert!(!ptr.is_null(), "allocate({}) failed", size);
        unsafe {
            for i in 0..size {
                *ptr.add(i) = (i % 251) as u8;
            }
            for i in 0..size {
                assert_eq!(*ptr.add(i), (i % 251) as u8, "size {}, byte {}", size, i);
            }
            deallocate(ptr, size);
        }
    }
}

#[test]
fn test_alignment_sweep() {
    for size in 1..=256 {
        let ptr = allocate(size);
        assert!(!ptr.is_null());
        assert_eq!(
            ptr as usize % ALIGNMENT,
            0,
            "size {} misaligned: {:?}",
            size,
            ptr
        );
        unsafe { deallocate(ptr, size) };
    }
}

#[test]
fn test_lifo_reuse_per_thread() {
    // The node most recently freed is the node next allocated.
    let first = allocate(40);
    assert!(!first.is_null());
    unsafe { deallocate(first, 40) };
    let second = allocate(40);
    assert_eq!(first, second);
    unsafe { deallocate(second, 40) };
}

#[test]
fn test_alloc_free_cycles() {
    // Repeated cycles keep succeeding and settle on a stable set of nodes.
    for _ in 0..1000 {
        let a = allocate(56);
        let b = allocate(56);
        assert!(!a.is_null() && !b.is_null());
        assert_ne!(a, b);
        unsafe {
            deallocate(b, 56);
            deallocate(a, 56);
        }
    }
}

#[test]
fn test_large_allocation_round_trip() {
    // Beyond MAX_BYTES: the system allocator serves it; contents behave.
    let size = 1024 * 1024;
    let ptr = allocate(size);
    assert!(!ptr.is_null());
    unsafe {
        *ptr = 0x11;
        *ptr.add(size / 2) = 0x22;
        *ptr.add(size - 1) = 0x33;
        assert_eq!(*ptr, 0x11);
        assert_eq!(*ptr.add(size / 2), 0x22);
        assert_eq!(*ptr.add(size - 1), 0x33);
        deallocate(ptr, size);
    }
}

#[test]
fn test_many_sizes_interleaved() {
    let mut live: Vec<(usize, *mut u8)> = Vec::new();
    for round in 0..20 {
        for size in [8, 16, 72, 300, 1500, 9000] {
            let ptr = allocate(size);
            assert!(!ptr.is_null());
            unsafe { ptr.write_bytes((round & 0xFF) as u8, size) };
            live.push((size, ptr));
        }
        if round % 3 == 2 {
            for (size, ptr) in live.drain(..live.len() / 2) {
                unsafe { deallocate(ptr, size) };
            }
        }
    }
    for (size, ptr) in live {
        unsafe { deallocate(ptr, size) };
    }
}
