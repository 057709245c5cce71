use std::alloc::{Layout, alloc, dealloc};
use std::cell::Cell;
use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::{Error, Result};

/// A source of raw memory from which pools obtain whole pages, and to which oversized or
/// multi-element requests are forwarded directly.
///
/// # Safety
///
/// Implementations must return memory that is valid for reads and writes of `layout.size()`
/// bytes, aligned to `layout.align()` and not aliased by any other live allocation, and must
/// accept back every pointer they handed out when presented with the same layout.
pub unsafe trait RawMemory {
    /// Obtains a block of memory matching `layout`.
    ///
    /// Callers never pass a zero-sized layout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the memory cannot be provided.
    fn allocate_raw(&self, layout: Layout) -> Result<NonNull<u8>>;

    /// Returns a block of memory previously obtained from [`allocate_raw()`][Self::allocate_raw].
    ///
    /// # Safety
    ///
    /// The caller must guarantee that `ptr` was returned by `allocate_raw()` on this source (or
    /// a clone of it) with the same `layout` and has not been returned already.
    unsafe fn deallocate_raw(&self, ptr: NonNull<u8>, layout: Layout);
}

/// Raw memory from the Rust global allocator. This is the default memory source of every pool.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[expect(clippy::exhaustive_structs, reason = "intentionally an empty struct")]
pub struct SystemMemory;

// SAFETY: We forward to the global allocator, which upholds the same contract.
unsafe impl RawMemory for SystemMemory {
    fn allocate_raw(&self, layout: Layout) -> Result<NonNull<u8>> {
        assert!(
            layout.size() > 0,
            "raw memory requests must not be zero-sized"
        );

        // SAFETY: The layout has a non-zero size, as asserted above.
        NonNull::new(unsafe { alloc(layout) }).ok_or_else(|| Error::OutOfMemory {
            size: layout.size(),
            align: layout.align(),
        })
    }

    unsafe fn deallocate_raw(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe {
            dealloc(ptr.as_ptr(), layout);
        }
    }
}

/// A [`RawMemory`] wrapper that counts the traffic flowing to another memory source.
///
/// Clones share the same counters, so a counting source can be handed to a pool and inspected
/// afterwards through a retained clone.
///
/// # Example
///
/// ```rust
/// use clique_pool::{CountingMemory, PoolAllocator};
///
/// let memory = CountingMemory::default();
/// let allocator = PoolAllocator::<u64>::builder()
///     .memory(memory.clone())
///     .build();
///
/// let block = allocator.allocate(1);
/// assert_eq!(memory.live_blocks(), 1); // The first page.
///
/// // SAFETY: The block came from this allocator with the same count.
/// unsafe { allocator.deallocate(block, 1) };
/// drop(allocator);
///
/// assert_eq!(memory.live_blocks(), 0);
/// ```
#[derive(Clone)]
pub struct CountingMemory<M = SystemMemory> {
    inner: M,
    counters: Rc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    live_blocks: Cell<usize>,
    live_bytes: Cell<usize>,
    peak_bytes: Cell<usize>,
    total_allocations: Cell<u64>,
}

impl<M> CountingMemory<M> {
    /// Wraps `inner`, starting with all counters at zero.
    #[must_use]
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            counters: Rc::new(Counters::default()),
        }
    }

    /// Number of blocks obtained and not yet returned.
    #[must_use]
    pub fn live_blocks(&self) -> usize {
        self.counters.live_blocks.get()
    }

    /// Number of bytes obtained and not yet returned.
    #[must_use]
    pub fn live_bytes(&self) -> usize {
        self.counters.live_bytes.get()
    }

    /// Highest value [`live_bytes()`][Self::live_bytes] has ever reached.
    #[must_use]
    pub fn peak_bytes(&self) -> usize {
        self.counters.peak_bytes.get()
    }

    /// Number of successful allocation calls made over the lifetime of the counters.
    #[must_use]
    pub fn total_allocations(&self) -> u64 {
        self.counters.total_allocations.get()
    }
}

impl Default for CountingMemory {
    fn default() -> Self {
        Self::new(SystemMemory)
    }
}

// SAFETY: We forward to the inner source, which upholds the contract. Counting has no
// effect on the memory itself.
unsafe impl<M: RawMemory> RawMemory for CountingMemory<M> {
    fn allocate_raw(&self, layout: Layout) -> Result<NonNull<u8>> {
        let ptr = self.inner.allocate_raw(layout)?;

        let counters = &self.counters;

        // Cannot overflow because that would imply more live memory than the address space holds.
        let live_bytes = counters.live_bytes.get().wrapping_add(layout.size());
        counters.live_bytes.set(live_bytes);
        counters
            .live_blocks
            .set(counters.live_blocks.get().wrapping_add(1));
        counters
            .total_allocations
            .set(counters.total_allocations.get().wrapping_add(1));
        counters
            .peak_bytes
            .set(counters.peak_bytes.get().max(live_bytes));

        Ok(ptr)
    }

    unsafe fn deallocate_raw(&self, ptr: NonNull<u8>, layout: Layout) {
        let counters = &self.counters;

        assert!(
            counters.live_blocks.get() > 0,
            "deallocate_raw() called with no live blocks outstanding"
        );

        counters
            .live_blocks
            .set(counters.live_blocks.get().wrapping_sub(1));
        counters
            .live_bytes
            .set(counters.live_bytes.get().saturating_sub(layout.size()));

        // SAFETY: Forwarding safety requirements to the caller.
        unsafe {
            self.inner.deallocate_raw(ptr, layout);
        }
    }
}

impl<M: fmt::Debug> fmt::Debug for CountingMemory<M> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountingMemory")
            .field("inner", &self.inner)
            .field("counters", &self.counters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::PoolAllocator;

    assert_impl_all!(SystemMemory: Send, Sync, Copy, fmt::Debug);
    assert_not_impl_any!(CountingMemory: Send, Sync);

    #[test]
    fn system_memory_round_trip() {
        let layout = Layout::from_size_align(64, 16).unwrap();
        let ptr = SystemMemory.allocate_raw(layout).unwrap();

        assert_eq!(ptr.as_ptr().addr() % 16, 0);

        // SAFETY: We own the 64 bytes we just allocated.
        unsafe {
            ptr.as_ptr().write_bytes(0xAB, 64);
            assert_eq!(ptr.as_ptr().add(63).read(), 0xAB);
        }

        // SAFETY: Same source, same layout, not yet deallocated.
        unsafe { SystemMemory.deallocate_raw(ptr, layout) };
    }

    #[test]
    #[should_panic]
    fn system_memory_rejects_zero_size() {
        let layout = Layout::from_size_align(0, 1).unwrap();
        _ = SystemMemory.allocate_raw(layout);
    }

    #[test]
    fn counting_memory_tracks_live_and_peak() {
        let memory = CountingMemory::default();
        let observer = memory.clone();

        let small = Layout::from_size_align(32, 8).unwrap();
        let large = Layout::from_size_align(96, 8).unwrap();

        let a = memory.allocate_raw(small).unwrap();
        let b = memory.allocate_raw(large).unwrap();

        assert_eq!(observer.live_blocks(), 2);
        assert_eq!(observer.live_bytes(), 128);
        assert_eq!(observer.peak_bytes(), 128);
        assert_eq!(observer.total_allocations(), 2);

        // SAFETY: Same source, same layout, not yet deallocated.
        unsafe { memory.deallocate_raw(b, large) };

        assert_eq!(observer.live_blocks(), 1);
        assert_eq!(observer.live_bytes(), 32);
        assert_eq!(observer.peak_bytes(), 128);

        // SAFETY: Same source, same layout, not yet deallocated.
        unsafe { memory.deallocate_raw(a, small) };

        assert_eq!(observer.live_blocks(), 0);
        assert_eq!(observer.live_bytes(), 0);
        assert_eq!(observer.total_allocations(), 2);
    }

    #[test]
    fn default_counting_memory_feeds_a_pool() {
        let memory = CountingMemory::default();

        let allocator = PoolAllocator::<u64>::builder()
            .memory(memory.clone())
            .build();

        let block = allocator.allocate(1);
        assert_eq!(memory.live_blocks(), 1);
        assert_eq!(memory.total_allocations(), 1);

        // SAFETY: The block came from this allocator with the same count.
        unsafe { allocator.deallocate(block, 1) };
        drop(allocator);

        assert_eq!(memory.live_blocks(), 0);
    }

    #[test]
    fn counting_memory_is_debug() {
        let memory = CountingMemory::new(SystemMemory);
        let output = format!("{memory:?}");
        assert!(output.contains("CountingMemory"));
        assert!(output.contains("live_blocks"));
    }
}
