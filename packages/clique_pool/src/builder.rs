use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;

use crate::{
    DEFAULT_MAX_PAGE_BYTES, MIN_MAX_PAGE_BYTES, PackedHeader, PageHandle, PageHeader,
    PoolAllocator, RawMemory, SystemMemory,
};

/// Builder for creating an instance of [`PoolAllocator`].
///
/// Every setting is optional. The settings chosen here are shared by the whole clique that grows
/// out of the built allocator, and are inherited by handles that detach from it.
///
/// # Examples
///
/// ```
/// use clique_pool::{CountingMemory, DirectHeader, PoolAllocator};
///
/// let memory = CountingMemory::default();
///
/// let allocator = PoolAllocator::<u32>::builder()
///     .max_page_bytes(16 * 1024)
///     .header::<DirectHeader>()
///     .memory(memory.clone())
///     .build();
///
/// let block = allocator.allocate(1);
///
/// // SAFETY: The block came from this allocator with the same count.
/// unsafe { allocator.deallocate(block, 1) };
/// ```
#[must_use]
pub struct PoolAllocatorBuilder<T, H = PackedHeader, M = SystemMemory> {
    memory: M,
    max_page_bytes: usize,

    _types: PhantomData<fn() -> (T, H)>,
}

impl<T> PoolAllocatorBuilder<T> {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            memory: SystemMemory,
            max_page_bytes: DEFAULT_MAX_PAGE_BYTES,
            _types: PhantomData,
        }
    }
}

impl<T, H, M> PoolAllocatorBuilder<T, H, M> {
    /// Sets the largest size in bytes, header included, that any single page may have.
    ///
    /// Pages grow exponentially until they reach this budget. Larger budgets mean fewer calls to
    /// the raw memory source, smaller budgets bound the size of each call.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is less than [`MIN_MAX_PAGE_BYTES`].
    ///
    /// # Examples
    ///
    /// ```
    /// use clique_pool::PoolAllocator;
    ///
    /// let allocator = PoolAllocator::<u64>::builder().max_page_bytes(4096).build();
    /// ```
    #[inline]
    pub fn max_page_bytes(mut self, bytes: usize) -> Self {
        assert!(
            bytes >= MIN_MAX_PAGE_BYTES,
            "page byte budget {bytes} is below the minimum of {MIN_MAX_PAGE_BYTES}"
        );

        self.max_page_bytes = bytes;
        self
    }

    /// Sets the raw memory source used for pages and for requests that bypass the pool.
    #[inline]
    pub fn memory<M2: RawMemory + Clone>(self, memory: M2) -> PoolAllocatorBuilder<T, H, M2> {
        PoolAllocatorBuilder {
            memory,
            max_page_bytes: self.max_page_bytes,
            _types: PhantomData,
        }
    }

    /// Selects the page header encoding. The default is [`PackedHeader`].
    #[inline]
    pub fn header<H2: PageHeader>(self) -> PoolAllocatorBuilder<T, H2, M> {
        PoolAllocatorBuilder {
            memory: self.memory,
            max_page_bytes: self.max_page_bytes,
            _types: PhantomData,
        }
    }
}

impl<T, H: PageHeader, M: RawMemory + Clone> PoolAllocatorBuilder<T, H, M> {
    /// Builds an allocator that is alone in a new clique and has no pages yet.
    #[must_use]
    #[inline]
    pub fn build(self) -> PoolAllocator<T, H, M> {
        PoolAllocator::from_handle(PageHandle::new(self.memory, self.max_page_bytes))
    }
}

impl<T, H, M: fmt::Debug> fmt::Debug for PoolAllocatorBuilder<T, H, M> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("memory", &self.memory)
            .field("max_page_bytes", &self.max_page_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::{CountingMemory, DirectHeader};

    assert_impl_all!(PoolAllocatorBuilder<u64>: Send, Sync, fmt::Debug);

    #[test]
    fn builder_new_creates_default_state() {
        let builder = PoolAllocatorBuilder::<u64>::new();
        assert_eq!(builder.max_page_bytes, DEFAULT_MAX_PAGE_BYTES);
        assert_eq!(builder.memory, SystemMemory);
    }

    #[test]
    fn max_page_bytes_is_applied() {
        let allocator = PoolAllocatorBuilder::<u64>::new()
            .max_page_bytes(MIN_MAX_PAGE_BYTES)
            .build();

        assert_eq!(allocator.max_page_bytes(), MIN_MAX_PAGE_BYTES);
    }

    #[test]
    #[should_panic]
    fn max_page_bytes_below_minimum_panics() {
        _ = PoolAllocatorBuilder::<u64>::new().max_page_bytes(MIN_MAX_PAGE_BYTES - 1);
    }

    #[test]
    fn settings_survive_type_changing_steps() {
        let memory = CountingMemory::default();

        let allocator = PoolAllocatorBuilder::<u64>::new()
            .max_page_bytes(8192)
            .memory(memory.clone())
            .header::<DirectHeader>()
            .build();

        assert_eq!(allocator.max_page_bytes(), 8192);

        let block = allocator.allocate(1);
        assert_eq!(memory.live_blocks(), 1);

        // SAFETY: The block came from this allocator with the same count.
        unsafe { allocator.deallocate(block, 1) };
    }

    #[test]
    fn builder_is_debug() {
        let builder = PoolAllocatorBuilder::<u64>::new();
        let output = format!("{builder:?}");
        assert!(output.contains("PoolAllocatorBuilder"));
        assert!(output.contains("max_page_bytes"));
    }
}
