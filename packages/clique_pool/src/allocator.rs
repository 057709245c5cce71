use std::alloc::{Layout, handle_alloc_error};
use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::align::alignment_for_size;
use crate::{
    DEFAULT_MAX_PAGE_BYTES, Error, MAX_ALIGN, MAX_BLOCK_SIZE, PackedHeader, PageHandle,
    PageHeader, PageRef, PoolAllocatorBuilder, RawMemory, Result, SystemMemory,
};

/// A single-threaded allocator that serves single values of `T` from a pool of fixed-size blocks.
///
/// Every allocator belongs to a clique: the set of allocators that share one pool. A new
/// allocator is alone in its own clique and has no memory yet. Cloning an allocator adds the
/// clone to the same clique, so a block allocated through any member may be deallocated through
/// any other member. The pool is released as a whole when the last member of the clique is
/// dropped.
///
/// Two allocators compare equal if and only if they are in the same clique.
///
/// Requests for more than one value, or for types too large or too strictly aligned to fit the
/// pool's blocks, are forwarded to the underlying [`RawMemory`] source unchanged.
///
/// # Example
///
/// ```rust
/// use clique_pool::PoolAllocator;
///
/// let allocator = PoolAllocator::<u64>::new();
/// let peer = allocator.clone();
///
/// let block = allocator.allocate(1);
///
/// // SAFETY: The block is freshly allocated and sized for one `u64`.
/// unsafe {
///     block.write(42);
///     assert_eq!(block.read(), 42);
/// }
///
/// // Any member of the clique can give the block back.
/// // SAFETY: The block came from the same clique with the same count.
/// unsafe { peer.deallocate(block, 1) };
///
/// assert_eq!(allocator, peer);
/// ```
///
/// # Thread safety
///
/// The allocator is single-threaded and cannot be moved or referenced across threads.
pub struct PoolAllocator<T, H: PageHeader = PackedHeader, M: RawMemory = SystemMemory> {
    handle: PageHandle<H, M>,

    _element: PhantomData<fn() -> T>,
}

impl<T> PoolAllocator<T> {
    /// Creates an allocator with the default header encoding, memory source and page budget.
    ///
    /// The allocator is alone in a new clique and obtains no memory until the first allocation.
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for configuring a new allocator.
    #[inline]
    pub fn builder() -> PoolAllocatorBuilder<T> {
        PoolAllocatorBuilder::new()
    }
}

impl<T, H: PageHeader, M: RawMemory> PoolAllocator<T, H, M> {
    #[must_use]
    pub(crate) fn from_handle(handle: PageHandle<H, M>) -> Self {
        Self {
            handle,
            _element: PhantomData,
        }
    }

    /// Allocates memory for `count` values of `T`.
    ///
    /// Zero-sized requests return a dangling, well-aligned pointer and touch no memory.
    ///
    /// # Panics
    ///
    /// Aborts through [`handle_alloc_error()`] if the memory source is exhausted, and panics if
    /// `count` values of `T` cannot be laid out in memory at all.
    #[must_use]
    pub fn allocate(&self, count: usize) -> NonNull<T> {
        match self.try_allocate(count) {
            Ok(ptr) => ptr,
            Err(Error::OutOfMemory { size, align }) => handle_alloc_error(
                Layout::from_size_align(size, align)
                    .expect("the failed request was made with this same valid layout"),
            ),
            Err(error) => panic!("cannot allocate {count} x {}: {error}", type_name::<T>()),
        }
    }

    /// Allocates memory for `count` values of `T`, reporting failure as an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the memory source cannot satisfy the request and
    /// [`Error::LayoutOverflow`] if `count` values of `T` do not fit in the address space. In
    /// either case the pool is left as it was.
    pub fn try_allocate(&self, count: usize) -> Result<NonNull<T>> {
        if Self::is_zero_sized(count) {
            return Ok(NonNull::dangling());
        }

        if self.routes_to_pool(count) {
            let page = self.handle.get_or_create_page(size_of::<T>(), true)?;

            return Ok(page.take_block().cast());
        }

        let layout = Self::array_layout(count)?;

        self.handle
            .memory()
            .allocate_raw(layout)
            .map(NonNull::cast)
    }

    /// Gives back memory obtained from [`allocate()`][Self::allocate] or
    /// [`try_allocate()`][Self::try_allocate].
    ///
    /// # Safety
    ///
    /// The caller must guarantee that `ptr` was allocated with the same `count` by an allocator
    /// of the same clique as this one, that it has not been deallocated already and that the
    /// memory is not used after this call. Any values stored in it are not dropped.
    ///
    /// # Panics
    ///
    /// Panics if the request routes to the pool but the clique has no pool, which means the
    /// pointer did not come from this clique.
    pub unsafe fn deallocate(&self, ptr: NonNull<T>, count: usize) {
        if Self::is_zero_sized(count) {
            return;
        }

        if self.routes_to_pool(count) {
            let Some(page) = self.handle.current_page() else {
                panic!(
                    "deallocate() of a pooled {} on an allocator whose clique has no pool",
                    type_name::<T>()
                );
            };

            // SAFETY: Routing is the same as when the block was allocated, so the block came from
            // this clique's chain. The caller guarantees it is no longer used.
            unsafe {
                page.return_block(ptr.cast());
            }

            return;
        }

        let layout = Self::array_layout(count)
            .expect("the same layout was valid when the memory was allocated");

        // SAFETY: The memory came from the clique's memory source with this layout, and the
        // caller guarantees it is no longer used.
        unsafe {
            self.handle.memory().deallocate_raw(ptr.cast(), layout);
        }
    }

    /// Leaves the current clique and joins the clique of `source`.
    ///
    /// This is how a container taking over the contents of another container should take over
    /// its allocator: afterwards, blocks allocated through `source` can be deallocated through
    /// `self`. If `self` was the last member of its old clique, the old pool is released.
    pub fn rederive_from<U>(&mut self, source: &PoolAllocator<U, H, M>) {
        self.handle = PageHandle::join_from(&source.handle);
    }

    /// Leaves the current clique and becomes alone in a new one, without any memory.
    ///
    /// The memory source and page budget are kept. If `self` was the last member of its old
    /// clique, the old pool is released.
    pub fn reset(&mut self)
    where
        M: Clone,
    {
        if self.handle.is_alone() {
            self.handle = self.handle.fresh_like();
        } else {
            self.handle.detach();
        }
    }

    /// Creates an allocator for a different element type in the same clique as this one.
    #[must_use]
    pub fn rebind<U>(&self) -> PoolAllocator<U, H, M> {
        PoolAllocator::from_handle(PageHandle::join_from(&self.handle))
    }

    /// Creates an allocator with the same configuration as this one that is alone in a new
    /// clique.
    ///
    /// This is what a container being copied should use for the copy, since the copy owns
    /// separate blocks.
    #[must_use]
    pub fn fresh_like(&self) -> Self
    where
        M: Clone,
    {
        Self::from_handle(self.handle.fresh_like())
    }

    /// Whether no other allocator shares this allocator's clique.
    #[must_use]
    pub fn is_alone(&self) -> bool {
        self.handle.is_alone()
    }

    /// Whether the clique has obtained any pool memory yet.
    #[must_use]
    pub fn has_page(&self) -> bool {
        self.handle.current_page().is_some()
    }

    /// The size of the blocks in the clique's pool, once the pool exists.
    ///
    /// The first pooled allocation in a clique fixes the block size for the lifetime of the pool.
    #[must_use]
    pub fn block_size(&self) -> Option<usize> {
        self.handle.current_page().map(PageRef::block_size)
    }

    /// Number of unused blocks currently held by the clique's pool.
    #[must_use]
    pub fn free_block_count(&self) -> usize {
        self.handle
            .current_page()
            .map_or(0, PageRef::count_free_blocks)
    }

    /// Number of pages that make up the clique's pool.
    #[must_use]
    pub fn page_count(&self) -> usize {
        PageRef::chain_len(self.handle.current_page())
    }

    /// The largest size in bytes, header included, of any page in the clique's pool.
    #[must_use]
    pub fn max_page_bytes(&self) -> usize {
        self.handle.max_page_bytes()
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(all(test, debug_assertions))]
    fn integrity_check(&self) {
        if let Some(page) = self.handle.current_page() {
            page.integrity_check(self.handle.max_page_bytes());
        }
    }

    fn is_zero_sized(count: usize) -> bool {
        size_of::<T>() == 0 || count == 0
    }

    /// Whether a request for `count` values is served from the pool.
    ///
    /// The answer only depends on `count` and on the block size of the clique's pool, which never
    /// changes once the pool exists. Allocation and deallocation of the same memory therefore
    /// always take the same route.
    fn routes_to_pool(&self, count: usize) -> bool {
        if count != 1 || size_of::<T>() > MAX_BLOCK_SIZE || align_of::<T>() > MAX_ALIGN {
            return false;
        }

        self.handle.current_page().is_none_or(|page| {
            let block_size = page.block_size();
            block_size >= size_of::<T>() && alignment_for_size(block_size) >= align_of::<T>()
        })
    }

    fn array_layout(count: usize) -> Result<Layout> {
        Layout::array::<T>(count).map_err(|_layout_error| Error::LayoutOverflow {
            count,
            element_size: size_of::<T>(),
        })
    }
}

impl<T, H: PageHeader, M: RawMemory> Clone for PoolAllocator<T, H, M> {
    /// Creates a new member of this allocator's clique.
    fn clone(&self) -> Self {
        Self::from_handle(PageHandle::join_from(&self.handle))
    }

    fn clone_from(&mut self, source: &Self) {
        self.rederive_from(source);
    }
}

impl<T, U, H: PageHeader, M: RawMemory> PartialEq<PoolAllocator<U, H, M>>
    for PoolAllocator<T, H, M>
{
    fn eq(&self, other: &PoolAllocator<U, H, M>) -> bool {
        match (self.handle.current_page(), other.handle.current_page()) {
            (Some(ours), Some(theirs)) => ours == theirs,
            (None, None) => self.handle.same_clique(&other.handle),
            _ => false,
        }
    }
}

impl<T, H: PageHeader, M: RawMemory> Eq for PoolAllocator<T, H, M> {}

impl<T, H: PageHeader, M: RawMemory + Default> Default for PoolAllocator<T, H, M> {
    fn default() -> Self {
        Self::from_handle(PageHandle::new(M::default(), DEFAULT_MAX_PAGE_BYTES))
    }
}

impl<T, H: PageHeader, M: RawMemory> fmt::Debug for PoolAllocator<T, H, M> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::items_after_statements,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::Cell;
    use std::collections::HashSet;
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::{CountingMemory, DirectHeader};

    assert_not_impl_any!(PoolAllocator<u32>: Send, Sync);
    assert_impl_all!(PoolAllocator<u32>: Clone, Eq, Default, fmt::Debug);

    #[repr(align(16))]
    struct Aligned16([u8; 16]);

    #[derive(Clone, Debug, Default)]
    struct FailingMemory;

    // SAFETY: Never hands out any memory.
    unsafe impl RawMemory for FailingMemory {
        fn allocate_raw(&self, layout: Layout) -> Result<NonNull<u8>> {
            Err(Error::OutOfMemory {
                size: layout.size(),
                align: layout.align(),
            })
        }

        unsafe fn deallocate_raw(&self, _ptr: NonNull<u8>, _layout: Layout) {
            panic!("nothing was ever allocated");
        }
    }

    /// Forwards to a [`CountingMemory`] until a shared budget of raw allocations runs out.
    #[derive(Clone, Debug)]
    struct LimitedMemory {
        inner: CountingMemory,
        remaining: Rc<Cell<usize>>,
    }

    impl LimitedMemory {
        fn new(inner: CountingMemory, budget: usize) -> Self {
            Self {
                inner,
                remaining: Rc::new(Cell::new(budget)),
            }
        }
    }

    // SAFETY: Forwards to a valid memory source, or refuses.
    unsafe impl RawMemory for LimitedMemory {
        fn allocate_raw(&self, layout: Layout) -> Result<NonNull<u8>> {
            let Some(remaining) = self.remaining.get().checked_sub(1) else {
                return Err(Error::OutOfMemory {
                    size: layout.size(),
                    align: layout.align(),
                });
            };

            self.remaining.set(remaining);
            self.inner.allocate_raw(layout)
        }

        unsafe fn deallocate_raw(&self, ptr: NonNull<u8>, layout: Layout) {
            unsafe { self.inner.deallocate_raw(ptr, layout) };
        }
    }

    fn counting<T>() -> (PoolAllocator<T, PackedHeader, CountingMemory>, CountingMemory) {
        let memory = CountingMemory::default();
        let allocator = PoolAllocator::<T>::builder()
            .memory(memory.clone())
            .build();

        (allocator, memory)
    }

    #[test]
    fn freed_block_is_reused_first() {
        let allocator = PoolAllocator::<[u8; 16]>::new();

        let first = allocator.allocate(1);
        assert_eq!(allocator.block_size(), Some(16));

        unsafe { allocator.deallocate(first, 1) };

        let second = allocator.allocate(1);
        assert_eq!(first, second);

        unsafe { allocator.deallocate(second, 1) };
        #[cfg(debug_assertions)]
        allocator.integrity_check();
    }

    #[test]
    fn blocks_hold_values() {
        let allocator = PoolAllocator::<u64>::new();

        let blocks = (0..100_u64)
            .map(|value| {
                let block = allocator.allocate(1);
                unsafe { block.write(value) };
                block
            })
            .collect::<Vec<_>>();

        let distinct = blocks.iter().copied().collect::<HashSet<_>>();
        assert_eq!(distinct.len(), blocks.len());

        for (expected, block) in (0..100_u64).zip(&blocks) {
            assert_eq!(unsafe { block.read() }, expected);
        }

        for block in blocks {
            unsafe { allocator.deallocate(block, 1) };
        }

        #[cfg(debug_assertions)]
        allocator.integrity_check();
    }

    #[test]
    fn clone_made_before_first_page_sees_it() {
        let original = PoolAllocator::<u32>::new();
        let clone = original.clone();

        assert!(!clone.has_page());

        let block = original.allocate(1);

        assert!(clone.has_page());
        assert_eq!(clone.block_size(), original.block_size());
        assert_eq!(original, clone);

        unsafe { clone.deallocate(block, 1) };
    }

    #[test]
    fn equality_follows_clique_membership() {
        let mut a = PoolAllocator::<u64>::new();
        let mut b = PoolAllocator::<u64>::new();

        assert_eq!(a, a);
        assert_ne!(a, b);

        let c = a.clone();
        assert_eq!(a, c);

        let block = c.allocate(1);
        assert_eq!(a, c);
        assert_ne!(a, b);

        b.rederive_from(&a);
        assert_eq!(a, b);
        assert_eq!(b, c);

        a.reset();
        assert!(a.is_alone());
        assert!(!a.has_page());
        assert_ne!(a, b);
        assert_eq!(b, c);

        unsafe { b.deallocate(block, 1) };
    }

    #[test]
    fn clone_from_joins_source() {
        let source = PoolAllocator::<u64>::new();
        let mut target = PoolAllocator::<u64>::new();

        let block = source.allocate(1);

        target.clone_from(&source);
        assert_eq!(target, source);
        assert!(!source.is_alone());

        unsafe { target.deallocate(block, 1) };
    }

    #[test]
    fn pool_released_with_last_member() {
        let (first, memory) = counting::<u64>();
        let second = first.clone();
        let third = second.rebind::<u32>();

        let blocks = (0..50).map(|_| first.allocate(1)).collect::<Vec<_>>();
        assert!(first.page_count() > 1);
        assert_eq!(memory.live_blocks(), first.page_count());

        for block in blocks {
            unsafe { second.deallocate(block, 1) };
        }

        drop(first);
        drop(second);
        assert!(third.is_alone());
        assert!(memory.live_blocks() > 0);

        drop(third);
        assert_eq!(memory.live_blocks(), 0);
        assert_eq!(memory.live_bytes(), 0);
    }

    #[test]
    fn reset_of_last_member_releases_pool() {
        let (mut allocator, memory) = counting::<u64>();

        let block = allocator.allocate(1);
        unsafe { allocator.deallocate(block, 1) };
        assert_eq!(memory.live_blocks(), 1);

        allocator.reset();
        assert_eq!(memory.live_blocks(), 0);
        assert!(!allocator.has_page());

        // The reset allocator keeps using the same memory source.
        let block = allocator.allocate(1);
        assert_eq!(memory.live_blocks(), 1);
        unsafe { allocator.deallocate(block, 1) };
    }

    #[test]
    fn oversized_values_bypass_pool() {
        let (allocator, memory) = counting::<[u8; MAX_BLOCK_SIZE + 8]>();

        let block = allocator.allocate(1);
        assert!(!allocator.has_page());
        assert_eq!(memory.live_blocks(), 1);
        assert_eq!(memory.live_bytes(), MAX_BLOCK_SIZE + 8);

        unsafe { allocator.deallocate(block, 1) };
        assert_eq!(memory.live_blocks(), 0);
    }

    #[test]
    fn batches_bypass_pool() {
        let (allocator, memory) = counting::<u64>();

        let batch = allocator.allocate(4);
        assert!(!allocator.has_page());
        assert_eq!(memory.live_bytes(), 32);

        let single = allocator.allocate(1);
        assert!(allocator.has_page());

        unsafe {
            allocator.deallocate(batch, 4);
            allocator.deallocate(single, 1);
        }

        assert_eq!(memory.live_blocks(), 1);
    }

    #[test]
    fn strictly_aligned_values_bypass_pool() {
        #[repr(align(32))]
        struct Aligned32(u8);

        let (allocator, memory) = counting::<Aligned32>();

        let block = allocator.allocate(1);
        assert!(!allocator.has_page());
        assert_eq!(block.as_ptr().addr() % 32, 0);
        assert_eq!(memory.live_blocks(), 1);

        unsafe { allocator.deallocate(block, 1) };
    }

    #[test]
    fn zero_sized_requests_touch_no_memory() {
        let (allocator, memory) = counting::<u64>();

        let none = allocator.allocate(0);
        assert_eq!(none, NonNull::dangling());
        unsafe { allocator.deallocate(none, 0) };

        let units = allocator.rebind::<()>();
        let unit = units.allocate(1);
        unsafe { units.deallocate(unit, 1) };

        assert!(!allocator.has_page());
        assert_eq!(memory.total_allocations(), 0);
    }

    #[test]
    fn rebind_shares_pool_of_compatible_type() {
        let allocator = PoolAllocator::<u64>::new();
        let rebound = allocator.rebind::<u32>();

        assert_eq!(allocator, rebound);

        let wide = allocator.allocate(1);
        let narrow = rebound.allocate(1);

        assert_eq!(rebound.block_size(), Some(8));
        assert_ne!(wide.cast::<u32>(), narrow);

        unsafe {
            rebound.deallocate(narrow, 1);
            allocator.deallocate(wide, 1);
        }

        #[cfg(debug_assertions)]
        allocator.integrity_check();
    }

    #[test]
    fn rebind_to_larger_type_bypasses_existing_pool() {
        let (allocator, memory) = counting::<u32>();

        let small = allocator.allocate(1);
        assert_eq!(memory.live_blocks(), 1);

        let rebound = allocator.rebind::<[u64; 4]>();
        let large = rebound.allocate(1);
        assert_eq!(memory.live_blocks(), 2);
        assert_eq!(rebound.block_size(), Some(8));

        unsafe {
            rebound.deallocate(large, 1);
            allocator.deallocate(small, 1);
        }

        assert_eq!(memory.live_blocks(), 1);
    }

    #[test]
    fn rebind_to_misaligned_blocks_bypasses_existing_pool() {
        let (allocator, memory) = counting::<[u8; 24]>();

        let unaligned = allocator.allocate(1);
        assert_eq!(allocator.block_size(), Some(24));

        let rebound = allocator.rebind::<Aligned16>();
        let aligned = rebound.allocate(1);
        assert_eq!(aligned.as_ptr().addr() % 16, 0);
        assert_eq!(memory.live_blocks(), 2);

        unsafe {
            rebound.deallocate(aligned, 1);
            allocator.deallocate(unaligned, 1);
        }
    }

    #[test]
    fn first_pool_of_aligned_type_aligns_every_block() {
        let allocator = PoolAllocator::<Aligned16>::new();

        let blocks = (0..20).map(|_| allocator.allocate(1)).collect::<Vec<_>>();

        for block in &blocks {
            assert_eq!(block.as_ptr().addr() % 16, 0);
        }

        for block in blocks {
            unsafe { allocator.deallocate(block, 1) };
        }
    }

    #[test]
    fn pool_grows_by_pages() {
        let allocator = PoolAllocator::<u64>::new();

        let first = allocator.allocate(1);
        assert_eq!(allocator.page_count(), 1);

        let mut blocks = vec![first];
        while allocator.free_block_count() > 0 {
            blocks.push(allocator.allocate(1));
        }
        assert_eq!(allocator.page_count(), 1);

        blocks.push(allocator.allocate(1));
        assert_eq!(allocator.page_count(), 2);

        for block in blocks {
            unsafe { allocator.deallocate(block, 1) };
        }

        #[cfg(debug_assertions)]
        allocator.integrity_check();
    }

    #[test]
    fn direct_header_works_alike() {
        let allocator = PoolAllocator::<u64>::builder()
            .header::<DirectHeader>()
            .build();

        let block = allocator.allocate(1);
        unsafe { allocator.deallocate(block, 1) };

        assert_eq!(allocator.allocate(1), block);
        unsafe { allocator.deallocate(block, 1) };
    }

    #[test]
    fn out_of_memory_leaves_pool_unchanged() {
        let allocator = PoolAllocator::<u64>::builder()
            .memory(FailingMemory)
            .build();

        let error = allocator.try_allocate(1).unwrap_err();
        assert!(matches!(error, Error::OutOfMemory { .. }));
        assert!(!allocator.has_page());

        let error = allocator.try_allocate(3).unwrap_err();
        assert!(matches!(error, Error::OutOfMemory { size: 24, .. }));
    }

    #[test]
    fn failed_second_page_leaves_pool_unchanged() {
        let memory = CountingMemory::default();

        let allocator = PoolAllocator::<u64>::builder()
            .memory(LimitedMemory::new(memory.clone(), 1))
            .build();
        let peer = allocator.clone();

        let mut blocks = vec![allocator.allocate(1)];
        while allocator.free_block_count() > 0 {
            blocks.push(allocator.allocate(1));
        }
        assert_eq!(allocator.page_count(), 1);
        assert_eq!(memory.live_blocks(), 1);

        let error = allocator.try_allocate(1).unwrap_err();
        assert!(matches!(error, Error::OutOfMemory { .. }));

        assert_eq!(allocator.page_count(), 1);
        assert_eq!(allocator.free_block_count(), 0);
        assert_eq!(peer.page_count(), 1);
        assert_eq!(allocator, peer);
        assert_eq!(memory.live_blocks(), 1);

        // The surviving page still serves freed blocks.
        let last = blocks.pop().unwrap();
        unsafe { peer.deallocate(last, 1) };
        assert_eq!(allocator.try_allocate(1).unwrap(), last);
        blocks.push(last);

        for block in blocks {
            unsafe { allocator.deallocate(block, 1) };
        }

        #[cfg(debug_assertions)]
        allocator.integrity_check();

        drop(allocator);
        drop(peer);
        assert_eq!(memory.live_blocks(), 0);
    }

    #[test]
    fn impossible_layout_is_reported() {
        let allocator = PoolAllocator::<u64>::new();

        let error = allocator.try_allocate(usize::MAX).unwrap_err();
        assert!(matches!(
            error,
            Error::LayoutOverflow {
                count: usize::MAX,
                element_size: 8
            }
        ));
    }

    #[test]
    #[should_panic]
    fn allocate_panics_on_impossible_layout() {
        let allocator = PoolAllocator::<u64>::new();
        _ = allocator.allocate(usize::MAX);
    }

    #[test]
    #[should_panic]
    fn pooled_deallocate_without_pool_panics() {
        let allocator = PoolAllocator::<u64>::new();
        let mut storage = 0_u64;

        unsafe { allocator.deallocate(NonNull::from(&mut storage), 1) };
    }

    #[test]
    fn fresh_like_is_alone_and_keeps_configuration() {
        let (allocator, memory) = counting::<u64>();
        let _peer = allocator.clone();

        let fresh = allocator.fresh_like();
        assert!(fresh.is_alone());
        assert_ne!(fresh, allocator);
        assert_eq!(fresh.max_page_bytes(), allocator.max_page_bytes());

        let block = fresh.allocate(1);
        assert_eq!(memory.live_blocks(), 1);
        unsafe { fresh.deallocate(block, 1) };
    }

    #[test]
    fn default_is_alone_without_page() {
        let allocator = PoolAllocator::<u64>::default();

        assert!(allocator.is_alone());
        assert!(!allocator.has_page());
        assert_eq!(allocator.block_size(), None);
        assert_eq!(allocator.free_block_count(), 0);
        assert_eq!(allocator.page_count(), 0);
        assert_eq!(allocator.max_page_bytes(), DEFAULT_MAX_PAGE_BYTES);
    }

    #[test]
    fn allocator_is_debug() {
        let allocator = PoolAllocator::<u64>::new();
        let output = format!("{allocator:?}");
        assert!(output.contains("PoolAllocator"));
    }
}
