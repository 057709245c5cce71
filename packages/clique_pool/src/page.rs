use std::alloc::Layout;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use tracing::debug;

use crate::align::{alignment_for_ptr, round_up};
use crate::{Error, MAX_ALIGN, MIN_ALIGN, PageHeader, RawMemory, Result};

/// The in-place layout at the start of every page.
///
/// The memory of a page is `<Page> <block> <block> ... <block>`, with every block being
/// `header.block_size()` bytes. The alignment of this type pads the header so that the first
/// block starts at a [`MAX_ALIGN`] boundary.
#[repr(C, align(16))]
struct Page<H> {
    header: H,
}

const _: () = assert!(align_of::<Page<crate::PackedHeader>>() == MAX_ALIGN);

/// The view of an unused block: its storage holds the link to the next unused block.
#[repr(C)]
struct FreeBlock {
    next: Option<NonNull<Self>>,
}

const _: () = assert!(size_of::<FreeBlock>() <= MIN_ALIGN);

/// A reference to one page of a pool's page chain.
///
/// Pages are created by [`add_new_page()`][Self::add_new_page] and released all at once by
/// [`delete_all_pages()`][Self::delete_all_pages]. A `PageRef` is a plain pointer: it may only be
/// used while the chain it belongs to has not been deleted. Within the crate, only the clique
/// owning the chain keeps `PageRef`s across calls, which upholds this.
///
/// All pages of a chain share one free-block list. Whenever a page is added, the free blocks of
/// the previous page are appended to the list of the new page, so the newest page's header always
/// holds the head of the complete list and the headers of older pages go stale.
pub(crate) struct PageRef<H> {
    page: NonNull<Page<H>>,
    _header: PhantomData<H>,
}

impl<H> Clone for PageRef<H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H> Copy for PageRef<H> {}

impl<H> PartialEq for PageRef<H> {
    fn eq(&self, other: &Self) -> bool {
        self.page == other.page
    }
}

impl<H> Eq for PageRef<H> {}

impl<H> fmt::Debug for PageRef<H> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PageRef").field(&self.page).finish()
    }
}

impl<H: PageHeader> PageRef<H> {
    /// Size of the header region that precedes the first block of every page.
    pub(crate) const HEADER_SIZE: usize = size_of::<Page<H>>();

    fn header(&self) -> &H {
        // SAFETY: The chain is alive (type invariant), so the page header is initialized. The
        // pool is single-threaded and no mutable reference to the header outlives a single
        // `update_header()` call, so no mutable reference exists right now.
        unsafe { &self.page.as_ref().header }
    }

    fn update_header(self, f: impl FnOnce(&mut H)) {
        let mut page = self.page;

        // SAFETY: The chain is alive (type invariant). The pool is single-threaded and the
        // reference does not escape this call, so it is the only reference to the header.
        f(unsafe { &mut page.as_mut().header });
    }

    /// The size of every block in the page (and in every other page of the chain).
    #[must_use]
    pub(crate) fn block_size(self) -> usize {
        self.header().block_size()
    }

    /// The next older page of the chain, if any.
    #[must_use]
    pub(crate) fn previous(self) -> Option<Self> {
        self.header().previous_page().map(|page| Self {
            page: page.cast(),
            _header: PhantomData,
        })
    }

    fn free_list_head(self) -> Option<NonNull<FreeBlock>> {
        self.header().free_list_head().map(NonNull::cast)
    }

    fn set_free_list_head(self, block: Option<NonNull<FreeBlock>>) {
        self.update_header(|header| header.set_free_list_head(block.map(NonNull::cast)));
    }

    #[must_use]
    pub(crate) fn has_free_blocks(self) -> bool {
        self.free_list_head().is_some()
    }

    /// Pops the most recently returned (or, failing that, the lowest-addressed new) free block.
    ///
    /// This never grows the pool; callers check [`has_free_blocks()`][Self::has_free_blocks]
    /// first or otherwise know that a block is available.
    ///
    /// # Panics
    ///
    /// Panics if there are no free blocks.
    #[must_use]
    pub(crate) fn take_block(self) -> NonNull<u8> {
        let Some(block) = self.free_list_head() else {
            panic!(
                "take_block() called on a page with no free blocks (block size {})",
                self.block_size()
            );
        };

        // SAFETY: Every block on the free list holds an initialized `FreeBlock` and belongs to
        // the live chain.
        let next = unsafe { block.as_ref().next };
        self.set_free_list_head(next);

        block.cast()
    }

    /// Pushes a block back onto the free list, making it the next block to be taken.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that `block` was taken from this page's chain, is not on the
    /// free list already and that nobody accesses its storage anymore.
    pub(crate) unsafe fn return_block(self, block: NonNull<u8>) {
        let block = block.cast::<FreeBlock>();

        // SAFETY: The caller guarantees the block is ours and unused. Blocks are at least
        // `MIN_ALIGN` in size and alignment, enough for a `FreeBlock`.
        unsafe {
            block.write(FreeBlock {
                next: self.free_list_head(),
            });
        }

        self.set_free_list_head(Some(block));
    }

    /// Walks the free list and counts its entries.
    #[must_use]
    pub(crate) fn count_free_blocks(self) -> usize {
        let mut count: usize = 0;
        let mut current = self.free_list_head();

        while let Some(block) = current {
            // Cannot overflow because every block takes at least one byte of address space.
            count = count.wrapping_add(1);

            // SAFETY: Every block on the free list holds an initialized `FreeBlock`.
            current = unsafe { block.as_ref().next };
        }

        count
    }

    /// Number of pages in the chain that starts at `chain`.
    #[must_use]
    pub(crate) fn chain_len(chain: Option<Self>) -> usize {
        let mut len: usize = 0;
        let mut current = chain;

        while let Some(page) = current {
            // Cannot overflow because every page takes at least one byte of address space.
            len = len.wrapping_add(1);
            current = page.previous();
        }

        len
    }

    /// Block count of the first page of a chain: enough blocks to span at least the header, but
    /// never fewer than one.
    #[must_use]
    #[expect(
        clippy::integer_division,
        clippy::arithmetic_side_effects,
        reason = "rounding down is the intended behavior and the block size is never zero"
    )]
    pub(crate) fn min_block_count(block_size: usize) -> usize {
        assert!(block_size > 0, "block size must be non-zero");

        if block_size >= Self::HEADER_SIZE {
            1
        } else {
            Self::HEADER_SIZE / block_size
        }
    }

    /// Block count of the next page to add in front of `chain`.
    #[must_use]
    pub(crate) fn new_page_block_count(
        block_size: usize,
        chain: Option<Self>,
        max_page_bytes: usize,
    ) -> usize {
        Self::block_count_at_depth(block_size, Self::chain_len(chain), max_page_bytes)
    }

    /// Block count of a page that has `older_pages` pages behind it in its chain.
    ///
    /// The count doubles with every older page, starting from [`min_block_count()`], until a page
    /// would exceed `max_page_bytes`; from then on every page holds as many blocks as fit in
    /// that budget.
    ///
    /// This is a pure function, which lets us recompute the size of any page from its position
    /// in the chain instead of storing it in the header.
    ///
    /// [`min_block_count()`]: Self::min_block_count
    #[must_use]
    #[expect(
        clippy::integer_division,
        clippy::arithmetic_side_effects,
        reason = "rounding down is the intended behavior and the block size is never zero"
    )]
    fn block_count_at_depth(block_size: usize, older_pages: usize, max_page_bytes: usize) -> usize {
        let first_page_count = Self::min_block_count(block_size);

        if older_pages == 0 {
            return first_page_count;
        }

        let max_page_count = (max_page_bytes.saturating_sub(Self::HEADER_SIZE) / block_size).max(1);

        let mut count = first_page_count;

        for _ in 0..older_pages {
            count = count.saturating_mul(2);

            if count >= max_page_count {
                return max_page_count;
            }
        }

        count
    }

    fn page_layout(block_size: usize, block_count: usize) -> Result<Layout> {
        let overflow = || Error::LayoutOverflow {
            count: block_count,
            element_size: block_size,
        };

        let size = block_size
            .checked_mul(block_count)
            .and_then(|blocks| blocks.checked_add(Self::HEADER_SIZE))
            .ok_or_else(overflow)?;

        Layout::from_size_align(size, MAX_ALIGN).map_err(|_layout_error| overflow())
    }

    /// Lays out a fresh page in `memory`: writes the header and threads all blocks into one free
    /// list, in address order, followed by the free blocks of `previous`.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that `memory` is valid for writes of
    /// `page_layout(block_size, block_count)` bytes and aligned to [`MAX_ALIGN`], and that
    /// `previous` (if any) is the head of a live chain with the same block size.
    unsafe fn initialize(
        memory: NonNull<u8>,
        block_size: usize,
        block_count: usize,
        previous: Option<Self>,
    ) -> Self {
        assert!(
            block_size >= MIN_ALIGN && block_size % MIN_ALIGN == 0 && block_count > 0,
            "invalid page geometry: {block_count} blocks of {block_size} bytes"
        );

        let inherited = previous.and_then(Self::free_list_head);

        // SAFETY: The caller guarantees the memory spans the header plus all blocks.
        let first_block = unsafe { memory.add(Self::HEADER_SIZE) };

        // Link from the last block backwards so each block can point at its successor.
        let mut next = inherited;

        for index in (0..block_count).rev() {
            // Cannot overflow because the page layout calculation already checked the total size.
            let offset = index.wrapping_mul(block_size);

            // SAFETY: The offset is within the block region (index < block_count).
            let block = unsafe { first_block.add(offset) };

            let block = block.cast::<FreeBlock>();

            // SAFETY: The block is within our memory and suitably aligned for a `FreeBlock`,
            // because the header size and the block size are both multiples of MIN_ALIGN.
            unsafe {
                block.write(FreeBlock { next });
            }

            next = Some(block);
        }

        let mut header = H::empty();
        header.set_block_size(block_size);
        header.set_previous_page(previous.map(|page| page.page.cast()));
        header.set_free_list_head(next.map(NonNull::cast));

        let page = memory.cast::<Page<H>>();

        // SAFETY: The memory is valid for writes and aligned to MAX_ALIGN, which is the alignment
        // of `Page<H>`.
        unsafe {
            page.write(Page { header });
        }

        Self {
            page,
            _header: PhantomData,
        }
    }

    /// Creates a new page sized by the growth policy and links it in front of `chain`.
    ///
    /// The first page of a chain fixes the block size at `user_size` rounded up to
    /// [`MIN_ALIGN`]; later pages inherit it. The new page's free list also contains every block
    /// that was free in `chain`, so its header becomes the single free-list head of the pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the page cannot be laid out or `memory` cannot supply it. In that
    /// case `chain` is left untouched.
    ///
    /// # Panics
    ///
    /// Panics if `user_size` does not fit in the chain's block size or exceeds what the header
    /// encoding can represent.
    pub(crate) fn add_new_page<M: RawMemory>(
        user_size: usize,
        chain: Option<Self>,
        memory: &M,
        max_page_bytes: usize,
    ) -> Result<Self> {
        let block_size = chain.map_or_else(
            || round_up(user_size.max(1), MIN_ALIGN),
            |newest| {
                let block_size = newest.block_size();

                assert!(
                    block_size >= user_size,
                    "requested {user_size} bytes from a pool of {block_size}-byte blocks"
                );

                block_size
            },
        );

        assert!(
            block_size <= H::MAX_BLOCK_SIZE,
            "block size {block_size} exceeds the {}-byte limit of the page header encoding",
            H::MAX_BLOCK_SIZE
        );

        let block_count = Self::new_page_block_count(block_size, chain, max_page_bytes);
        let layout = Self::page_layout(block_size, block_count)?;

        let raw = memory.allocate_raw(layout)?;

        debug_assert!(
            alignment_for_ptr(raw.as_ptr()) >= MAX_ALIGN,
            "raw memory source returned {raw:p}, which is not aligned to {MAX_ALIGN}"
        );

        // SAFETY: The memory was just allocated with the page layout, which is aligned to
        // MAX_ALIGN. The chain is alive because our caller owns it.
        let page = unsafe { Self::initialize(raw, block_size, block_count, chain) };

        debug!(
            block_size,
            block_count,
            pages = Self::chain_len(Some(page)),
            "added page to pool"
        );

        Ok(page)
    }

    /// Returns every page of the chain to `memory`.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that `chain` is the head of a live chain created with the same
    /// `memory` and `max_page_bytes`, that no block of it is used anymore and that no `PageRef`
    /// into the chain is used after this call.
    pub(crate) unsafe fn delete_all_pages<M: RawMemory>(
        chain: Option<Self>,
        memory: &M,
        max_page_bytes: usize,
    ) {
        let Some(newest) = chain else {
            return;
        };

        let block_size = newest.block_size();
        let pages = Self::chain_len(chain);

        let mut older_pages = pages;
        let mut current = chain;

        while let Some(page) = current {
            // Cannot underflow because we counted exactly this many pages above.
            older_pages = older_pages.wrapping_sub(1);

            // Read the link before the page memory goes away.
            current = page.previous();

            let block_count = Self::block_count_at_depth(block_size, older_pages, max_page_bytes);
            let layout = Self::page_layout(block_size, block_count)
                .expect("the same layout was valid when the page was allocated");

            // SAFETY: The page was allocated from `memory` with exactly this layout, because the
            // block count is a pure function of the page's position in the chain. The caller
            // guarantees nobody uses the page anymore.
            unsafe {
                memory.deallocate_raw(page.page.cast(), layout);
            }
        }

        debug!(block_size, pages, "released page chain");
    }

    /// Verifies that the free list holds only distinct, correctly placed blocks of this chain.
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    #[allow(
        clippy::arithmetic_side_effects,
        reason = "integrity check is debug-only and works on addresses known to be in range"
    )]
    pub(crate) fn integrity_check(self, max_page_bytes: usize) {
        use std::collections::HashSet;

        let block_size = self.block_size();
        let pages = Self::chain_len(Some(self));

        // (first block address, block count) for every page in the chain.
        let mut page_spans = Vec::with_capacity(pages);
        let mut older_pages = pages;
        let mut current = Some(self);

        while let Some(page) = current {
            older_pages -= 1;

            assert_eq!(
                page.block_size(),
                block_size,
                "page {:p} has a different block size than the rest of its chain",
                page.page
            );

            let first_block = page.page.as_ptr().addr() + Self::HEADER_SIZE;
            let block_count = Self::block_count_at_depth(block_size, older_pages, max_page_bytes);
            page_spans.push((first_block, block_count));

            current = page.previous();
        }

        let mut seen = HashSet::new();
        let mut current = self.free_list_head();

        while let Some(block) = current {
            let addr = block.as_ptr().addr();

            assert!(
                seen.insert(addr),
                "block {addr:#x} appears twice in the free list"
            );

            assert!(
                page_spans.iter().any(|&(first_block, block_count)| {
                    addr >= first_block
                        && addr < first_block + block_count * block_size
                        && (addr - first_block) % block_size == 0
                }),
                "free list entry {addr:#x} is not a block of this chain"
            );

            // SAFETY: We just verified the block belongs to the live chain, so it holds an
            // initialized `FreeBlock`.
            current = unsafe { block.as_ref().next };
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::{CountingMemory, DEFAULT_MAX_PAGE_BYTES, DirectHeader, PackedHeader, SystemMemory};

    type PackedPage = PageRef<PackedHeader>;
    type DirectPage = PageRef<DirectHeader>;

    #[test]
    fn header_sizes() {
        assert_eq!(PackedPage::HEADER_SIZE, 16);
        assert_eq!(DirectPage::HEADER_SIZE, 32);
    }

    #[test]
    fn min_block_count_spans_header() {
        assert_eq!(PackedPage::min_block_count(1), 16);
        assert_eq!(PackedPage::min_block_count(MIN_ALIGN), 16 / MIN_ALIGN);
        assert_eq!(PackedPage::min_block_count(16), 1);
        assert_eq!(PackedPage::min_block_count(PackedPage::HEADER_SIZE), 1);
        assert_eq!(PackedPage::min_block_count(100), 1);

        assert_eq!(DirectPage::min_block_count(8), 4);
        assert_eq!(DirectPage::min_block_count(24), 1);
        assert_eq!(DirectPage::min_block_count(40), 1);
    }

    #[test]
    fn growth_doubles_then_caps() {
        let first = DirectPage::min_block_count(8);

        assert_eq!(DirectPage::block_count_at_depth(8, 0, DEFAULT_MAX_PAGE_BYTES), first);
        assert_eq!(DirectPage::block_count_at_depth(8, 1, DEFAULT_MAX_PAGE_BYTES), first * 2);
        assert_eq!(DirectPage::block_count_at_depth(8, 2, DEFAULT_MAX_PAGE_BYTES), first * 4);

        let max_count = (DEFAULT_MAX_PAGE_BYTES - DirectPage::HEADER_SIZE) / 8;
        assert_eq!(
            DirectPage::block_count_at_depth(8, 1000, DEFAULT_MAX_PAGE_BYTES),
            max_count
        );
    }

    #[test]
    fn growth_is_monotonic_and_bounded() {
        for block_size in (MIN_ALIGN..=crate::MAX_BLOCK_SIZE).step_by(MIN_ALIGN) {
            for max_page_bytes in [crate::MIN_MAX_PAGE_BYTES, 4096, DEFAULT_MAX_PAGE_BYTES] {
                let mut previous = 0;

                for depth in 0..40 {
                    let count = PackedPage::block_count_at_depth(block_size, depth, max_page_bytes);

                    assert!(count >= previous, "page {depth} shrank for {block_size}-byte blocks");
                    assert!(count >= 1);

                    if depth > 0 {
                        let bytes = PackedPage::HEADER_SIZE + count * block_size;
                        assert!(bytes <= max_page_bytes, "page {depth} exceeds the budget");
                    }

                    previous = count;
                }
            }
        }
    }

    #[test]
    fn first_page_has_min_block_count() {
        let memory = SystemMemory;
        let page = PackedPage::add_new_page(16, None, &memory, DEFAULT_MAX_PAGE_BYTES).unwrap();

        assert_eq!(page.block_size(), 16);
        assert_eq!(page.count_free_blocks(), PackedPage::min_block_count(16));
        assert_eq!(page.previous(), None);
        assert_eq!(PackedPage::chain_len(Some(page)), 1);

        unsafe { PackedPage::delete_all_pages(Some(page), &memory, DEFAULT_MAX_PAGE_BYTES) };
    }

    #[test]
    fn block_size_is_rounded_up() {
        let memory = SystemMemory;
        let page = DirectPage::add_new_page(13, None, &memory, DEFAULT_MAX_PAGE_BYTES).unwrap();

        assert_eq!(page.block_size(), 16);

        unsafe { DirectPage::delete_all_pages(Some(page), &memory, DEFAULT_MAX_PAGE_BYTES) };
    }

    #[test]
    fn new_page_inherits_free_blocks() {
        let memory = SystemMemory;

        let p1 = DirectPage::add_new_page(MIN_ALIGN, None, &memory, DEFAULT_MAX_PAGE_BYTES).unwrap();
        let first_count = DirectPage::min_block_count(MIN_ALIGN);
        assert_eq!(p1.count_free_blocks(), first_count);

        let p2_count = DirectPage::new_page_block_count(MIN_ALIGN, Some(p1), DEFAULT_MAX_PAGE_BYTES);
        assert_eq!(p2_count, 2 * first_count);

        let p2 =
            DirectPage::add_new_page(MIN_ALIGN, Some(p1), &memory, DEFAULT_MAX_PAGE_BYTES).unwrap();
        assert_eq!(p2.previous(), Some(p1));
        assert_eq!(p2.block_size(), MIN_ALIGN);

        let free = p2.count_free_blocks();
        assert_eq!(free, first_count + p2_count);

        let block = p2.take_block();
        assert_eq!(p2.count_free_blocks(), free - 1);

        unsafe { p2.return_block(block) };
        assert_eq!(p2.count_free_blocks(), free);

        #[cfg(debug_assertions)]
        p2.integrity_check(DEFAULT_MAX_PAGE_BYTES);

        unsafe { DirectPage::delete_all_pages(Some(p2), &memory, DEFAULT_MAX_PAGE_BYTES) };
    }

    #[test]
    fn new_page_blocks_come_first() {
        let memory = SystemMemory;

        let p1 = PackedPage::add_new_page(32, None, &memory, DEFAULT_MAX_PAGE_BYTES).unwrap();
        let old_block = p1.take_block();
        assert!(!p1.has_free_blocks());

        unsafe { p1.return_block(old_block) };

        let p2 = PackedPage::add_new_page(32, Some(p1), &memory, DEFAULT_MAX_PAGE_BYTES).unwrap();
        let p2_start = p2.page.as_ptr().addr();
        let p2_count = PackedPage::new_page_block_count(32, Some(p1), DEFAULT_MAX_PAGE_BYTES);

        // Every block of the new page is handed out before the inherited one.
        for _ in 0..p2_count {
            let block = p2.take_block().as_ptr().addr();
            assert!(block > p2_start && block < p2_start + PackedPage::HEADER_SIZE + 32 * p2_count);
        }

        assert_eq!(p2.take_block(), old_block);
        assert!(!p2.has_free_blocks());

        unsafe { PackedPage::delete_all_pages(Some(p2), &memory, DEFAULT_MAX_PAGE_BYTES) };
    }

    #[test]
    fn take_and_return_is_lifo() {
        let memory = SystemMemory;
        let page = PackedPage::add_new_page(8, None, &memory, DEFAULT_MAX_PAGE_BYTES).unwrap();
        let page = PackedPage::add_new_page(8, Some(page), &memory, DEFAULT_MAX_PAGE_BYTES).unwrap();

        let a = page.take_block();
        let b = page.take_block();
        assert_ne!(a, b);

        unsafe { page.return_block(a) };
        assert_eq!(page.take_block(), a);

        unsafe {
            page.return_block(b);
            page.return_block(a);
        }

        assert_eq!(page.take_block(), a);
        assert_eq!(page.take_block(), b);

        unsafe {
            page.return_block(a);
            page.return_block(b);
        }

        unsafe { PackedPage::delete_all_pages(Some(page), &memory, DEFAULT_MAX_PAGE_BYTES) };
    }

    #[test]
    fn free_list_integrity_over_sequences() {
        let memory = SystemMemory;
        let mut chain = None;

        for _ in 0..4 {
            chain = Some(
                PackedPage::add_new_page(24, chain, &memory, DEFAULT_MAX_PAGE_BYTES).unwrap(),
            );
        }

        let page = chain.unwrap();
        let total = page.count_free_blocks();

        let mut outstanding = Vec::new();

        // A deterministic mix of takes and returns.
        for step in 0_usize..500 {
            if step % 3 == 2 && !outstanding.is_empty() {
                let block = outstanding.swap_remove(step % outstanding.len());
                unsafe { page.return_block(block) };
            } else if page.has_free_blocks() {
                outstanding.push(page.take_block());
            }

            assert_eq!(page.count_free_blocks(), total - outstanding.len());
        }

        let distinct: HashSet<_> = outstanding.iter().copied().collect();
        assert_eq!(distinct.len(), outstanding.len());

        #[cfg(debug_assertions)]
        page.integrity_check(DEFAULT_MAX_PAGE_BYTES);

        for block in outstanding {
            unsafe { page.return_block(block) };
        }

        assert_eq!(page.count_free_blocks(), total);

        #[cfg(debug_assertions)]
        page.integrity_check(DEFAULT_MAX_PAGE_BYTES);

        unsafe { PackedPage::delete_all_pages(chain, &memory, DEFAULT_MAX_PAGE_BYTES) };
    }

    #[test]
    fn blocks_are_writable_and_aligned() {
        let memory = SystemMemory;
        let page = PackedPage::add_new_page(16, None, &memory, DEFAULT_MAX_PAGE_BYTES).unwrap();
        let page = PackedPage::add_new_page(16, Some(page), &memory, DEFAULT_MAX_PAGE_BYTES).unwrap();

        let blocks: Vec<_> = std::iter::from_fn(|| page.has_free_blocks().then(|| page.take_block()))
            .collect();

        for (index, block) in blocks.iter().enumerate() {
            assert_eq!(block.as_ptr().addr() % 16, 0);
            unsafe { block.cast::<u128>().write(index as u128) };
        }

        for (index, block) in blocks.iter().enumerate() {
            assert_eq!(unsafe { block.cast::<u128>().read() }, index as u128);
        }

        for block in blocks {
            unsafe { page.return_block(block) };
        }

        unsafe { PackedPage::delete_all_pages(Some(page), &memory, DEFAULT_MAX_PAGE_BYTES) };
    }

    #[test]
    #[should_panic]
    fn take_from_exhausted_page_panics() {
        let memory = SystemMemory;
        let page = PackedPage::add_new_page(64, None, &memory, DEFAULT_MAX_PAGE_BYTES).unwrap();

        // The first page for 64-byte blocks has a single block.
        _ = page.take_block();
        _ = page.take_block();
    }

    #[test]
    #[should_panic]
    fn larger_size_in_existing_chain_panics() {
        let memory = SystemMemory;
        let page = PackedPage::add_new_page(16, None, &memory, DEFAULT_MAX_PAGE_BYTES).unwrap();

        _ = PackedPage::add_new_page(24, Some(page), &memory, DEFAULT_MAX_PAGE_BYTES);
    }

    #[test]
    fn delete_returns_every_page() {
        let memory = CountingMemory::default();
        let mut chain = None;

        for expected_pages in 1..=12 {
            chain = Some(
                PackedPage::add_new_page(8, chain, &memory, crate::MIN_MAX_PAGE_BYTES).unwrap(),
            );
            assert_eq!(memory.live_blocks(), expected_pages);
        }

        assert!(memory.live_bytes() <= 12 * crate::MIN_MAX_PAGE_BYTES);

        unsafe { PackedPage::delete_all_pages(chain, &memory, crate::MIN_MAX_PAGE_BYTES) };

        assert_eq!(memory.live_blocks(), 0);
        assert_eq!(memory.live_bytes(), 0);
    }

    #[test]
    fn delete_empty_chain_is_noop() {
        let memory = CountingMemory::default();

        unsafe { PackedPage::delete_all_pages(None, &memory, DEFAULT_MAX_PAGE_BYTES) };

        assert_eq!(memory.total_allocations(), 0);
    }
}
