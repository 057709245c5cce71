use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::{PageHeader, PageRef, RawMemory, Result};

/// The state shared by every handle of one clique: the page chain and where its memory
/// comes from.
///
/// There is exactly one `current_page` for the whole clique, so every member observes a page
/// change the moment it happens. The chain is released when the last member goes away, which is
/// when the last `Rc` to this struct is dropped.
struct Clique<H: PageHeader, M: RawMemory> {
    /// Newest page of the chain, holding the head of the shared free list.
    current_page: Cell<Option<PageRef<H>>>,

    memory: M,

    max_page_bytes: usize,
}

impl<H: PageHeader, M: RawMemory> Clique<H, M> {
    fn new(memory: M, max_page_bytes: usize) -> Self {
        Self {
            current_page: Cell::new(None),
            memory,
            max_page_bytes,
        }
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    fn integrity_check(&self) {
        if let Some(page) = self.current_page.get() {
            page.integrity_check(self.max_page_bytes);
        }
    }
}

impl<H: PageHeader, M: RawMemory> Drop for Clique<H, M> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.integrity_check();

        // SAFETY: We are the sole owner of the chain and the last member of the clique is
        // going away, so nothing can use the pages or any block in them anymore.
        unsafe {
            PageRef::delete_all_pages(self.current_page.take(), &self.memory, self.max_page_bytes);
        }
    }
}

/// One member of a clique: a set of handles that share one page chain.
///
/// A handle starts alone and without a page. Cloning it (see [`join_from()`][Self::join_from])
/// adds the clone to the same clique. A handle leaves its clique when it is dropped or detached;
/// the last member to leave releases the page chain.
pub(crate) struct PageHandle<H: PageHeader, M: RawMemory> {
    clique: Rc<Clique<H, M>>,
}

impl<H: PageHeader, M: RawMemory> PageHandle<H, M> {
    /// Creates a handle that is alone in a new clique and has no page yet.
    #[must_use]
    pub(crate) fn new(memory: M, max_page_bytes: usize) -> Self {
        Self {
            clique: Rc::new(Clique::new(memory, max_page_bytes)),
        }
    }

    /// Creates a new handle that is alone and page-less but uses the same memory source and
    /// page budget as this one.
    #[must_use]
    pub(crate) fn fresh_like(&self) -> Self
    where
        M: Clone,
    {
        Self::new(self.clique.memory.clone(), self.clique.max_page_bytes)
    }

    /// Whether no other handle shares this handle's clique.
    #[must_use]
    pub(crate) fn is_alone(&self) -> bool {
        Rc::strong_count(&self.clique) == 1
    }

    /// Creates a new handle in the same clique as `source`, sharing whatever page `source`
    /// has now or will get later.
    #[must_use]
    pub(crate) fn join_from(source: &Self) -> Self {
        let clique = Rc::clone(&source.clique);

        trace!(members = Rc::strong_count(&clique), "handle joined clique");

        Self { clique }
    }

    /// Leaves the clique, becoming alone and page-less. The pages stay with the remaining
    /// members.
    ///
    /// # Panics
    ///
    /// Panics if the handle is already alone, since detaching it would strand the chain.
    pub(crate) fn detach(&mut self)
    where
        M: Clone,
    {
        assert!(
            !self.is_alone(),
            "detach() called on a handle that is alone in its clique"
        );

        *self = self.fresh_like();

        trace!("handle detached from clique");
    }

    /// Whether `other` belongs to the same clique as this handle.
    #[must_use]
    pub(crate) fn same_clique(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.clique, &other.clique)
    }

    /// The clique's newest page, if the clique has created one yet.
    #[must_use]
    pub(crate) fn current_page(&self) -> Option<PageRef<H>> {
        self.clique.current_page.get()
    }

    /// Returns the clique's current page, first adding a new page if there is none yet or if a
    /// free block is needed and the pool has none left.
    ///
    /// A new page becomes the current page of every member of the clique.
    ///
    /// # Errors
    ///
    /// Returns an error if a page is needed and cannot be created. The clique is unchanged.
    pub(crate) fn get_or_create_page(
        &self,
        user_block_size: usize,
        need_free_block: bool,
    ) -> Result<PageRef<H>> {
        let current = self.current_page();

        if let Some(page) = current {
            if !need_free_block || page.has_free_blocks() {
                return Ok(page);
            }
        }

        let page = PageRef::add_new_page(
            user_block_size,
            current,
            &self.clique.memory,
            self.clique.max_page_bytes,
        )?;

        self.clique.current_page.set(Some(page));

        Ok(page)
    }

    /// The memory source of the clique.
    #[must_use]
    pub(crate) fn memory(&self) -> &M {
        &self.clique.memory
    }

    /// The page byte budget of the clique.
    #[must_use]
    pub(crate) fn max_page_bytes(&self) -> usize {
        self.clique.max_page_bytes
    }

    /// Number of handles in the clique, this one included.
    #[must_use]
    pub(crate) fn members(&self) -> usize {
        Rc::strong_count(&self.clique)
    }
}

impl<H: PageHeader, M: RawMemory> fmt::Debug for PageHandle<H, M> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageHandle")
            .field("current_page", &self.current_page())
            .field("members", &self.members())
            .field("max_page_bytes", &self.max_page_bytes())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_not_impl_any;

    use super::*;
    use crate::{CountingMemory, DEFAULT_MAX_PAGE_BYTES, DirectHeader, PackedHeader, SystemMemory};

    type Handle = PageHandle<PackedHeader, SystemMemory>;
    type CountingHandle = PageHandle<DirectHeader, CountingMemory>;

    assert_not_impl_any!(Handle: Send, Sync);

    fn new_handle() -> Handle {
        Handle::new(SystemMemory, DEFAULT_MAX_PAGE_BYTES)
    }

    #[test]
    fn new_handle_is_alone_without_page() {
        let handle = new_handle();

        assert!(handle.is_alone());
        assert!(handle.current_page().is_none());
        assert_eq!(handle.members(), 1);
        assert!(handle.same_clique(&handle));
    }

    #[test]
    fn join_and_detach() {
        let mut first = new_handle();
        let second = new_handle();

        assert!(!first.same_clique(&second));

        let joined = Handle::join_from(&second);
        assert!(!joined.is_alone());
        assert!(!second.is_alone());
        assert!(joined.same_clique(&second));
        assert!(joined.current_page().is_none());

        first = Handle::join_from(&joined);
        assert_eq!(second.members(), 3);
        assert!(first.same_clique(&second));

        first.detach();
        assert!(first.is_alone());
        assert!(!first.same_clique(&second));
        assert_eq!(second.members(), 2);
    }

    #[test]
    fn page_is_shared_with_every_member() {
        let first = new_handle();
        let second = Handle::join_from(&first);
        let third = Handle::join_from(&second);

        let page = first.get_or_create_page(20, true).unwrap();

        assert!(page.block_size() >= 20);
        assert!(page.count_free_blocks() >= 1);
        assert_eq!(second.current_page(), Some(page));
        assert_eq!(third.current_page(), Some(page));
    }

    #[test]
    fn detached_handle_loses_page_but_clique_keeps_it() {
        let first = new_handle();
        let mut second = Handle::join_from(&first);

        let page = first.get_or_create_page(20, true).unwrap();

        second.detach();
        assert!(second.is_alone());
        assert!(second.current_page().is_none());
        assert_eq!(first.current_page(), Some(page));

        let rejoined = Handle::join_from(&first);
        assert_eq!(rejoined.current_page(), Some(page));
    }

    #[test]
    #[should_panic]
    fn detach_alone_panics() {
        let mut handle = new_handle();
        handle.detach();
    }

    #[test]
    fn existing_page_is_reused_while_it_has_blocks() {
        let handle = new_handle();

        let page = handle.get_or_create_page(64, true).unwrap();
        assert_eq!(handle.get_or_create_page(64, true).unwrap(), page);
        assert_eq!(handle.get_or_create_page(64, false).unwrap(), page);
    }

    #[test]
    fn exhausted_page_is_replaced_only_when_a_block_is_needed() {
        let handle = new_handle();

        // 64-byte blocks get a single-block first page.
        let first_page = handle.get_or_create_page(64, true).unwrap();
        let block = first_page.take_block();
        assert!(!first_page.has_free_blocks());

        assert_eq!(handle.get_or_create_page(64, false).unwrap(), first_page);

        let second_page = handle.get_or_create_page(64, true).unwrap();
        assert_ne!(second_page, first_page);
        assert_eq!(second_page.previous(), Some(first_page));
        assert_eq!(handle.current_page(), Some(second_page));

        // SAFETY: The block came from this chain and is not used anymore.
        unsafe { second_page.return_block(block) };
    }

    #[test]
    fn page_created_without_block_need_when_absent() {
        let handle = new_handle();

        let page = handle.get_or_create_page(8, false).unwrap();
        assert_eq!(handle.current_page(), Some(page));
    }

    #[test]
    fn last_member_releases_chain() {
        let memory = CountingMemory::default();

        let first = CountingHandle::new(memory.clone(), DEFAULT_MAX_PAGE_BYTES);
        let second = CountingHandle::join_from(&first);
        let third = CountingHandle::join_from(&second);

        let page = second.get_or_create_page(8, true).unwrap();
        let _block = page.take_block();
        while page.has_free_blocks() {
            _ = page.take_block();
        }
        _ = third.get_or_create_page(8, true).unwrap();
        assert_eq!(memory.live_blocks(), 2);

        drop(first);
        drop(third);
        assert_eq!(memory.live_blocks(), 2);

        drop(second);
        assert_eq!(memory.live_blocks(), 0);
    }

    #[test]
    fn detach_keeps_configuration() {
        let memory = CountingMemory::default();
        let first = CountingHandle::new(memory.clone(), 4096);
        let mut second = CountingHandle::join_from(&first);

        second.detach();
        assert_eq!(second.max_page_bytes(), 4096);

        _ = second.get_or_create_page(8, true).unwrap();
        assert_eq!(memory.live_blocks(), 1);

        drop(second);
        assert_eq!(memory.live_blocks(), 0);
        assert_eq!(first.memory().total_allocations(), 1);
    }
}
