use std::fmt;
use std::ptr::{self, NonNull};

use crate::{MIN_ALIGN, Sealed};

/// Metadata stored in place at the start of every page of a pool.
///
/// A page header records the block size of the page, the previous (older) page of the same pool
/// and the head of the free-block list. Two encodings exist:
///
/// * [`DirectHeader`] stores every field in a full machine word.
/// * [`PackedHeader`] squeezes the same data into two machine words by hiding the block size in
///   the always-zero low bits of the two pointers.
///
/// The encoding is a type parameter of [`PoolAllocator`][crate::PoolAllocator], so one pool never
/// mixes the two. This trait is sealed; the pool relies on the exact behavior of the two
/// provided encodings.
pub trait PageHeader: fmt::Debug + Sealed {
    /// Largest block size this encoding can represent.
    const MAX_BLOCK_SIZE: usize;

    /// Creates a header with a zero block size and null links.
    #[must_use]
    fn empty() -> Self;

    /// The size in bytes of every block of the page.
    #[must_use]
    fn block_size(&self) -> usize;

    /// Sets the size in bytes of every block of the page.
    fn set_block_size(&mut self, block_size: usize);

    /// The start of the previous page of the same pool, if any.
    #[must_use]
    fn previous_page(&self) -> Option<NonNull<u8>>;

    /// Sets the start of the previous page of the same pool.
    fn set_previous_page(&mut self, page: Option<NonNull<u8>>);

    /// The first block of the free-block list, if any.
    #[must_use]
    fn free_list_head(&self) -> Option<NonNull<u8>>;

    /// Sets the first block of the free-block list.
    fn set_free_list_head(&mut self, block: Option<NonNull<u8>>);
}

/// A page header that stores each field as a full machine word.
///
/// This is three words in size and accepts any block size.
#[derive(Debug)]
#[repr(C)]
pub struct DirectHeader {
    block_size: usize,
    previous_page: Option<NonNull<u8>>,
    free_list_head: Option<NonNull<u8>>,
}

impl Sealed for DirectHeader {}

impl PageHeader for DirectHeader {
    const MAX_BLOCK_SIZE: usize = usize::MAX;

    fn empty() -> Self {
        Self {
            block_size: 0,
            previous_page: None,
            free_list_head: None,
        }
    }

    #[inline]
    fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    fn set_block_size(&mut self, block_size: usize) {
        self.block_size = block_size;
    }

    #[inline]
    fn previous_page(&self) -> Option<NonNull<u8>> {
        self.previous_page
    }

    #[inline]
    fn set_previous_page(&mut self, page: Option<NonNull<u8>>) {
        self.previous_page = page;
    }

    #[inline]
    fn free_list_head(&self) -> Option<NonNull<u8>> {
        self.free_list_head
    }

    #[inline]
    fn set_free_list_head(&mut self, block: Option<NonNull<u8>>) {
        self.free_list_head = block;
    }
}

/// Number of low pointer bits that are always zero and therefore free to carry data.
const TAG_BITS: u32 = MIN_ALIGN.trailing_zeros();

const TAG_MASK: usize = (1 << TAG_BITS) - 1;

/// A page header that fits in two machine words.
///
/// Every page and every block is aligned to at least [`MIN_ALIGN`] (8) and every block size is a
/// multiple of it, so the low 3 bits of each of these values are always zero. The block size
/// divided by 8 is a 6-bit number whose upper half travels in the low bits of the previous page
/// pointer and whose lower half travels in the low bits of the free-list head pointer.
///
/// The encoding only works for block sizes that are multiples of 8 and at most
/// [`PackedHeader::MAX_BLOCK_SIZE`], and for pointers aligned to 8. These preconditions are
/// checked by debug assertions only.
///
/// The tag bits are applied with the strict provenance pointer APIs, so the stored pointers keep
/// their provenance and can be dereferenced after untagging.
#[repr(C)]
pub struct PackedHeader {
    /// Previous page, tagged with bits 6..9 of the block size.
    previous_page: *mut u8,

    /// Free-list head, tagged with bits 3..6 of the block size.
    free_list_head: *mut u8,
}

impl PackedHeader {
    fn tag(ptr: *mut u8) -> usize {
        ptr.addr() & TAG_MASK
    }

    fn untag(ptr: *mut u8) -> Option<NonNull<u8>> {
        NonNull::new(ptr.map_addr(|addr| addr & !TAG_MASK))
    }

    fn with_tag(ptr: Option<NonNull<u8>>, tag: usize) -> *mut u8 {
        let ptr = ptr.map_or(ptr::null_mut(), NonNull::as_ptr);

        debug_assert!(
            ptr.addr() & TAG_MASK == 0,
            "pointer {ptr:p} is not aligned to {MIN_ALIGN} and cannot be stored in a packed page header"
        );
        debug_assert!(tag <= TAG_MASK, "tag {tag} does not fit in {TAG_BITS} bits");

        ptr.map_addr(|addr| addr | tag)
    }
}

impl Sealed for PackedHeader {}

impl PageHeader for PackedHeader {
    /// Two 3-bit halves of `block_size / 8`.
    const MAX_BLOCK_SIZE: usize = ((TAG_MASK << TAG_BITS) | TAG_MASK) << TAG_BITS;

    fn empty() -> Self {
        Self {
            previous_page: ptr::null_mut(),
            free_list_head: ptr::null_mut(),
        }
    }

    #[inline]
    fn block_size(&self) -> usize {
        let high = Self::tag(self.previous_page);
        let low = Self::tag(self.free_list_head);

        ((high << TAG_BITS) | low) << TAG_BITS
    }

    fn set_block_size(&mut self, block_size: usize) {
        debug_assert!(
            block_size % MIN_ALIGN == 0,
            "block size {block_size} is not a multiple of {MIN_ALIGN} and cannot be stored in a packed page header"
        );
        debug_assert!(
            block_size <= Self::MAX_BLOCK_SIZE,
            "block size {block_size} exceeds the packed page header limit of {}",
            Self::MAX_BLOCK_SIZE
        );

        let units = block_size >> TAG_BITS;
        let high = (units >> TAG_BITS) & TAG_MASK;
        let low = units & TAG_MASK;

        self.previous_page = Self::with_tag(Self::untag(self.previous_page), high);
        self.free_list_head = Self::with_tag(Self::untag(self.free_list_head), low);
    }

    #[inline]
    fn previous_page(&self) -> Option<NonNull<u8>> {
        Self::untag(self.previous_page)
    }

    #[inline]
    fn set_previous_page(&mut self, page: Option<NonNull<u8>>) {
        self.previous_page = Self::with_tag(page, Self::tag(self.previous_page));
    }

    #[inline]
    fn free_list_head(&self) -> Option<NonNull<u8>> {
        Self::untag(self.free_list_head)
    }

    #[inline]
    fn set_free_list_head(&mut self, block: Option<NonNull<u8>>) {
        self.free_list_head = Self::with_tag(block, Self::tag(self.free_list_head));
    }
}

impl fmt::Debug for PackedHeader {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackedHeader")
            .field("block_size", &self.block_size())
            .field("previous_page", &self.previous_page())
            .field("free_list_head", &self.free_list_head())
            .finish()
    }
}

const _: () = assert!(size_of::<PackedHeader>() == 2 * size_of::<usize>());
const _: () = assert!(size_of::<DirectHeader>() == 3 * size_of::<usize>());
const _: () = assert!(PackedHeader::MAX_BLOCK_SIZE >= crate::MAX_BLOCK_SIZE);
#[cfg(target_pointer_width = "64")]
const _: () = assert!(PackedHeader::MAX_BLOCK_SIZE == 504);

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use super::*;

    #[repr(C, align(16))]
    struct Storage([u8; 64]);

    fn aligned_pointers(storage: &mut Storage) -> (NonNull<u8>, NonNull<u8>) {
        let base = NonNull::from(&mut storage.0).cast::<u8>();

        // SAFETY: Both offsets are within the 64-byte storage.
        unsafe { (base.add(16), base.add(40)) }
    }

    fn round_trip<H: PageHeader>(block_size: usize, page: NonNull<u8>, block: NonNull<u8>) {
        let mut header = H::empty();
        assert_eq!(header.block_size(), 0);
        assert_eq!(header.previous_page(), None);
        assert_eq!(header.free_list_head(), None);

        header.set_block_size(block_size);
        assert_eq!(header.block_size(), block_size);

        header.set_free_list_head(Some(block));
        assert_eq!(header.free_list_head(), Some(block));
        assert_eq!(header.block_size(), block_size);

        header.set_previous_page(Some(page));
        assert_eq!(header.previous_page(), Some(page));
        assert_eq!(header.free_list_head(), Some(block));
        assert_eq!(header.block_size(), block_size);

        header.set_free_list_head(None);
        assert_eq!(header.free_list_head(), None);
        assert_eq!(header.previous_page(), Some(page));
        assert_eq!(header.block_size(), block_size);

        header.set_previous_page(None);
        assert_eq!(header.previous_page(), None);
        assert_eq!(header.block_size(), block_size);
    }

    #[test]
    fn direct_round_trip() {
        let mut storage = Storage([0; 64]);
        let (page, block) = aligned_pointers(&mut storage);

        round_trip::<DirectHeader>(4, page, block);
        round_trip::<DirectHeader>(64, page, block);
        round_trip::<DirectHeader>(1_000_000, page, block);
    }

    #[test]
    fn packed_round_trip() {
        let mut storage = Storage([0; 64]);
        let (page, block) = aligned_pointers(&mut storage);

        round_trip::<PackedHeader>(64, page, block);
    }

    #[test]
    fn packed_and_direct_agree_on_every_representable_size() {
        let mut storage = Storage([0; 64]);
        let (page, block) = aligned_pointers(&mut storage);

        for block_size in (0..=PackedHeader::MAX_BLOCK_SIZE).step_by(MIN_ALIGN) {
            let mut packed = PackedHeader::empty();
            let mut direct = DirectHeader::empty();

            for header in [&mut packed as &mut dyn DynHeader, &mut direct] {
                header.set_all(block_size, page, block);
            }

            assert_eq!(packed.block_size(), direct.block_size());
            assert_eq!(packed.previous_page(), direct.previous_page());
            assert_eq!(packed.free_list_head(), direct.free_list_head());
            assert_eq!(packed.block_size(), block_size);
        }
    }

    #[test]
    fn packed_block_size_survives_relinking() {
        let mut storage = Storage([0; 64]);
        let (page, block) = aligned_pointers(&mut storage);

        let mut header = PackedHeader::empty();
        header.set_block_size(PackedHeader::MAX_BLOCK_SIZE);

        for _ in 0..3 {
            header.set_previous_page(Some(page));
            header.set_free_list_head(Some(block));
            header.set_free_list_head(Some(page));
            header.set_previous_page(None);
        }

        assert_eq!(header.block_size(), PackedHeader::MAX_BLOCK_SIZE);
        assert_eq!(header.free_list_head(), Some(page));
    }

    #[test]
    fn packed_pointers_remain_dereferenceable() {
        let mut storage = Storage([0; 64]);
        storage.0[40] = 0x5A;
        let (_, block) = aligned_pointers(&mut storage);

        let mut header = PackedHeader::empty();
        header.set_block_size(120);
        header.set_free_list_head(Some(block));

        let restored = header.free_list_head().unwrap();

        // SAFETY: The pointer refers to our storage array, which is still alive.
        assert_eq!(unsafe { restored.read() }, 0x5A);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn packed_rejects_unaligned_block_size() {
        let mut header = PackedHeader::empty();
        header.set_block_size(12);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn packed_rejects_oversized_block() {
        let mut header = PackedHeader::empty();
        header.set_block_size(PackedHeader::MAX_BLOCK_SIZE + MIN_ALIGN);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn packed_rejects_unaligned_pointer() {
        let mut storage = Storage([0; 64]);
        let (page, _) = aligned_pointers(&mut storage);

        let mut header = PackedHeader::empty();

        // SAFETY: Offset is within the 64-byte storage.
        header.set_previous_page(Some(unsafe { page.add(3) }));
    }

    /// Lets the equivalence test drive both encodings through one loop.
    trait DynHeader {
        fn set_all(&mut self, block_size: usize, page: NonNull<u8>, block: NonNull<u8>);
    }

    impl<H: PageHeader> DynHeader for H {
        fn set_all(&mut self, block_size: usize, page: NonNull<u8>, block: NonNull<u8>) {
            self.set_previous_page(Some(page));
            self.set_block_size(block_size);
            self.set_free_list_head(Some(block));
        }
    }
}
