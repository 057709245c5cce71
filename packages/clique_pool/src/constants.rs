/// Every block size and every block address is a multiple of this.
///
/// This is the width of a pointer but never less than 8 bytes, so that the low 3 bits of every
/// block address and block size are always zero, which the packed page header relies on.
pub const MIN_ALIGN: usize = if size_of::<usize>() > 8 {
    size_of::<usize>()
} else {
    8
};

/// The strongest alignment the pool guarantees for the blocks it hands out.
///
/// Pages are requested from the raw memory source with this alignment and the page header is
/// padded to a multiple of it. Element types with a stricter alignment requirement bypass the
/// pool and are served directly by the raw memory source.
pub const MAX_ALIGN: usize = 16;

/// Largest element size (in bytes) that is served from pages.
///
/// Bigger elements are forwarded to the raw memory source.
pub const MAX_BLOCK_SIZE: usize = 128;

/// Default upper bound on the size (in bytes) of a single page, header included.
pub const DEFAULT_MAX_PAGE_BYTES: usize = 100_000;

/// Smallest page byte budget accepted by the builder.
///
/// This leaves room for at least one block of [`MAX_BLOCK_SIZE`] next to either header encoding.
pub const MIN_MAX_PAGE_BYTES: usize = 1024;

const _: () = assert!(MAX_ALIGN >= MIN_ALIGN);
const _: () = assert!(MAX_ALIGN.is_power_of_two() && MIN_ALIGN.is_power_of_two());
const _: () = assert!(MAX_BLOCK_SIZE % MIN_ALIGN == 0);
const _: () = assert!(MIN_MAX_PAGE_BYTES <= DEFAULT_MAX_PAGE_BYTES);
