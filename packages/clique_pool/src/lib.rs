//! A single-threaded pool allocator for fixed-size blocks, shared by groups of handles.
//!
//! This crate provides [`PoolAllocator`], an allocator handle that serves single values of a small
//! type from a chain of pages, each page carved into blocks of one fixed size. Unused blocks are
//! kept on an intrusive free list threaded through their own storage, so allocating and
//! deallocating a block are both constant-time pointer swaps.
//!
//! # Cliques
//!
//! Allocator handles are grouped into cliques. A clique is the set of handles that share one
//! pool: any member may deallocate a block allocated by any other member, and all members observe
//! new pages the moment one of them creates a page. Handles compare equal exactly when they are
//! in the same clique.
//!
//! - A new handle is alone in a new clique and has no memory.
//! - [`Clone`] adds the clone to the original's clique.
//! - [`rederive_from()`](PoolAllocator::rederive_from) moves a handle into another clique, for
//!   containers that take over each other's contents.
//! - [`reset()`](PoolAllocator::reset) and [`fresh_like()`](PoolAllocator::fresh_like) produce a
//!   handle that is alone again, for containers that copy their contents.
//! - [`rebind()`](PoolAllocator::rebind) creates a member of the same clique for another element
//!   type.
//!
//! The pool of a clique is released as a whole when the last member goes away.
//!
//! # Pages
//!
//! The first pooled allocation in a clique fixes the block size at the element size rounded up
//! to [`MIN_ALIGN`]. Pages grow exponentially, starting from a page barely larger than its own
//! header and doubling until a page would exceed the configured page budget (see
//! [`PoolAllocatorBuilder::max_page_bytes()`]).
//!
//! Each page starts with a small header. By default the compact [`PackedHeader`] is used, which
//! hides the block size in the alignment bits of its two pointers. [`DirectHeader`] stores
//! every field in full instead.
//!
//! # What bypasses the pool
//!
//! Requests for more than one value, for types larger than [`MAX_BLOCK_SIZE`] or aligned more
//! strictly than [`MAX_ALIGN`], and for types that do not fit the blocks of an existing pool are
//! passed straight to the [`RawMemory`] source of the clique. Zero-sized requests touch no memory.
//!
//! # Examples
//!
//! ```rust
//! use clique_pool::PoolAllocator;
//!
//! let allocator = PoolAllocator::<u32>::new();
//!
//! let first = allocator.allocate(1);
//!
//! // SAFETY: The block came from this allocator with the same count.
//! unsafe { allocator.deallocate(first, 1) };
//!
//! // The most recently freed block is handed out first.
//! let second = allocator.allocate(1);
//! assert_eq!(first, second);
//!
//! // SAFETY: The block came from this allocator with the same count.
//! unsafe { allocator.deallocate(second, 1) };
//! ```
//!
//! Handles created before the pool exists still share it:
//!
//! ```rust
//! use clique_pool::PoolAllocator;
//!
//! let allocator = PoolAllocator::<u64>::new();
//! let peer = allocator.clone();
//! assert!(!peer.has_page());
//!
//! let _block = allocator.allocate(1);
//! assert!(peer.has_page());
//!
//! // Outstanding blocks need not be deallocated: the pages go away with the last member.
//! drop(allocator);
//! drop(peer);
//! ```
//!
//! See [`PoolAllocatorBuilder`] for the available configuration.

mod align;
mod allocator;
mod builder;
mod clique;
mod constants;
mod error;
mod header;
mod page;
mod raw_memory;

pub use allocator::*;
pub use builder::*;
pub(crate) use clique::*;
pub use constants::*;
pub use error::*;
pub use header::*;
pub(crate) use page::*;
pub use raw_memory::*;

trait Sealed {}
