use std::result;

use thiserror::Error;

/// Errors that can occur when a pool asks for memory.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The raw memory source could not satisfy a request.
    ///
    /// Page creation is all-or-nothing, so when this is returned no page has been linked into
    /// the pool and the pool is in the same state as before the call.
    #[error("raw memory source could not provide {size} bytes aligned to {align}")]
    OutOfMemory {
        /// Number of bytes requested.
        size: usize,

        /// Alignment requested.
        align: usize,
    },

    /// The size of the requested memory cannot be expressed as a valid memory layout.
    #[error("cannot lay out {count} elements of {element_size} bytes each")]
    LayoutOverflow {
        /// Number of elements requested.
        count: usize,

        /// Size of one element in bytes.
        element_size: usize,
    },
}

/// A specialized `Result` type for pool operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn out_of_memory_mentions_request() {
        let error = Error::OutOfMemory {
            size: 4096,
            align: 16,
        };

        let message = error.to_string();
        assert!(message.contains("4096"));
        assert!(message.contains("16"));
    }

    #[test]
    fn layout_overflow_mentions_request() {
        let error = Error::LayoutOverflow {
            count: usize::MAX,
            element_size: 8,
        };

        let message = error.to_string();
        assert!(message.contains(&usize::MAX.to_string()));

        let result: Result<()> = Err(error);
        assert!(result.is_err());
    }
}
