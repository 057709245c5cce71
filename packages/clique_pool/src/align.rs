use crate::MAX_ALIGN;

/// Smallest value `>= value` that is divisible by `alignment`.
///
/// # Panics
///
/// Panics if `alignment` is not a power of two or if the result would overflow.
#[must_use]
pub(crate) fn round_up(value: usize, alignment: usize) -> usize {
    assert!(
        alignment.is_power_of_two(),
        "alignment {alignment} is not a power of two"
    );

    value.next_multiple_of(alignment)
}

/// The strongest alignment (capped at [`MAX_ALIGN`]) that an object of `size` bytes can have.
///
/// Zero is divisible by everything, so it maps to [`MAX_ALIGN`].
#[must_use]
pub(crate) fn alignment_for_size(size: usize) -> usize {
    1_usize
        .checked_shl(size.trailing_zeros())
        .map_or(MAX_ALIGN, |alignment| alignment.min(MAX_ALIGN))
}

/// The strongest alignment (capped at [`MAX_ALIGN`]) that `ptr` satisfies.
#[must_use]
pub(crate) fn alignment_for_ptr<T>(ptr: *const T) -> usize {
    alignment_for_size(ptr.addr())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_up_examples() {
        assert_eq!(round_up(0, 1), 0);
        assert_eq!(round_up(3, 1), 3);
        assert_eq!(round_up(3, 4), 4);
        assert_eq!(round_up(2, 8), 8);
        assert_eq!(round_up(2, 2), 2);
        assert_eq!(round_up(16, 8), 16);
        assert_eq!(round_up(17, 8), 24);
    }

    #[test]
    #[should_panic]
    fn round_up_rejects_non_power_of_two() {
        _ = round_up(5, 3);
    }

    #[test]
    fn alignment_for_size_examples() {
        assert_eq!(alignment_for_size(12), 4);
        assert_eq!(alignment_for_size(13), 1);
        assert_eq!(alignment_for_size(8), 8);
        assert_eq!(alignment_for_size(MAX_ALIGN * 10), MAX_ALIGN);
        assert_eq!(alignment_for_size(MAX_ALIGN * 10 + 1), 1);
        assert_eq!(alignment_for_size(0), MAX_ALIGN);
    }

    #[test]
    fn alignment_for_ptr_examples() {
        #[repr(align(16))]
        struct Aligned([u8; 16]);

        let storage = Aligned([0; 16]);
        let base = storage.0.as_ptr();

        assert_eq!(alignment_for_ptr(std::ptr::null::<u8>()), MAX_ALIGN);
        assert_eq!(alignment_for_ptr(base), MAX_ALIGN);
        assert_eq!(alignment_for_ptr(base.wrapping_add(1)), 1);
        assert_eq!(alignment_for_ptr(base.wrapping_add(2)), 2);
        assert_eq!(alignment_for_ptr(base.wrapping_add(5)), 1);
        assert_eq!(alignment_for_ptr(base.wrapping_add(8)), 8);
    }
}
