use super::PointerEncoder;
use crate::transform::transform;

/// Stores `transform(address)` for the full pointer width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WholePointer;

impl PointerEncoder for WholePointer {
    const NULL: usize = transform(0);

    #[inline(always)]
    fn encode(next: usize) -> usize {
        transform(next)
    }

    #[inline(always)]
    fn decode(_here: usize, encoded: usize) -> usize {
        transform(encoded)
    }

    #[inline(always)]
    fn is_same_pool(_here: usize, _next: usize) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_transform_of_zero() {
        assert_eq!(WholePointer::NULL, transform(0));
        assert_eq!(WholePointer::decode(0, WholePointer::NULL), 0);
    }

    #[test]
    fn round_trip() {
        for p in [16usize, 0x1000, 0x7fff_fff0, usize::MAX & !0xf] {
            assert_eq!(WholePointer::decode(0, WholePointer::encode(p)), p);
            assert_ne!(WholePointer::encode(p), p);
        }
    }
}
