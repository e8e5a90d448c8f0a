//! Reversible word transform used to obfuscate freelist links.
//!
//! On little-endian targets the transform reverses the bytes of the word.
//! Canonical user-space addresses have zero high bytes, so a raw pointer
//! written over an encoded link decodes to a non-canonical address and
//! faults on first use. A partial overwrite of the low bytes lands in the
//! high bytes of the decoded value instead of nudging the pointer a little.
//! Big-endian targets invert every bit for the same effect.
//!
//! The transform is a pure function of its input: no salt, no state.

/// Apply the link transform. It is its own inverse.
#[inline(always)]
pub const fn transform(address: usize) -> usize {
    #[cfg(target_endian = "big")]
    {
        !address
    }
    #[cfg(not(target_endian = "big"))]
    {
        address.swap_bytes()
    }
}

/// Shadow transform: bitwise inversion of an already encoded word.
#[inline(always)]
pub const fn invert(encoded: usize) -> usize {
    !encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn involution() {
        for x in [0usize, 1, 0x1234, usize::MAX, usize::MAX / 3, 0x7f00_beef] {
            assert_eq!(transform(transform(x)), x);
            assert_eq!(invert(invert(x)), x);
        }
    }

    #[cfg(all(target_endian = "little", target_pointer_width = "64"))]
    #[test]
    fn little_endian_swaps_bytes() {
        assert_eq!(transform(0x0000_7f12_3456_7890), 0x9078_5634_127f_0000);
        assert_eq!(transform(0), 0);
    }

    #[test]
    fn canonical_pointer_becomes_implausible() {
        // A slot address keeps its top byte clear; the encoded form must not.
        let addr = 0x0055_aa30usize;
        assert_ne!(transform(addr) >> (usize::BITS - 8), 0);
    }
}
