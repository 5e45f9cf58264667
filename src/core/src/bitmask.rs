//! Fixed-width permission bitmasks
//!
//! A [`Bitmask`] is a bit vector of 1 to 1024 bits. Bit indices are counted
//! from the most significant end: index 0 is the leftmost character of the
//! textual form, so `"1000"` has bit 0 set and `"0001"` has bit 3 set.
//!
//! The algebra is the one the closure engine composes along and across paths:
//!
//! - [`Bitmask::and`] narrows a grant along a path
//! - [`Bitmask::or`] merges grants from parallel paths
//! - [`Bitmask::or_reduce`] folds any number of path results, identity all-zeros
//!
//! # Example
//!
//! ```rust
//! use hierarch_core::{Bitmask, BitmaskSize};
//!
//! let size = BitmaskSize::new(4).unwrap();
//! let a: Bitmask = "1100".parse().unwrap();
//! let b: Bitmask = "1010".parse().unwrap();
//!
//! assert_eq!(a.and(&b).to_string(), "1000");
//! assert_eq!(Bitmask::or_reduce([a, b], size).to_string(), "1110");
//! ```

use crate::error::{CoreError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Smallest supported bitmask width
pub const MIN_BITMASK_SIZE: usize = 1;

/// Largest supported bitmask width
pub const MAX_BITMASK_SIZE: usize = 1024;

const WORD_BITS: usize = 64;

/// Validated bitmask width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BitmaskSize(usize);

impl BitmaskSize {
    /// Validate a width in bits
    pub fn new(size: usize) -> Result<Self> {
        if !(MIN_BITMASK_SIZE..=MAX_BITMASK_SIZE).contains(&size) {
            return Err(CoreError::InvalidSize {
                size,
                min: MIN_BITMASK_SIZE,
                max: MAX_BITMASK_SIZE,
            });
        }
        Ok(Self(size))
    }

    /// Width in bits
    pub fn get(self) -> usize {
        self.0
    }

    fn words(self) -> usize {
        self.0.div_ceil(WORD_BITS)
    }

    /// Mask applied to the last storage word so unused bits stay zero
    fn tail_mask(self) -> u64 {
        let used = self.0 % WORD_BITS;
        if used == 0 {
            u64::MAX
        } else {
            u64::MAX << (WORD_BITS - used)
        }
    }
}

impl fmt::Display for BitmaskSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for BitmaskSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0 as u64)
    }
}

impl<'de> Deserialize<'de> for BitmaskSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = usize::deserialize(deserializer)?;
        BitmaskSize::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Fixed-width bit vector
///
/// Storage is big-endian by bit index: bit `i` lives in word `i / 64` at
/// position `63 - i % 64`. Bits past the width are always zero, which keeps
/// derived `Eq`/`Hash` meaningful.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Bitmask {
    size: BitmaskSize,
    words: Vec<u64>,
}

impl Bitmask {
    /// All bits cleared
    pub fn all_zeros(size: BitmaskSize) -> Self {
        Self {
            size,
            words: vec![0; size.words()],
        }
    }

    /// All bits set
    pub fn all_ones(size: BitmaskSize) -> Self {
        let mut words = vec![u64::MAX; size.words()];
        if let Some(last) = words.last_mut() {
            *last &= size.tail_mask();
        }
        Self { size, words }
    }

    /// Parse a bit string whose length must equal `size`
    pub fn parse_with_size(text: &str, size: BitmaskSize) -> Result<Self> {
        let mask: Bitmask = text.parse()?;
        if mask.size != size {
            return Err(CoreError::size_mismatch(size.get(), mask.size.get()));
        }
        Ok(mask)
    }

    /// Build a mask of `size` with exactly the given bits set
    pub fn from_bits(size: BitmaskSize, bits: &[usize]) -> Result<Self> {
        let mut mask = Self::all_zeros(size);
        for &index in bits {
            mask.set(index)?;
        }
        Ok(mask)
    }

    /// Width in bits
    pub fn size(&self) -> BitmaskSize {
        self.size
    }

    /// Set one bit
    pub fn set(&mut self, index: usize) -> Result<()> {
        if index >= self.size.get() {
            return Err(CoreError::BitOutOfRange {
                index,
                size: self.size.get(),
            });
        }
        self.words[index / WORD_BITS] |= 1 << (WORD_BITS - 1 - index % WORD_BITS);
        Ok(())
    }

    /// Test one bit, counted from the most significant end
    ///
    /// Indices past the width read as unset.
    pub fn test(&self, index: usize) -> bool {
        if index >= self.size.get() {
            return false;
        }
        (self.words[index / WORD_BITS] >> (WORD_BITS - 1 - index % WORD_BITS)) & 1 == 1
    }

    /// Bitwise AND
    ///
    /// Both operands must share a width; callers validate widths at the
    /// boundary where masks enter a store.
    pub fn and(&self, other: &Bitmask) -> Bitmask {
        debug_assert_eq!(self.size, other.size, "bitmask width mismatch");
        let words = self
            .words
            .iter()
            .zip(other.words.iter().chain(std::iter::repeat(&0)))
            .map(|(a, b)| a & b)
            .collect();
        Bitmask {
            size: self.size,
            words,
        }
    }

    /// Bitwise OR
    pub fn or(&self, other: &Bitmask) -> Bitmask {
        let mut out = self.clone();
        out.or_assign(other);
        out
    }

    /// In-place bitwise OR
    pub fn or_assign(&mut self, other: &Bitmask) {
        debug_assert_eq!(self.size, other.size, "bitmask width mismatch");
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= b;
        }
    }

    /// Bitwise NOT within the width
    pub fn not(&self) -> Bitmask {
        let mut words: Vec<u64> = self.words.iter().map(|w| !w).collect();
        if let Some(last) = words.last_mut() {
            *last &= self.size.tail_mask();
        }
        Bitmask {
            size: self.size,
            words,
        }
    }

    /// OR-fold of any number of masks, identity is all-zeros of `size`
    pub fn or_reduce<I>(masks: I, size: BitmaskSize) -> Bitmask
    where
        I: IntoIterator,
        I::Item: std::borrow::Borrow<Bitmask>,
    {
        masks.into_iter().fold(Bitmask::all_zeros(size), |mut acc, mask| {
            acc.or_assign(std::borrow::Borrow::borrow(&mask));
            acc
        })
    }

    /// True if no bit is set
    pub fn is_zero(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// True if every bit within the width is set
    pub fn is_all_ones(&self) -> bool {
        *self == Bitmask::all_ones(self.size)
    }

    /// Number of set bits
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// `self` is a subset of `other` (every set bit of `self` is set in `other`)
    pub fn is_subset_of(&self, other: &Bitmask) -> bool {
        self.and(other) == *self
    }
}

impl FromStr for Bitmask {
    type Err = CoreError;

    fn from_str(text: &str) -> Result<Self> {
        let size = BitmaskSize::new(text.chars().count())?;
        let mut mask = Bitmask::all_zeros(size);
        for (position, ch) in text.chars().enumerate() {
            match ch {
                '0' => {}
                '1' => mask.set(position)?,
                found => return Err(CoreError::InvalidBit { found, position }),
            }
        }
        Ok(mask)
    }
}

impl fmt::Display for Bitmask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for index in 0..self.size.get() {
            f.write_str(if self.test(index) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl fmt::Debug for Bitmask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bitmask({})", self)
    }
}

impl Serialize for Bitmask {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Bitmask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(text: &str) -> Bitmask {
        text.parse().unwrap()
    }

    #[test]
    fn test_size_bounds() {
        assert!(BitmaskSize::new(0).is_err());
        assert!(BitmaskSize::new(1).is_ok());
        assert!(BitmaskSize::new(1024).is_ok());
        assert!(BitmaskSize::new(1025).is_err());
    }

    #[test]
    fn test_bit_index_from_most_significant_end() {
        let m = mask("1000");
        assert!(m.test(0));
        assert!(!m.test(3));

        let m = mask("0001");
        assert!(!m.test(0));
        assert!(m.test(3));

        // Past the width reads as unset
        assert!(!m.test(4));
        assert!(!m.test(1000));
    }

    #[test]
    fn test_and_or_not() {
        assert_eq!(mask("1100").and(&mask("1010")), mask("1000"));
        assert_eq!(mask("1100").or(&mask("1010")), mask("1110"));
        assert_eq!(mask("1100").not(), mask("0011"));
    }

    #[test]
    fn test_constants() {
        let size = BitmaskSize::new(70).unwrap();
        let ones = Bitmask::all_ones(size);
        let zeros = Bitmask::all_zeros(size);

        assert_eq!(ones.count_ones(), 70);
        assert!(ones.is_all_ones());
        assert!(zeros.is_zero());
        assert_eq!(ones.not(), zeros);
        assert_eq!(zeros.not(), ones);
        assert!(ones.test(69));
        assert!(!ones.test(70));
    }

    #[test]
    fn test_word_boundary() {
        let size = BitmaskSize::new(128).unwrap();
        let m = Bitmask::from_bits(size, &[0, 63, 64, 127]).unwrap();
        assert!(m.test(0));
        assert!(m.test(63));
        assert!(m.test(64));
        assert!(m.test(127));
        assert!(!m.test(1));
        assert_eq!(m.count_ones(), 4);

        let text = m.to_string();
        assert_eq!(text.len(), 128);
        assert_eq!(mask(&text), m);
    }

    #[test]
    fn test_or_reduce_identity() {
        let size = BitmaskSize::new(4).unwrap();
        let empty: Vec<Bitmask> = Vec::new();
        assert_eq!(Bitmask::or_reduce(empty, size), mask("0000"));

        let folded = Bitmask::or_reduce([mask("1000"), mask("0100"), mask("0001")], size);
        assert_eq!(folded, mask("1101"));

        // Accepts borrowed masks too
        let owned = [mask("0010"), mask("0001")];
        assert_eq!(Bitmask::or_reduce(owned.iter(), size), mask("0011"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "10x1".parse::<Bitmask>(),
            Err(CoreError::InvalidBit { found: 'x', position: 2 })
        ));
        assert!("".parse::<Bitmask>().is_err());

        let size = BitmaskSize::new(8).unwrap();
        assert!(matches!(
            Bitmask::parse_with_size("1010", size),
            Err(CoreError::SizeMismatch { expected: 8, actual: 4 })
        ));
    }

    #[test]
    fn test_set_out_of_range() {
        let size = BitmaskSize::new(4).unwrap();
        assert!(Bitmask::from_bits(size, &[4]).is_err());
    }

    #[test]
    fn test_subset() {
        assert!(mask("1000").is_subset_of(&mask("1100")));
        assert!(!mask("1010").is_subset_of(&mask("1100")));
    }

    #[test]
    fn test_serde_as_bit_string() {
        let json = serde_json::to_string(&mask("1010")).unwrap();
        assert_eq!(json, "\"1010\"");

        let back: Bitmask = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mask("1010"));

        assert!(serde_json::from_str::<Bitmask>("\"12\"").is_err());
        assert!(serde_json::from_str::<BitmaskSize>("0").is_err());
    }
}
