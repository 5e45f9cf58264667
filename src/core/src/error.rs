//! Error types shared by the hierarch crates
//!
//! Covers the failure modes of the value types in this crate: bitmask
//! construction, parsing and width agreement.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for bitmask and identifier handling
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Bitmask width outside the supported range
    #[error("Invalid bitmask size {size}: must be between {min} and {max}")]
    InvalidSize { size: usize, min: usize, max: usize },

    /// A character other than '0' or '1' in a bit string
    #[error("Invalid bit character {found:?} at position {position}")]
    InvalidBit { found: char, position: usize },

    /// Two bitmasks (or a bitmask and a configured width) disagree on size
    #[error("Bitmask size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Bit index past the end of the bitmask
    #[error("Bit index {index} out of range for bitmask of size {size}")]
    BitOutOfRange { index: usize, size: usize },

    /// Identifier that could not be parsed
    #[error("Invalid identifier: {0}")]
    InvalidId(String),
}

impl CoreError {
    /// Create a size mismatch error
    pub fn size_mismatch(expected: usize, actual: usize) -> Self {
        CoreError::SizeMismatch { expected, actual }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::InvalidSize {
            size: 0,
            min: 1,
            max: 1024,
        };
        assert_eq!(
            err.to_string(),
            "Invalid bitmask size 0: must be between 1 and 1024"
        );

        let err = CoreError::size_mismatch(4, 8);
        assert_eq!(err.to_string(), "Bitmask size mismatch: expected 4, got 8");
    }
}
