//! # Hierarch Core
//!
//! Shared value types for the hierarch authorization engine: the fixed-width
//! permission [`Bitmask`], node identifiers and the two hierarchy kinds.
//! Kept free of async and I/O so the closure algorithms can be tested on
//! their own.

pub mod bitmask;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use bitmask::{Bitmask, BitmaskSize, MAX_BITMASK_SIZE, MIN_BITMASK_SIZE};
pub use error::{CoreError, Result};
pub use types::{HierarchyKind, NodeId};
