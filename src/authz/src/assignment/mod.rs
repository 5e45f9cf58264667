//! Assignment relation and the optional combined cache

pub mod bridge;
pub mod combined;

pub use bridge::{Assignment, AssignmentBridge, AssignmentChange, AssignmentMutation};
pub use combined::{CombinedCache, CombinedEntry};
