//! Error types for the authorization engine

use hierarch_core::{CoreError, HierarchyKind, NodeId};
use thiserror::Error;

/// Authorization engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Configuration rejected before any store or cache exists
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Bitmask parse or width error
    #[error("Bitmask error: {0}")]
    Bitmask(#[from] CoreError),

    /// Node does not exist in the named hierarchy
    #[error("Unknown {kind} node: {id}")]
    UnknownNode { kind: HierarchyKind, id: NodeId },

    /// Node already exists in the named hierarchy
    #[error("Duplicate {kind} node: {id}")]
    DuplicateNode { kind: HierarchyKind, id: NodeId },

    /// Edge does not exist
    #[error("Unknown {kind} edge: {parent} -> {child}")]
    UnknownEdge {
        kind: HierarchyKind,
        parent: NodeId,
        child: NodeId,
    },

    /// Edge already exists
    #[error("Duplicate {kind} edge: {parent} -> {child}")]
    DuplicateEdge {
        kind: HierarchyKind,
        parent: NodeId,
        child: NodeId,
    },

    /// Assignment does not exist
    #[error("Unknown assignment: resource {resource} / role {role}")]
    UnknownAssignment { resource: NodeId, role: NodeId },

    /// Assignment already exists
    #[error("Duplicate assignment: resource {resource} / role {role}")]
    DuplicateAssignment { resource: NodeId, role: NodeId },

    /// No capability bit configured for (table, principal class, operation)
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    /// Read attempted while maintenance is suspended
    #[error("Maintenance suspended for {0}; resume before reading")]
    Suspended(String),

    /// Combined assignment cache awaits reconciliation
    #[error("Combined assignment cache is stale; reconcile before reading")]
    StaleCombinedCache,

    /// Validation found live cache contents that differ from a full recompute
    #[error("Closure cache drift in {kind} hierarchy: {detail}")]
    CacheDrift { kind: HierarchyKind, detail: String },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthzError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        AuthzError::Configuration(msg.into())
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
