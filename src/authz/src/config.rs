//! Engine configuration
//!
//! Loaded from JSON or built programmatically, then validated once before any
//! store or cache exists. Validation fails fast: a bad width, a zero depth or
//! a capability for an undeclared principal class is rejected here rather
//! than degrading at query time.

use crate::error::{AuthzError, Result};
use hierarch_core::{BitmaskSize, HierarchyKind, MAX_BITMASK_SIZE, MIN_BITMASK_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Default permission bitmask width
pub const DEFAULT_BITMAP_SIZE: usize = 128;

/// Default traversal depth bound for both hierarchies
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Which hierarchy, if any, assignments are pre-joined with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineWith {
    #[default]
    None,
    Resource,
    Role,
}

impl CombineWith {
    /// The hierarchy whose closure is folded into the combined cache
    pub fn side(self) -> Option<HierarchyKind> {
        match self {
            CombineWith::None => None,
            CombineWith::Resource => Some(HierarchyKind::Resource),
            CombineWith::Role => Some(HierarchyKind::Role),
        }
    }
}

/// How the combined assignment cache follows mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombinedRefresh {
    /// Delete and recompute the affected keys after every mutation
    #[default]
    Incremental,
    /// Mark the cache stale on every relevant mutation; only a reconcile
    /// brings it back
    Reconcile,
}

/// Per-hierarchy traversal depth bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxDepth {
    #[serde(default = "default_max_depth")]
    pub resource: usize,
    #[serde(default = "default_max_depth")]
    pub role: usize,
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl Default for MaxDepth {
    fn default() -> Self {
        Self {
            resource: DEFAULT_MAX_DEPTH,
            role: DEFAULT_MAX_DEPTH,
        }
    }
}

impl MaxDepth {
    pub fn for_kind(&self, kind: HierarchyKind) -> usize {
        match kind {
            HierarchyKind::Resource => self.resource,
            HierarchyKind::Role => self.role,
        }
    }
}

/// Row-level operation on a protected table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Select,
        Operation::Insert,
        Operation::Update,
        Operation::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Select => "select",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "select" => Ok(Operation::Select),
            "insert" => Ok(Operation::Insert),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(AuthzError::InvalidInput(format!("unknown operation: {other}"))),
        }
    }
}

/// Capability bit per operation; `None` means the operation is not granted
/// through the hierarchy for that principal class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationBits {
    #[serde(default)]
    pub select: Option<usize>,
    #[serde(default)]
    pub insert: Option<usize>,
    #[serde(default)]
    pub update: Option<usize>,
    #[serde(default)]
    pub delete: Option<usize>,
}

impl OperationBits {
    pub fn get(&self, op: Operation) -> Option<usize> {
        match op {
            Operation::Select => self.select,
            Operation::Insert => self.insert,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }
}

/// A protected table and its capability bits per principal class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    #[serde(default)]
    pub permission: BTreeMap<String, OperationBits>,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Permission bitmask width in bits
    #[serde(default = "default_bitmap_size")]
    pub bitmap_size: usize,

    /// Traversal depth bound per hierarchy
    #[serde(default)]
    pub max_depth: MaxDepth,

    /// Hierarchy pre-joined with assignments
    #[serde(default)]
    pub combine_with: CombineWith,

    /// Refresh strategy for the combined cache
    #[serde(default)]
    pub combined_refresh: CombinedRefresh,

    /// Declared principal classes
    #[serde(default)]
    pub principal_classes: Vec<String>,

    /// Protected tables
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

fn default_bitmap_size() -> usize {
    DEFAULT_BITMAP_SIZE
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bitmap_size: DEFAULT_BITMAP_SIZE,
            max_depth: MaxDepth::default(),
            combine_with: CombineWith::None,
            combined_refresh: CombinedRefresh::Incremental,
            principal_classes: Vec::new(),
            tables: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Validated bitmask width
    pub fn bitmask_size(&self) -> Result<BitmaskSize> {
        BitmaskSize::new(self.bitmap_size).map_err(|_| {
            AuthzError::config(format!(
                "bitmap_size {} out of range {}..={}",
                self.bitmap_size, MIN_BITMASK_SIZE, MAX_BITMASK_SIZE
            ))
        })
    }

    /// Reject the configuration if any knob is out of range
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::Configuration` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let size = self.bitmask_size()?;

        for kind in [HierarchyKind::Resource, HierarchyKind::Role] {
            if self.max_depth.for_kind(kind) < 1 {
                return Err(AuthzError::config(format!(
                    "max_depth.{kind} must be at least 1"
                )));
            }
        }

        let mut classes = HashSet::new();
        for class in &self.principal_classes {
            if class.is_empty() {
                return Err(AuthzError::config("empty principal class name"));
            }
            if !classes.insert(class.as_str()) {
                return Err(AuthzError::config(format!(
                    "principal class '{class}' declared twice"
                )));
            }
        }

        let mut tables = HashSet::new();
        for table in &self.tables {
            if !tables.insert(table.name.as_str()) {
                return Err(AuthzError::config(format!(
                    "table '{}' declared twice",
                    table.name
                )));
            }
            for (class, bits) in &table.permission {
                if !classes.contains(class.as_str()) {
                    return Err(AuthzError::config(format!(
                        "table '{}' assigns capabilities to undeclared principal class '{}'",
                        table.name, class
                    )));
                }
                for op in Operation::ALL {
                    if let Some(bit) = bits.get(op) {
                        if bit >= size.get() {
                            return Err(AuthzError::config(format!(
                                "table '{}' {} {} bit {} exceeds bitmap_size {}",
                                table.name, class, op, bit, size
                            )));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Build the capability lookup table
    pub fn capability_table(&self) -> CapabilityTable {
        CapabilityTable::from_config(self)
    }
}

/// Resolves (table, principal class, operation) to a capability bit index
#[derive(Debug, Clone, Default)]
pub struct CapabilityTable {
    bits: HashMap<(String, String, Operation), usize>,
}

impl CapabilityTable {
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut bits = HashMap::new();
        for table in &config.tables {
            for (class, ops) in &table.permission {
                for op in Operation::ALL {
                    if let Some(bit) = ops.get(op) {
                        bits.insert((table.name.clone(), class.clone(), op), bit);
                    }
                }
            }
        }
        Self { bits }
    }

    /// Look up a capability bit
    ///
    /// # Errors
    ///
    /// `AuthzError::UnknownCapability` if nothing is configured for the triple.
    pub fn bit(&self, table: &str, class: &str, op: Operation) -> Result<usize> {
        self.bits
            .get(&(table.to_string(), class.to_string(), op))
            .copied()
            .ok_or_else(|| AuthzError::UnknownCapability(format!("{table}/{class}/{op}")))
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }
}
