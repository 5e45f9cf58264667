//! Identifier and classification types

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Node identifier within a single hierarchy
///
/// Resource and role hierarchies have independent id spaces; the same
/// numeric id may name a resource and a role at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        NodeId(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(NodeId)
            .map_err(|_| CoreError::InvalidId(s.to_string()))
    }
}

/// Which of the two hierarchies a node or edge belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HierarchyKind {
    Resource,
    Role,
}

impl HierarchyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HierarchyKind::Resource => "resource",
            HierarchyKind::Role => "role",
        }
    }
}

impl fmt::Display for HierarchyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HierarchyKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resource" => Ok(HierarchyKind::Resource),
            "role" => Ok(HierarchyKind::Role),
            other => Err(CoreError::InvalidId(format!("unknown hierarchy: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_parse() {
        assert_eq!("42".parse::<NodeId>().unwrap(), NodeId(42));
        assert!("abc".parse::<NodeId>().is_err());
        assert_eq!(NodeId::from(7).to_string(), "7");
    }

    #[test]
    fn test_node_id_serde_transparent() {
        assert_eq!(serde_json::to_string(&NodeId(5)).unwrap(), "5");
    }

    #[test]
    fn test_hierarchy_kind() {
        assert_eq!("role".parse::<HierarchyKind>().unwrap(), HierarchyKind::Role);
        assert!("group".parse::<HierarchyKind>().is_err());
        assert_eq!(
            serde_json::to_string(&HierarchyKind::Resource).unwrap(),
            "\"resource\""
        );
    }
}
