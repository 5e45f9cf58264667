//! Authorization decision types

use super::evaluator::Witness;
use hierarch_core::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Authorization decision with the chain that justified it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessDecision {
    /// Unique decision ID
    pub id: String,

    /// Whether access is granted
    pub allowed: bool,

    /// Role node the check ran for; `None` when no principal resolved
    pub principal: Option<NodeId>,

    /// Resource node checked
    pub resource: NodeId,

    /// Capability bit tested
    pub capability: usize,

    /// Chain that satisfied the check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub witness: Option<Witness>,

    /// Reason for the decision
    pub reason: DecisionReason,

    /// Decision timestamp (milliseconds since epoch)
    pub timestamp: u64,

    /// Additional metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AccessDecision {
    /// Create an allow decision
    pub fn allow(principal: NodeId, resource: NodeId, capability: usize, witness: Witness) -> Self {
        Self::build(
            true,
            Some(principal),
            resource,
            capability,
            Some(witness),
            DecisionReason::PathFound,
        )
    }

    /// Create a deny decision
    pub fn deny(principal: Option<NodeId>, resource: NodeId, capability: usize) -> Self {
        let reason = if principal.is_some() {
            DecisionReason::NoPath
        } else {
            DecisionReason::NoPrincipal
        };
        Self::build(false, principal, resource, capability, None, reason)
    }

    /// Add metadata to the decision
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    fn build(
        allowed: bool,
        principal: Option<NodeId>,
        resource: NodeId,
        capability: usize,
        witness: Option<Witness>,
        reason: DecisionReason,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            allowed,
            principal,
            resource,
            capability,
            witness,
            reason,
            timestamp: chrono::Utc::now().timestamp_millis().max(0) as u64,
            metadata: HashMap::new(),
        }
    }
}

/// Reason for an authorization decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecisionReason {
    /// A resource / assignment / role chain carries the bit at every hop
    PathFound,

    /// No chain carries the bit
    NoPath,

    /// The resolver produced no principal
    NoPrincipal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_decision() {
        let witness = Witness {
            resource_ancestor: Some(NodeId(1)),
            role_ancestor: Some(NodeId(7)),
        };
        let decision = AccessDecision::allow(NodeId(9), NodeId(3), 2, witness);

        assert!(decision.allowed);
        assert_eq!(decision.reason, DecisionReason::PathFound);
        assert_eq!(decision.witness, Some(witness));
        assert!(!decision.id.is_empty());
        assert!(decision.timestamp > 0);
    }

    #[test]
    fn test_deny_reasons() {
        let decision = AccessDecision::deny(Some(NodeId(9)), NodeId(3), 2);
        assert!(!decision.allowed);
        assert_eq!(decision.reason, DecisionReason::NoPath);

        let decision = AccessDecision::deny(None, NodeId(3), 2);
        assert_eq!(decision.reason, DecisionReason::NoPrincipal);
    }

    #[test]
    fn test_decision_metadata() {
        let decision = AccessDecision::deny(None, NodeId(1), 0)
            .with_metadata("table", serde_json::json!("document"))
            .with_metadata("operation", serde_json::json!("select"));

        assert_eq!(decision.metadata.len(), 2);
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["reason"]["type"], "no_principal");
    }
}
