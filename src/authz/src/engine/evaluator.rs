//! Authorization predicate over the two closures and the assignment bridge
//!
//! Access to `resource` with capability bit `i` is granted to `principal`
//! when some chain
//!
//! ```text
//! resource_closure(ra -> resource) . assignment(ra, ro) . role_closure(ro -> principal)
//! ```
//!
//! has bit `i` set at every hop. With a combined cache the assignment and one
//! closure are already folded together and the chain has two hops.

use crate::assignment::{AssignmentBridge, CombinedCache};
use crate::closure::ClosureCache;
use hierarch_core::{HierarchyKind, NodeId};
use serde::{Deserialize, Serialize};

/// Supplies the role node of the caller
///
/// Passed explicitly to every authorization call instead of being read from
/// ambient session state.
pub trait PrincipalResolver {
    fn current_principal(&self) -> Option<NodeId>;
}

impl PrincipalResolver for NodeId {
    fn current_principal(&self) -> Option<NodeId> {
        Some(*self)
    }
}

impl PrincipalResolver for Option<NodeId> {
    fn current_principal(&self) -> Option<NodeId> {
        *self
    }
}

impl<T: PrincipalResolver + ?Sized> PrincipalResolver for &T {
    fn current_principal(&self) -> Option<NodeId> {
        (**self).current_principal()
    }
}

/// The chain that satisfied a check
///
/// A hop folded into the combined cache has no id of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    /// Resource ancestor carrying the assignment
    pub resource_ancestor: Option<NodeId>,
    /// Role ancestor carrying the assignment
    pub role_ancestor: Option<NodeId>,
}

/// Read-only view over the caches one check needs
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationEvaluator<'a> {
    resources: &'a ClosureCache,
    roles: &'a ClosureCache,
    bridge: &'a AssignmentBridge,
    combined: Option<&'a CombinedCache>,
}

impl<'a> AuthorizationEvaluator<'a> {
    pub fn new(resources: &'a ClosureCache, roles: &'a ClosureCache, bridge: &'a AssignmentBridge) -> Self {
        Self {
            resources,
            roles,
            bridge,
            combined: None,
        }
    }

    /// Evaluate through a combined cache instead of the full join
    pub fn with_combined(mut self, combined: &'a CombinedCache) -> Self {
        self.combined = Some(combined);
        self
    }

    pub fn authorize(&self, principal: NodeId, resource: NodeId, bit: usize) -> bool {
        self.witness(principal, resource, bit).is_some()
    }

    /// First satisfying chain in id order, if any
    pub fn witness(&self, principal: NodeId, resource: NodeId, bit: usize) -> Option<Witness> {
        match self.combined {
            None => self.three_way(principal, resource, bit),
            Some(combined) => match combined.side() {
                HierarchyKind::Role => self.via_combined_roles(combined, principal, resource, bit),
                HierarchyKind::Resource => self.via_combined_resources(combined, principal, resource, bit),
            },
        }
    }

    fn three_way(&self, principal: NodeId, resource: NodeId, bit: usize) -> Option<Witness> {
        for (resource_ancestor, on_resource) in self.resources.ancestors(resource) {
            if !on_resource.test(bit) {
                continue;
            }
            for (role_ancestor, assigned) in self.bridge.roles_of(resource_ancestor) {
                if !assigned.test(bit) {
                    continue;
                }
                if self
                    .roles
                    .get(role_ancestor, principal)
                    .is_some_and(|on_role| on_role.test(bit))
                {
                    return Some(Witness {
                        resource_ancestor: Some(resource_ancestor),
                        role_ancestor: Some(role_ancestor),
                    });
                }
            }
        }
        None
    }

    /// combined keyed (role descendant, resource)
    fn via_combined_roles(
        &self,
        combined: &CombinedCache,
        principal: NodeId,
        resource: NodeId,
        bit: usize,
    ) -> Option<Witness> {
        self.resources
            .ancestors(resource)
            .filter(|(_, on_resource)| on_resource.test(bit))
            .find(|(ancestor, _)| combined.get(principal, *ancestor).is_some_and(|p| p.test(bit)))
            .map(|(ancestor, _)| Witness {
                resource_ancestor: Some(ancestor),
                role_ancestor: None,
            })
    }

    /// combined keyed (resource descendant, role)
    fn via_combined_resources(
        &self,
        combined: &CombinedCache,
        principal: NodeId,
        resource: NodeId,
        bit: usize,
    ) -> Option<Witness> {
        self.roles
            .ancestors(principal)
            .filter(|(_, on_role)| on_role.test(bit))
            .find(|(ancestor, _)| combined.get(resource, *ancestor).is_some_and(|p| p.test(bit)))
            .map(|(ancestor, _)| Witness {
                resource_ancestor: None,
                role_ancestor: Some(ancestor),
            })
    }
}
