//! Bounded transitive-closure traversal
//!
//! Walks every path from a seed node up to the configured depth, narrowing
//! the permission with AND along each path and merging parallel paths with
//! OR. A step onto a node already on the current path is not taken, which is
//! all it takes to make cycles terminate.

use crate::graph::GraphStore;
use hierarch_core::{Bitmask, NodeId};
use std::collections::{BTreeMap, VecDeque};

/// Traversal direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards parents, collecting ancestors
    Up,
    /// Towards children, collecting descendants
    Down,
}

/// One partial path in the work queue
#[derive(Debug)]
struct Frontier {
    node: NodeId,
    permission: Bitmask,
    depth: usize,
    /// Nodes already stepped from on this path
    path: Vec<NodeId>,
}

/// Computes composed permissions between a node and everything reachable
/// from it within `max_depth` edges
#[derive(Debug, Clone, Copy)]
pub struct ClosureComputer {
    max_depth: usize,
}

impl ClosureComputer {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Every ancestor of `child` (itself included) with the OR over all
    /// paths of the AND of edge weights along each path
    ///
    /// A node the store does not know yields an empty map.
    pub fn ancestors_of(&self, store: &GraphStore, child: NodeId) -> BTreeMap<NodeId, Bitmask> {
        self.traverse(store, child, Direction::Up)
    }

    /// Mirror of [`ancestors_of`](Self::ancestors_of), walking towards children
    pub fn descendants_of(&self, store: &GraphStore, parent: NodeId) -> BTreeMap<NodeId, Bitmask> {
        self.traverse(store, parent, Direction::Down)
    }

    pub fn traverse(
        &self,
        store: &GraphStore,
        seed: NodeId,
        direction: Direction,
    ) -> BTreeMap<NodeId, Bitmask> {
        let mut reached: BTreeMap<NodeId, Bitmask> = BTreeMap::new();
        if !store.contains_node(seed) {
            return reached;
        }

        let mut queue = VecDeque::new();
        queue.push_back(Frontier {
            node: seed,
            permission: Bitmask::all_ones(store.bitmask_size()),
            depth: 0,
            path: Vec::new(),
        });

        while let Some(current) = queue.pop_front() {
            match reached.get_mut(&current.node) {
                Some(acc) => acc.or_assign(&current.permission),
                None => {
                    reached.insert(current.node, current.permission.clone());
                }
            }

            if current.depth + 1 > self.max_depth || current.path.contains(&current.node) {
                continue;
            }

            let next: Vec<(NodeId, &Bitmask)> = match direction {
                Direction::Up => store.parents_of(current.node).collect(),
                Direction::Down => store.children_of(current.node).collect(),
            };
            for (node, weight) in next {
                let mut path = current.path.clone();
                path.push(current.node);
                queue.push_back(Frontier {
                    node,
                    permission: current.permission.and(weight),
                    depth: current.depth + 1,
                    path,
                });
            }
        }

        reached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphMutation;
    use hierarch_core::{BitmaskSize, HierarchyKind};

    fn mask(text: &str) -> Bitmask {
        text.parse().unwrap()
    }

    fn graph(nodes: &[u64], edges: &[(u64, u64, &str)]) -> GraphStore {
        let mut store = GraphStore::new(HierarchyKind::Resource, BitmaskSize::new(4).unwrap());
        for &id in nodes {
            store.apply(GraphMutation::insert_node(id)).unwrap();
        }
        for &(p, c, perm) in edges {
            store.apply(GraphMutation::insert_edge(p, c, mask(perm))).unwrap();
        }
        store
    }

    fn entries(map: &BTreeMap<NodeId, Bitmask>) -> Vec<(u64, String)> {
        map.iter().map(|(id, m)| (id.0, m.to_string())).collect()
    }

    #[test]
    fn test_isolated_node_has_only_self() {
        let store = graph(&[1], &[]);
        let computer = ClosureComputer::new(16);
        assert_eq!(entries(&computer.ancestors_of(&store, NodeId(1))), vec![(1, "1111".into())]);
        assert_eq!(entries(&computer.descendants_of(&store, NodeId(1))), vec![(1, "1111".into())]);
    }

    #[test]
    fn test_unknown_node_is_empty() {
        let store = graph(&[1], &[]);
        assert!(ClosureComputer::new(16).ancestors_of(&store, NodeId(2)).is_empty());
    }

    #[test]
    fn test_parallel_paths_or_merged() {
        // 1 -> 2 -> 4 and 1 -> 3 -> 4
        let store = graph(
            &[1, 2, 3, 4],
            &[(1, 2, "1100"), (2, 4, "1111"), (1, 3, "0011"), (3, 4, "0110")],
        );
        let up = ClosureComputer::new(16).ancestors_of(&store, NodeId(4));
        assert_eq!(up[&NodeId(1)], mask("1110"));
        assert_eq!(up[&NodeId(2)], mask("1111"));
        assert_eq!(up[&NodeId(3)], mask("0110"));
        assert_eq!(up[&NodeId(4)], mask("1111"));
    }

    #[test]
    fn test_depth_bound_truncates() {
        let store = graph(&[1, 2, 3], &[(1, 2, "1111"), (2, 3, "1111")]);

        let shallow = ClosureComputer::new(1).ancestors_of(&store, NodeId(3));
        assert!(shallow.contains_key(&NodeId(2)));
        assert!(!shallow.contains_key(&NodeId(1)));

        let deep = ClosureComputer::new(2).ancestors_of(&store, NodeId(3));
        assert!(deep.contains_key(&NodeId(1)));
    }

    #[test]
    fn test_cycle_terminates() {
        let store = graph(&[1, 2, 3], &[(1, 2, "1100"), (2, 3, "1010"), (3, 1, "0110")]);
        let computer = ClosureComputer::new(64);

        let up = computer.ancestors_of(&store, NodeId(3));
        assert_eq!(up[&NodeId(3)], mask("1111"));
        assert_eq!(up[&NodeId(2)], mask("1010"));
        assert_eq!(up[&NodeId(1)], mask("1000"));

        let down = computer.descendants_of(&store, NodeId(1));
        assert_eq!(down.len(), 3);
        assert_eq!(down[&NodeId(3)], mask("1000"));
    }

    #[test]
    fn test_self_loop_keeps_self_all_ones() {
        let store = graph(&[1], &[(1, 1, "0001")]);
        let up = ClosureComputer::new(8).ancestors_of(&store, NodeId(1));
        assert_eq!(entries(&up), vec![(1, "1111".into())]);
    }
}
