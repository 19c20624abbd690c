//! R-tree over the top-level nodes of the open sub-chart level.
//!
//! Hit testing drives drop-to-reparent decisions, so the index has to be
//! rebuilt (or patched) after every change to top-level membership before
//! the next query.

use crate::graph::Graph;
use chartgraph_core::{NodeId, Rect, Vec2};
use rstar::{AABB, RTree, RTreeObject};
use std::collections::HashMap;

/// Index entry for one node.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedNode {
    pub id: NodeId,
    bounds: AABB<[f32; 2]>,
}

impl IndexedNode {
    pub fn new(id: NodeId, rect: Rect) -> Self {
        Self {
            id,
            bounds: envelope(rect),
        }
    }
}

impl RTreeObject for IndexedNode {
    type Envelope = AABB<[f32; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.bounds
    }
}

fn envelope(rect: Rect) -> AABB<[f32; 2]> {
    AABB::from_corners([rect.min.x, rect.min.y], [rect.max.x, rect.max.y])
}

#[derive(Clone, Default)]
pub struct SpatialIndex {
    tree: RTree<IndexedNode>,
    /// Rect each node was inserted with, so removal can locate the entry.
    entries: HashMap<NodeId, Rect>,
}

impl std::fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("count", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, replacing any entry it already has.
    pub fn insert(&mut self, id: NodeId, rect: Rect) {
        self.remove(id);
        self.tree.insert(IndexedNode::new(id, rect));
        self.entries.insert(id, rect);
    }

    pub fn remove(&mut self, id: NodeId) -> bool {
        let Some(rect) = self.entries.remove(&id) else {
            return false;
        };
        self.tree.remove(&IndexedNode::new(id, rect)).is_some()
    }

    /// Replace the whole content of the index.
    pub fn load(&mut self, nodes: impl IntoIterator<Item = (NodeId, Rect)>) {
        self.entries = nodes.into_iter().collect();
        self.tree = RTree::bulk_load(
            self.entries
                .iter()
                .map(|(id, rect)| IndexedNode::new(*id, *rect))
                .collect(),
        );
    }

    /// Nodes whose bounds intersect `rect`, in id order.
    pub fn search(&self, rect: Rect) -> Vec<NodeId> {
        let mut found: Vec<NodeId> = self
            .tree
            .locate_in_envelope_intersecting(&envelope(rect))
            .map(|entry| entry.id)
            .collect();
        found.sort();
        found
    }

    /// Nodes within `radius` of a point.
    pub fn search_point(&self, point: Vec2, radius: f32) -> Vec<NodeId> {
        self.search(Rect::around(point, radius))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn rect(&self, id: NodeId) -> Option<Rect> {
        self.entries.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every indexed node, in id order.
    pub fn all(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.entries.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Reload from the graph's top-level nodes at the `current` level.
    pub fn rebuild(&mut self, graph: &Graph, current: Option<NodeId>) {
        let nodes = graph
            .top_level(current)
            .into_iter()
            .filter_map(|id| graph.node(id).map(|n| (id, n.rect())));
        self.load(nodes);
        tracing::debug!(level = ?current, count = self.len(), "spatial index rebuilt");
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Insert(u64, f32, f32),
        Remove(u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u64..12, -500.0f32..500.0, -500.0f32..500.0).prop_map(|(id, x, y)| Op::Insert(id, x, y)),
            (0u64..12).prop_map(Op::Remove),
        ]
    }

    proptest! {
        /// A query covering everything returns exactly the live entries,
        /// once each.
        #[test]
        fn prop_index_has_no_stale_entries(ops in proptest::collection::vec(op(), 0..60)) {
            let mut index = SpatialIndex::new();
            let mut expected = std::collections::BTreeSet::new();
            for op in ops {
                match op {
                    Op::Insert(id, x, y) => {
                        index.insert(NodeId(id), Rect::from_pos_size(Vec2::new(x, y), Vec2::new(20.0, 20.0)));
                        expected.insert(NodeId(id));
                    }
                    Op::Remove(id) => {
                        index.remove(NodeId(id));
                        expected.remove(&NodeId(id));
                    }
                }
            }
            let everything = Rect::from_min_max(Vec2::new(-1e4, -1e4), Vec2::new(1e4, 1e4));
            let found = index.search(everything);
            prop_assert_eq!(found, expected.into_iter().collect::<Vec<_>>());
        }
    }
}
