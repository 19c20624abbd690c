//! Reference-resolved copies of the live graph.
//!
//! A snapshot names every node, edge and connection by its numeric id and
//! expresses parent and bridge links as ids, so it can be serialized and
//! crafted back into a graph, either under the same ids or under fresh ones.

use crate::error::GraphError;
use crate::graph::Graph;
use crate::model::{AttachType, ConnectionState, Multipart, Node, NodeGeometry};
use chartgraph_core::{ConnectionId, EdgeId, NodeId, NodeKind, Vec2, Wall};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub kind: NodeKind,
    pub position: Vec2,
    pub size: Vec2,
    #[serde(default)]
    pub circular: bool,
    #[serde(default)]
    pub parent: Option<NodeId>,
    #[serde(default)]
    pub is_open: bool,
    #[serde(default)]
    pub normal_state: Option<NodeGeometry>,
    #[serde(default)]
    pub open_state: Option<NodeGeometry>,
    #[serde(default = "default_true")]
    pub show_content: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub id: ConnectionId,
    pub attach: AttachType,
    #[serde(default)]
    pub node: Option<NodeId>,
    pub wall: Wall,
    #[serde(default)]
    pub position: Vec2,
    #[serde(default)]
    pub offset: Option<Vec2>,
    #[serde(default)]
    pub bridge_to: Option<ConnectionId>,
    #[serde(default)]
    pub bridge_from: Option<ConnectionId>,
}

impl ConnectionRecord {
    pub fn state(&self) -> ConnectionState {
        ConnectionState {
            attach: self.attach,
            node: self.node,
            wall: self.wall,
            position: self.position,
            offset: self.offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: EdgeId,
    pub source: ConnectionRecord,
    pub target: ConnectionRecord,
    #[serde(default)]
    pub multipart: Option<Multipart>,
    #[serde(default)]
    pub shape_points: Vec<Vec2>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Id allocator position at the time of the copy.
    pub next_id: u64,
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

impl GraphSnapshot {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// How crafted components are identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdMode {
    /// Keep the ids recorded in the snapshot.
    Preserve,
    /// Allocate new ids, as done when pasting.
    Fresh,
}

/// What a craft actually produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CraftReport {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
    /// Snapshot ids of edges dropped because an endpoint node was missing.
    pub skipped_edges: Vec<EdgeId>,
    /// Snapshot ids of nodes whose recorded parent was missing.
    pub orphaned_parents: Vec<NodeId>,
}

impl CraftReport {
    pub fn is_complete(&self) -> bool {
        self.skipped_edges.is_empty() && self.orphaned_parents.is_empty()
    }
}

impl Graph {
    pub fn node_record(&self, id: NodeId) -> Result<NodeRecord, GraphError> {
        let node = self.require_node(id)?;
        Ok(NodeRecord {
            id: node.id,
            kind: node.kind.clone(),
            position: node.position,
            size: node.size,
            circular: node.circular,
            parent: node.parent(),
            is_open: node.is_open,
            normal_state: node.normal_state,
            open_state: node.open_state,
            show_content: node.show_content,
        })
    }

    pub fn connection_record(&self, id: ConnectionId) -> Result<ConnectionRecord, GraphError> {
        let conn = self.require_connection(id)?;
        Ok(ConnectionRecord {
            id: conn.id,
            attach: conn.attach,
            node: conn.node(),
            wall: conn.wall,
            position: conn.position,
            offset: conn.offset,
            bridge_to: conn.bridge_to(),
            bridge_from: conn.bridge_from(),
        })
    }

    pub fn edge_record(&self, id: EdgeId) -> Result<EdgeRecord, GraphError> {
        let edge = self.require_edge(id)?;
        Ok(EdgeRecord {
            id: edge.id,
            source: self.connection_record(edge.source())?,
            target: self.connection_record(edge.target())?,
            multipart: edge.multipart,
            shape_points: edge.shape_points.clone(),
        })
    }

    /// Put a previously recorded node back under its recorded id and parent.
    pub fn restore_node(&mut self, record: &NodeRecord) -> Result<NodeId, GraphError> {
        let id = self.insert_node(node_from_record(record, record.id, Vec2::ZERO))?;
        if let Some(parent) = record.parent {
            if self.node(parent).is_some() {
                self.set_parent(id, Some(parent))?;
            } else {
                tracing::warn!(node = %id, parent = %parent, "restored node's parent is missing");
            }
        }
        Ok(id)
    }

    /// Put a previously recorded edge back, relinking any bridge whose other
    /// side still exists.
    pub fn restore_edge(&mut self, record: &EdgeRecord) -> Result<EdgeId, GraphError> {
        let id = self.insert_edge(
            record.id,
            (record.source.id, record.source.state()),
            (record.target.id, record.target.state()),
            record.multipart,
            record.shape_points.clone(),
        )?;
        for conn in [&record.source, &record.target] {
            if let Some(to) = conn.bridge_to
                && self.connection(to).is_some()
            {
                self.bridge(conn.id, to)?;
            }
            if let Some(from) = conn.bridge_from
                && self.connection(from).is_some()
            {
                self.bridge(from, conn.id)?;
            }
        }
        Ok(id)
    }

    /// Copy of the whole graph. Nodes are listed parents first, in child
    /// order, so crafting reproduces the hierarchy exactly.
    pub fn copy_graph(&self) -> GraphSnapshot {
        let mut order = Vec::new();
        for root in self.top_level(None) {
            order.push(root);
            order.extend(self.descendants(root));
        }
        let nodes = order
            .into_iter()
            .filter_map(|id| self.node_record(id).ok())
            .collect();
        let edges = self
            .edges()
            .filter_map(|e| self.edge_record(e.id).ok())
            .collect();
        GraphSnapshot {
            next_id: self.ids().peek(),
            nodes,
            edges,
        }
    }

    /// Copy of `roots`, everything below them and the edges running between
    /// copied nodes. Links that leave the copied set are dropped.
    pub fn copy_nodes(&self, roots: &[NodeId]) -> GraphSnapshot {
        let mut order: Vec<NodeId> = Vec::new();
        for root in roots {
            if self.node(*root).is_none() || order.contains(root) {
                continue;
            }
            // A root already copied as a descendant of another root is skipped.
            if roots.iter().any(|r| r != root && self.is_descendant_of(*root, *r)) {
                continue;
            }
            order.push(*root);
            order.extend(self.descendants(*root));
        }
        let set: BTreeSet<NodeId> = order.iter().copied().collect();

        let nodes = order
            .iter()
            .filter_map(|id| self.node_record(*id).ok())
            .map(|mut record| {
                if record.parent.is_some_and(|p| !set.contains(&p)) {
                    record.parent = None;
                }
                record
            })
            .collect();

        let mut edges: Vec<EdgeRecord> = self
            .edges()
            .filter(|edge| {
                let ends: Vec<Option<NodeId>> = [edge.source(), edge.target()]
                    .iter()
                    .map(|c| self.connection(*c).and_then(|c| c.node()))
                    .collect();
                ends.iter().any(|n| n.is_some())
                    && ends.iter().flatten().all(|n| set.contains(n))
            })
            .filter_map(|edge| self.edge_record(edge.id).ok())
            .collect();

        let copied: BTreeSet<ConnectionId> = edges
            .iter()
            .flat_map(|e| [e.source.id, e.target.id])
            .collect();
        for edge in &mut edges {
            let mut broken = false;
            for conn in [&mut edge.source, &mut edge.target] {
                if conn.bridge_to.is_some_and(|c| !copied.contains(&c)) {
                    conn.bridge_to = None;
                    broken = true;
                }
                if conn.bridge_from.is_some_and(|c| !copied.contains(&c)) {
                    conn.bridge_from = None;
                }
            }
            if broken {
                edge.multipart = None;
            }
        }

        GraphSnapshot {
            next_id: self.ids().peek(),
            nodes,
            edges,
        }
    }

    /// Build the snapshot's components into this graph.
    ///
    /// `offset` moves every crafted position; snapshot nodes without a
    /// parent inside the snapshot are placed under `parent`. Edges whose
    /// endpoint node cannot be resolved are skipped and reported.
    pub fn craft(
        &mut self,
        snapshot: &GraphSnapshot,
        mode: IdMode,
        offset: Vec2,
        parent: Option<NodeId>,
    ) -> Result<CraftReport, GraphError> {
        if let Some(parent) = parent {
            self.require_node(parent)?;
        }
        let mut report = CraftReport::default();
        let mut node_map: HashMap<NodeId, NodeId> = HashMap::new();

        for record in &snapshot.nodes {
            let id = match mode {
                IdMode::Preserve => record.id,
                IdMode::Fresh => self.ids_mut().next_node(),
            };
            self.insert_node(node_from_record(record, id, offset))?;
            node_map.insert(record.id, id);
            report.nodes.push(id);
        }

        for record in &snapshot.nodes {
            let id = node_map[&record.id];
            let target = match record.parent {
                Some(p) => match node_map.get(&p) {
                    Some(mapped) => Some(*mapped),
                    None => {
                        tracing::warn!(node = %record.id, parent = %p, "snapshot parent missing");
                        report.orphaned_parents.push(record.id);
                        parent
                    }
                },
                None => parent,
            };
            if target.is_some() {
                self.set_parent(id, target)?;
            }
        }

        let mut conn_map: HashMap<ConnectionId, ConnectionId> = HashMap::new();
        for record in &snapshot.edges {
            let resolved = [&record.source, &record.target].map(|conn| match conn.node {
                Some(n) => node_map.get(&n).copied().map(Some),
                None => Some(None),
            });
            let [Some(source_node), Some(target_node)] = resolved else {
                tracing::warn!(edge = %record.id, "skipping edge with a missing endpoint node");
                report.skipped_edges.push(record.id);
                continue;
            };

            let (edge_id, source_id, target_id) = match mode {
                IdMode::Preserve => (record.id, record.source.id, record.target.id),
                IdMode::Fresh => (
                    self.ids_mut().next_edge(),
                    self.ids_mut().next_connection(),
                    self.ids_mut().next_connection(),
                ),
            };
            let place = |conn: &ConnectionRecord, node: Option<NodeId>| {
                let mut state = conn.state();
                state.node = node;
                if conn.attach == AttachType::Position {
                    state.position += offset;
                }
                state
            };
            self.insert_edge(
                edge_id,
                (source_id, place(&record.source, source_node)),
                (target_id, place(&record.target, target_node)),
                record.multipart,
                record.shape_points.iter().map(|p| *p + offset).collect(),
            )?;
            conn_map.insert(record.source.id, source_id);
            conn_map.insert(record.target.id, target_id);
            report.edges.push(edge_id);
        }

        for record in &snapshot.edges {
            for conn in [&record.source, &record.target] {
                let Some(to) = conn.bridge_to else {
                    continue;
                };
                match (conn_map.get(&conn.id), conn_map.get(&to)) {
                    (Some(from), Some(to)) => self.bridge(*from, *to)?,
                    _ => tracing::warn!(connection = %conn.id, "dropping bridge to a missing connection"),
                }
            }
        }

        tracing::debug!(
            nodes = report.nodes.len(),
            edges = report.edges.len(),
            skipped = report.skipped_edges.len(),
            "snapshot crafted"
        );
        Ok(report)
    }

    /// A new graph holding exactly the snapshot, with the id allocator
    /// continuing from the snapshot's recorded position.
    pub fn from_snapshot(snapshot: &GraphSnapshot) -> Result<(Graph, CraftReport), GraphError> {
        let mut graph = Graph::new();
        let report = graph.craft(snapshot, IdMode::Preserve, Vec2::ZERO, None)?;
        let next = snapshot.next_id.max(graph.ids().peek());
        graph.ids_mut().reset_to(next);
        Ok((graph, report))
    }
}

fn node_from_record(record: &NodeRecord, id: NodeId, offset: Vec2) -> Node {
    let shift = |g: NodeGeometry| NodeGeometry::new(g.position + offset, g.size);
    let mut node = Node::new(id, record.kind.clone(), record.position + offset, record.size);
    node.circular = record.circular || node.circular;
    node.is_open = record.is_open;
    node.normal_state = record.normal_state.map(shift);
    node.open_state = record.open_state.map(shift);
    node.show_content = record.show_content;
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutator::IdPlan;

    fn kind(name: &str) -> NodeKind {
        NodeKind::State { name: name.into() }
    }

    fn sample() -> (Graph, NodeId, NodeId, NodeId) {
        let mut graph = Graph::new();
        let p = graph.add_node(kind("p"), Vec2::ZERO, Vec2::new(300.0, 200.0));
        let c = graph.add_node(kind("c"), Vec2::new(20.0, 20.0), Vec2::new(80.0, 40.0));
        let e = graph.add_node(kind("e"), Vec2::new(600.0, 50.0), Vec2::new(80.0, 40.0));
        graph.set_parent(c, Some(p)).unwrap();
        graph
            .add_edge(ConnectionState::wall(c, Wall::Right), ConnectionState::wall(e, Wall::Left))
            .unwrap();
        graph.recalculate_all().unwrap();
        (graph, p, c, e)
    }

    #[test]
    fn test_copy_and_restore_whole_graph() {
        let (mut graph, p, _, _) = sample();
        graph.hide_content(p, &IdPlan::default()).unwrap();
        let snapshot = graph.copy_graph();

        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: GraphSnapshot = serde_json::from_str(&json).unwrap();
        let (rebuilt, report) = Graph::from_snapshot(&parsed).unwrap();

        assert!(report.is_complete());
        assert_eq!(rebuilt.copy_graph(), snapshot);
        assert_eq!(rebuilt.ids().peek(), graph.ids().peek());
        assert!(rebuilt.check_invariants().is_empty());
    }

    #[test]
    fn test_copy_nodes_keeps_internal_edges_only() {
        let (mut graph, p, c, _) = sample();
        let d = graph.add_node(kind("d"), Vec2::new(150.0, 20.0), Vec2::new(50.0, 40.0));
        graph.set_parent(d, Some(p)).unwrap();
        graph
            .add_edge(ConnectionState::wall(c, Wall::Bottom), ConnectionState::wall(d, Wall::Bottom))
            .unwrap();

        let snapshot = graph.copy_nodes(&[p, c]);
        assert_eq!(snapshot.nodes.len(), 3);
        assert_eq!(snapshot.nodes[0].id, p);
        assert_eq!(snapshot.edges.len(), 1);
    }

    #[test]
    fn test_fresh_craft_offsets_and_renumbers() {
        let (mut graph, p, _, _) = sample();
        let snapshot = graph.copy_nodes(&[p]);
        let before = graph.node_count();
        let report = graph
            .craft(&snapshot, IdMode::Fresh, Vec2::new(10.0, 10.0), None)
            .unwrap();

        assert_eq!(graph.node_count(), before + 2);
        assert!(!report.nodes.contains(&p));
        let pasted = graph.node(report.nodes[0]).unwrap();
        assert_eq!(pasted.position, Vec2::new(10.0, 10.0));
        assert_eq!(pasted.children(), &[report.nodes[1]]);
        assert!(graph.check_invariants().is_empty());
    }

    #[test]
    fn test_missing_endpoint_is_reported() {
        let (graph, _, c, _) = sample();
        let mut snapshot = graph.copy_graph();
        snapshot.nodes.retain(|n| n.id != c);

        let (rebuilt, report) = Graph::from_snapshot(&snapshot).unwrap();
        assert_eq!(report.skipped_edges.len(), 1);
        assert_eq!(report.edges.len(), snapshot.edges.len() - 1);
        assert_eq!(rebuilt.edge_count(), 0);
    }

    #[test]
    fn test_orphaned_parent_is_reported() {
        let (graph, p, c, _) = sample();
        let mut snapshot = graph.copy_graph();
        snapshot.nodes.retain(|n| n.id != p);
        let (rebuilt, report) = Graph::from_snapshot(&snapshot).unwrap();
        assert_eq!(report.orphaned_parents, vec![c]);
        assert_eq!(rebuilt.node(c).unwrap().parent(), None);
    }

    #[test]
    fn test_preserve_craft_rejects_taken_ids() {
        let (mut graph, _, _, _) = sample();
        let snapshot = graph.copy_graph();
        assert!(matches!(
            graph.craft(&snapshot, IdMode::Preserve, Vec2::ZERO, None),
            Err(GraphError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_edge_record_restores_bridge() {
        let (mut graph, p, _, _) = sample();
        let change = graph.hide_content(p, &IdPlan::default()).unwrap();
        let ids = change.plan.0.values().next().copied().unwrap();
        let record = graph.edge_record(ids.inner_edge).unwrap();

        graph.remove_edge(ids.inner_edge).unwrap();
        assert!(graph.connection(ids.outer).unwrap().bridge_from().is_none());

        graph.restore_edge(&record).unwrap();
        assert_eq!(graph.connection(ids.shadow).unwrap().bridge_to(), Some(ids.outer));
        assert!(graph.check_invariants().is_empty());
    }
}
