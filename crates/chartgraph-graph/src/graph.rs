use crate::error::GraphError;
use crate::model::{ConnectionState, Edge, EdgeConnection, Multipart, Node};
use crate::resolver::ResolveSettings;
use chartgraph_core::{ConnectionId, EdgeId, IdAllocator, NodeId, NodeKind, Vec2};
use std::collections::{BTreeMap, BTreeSet};

/// Arena owning every node, edge and edge connection of a diagram.
///
/// Cross references (parent, children, bridges, edge back-references) are
/// stored as ids. All structural edits go through methods on this type so
/// both directions of every link stay in sync.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    ids: IdAllocator,
    nodes: BTreeMap<NodeId, Node>,
    edges: BTreeMap<EdgeId, Edge>,
    connections: BTreeMap<ConnectionId, EdgeConnection>,
    pub settings: ResolveSettings,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: ResolveSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    pub fn ids_mut(&mut self) -> &mut IdAllocator {
        &mut self.ids
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn require_node(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.nodes.get(&id).ok_or(GraphError::UnknownNode(id))
    }

    pub(crate) fn require_node_mut(&mut self, id: NodeId) -> Result<&mut Node, GraphError> {
        self.nodes.get_mut(&id).ok_or(GraphError::UnknownNode(id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> Option<&mut Edge> {
        self.edges.get_mut(&id)
    }

    pub fn require_edge(&self, id: EdgeId) -> Result<&Edge, GraphError> {
        self.edges.get(&id).ok_or(GraphError::UnknownEdge(id))
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn edge_ids(&self) -> Vec<EdgeId> {
        self.edges.keys().copied().collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&EdgeConnection> {
        self.connections.get(&id)
    }

    pub fn require_connection(&self, id: ConnectionId) -> Result<&EdgeConnection, GraphError> {
        self.connections
            .get(&id)
            .ok_or(GraphError::UnknownConnection(id))
    }

    pub(crate) fn require_connection_mut(
        &mut self,
        id: ConnectionId,
    ) -> Result<&mut EdgeConnection, GraphError> {
        self.connections
            .get_mut(&id)
            .ok_or(GraphError::UnknownConnection(id))
    }

    pub fn connections(&self) -> impl Iterator<Item = &EdgeConnection> {
        self.connections.values()
    }

    pub(crate) fn id_in_use(&self, raw: u64) -> bool {
        self.nodes.contains_key(&NodeId(raw))
            || self.edges.contains_key(&EdgeId(raw))
            || self.connections.contains_key(&ConnectionId(raw))
    }

    fn claim(&mut self, raw: u64) -> Result<(), GraphError> {
        if self.id_in_use(raw) {
            return Err(GraphError::DuplicateId(raw));
        }
        self.ids.bump_past(raw);
        Ok(())
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    pub fn add_node(&mut self, kind: NodeKind, position: Vec2, size: Vec2) -> NodeId {
        let id = self.ids.next_node();
        self.nodes.insert(id, Node::new(id, kind, position, size));
        id
    }

    /// Insert a node under a caller-chosen id, as done when restoring.
    pub fn insert_node(&mut self, mut node: Node) -> Result<NodeId, GraphError> {
        self.claim(node.id.0)?;
        node.parent = None;
        node.children.clear();
        node.edges.clear();
        let id = node.id;
        self.nodes.insert(id, node);
        Ok(id)
    }

    /// Link `child` under `parent` (or detach it with `None`). Returns the
    /// previous parent.
    pub fn set_parent(
        &mut self,
        child: NodeId,
        parent: Option<NodeId>,
    ) -> Result<Option<NodeId>, GraphError> {
        let previous = self.require_node(child)?.parent;
        if previous == parent {
            return Ok(previous);
        }
        if let Some(parent) = parent {
            self.require_node(parent)?;
            if parent == child || self.is_descendant_of(parent, child) {
                return Err(GraphError::ParentCycle { child, parent });
            }
        }

        if let Some(old) = previous
            && let Some(old) = self.nodes.get_mut(&old)
        {
            old.children.retain(|c| *c != child);
        }
        if let Some(parent) = parent {
            self.require_node_mut(parent)?.children.push(child);
        }
        self.require_node_mut(child)?.parent = parent;
        Ok(previous)
    }

    /// Remove a node and unlink it from its parent and children. Edge
    /// connections still pinned to the node lose their node and fall back
    /// to the origin until reattached.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node, GraphError> {
        self.set_parent(id, None)?;
        let node = self.nodes.remove(&id).ok_or(GraphError::UnknownNode(id))?;
        for child in &node.children {
            if let Some(child) = self.nodes.get_mut(child) {
                child.parent = None;
            }
        }
        for conn in &node.edges {
            if let Some(conn) = self.connections.get_mut(conn) {
                tracing::debug!(connection = %conn.id, node = %id, "connection lost its node");
                conn.node = None;
            }
        }
        Ok(node)
    }

    pub fn is_descendant_of(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut cursor = self.nodes.get(&node).and_then(|n| n.parent);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.nodes.get(&current).and_then(|n| n.parent);
        }
        false
    }

    /// Every node below `id`, depth first, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self
            .nodes
            .get(&id)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(node) = self.nodes.get(&current) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.nodes.get(&id).and_then(|n| n.parent);
        while let Some(current) = cursor {
            out.push(current);
            cursor = self.nodes.get(&current).and_then(|n| n.parent);
        }
        out
    }

    /// Nodes that are top-level at the given sub-chart level.
    pub fn top_level(&self, current: Option<NodeId>) -> Vec<NodeId> {
        match current {
            None => self
                .nodes
                .values()
                .filter(|n| n.parent.is_none())
                .map(|n| n.id)
                .collect(),
            Some(current) => self
                .nodes
                .get(&current)
                .map(|n| n.children.clone())
                .unwrap_or_default(),
        }
    }

    /// Edges with at least one endpoint pinned to `node`.
    pub fn edges_of_node(&self, node: NodeId) -> Vec<EdgeId> {
        let Some(node) = self.nodes.get(&node) else {
            return Vec::new();
        };
        let set: BTreeSet<EdgeId> = node
            .edges
            .iter()
            .filter_map(|c| self.connections.get(c).and_then(|c| c.edge))
            .collect();
        set.into_iter().collect()
    }

    // ========================================================================
    // Connections
    // ========================================================================

    pub fn add_connection(&mut self, state: ConnectionState) -> Result<ConnectionId, GraphError> {
        if let Some(node) = state.node {
            self.require_node(node)?;
        }
        let id = self.ids.next_connection();
        self.attach_connection(EdgeConnection::from_state(id, state));
        Ok(id)
    }

    pub fn insert_connection(
        &mut self,
        id: ConnectionId,
        state: ConnectionState,
    ) -> Result<ConnectionId, GraphError> {
        if let Some(node) = state.node {
            self.require_node(node)?;
        }
        self.claim(id.0)?;
        self.attach_connection(EdgeConnection::from_state(id, state));
        Ok(id)
    }

    fn attach_connection(&mut self, conn: EdgeConnection) {
        if let Some(node) = conn.node
            && let Some(node) = self.nodes.get_mut(&node)
        {
            node.edges.push(conn.id);
        }
        self.connections.insert(conn.id, conn);
    }

    /// Replace the user-settable state of a connection, moving its
    /// registration to the new node if needed. Returns the previous state.
    pub fn set_connection_state(
        &mut self,
        id: ConnectionId,
        state: ConnectionState,
    ) -> Result<ConnectionState, GraphError> {
        if let Some(node) = state.node {
            self.require_node(node)?;
        }
        let previous = self.require_connection(id)?.state();
        if previous.node != state.node {
            if let Some(old) = previous.node {
                self.remove_connection_from_node(old, id)?;
            }
            if let Some(new) = state.node {
                self.require_node_mut(new)?.edges.push(id);
            }
        }
        let conn = self.require_connection_mut(id)?;
        conn.attach = state.attach;
        conn.node = state.node;
        conn.wall = state.wall;
        conn.position = state.position;
        conn.offset = state.offset;
        Ok(previous)
    }

    /// Unregister `connection` from `node`. Asking a node to drop a
    /// connection it does not own is a caller bug and reported as such.
    pub fn remove_connection_from_node(
        &mut self,
        node: NodeId,
        connection: ConnectionId,
    ) -> Result<(), GraphError> {
        let owner = self.require_node_mut(node)?;
        let Some(index) = owner.edges.iter().position(|c| *c == connection) else {
            return Err(GraphError::ConnectionNotOwned { node, connection });
        };
        owner.edges.remove(index);
        if let Some(conn) = self.connections.get_mut(&connection) {
            conn.node = None;
        }
        Ok(())
    }

    /// Delete a connection outright, unlinking node, bridge and edge
    /// back-references.
    pub(crate) fn remove_connection(
        &mut self,
        id: ConnectionId,
    ) -> Result<EdgeConnection, GraphError> {
        self.unbridge(id)?;
        if let Some(node) = self.require_connection(id)?.node {
            self.remove_connection_from_node(node, id)?;
        }
        let mut conn = self
            .connections
            .remove(&id)
            .ok_or(GraphError::UnknownConnection(id))?;
        conn.edge = None;
        Ok(conn)
    }

    /// Make `from` defer all geometry and identity reads to `to`.
    ///
    /// Bridges have length one: neither side may already take part in a
    /// bridge in the conflicting direction.
    pub fn bridge(&mut self, from: ConnectionId, to: ConnectionId) -> Result<(), GraphError> {
        let source = self.require_connection(from)?;
        let target = self.require_connection(to)?;
        if from == to || source.bridge_to.is_some() || source.bridge_from.is_some() {
            return Err(GraphError::BridgeChain(from));
        }
        if target.bridge_to.is_some() || target.bridge_from.is_some() {
            return Err(GraphError::BridgeChain(to));
        }
        self.require_connection_mut(from)?.bridge_to = Some(to);
        self.require_connection_mut(to)?.bridge_from = Some(from);
        Ok(())
    }

    /// Remove any bridge `id` takes part in, in either direction.
    pub fn unbridge(&mut self, id: ConnectionId) -> Result<(), GraphError> {
        let conn = self.require_connection_mut(id)?;
        let to = conn.bridge_to.take();
        let from = conn.bridge_from.take();
        if let Some(to) = to
            && let Some(other) = self.connections.get_mut(&to)
        {
            other.bridge_from = None;
        }
        if let Some(from) = from
            && let Some(other) = self.connections.get_mut(&from)
        {
            other.bridge_to = None;
        }
        Ok(())
    }

    /// The connection that actually owns the geometry of `id`.
    pub fn instance(&self, id: ConnectionId) -> ConnectionId {
        self.connections
            .get(&id)
            .and_then(|c| c.bridge_to)
            .unwrap_or(id)
    }

    /// The other endpoint of the edge `id` belongs to.
    pub fn opposite(&self, id: ConnectionId) -> Option<ConnectionId> {
        let edge = self.connections.get(&id)?.edge?;
        self.edges.get(&edge)?.opposite(id)
    }

    /// Whether `id` is the source of its edge, answered through the bridge.
    pub fn is_source(&self, id: ConnectionId) -> bool {
        let instance = self.instance(id);
        self.connections
            .get(&instance)
            .and_then(|c| c.edge)
            .and_then(|e| self.edges.get(&e))
            .is_some_and(|e| e.source == instance)
    }

    // ========================================================================
    // Edges
    // ========================================================================

    pub fn add_edge(
        &mut self,
        source: ConnectionState,
        target: ConnectionState,
    ) -> Result<EdgeId, GraphError> {
        for node in [source.node, target.node].into_iter().flatten() {
            self.require_node(node)?;
        }
        let id = self.ids.next_edge();
        let source = self.add_connection(source)?;
        let target = self.add_connection(target)?;
        self.link_edge(id, source, target, None, Vec::new())?;
        Ok(id)
    }

    /// Create an edge between two existing, unowned connections.
    pub(crate) fn link_edge(
        &mut self,
        id: EdgeId,
        source: ConnectionId,
        target: ConnectionId,
        multipart: Option<Multipart>,
        shape_points: Vec<Vec2>,
    ) -> Result<(), GraphError> {
        self.require_connection_mut(source)?.edge = Some(id);
        self.require_connection_mut(target)?.edge = Some(id);
        self.edges.insert(
            id,
            Edge {
                id,
                source,
                target,
                multipart,
                shape_points,
                center_point: None,
                offsetted_start_point: None,
            },
        );
        Ok(())
    }

    /// Recreate an edge with caller-chosen ids for the edge and both
    /// endpoints.
    pub fn insert_edge(
        &mut self,
        id: EdgeId,
        source: (ConnectionId, ConnectionState),
        target: (ConnectionId, ConnectionState),
        multipart: Option<Multipart>,
        shape_points: Vec<Vec2>,
    ) -> Result<EdgeId, GraphError> {
        for node in [source.1.node, target.1.node].into_iter().flatten() {
            self.require_node(node)?;
        }
        for raw in [id.0, source.0.0, target.0.0] {
            if self.id_in_use(raw) {
                return Err(GraphError::DuplicateId(raw));
            }
        }
        self.ids.bump_past(id.0);
        self.insert_connection(source.0, source.1)?;
        self.insert_connection(target.0, target.1)?;
        self.link_edge(id, source.0, target.0, multipart, shape_points)?;
        Ok(id)
    }

    /// Delete an edge together with its two connections.
    pub fn remove_edge(&mut self, id: EdgeId) -> Result<Edge, GraphError> {
        let edge = self.remove_edge_record(id)?;
        for conn in [edge.source, edge.target] {
            if self.connections.contains_key(&conn) {
                self.remove_connection(conn)?;
            }
        }
        Ok(edge)
    }

    pub(crate) fn remove_edge_record(&mut self, id: EdgeId) -> Result<Edge, GraphError> {
        self.edges.remove(&id).ok_or(GraphError::UnknownEdge(id))
    }

    /// Swap one endpoint of an edge for another existing connection. The
    /// old connection is left in the arena, no longer owned by the edge.
    pub(crate) fn replace_endpoint(
        &mut self,
        edge: EdgeId,
        old: ConnectionId,
        new: ConnectionId,
    ) -> Result<(), GraphError> {
        let slot = self.edges.get_mut(&edge).ok_or(GraphError::UnknownEdge(edge))?;
        if slot.source == old {
            slot.source = new;
        } else if slot.target == old {
            slot.target = new;
        } else {
            return Err(GraphError::UnknownConnection(old));
        }
        self.require_connection_mut(old)?.edge = None;
        self.require_connection_mut(new)?.edge = Some(edge);
        Ok(())
    }

    pub fn set_shape_points(&mut self, edge: EdgeId, points: Vec<Vec2>) -> Result<Vec<Vec2>, GraphError> {
        let slot = self.edges.get_mut(&edge).ok_or(GraphError::UnknownEdge(edge))?;
        Ok(std::mem::replace(&mut slot.shape_points, points))
    }

    // ========================================================================
    // Consistency
    // ========================================================================

    /// Every broken structural link, described. Empty when the graph is
    /// consistent.
    pub fn check_invariants(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for node in self.nodes.values() {
            for child in &node.children {
                match self.nodes.get(child) {
                    Some(c) if c.parent == Some(node.id) => {}
                    _ => problems.push(format!("node {} lists child {child} without back-link", node.id)),
                }
            }
            if let Some(parent) = node.parent {
                let listed = self
                    .nodes
                    .get(&parent)
                    .is_some_and(|p| p.children.contains(&node.id));
                if !listed {
                    problems.push(format!("node {} not listed by parent {parent}", node.id));
                }
            }
            for conn in &node.edges {
                if self.connections.get(conn).and_then(|c| c.node) != Some(node.id) {
                    problems.push(format!("node {} lists foreign connection {conn}", node.id));
                }
            }
        }
        for conn in self.connections.values() {
            if let Some(node) = conn.node
                && !self.nodes.get(&node).is_some_and(|n| n.edges.contains(&conn.id))
            {
                problems.push(format!("connection {} not registered on node {node}", conn.id));
            }
            if let Some(to) = conn.bridge_to {
                match self.connections.get(&to) {
                    Some(other) if other.bridge_from == Some(conn.id) && other.bridge_to.is_none() => {}
                    _ => problems.push(format!("connection {} has a broken bridge to {to}", conn.id)),
                }
            }
            if let Some(edge) = conn.edge
                && !self
                    .edges
                    .get(&edge)
                    .is_some_and(|e| e.source == conn.id || e.target == conn.id)
            {
                problems.push(format!("connection {} points at edge {edge} that does not own it", conn.id));
            }
        }
        for edge in self.edges.values() {
            for conn in [edge.source, edge.target] {
                if self.connections.get(&conn).and_then(|c| c.edge) != Some(edge.id) {
                    problems.push(format!("edge {} endpoint {conn} is missing its back-link", edge.id));
                }
            }
        }
        problems
    }
}
