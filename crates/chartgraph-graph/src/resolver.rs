//! Edge endpoint coordinate resolution.
//!
//! A connection's absolute position is derived from its attach type, the
//! geometry of the node it is pinned to, the other endpoint of its edge and
//! the positions of sibling connections on the same wall.

use crate::error::GraphError;
use crate::graph::Graph;
use crate::model::AttachType;
use chartgraph_core::{ConnectionId, EdgeId, NodeId, Vec2};
use serde::{Deserialize, Serialize};

/// Tunables for coordinate resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolveSettings {
    /// Minimum distance between connections sharing a wall.
    pub spacing: f32,
    /// Distance from a circular node's center to where edges touch it.
    pub rim_offset: f32,
    /// How far the offsetted start point sits from the edge's source.
    pub start_offset: f32,
}

impl Default for ResolveSettings {
    fn default() -> Self {
        Self {
            spacing: 10.0,
            rim_offset: 7.5,
            start_offset: 12.0,
        }
    }
}

/// Slots closer than this to the unadjusted position are not applied.
const SPACING_TOLERANCE: f32 = 1.0;

impl Graph {
    /// Anchor point of a connection before offsets and spacing.
    pub fn origin(&self, id: ConnectionId) -> Vec2 {
        let id = self.instance(id);
        let Some(conn) = self.connection(id) else {
            return Vec2::ZERO;
        };
        if conn.attach == AttachType::Position {
            return conn.position;
        }
        let Some(node) = conn.node().and_then(|n| self.node(n)) else {
            tracing::debug!(connection = %id, "connection has no node, resolving to origin");
            return Vec2::ZERO;
        };
        match conn.attach {
            AttachType::Position => conn.position,
            AttachType::Node => node.position,
            AttachType::NodeBody if node.circular => node.center(),
            AttachType::NodeBody | AttachType::NodeWall => {
                node.position + conn.wall.midpoint_offset(node.size)
            }
        }
    }

    /// Last resolved coordinates of a connection, read through its bridge.
    /// With `skip_offset` the bare anchor origin is returned instead.
    pub fn coordinates(&self, id: ConnectionId, skip_offset: bool) -> Vec2 {
        if skip_offset {
            return self.origin(id);
        }
        let id = self.instance(id);
        self.connection(id)
            .and_then(|c| c.cached_coordinates())
            .unwrap_or_else(|| self.origin(id))
    }

    /// Resolve and cache the absolute position of a connection.
    pub fn calculate_coordinates(&mut self, id: ConnectionId) -> Result<Vec2, GraphError> {
        let conn = self.require_connection(id)?;
        if let Some(target) = conn.bridge_to() {
            let coords = self.calculate_coordinates(target)?;
            self.require_connection_mut(id)?.coordinates = Some(coords);
            return Ok(coords);
        }

        let attach = conn.attach;
        let wall = conn.wall;
        let offset = conn.offset;
        let previous = conn.cached_coordinates();
        let node = conn.node().and_then(|n| self.node(n)).cloned();
        let mut coords = self.origin(id);

        match &node {
            Some(node) if attach == AttachType::NodeBody && node.circular => {
                let other = self
                    .opposite(id)
                    .map(|o| self.coordinates(o, false))
                    .unwrap_or(coords);
                // Pushed away from the other endpoint.
                if other != coords {
                    let angle = (coords.y - other.y).atan2(coords.x - other.x);
                    coords += Vec2::from_polar(self.settings.rim_offset, angle);
                }
            }
            _ => {
                if let Some(offset) = offset {
                    coords += match &node {
                        Some(node) => {
                            let axis = wall.variable_axis();
                            let mut scaled =
                                offset.with_axis(axis, offset.axis(axis) * node.size.axis(axis) / 100.0);
                            if node.is_open && attach == AttachType::NodeBody {
                                let secondary = axis.other();
                                scaled = scaled.with_axis(secondary, -scaled.axis(secondary));
                            }
                            let half = node.size * 0.5;
                            Vec2::new(
                                scaled.x.clamp(-half.x, half.x),
                                scaled.y.clamp(-half.y, half.y),
                            )
                        }
                        None => offset,
                    };
                }
            }
        }

        if let Some(node) = &node
            && !node.circular
            && matches!(attach, AttachType::NodeWall | AttachType::NodeBody)
            && let Some(slot) = self.spaced_slot(id, node.id, coords, previous)
        {
            coords = coords.with_axis(wall.variable_axis(), slot);
        }

        self.require_connection_mut(id)?.coordinates = Some(coords);
        Ok(coords)
    }

    /// Nearest free position along the wall's variable axis, if the
    /// candidate collides with a sibling connection.
    fn spaced_slot(
        &self,
        id: ConnectionId,
        node: NodeId,
        candidate: Vec2,
        previous: Option<Vec2>,
    ) -> Option<f32> {
        let conn = self.connection(id)?;
        let node = self.node(node)?;
        let wall = conn.wall;
        let axis = wall.variable_axis();
        let spacing = self.settings.spacing;

        let occupied: Vec<f32> = node
            .connections()
            .iter()
            .filter(|other| **other != id)
            .filter_map(|other| self.connection(*other))
            .filter(|other| {
                other.wall == wall
                    && matches!(other.attach, AttachType::NodeWall | AttachType::NodeBody)
                    && !other.is_bridged()
            })
            .filter_map(|other| other.cached_coordinates())
            .map(|c| c.axis(axis))
            .collect();

        let value = candidate.axis(axis);
        let is_free = |v: f32| occupied.iter().all(|o| (o - v).abs() >= spacing - 1e-3);
        if is_free(value) {
            return None;
        }

        let min = node.position.axis(axis) + spacing;
        let max = node.position.axis(axis) + node.size.axis(axis) - spacing;
        let direction = match previous.map(|p| p.axis(axis)) {
            Some(p) if p < value => -1.0,
            _ => 1.0,
        };
        let search = |dir: f32| {
            let mut v = value + dir * spacing;
            while v >= min && v <= max {
                if is_free(v) {
                    return Some(v);
                }
                v += dir * spacing;
            }
            None
        };

        let slot = search(direction).or_else(|| search(-direction))?;
        ((slot - value).abs() > SPACING_TOLERANCE).then_some(slot)
    }

    /// Resolve both endpoints of an edge and refresh its polyline caches.
    pub fn recalculate_edge(&mut self, id: EdgeId) -> Result<(), GraphError> {
        let edge = self.require_edge(id)?;
        let (source, target) = (edge.source(), edge.target());
        let start = self.calculate_coordinates(source)?;
        let end = self.calculate_coordinates(target)?;
        let start_offset = self.settings.start_offset;

        let edge = self.edge_mut(id).ok_or(GraphError::UnknownEdge(id))?;
        let mut points = Vec::with_capacity(edge.shape_points.len() + 2);
        points.push(start);
        points.extend(edge.shape_points.iter().copied());
        points.push(end);

        edge.center_point = Some(polyline_midpoint(&points));
        let next = points.get(1).copied().unwrap_or(end);
        edge.offsetted_start_point =
            Some(start + (next - start).normalized() * start_offset);
        Ok(())
    }

    /// Recalculate every edge touching `node` or any of its descendants.
    pub fn recalculate_node(&mut self, node: NodeId) -> Result<(), GraphError> {
        let mut nodes = vec![node];
        nodes.extend(self.descendants(node));
        let mut edges: Vec<EdgeId> = nodes.iter().flat_map(|n| self.edges_of_node(*n)).collect();
        edges.sort();
        edges.dedup();
        for edge in edges {
            self.recalculate_edge(edge)?;
        }
        Ok(())
    }

    pub fn recalculate_all(&mut self) -> Result<(), GraphError> {
        for edge in self.edge_ids() {
            self.recalculate_edge(edge)?;
        }
        Ok(())
    }
}

/// Point at half the total length of a polyline.
pub fn polyline_midpoint(points: &[Vec2]) -> Vec2 {
    let Some(first) = points.first() else {
        return Vec2::ZERO;
    };
    let total: f32 = points.windows(2).map(|w| w[0].distance(w[1])).sum();
    let mut remaining = total / 2.0;
    for w in points.windows(2) {
        let len = w[0].distance(w[1]);
        if len >= remaining && len > 0.0 {
            return w[0] + (w[1] - w[0]) * (remaining / len);
        }
        remaining -= len;
    }
    *points.last().unwrap_or(first)
}
