//! Splitting and merging of edges that cross a sub-chart boundary.
//!
//! Hiding a node's content splits every edge leaving its subtree into an
//! Outer half (outside world to the boundary node) and an Inner half
//! (boundary node to the original inside endpoint). The two halves are
//! stitched together by a bridge from the inner shadow connection to the
//! outer connection. Showing the content merges them back.

use crate::error::GraphError;
use crate::graph::Graph;
use crate::model::{ConnectionState, Multipart, MultipartLocation, MultipartType};
use chartgraph_core::{ConnectionId, EdgeId, NodeId, Vec2, Wall};
use chartgraph_events::Event;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Ids used to split one crossing edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitIds {
    /// Boundary connection that replaced the inside endpoint on the original edge.
    pub outer: ConnectionId,
    /// Boundary connection of the inner edge, bridged to `outer`.
    pub shadow: ConnectionId,
    pub inner_edge: EdgeId,
}

/// Split ids keyed by the inside connection they were created for. Replaying
/// a split with the plan of an earlier one recreates the same ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdPlan(pub BTreeMap<ConnectionId, SplitIds>);

impl IdPlan {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, inside: ConnectionId) -> Option<SplitIds> {
        self.0.get(&inside).copied()
    }
}

/// Outcome of a content visibility change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentChange {
    pub events: Vec<Event>,
    pub plan: IdPlan,
    /// Edges whose endpoints moved and need recalculation.
    pub touched_edges: Vec<EdgeId>,
}

impl Graph {
    /// Show or hide a node's content, splitting or merging crossing edges.
    pub fn set_content_visible(
        &mut self,
        node: NodeId,
        visible: bool,
        plan: &IdPlan,
    ) -> Result<ContentChange, GraphError> {
        if visible {
            self.show_content(node)
        } else {
            self.hide_content(node, plan)
        }
    }

    /// Close `node` as a sub-chart.
    pub fn hide_content(&mut self, node: NodeId, plan: &IdPlan) -> Result<ContentChange, GraphError> {
        let boundary = self.require_node(node)?;
        let mut change = ContentChange::default();
        if !boundary.show_content {
            return Ok(change);
        }
        self.require_node_mut(node)?.show_content = false;
        change.events.push(Event::NodeContentToggled {
            node,
            visible: false,
        });

        for (inside, edge) in self.foreign_connections(node) {
            let ids = plan
                .get(inside)
                .filter(|ids| self.split_ids_free(ids))
                .unwrap_or_else(|| SplitIds {
                    outer: self.ids_mut().next_connection(),
                    shadow: self.ids_mut().next_connection(),
                    inner_edge: self.ids_mut().next_edge(),
                });
            self.split_edge(node, edge, inside, ids)?;
            change.plan.0.insert(inside, ids);
            change.events.push(Event::EdgeConnectionsChanged { edge });
            change.events.push(Event::EdgeAdded {
                edge: ids.inner_edge,
            });
            change.touched_edges.extend([edge, ids.inner_edge]);
        }

        tracing::debug!(node = %node, split = change.plan.0.len(), "content hidden");
        Ok(change)
    }

    /// Open `node` as a sub-chart again.
    pub fn show_content(&mut self, node: NodeId) -> Result<ContentChange, GraphError> {
        let boundary = self.require_node(node)?;
        let mut change = ContentChange::default();
        if boundary.show_content {
            return Ok(change);
        }

        let shadows: Vec<ConnectionId> = boundary
            .connections()
            .iter()
            .copied()
            .filter(|c| self.connection(*c).is_some_and(|c| c.is_bridged()))
            .collect();

        for shadow in shadows {
            if let Some((inside, ids, outer_edge)) = self.merge_edge(shadow)? {
                change.plan.0.insert(inside, ids);
                change.events.push(Event::EdgeDeleted {
                    edge: ids.inner_edge,
                });
                change.events.push(Event::EdgeConnectionsChanged { edge: outer_edge });
                change.touched_edges.push(outer_edge);
            }
        }

        self.require_node_mut(node)?.show_content = true;
        change.events.push(Event::NodeContentToggled {
            node,
            visible: true,
        });
        tracing::debug!(node = %node, merged = change.plan.0.len(), "content shown");
        Ok(change)
    }

    /// Connections inside the subtree of `node` whose edge leads outside it,
    /// paired with that edge.
    fn foreign_connections(&self, node: NodeId) -> Vec<(ConnectionId, EdgeId)> {
        let inside: BTreeSet<NodeId> = self.descendants(node).into_iter().collect();
        let mut found = Vec::new();
        for member in &inside {
            let Some(member) = self.node(*member) else {
                continue;
            };
            for conn in member.connections() {
                let Some(edge) = self.connection(*conn).and_then(|c| c.edge()) else {
                    continue;
                };
                let far = self
                    .opposite(*conn)
                    .and_then(|o| self.connection(o))
                    .and_then(|o| o.node());
                if let Some(far) = far
                    && far != node
                    && !inside.contains(&far)
                {
                    found.push((*conn, edge));
                }
            }
        }
        found
    }

    fn split_ids_free(&self, ids: &SplitIds) -> bool {
        [ids.outer.0, ids.shadow.0, ids.inner_edge.0]
            .iter()
            .all(|raw| !self.id_in_use(*raw))
    }

    fn split_edge(
        &mut self,
        boundary: NodeId,
        edge: EdgeId,
        inside: ConnectionId,
        ids: SplitIds,
    ) -> Result<(), GraphError> {
        let outside = self
            .require_edge(edge)?
            .opposite(inside)
            .ok_or(GraphError::UnknownConnection(inside))?;
        let inside_was_source = self.require_edge(edge)?.source() == inside;
        let wall = self.wall_facing(boundary, self.coordinates(outside, false))?;

        self.insert_connection(ids.outer, ConnectionState::body(boundary, wall))?;
        self.replace_endpoint(edge, inside, ids.outer)?;

        // The boundary half sits where the inside endpoint used to be, so
        // the outer half starts on the boundary when the inside was source.
        let outer_kind = if inside_was_source {
            MultipartType::Starting
        } else {
            MultipartType::Ending
        };
        let slot = self.edge_mut(edge).ok_or(GraphError::UnknownEdge(edge))?;
        if !matches!(
            slot.multipart,
            Some(Multipart {
                location: MultipartLocation::Inner,
                ..
            })
        ) {
            slot.multipart = Some(Multipart {
                location: MultipartLocation::Outer,
                kind: outer_kind,
            });
        }

        self.insert_connection(ids.shadow, ConnectionState::body(boundary, wall))?;
        let (source, target) = if inside_was_source {
            (inside, ids.shadow)
        } else {
            (ids.shadow, inside)
        };
        self.ids_mut().bump_past(ids.inner_edge.0);
        self.link_edge(
            ids.inner_edge,
            source,
            target,
            Some(Multipart {
                location: MultipartLocation::Inner,
                kind: outer_kind.opposite(),
            }),
            Vec::new(),
        )?;
        self.bridge(ids.shadow, ids.outer)?;
        Ok(())
    }

    /// Undo the split the bridged `shadow` belongs to. Returns the inside
    /// connection, the ids that were dismantled and the surviving edge.
    fn merge_edge(
        &mut self,
        shadow: ConnectionId,
    ) -> Result<Option<(ConnectionId, SplitIds, EdgeId)>, GraphError> {
        let conn = self.require_connection(shadow)?;
        let (Some(outer), Some(inner_edge)) = (conn.bridge_to(), conn.edge()) else {
            return Ok(None);
        };
        let Some(outer_edge) = self.require_connection(outer)?.edge() else {
            tracing::warn!(connection = %outer, "bridge target has no edge, skipping merge");
            return Ok(None);
        };
        let inside = self
            .require_edge(inner_edge)?
            .opposite(shadow)
            .ok_or(GraphError::UnknownConnection(shadow))?;

        self.detach_edge(inner_edge)?;
        self.replace_endpoint(outer_edge, outer, inside)?;
        self.remove_connection(shadow)?;
        self.remove_connection(outer)?;

        // The surviving edge may still cross a deeper closed boundary, in
        // which case the inside endpoint is that boundary's outer connection.
        let inside_is_source = self.require_edge(outer_edge)?.source() == inside;
        let deeper = self.require_connection(inside)?.bridge_from().is_some();
        let slot = self
            .edge_mut(outer_edge)
            .ok_or(GraphError::UnknownEdge(outer_edge))?;
        match slot.multipart {
            Some(Multipart {
                location: MultipartLocation::Inner,
                ..
            }) => {}
            _ if deeper => {
                slot.multipart = Some(Multipart {
                    location: MultipartLocation::Outer,
                    kind: if inside_is_source {
                        MultipartType::Starting
                    } else {
                        MultipartType::Ending
                    },
                });
            }
            _ => slot.multipart = None,
        }

        Ok(Some((
            inside,
            SplitIds {
                outer,
                shadow,
                inner_edge,
            },
            outer_edge,
        )))
    }

    /// Drop an edge record but keep its connections in the arena.
    fn detach_edge(&mut self, id: EdgeId) -> Result<(), GraphError> {
        let edge = self.remove_edge_record(id)?;
        for conn in [edge.source(), edge.target()] {
            if let Ok(conn) = self.require_connection_mut(conn)
                && conn.edge == Some(id)
            {
                conn.edge = None;
            }
        }
        Ok(())
    }

    /// Wall of `node` that faces `point`, judged relative to the node's
    /// aspect ratio.
    fn wall_facing(&self, node: NodeId, point: Vec2) -> Result<Wall, GraphError> {
        let node = self.require_node(node)?;
        let delta = point - node.center();
        let size = Vec2::new(node.size.x.max(1.0), node.size.y.max(1.0));
        let (nx, ny) = (delta.x / size.x, delta.y / size.y);
        Ok(if nx.abs() >= ny.abs() {
            if nx >= 0.0 { Wall::Right } else { Wall::Left }
        } else if ny >= 0.0 {
            Wall::Bottom
        } else {
            Wall::Top
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartgraph_core::NodeKind;

    struct Scene {
        graph: Graph,
        p: NodeId,
        c: NodeId,
        e: NodeId,
        edge: EdgeId,
    }

    /// P contains C; C has an edge to E outside P.
    fn scene() -> Scene {
        let mut graph = Graph::new();
        let kind = NodeKind::State { name: String::new() };
        let p = graph.add_node(kind.clone(), Vec2::ZERO, Vec2::new(300.0, 200.0));
        let c = graph.add_node(kind.clone(), Vec2::new(20.0, 20.0), Vec2::new(80.0, 40.0));
        let e = graph.add_node(kind, Vec2::new(600.0, 50.0), Vec2::new(80.0, 40.0));
        graph.set_parent(c, Some(p)).unwrap();
        let edge = graph
            .add_edge(ConnectionState::wall(c, Wall::Right), ConnectionState::wall(e, Wall::Left))
            .unwrap();
        graph.recalculate_all().unwrap();
        Scene { graph, p, c, e, edge }
    }

    fn endpoint_nodes(graph: &Graph, edge: EdgeId) -> (Option<NodeId>, Option<NodeId>) {
        let edge = graph.edge(edge).unwrap();
        (
            graph.connection(edge.source()).unwrap().node(),
            graph.connection(edge.target()).unwrap().node(),
        )
    }

    #[test]
    fn test_hide_splits_crossing_edge() {
        let Scene { mut graph, p, c, e, edge } = scene();
        let change = graph.hide_content(p, &IdPlan::default()).unwrap();

        assert_eq!(change.plan.0.len(), 1);
        let ids = change.plan.0.values().next().copied().unwrap();

        assert_eq!(endpoint_nodes(&graph, edge), (Some(p), Some(e)));
        assert_eq!(
            graph.edge(edge).unwrap().multipart,
            Some(Multipart {
                location: MultipartLocation::Outer,
                kind: MultipartType::Starting,
            })
        );
        assert_eq!(endpoint_nodes(&graph, ids.inner_edge), (Some(c), Some(p)));
        assert_eq!(
            graph.edge(ids.inner_edge).unwrap().multipart,
            Some(Multipart {
                location: MultipartLocation::Inner,
                kind: MultipartType::Ending,
            })
        );
        assert_eq!(graph.connection(ids.shadow).unwrap().bridge_to(), Some(ids.outer));
        assert_eq!(graph.connection(ids.outer).unwrap().wall, Wall::Right);
        assert!(graph.check_invariants().is_empty());
        assert!(change.events.contains(&Event::EdgeAdded { edge: ids.inner_edge }));
    }

    #[test]
    fn test_show_merges_back() {
        let Scene { mut graph, p, c, e, edge } = scene();
        let hidden = graph.hide_content(p, &IdPlan::default()).unwrap();
        let shown = graph.show_content(p).unwrap();

        assert_eq!(shown.plan, hidden.plan);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(endpoint_nodes(&graph, edge), (Some(c), Some(e)));
        assert_eq!(graph.edge(edge).unwrap().multipart, None);
        assert_eq!(graph.connections().count(), 2);
        assert!(graph.connections().all(|c| !c.is_bridged() && c.bridge_from().is_none()));
        assert!(graph.node(p).unwrap().connections().is_empty());
        assert!(graph.check_invariants().is_empty());
    }

    #[test]
    fn test_plan_replays_same_ids() {
        let Scene { mut graph, p, .. } = scene();
        let first = graph.hide_content(p, &IdPlan::default()).unwrap();
        let shown = graph.show_content(p).unwrap();
        let again = graph.hide_content(p, &shown.plan).unwrap();
        assert_eq!(again.plan, first.plan);
    }

    #[test]
    fn test_transitions_are_idempotent() {
        let Scene { mut graph, p, .. } = scene();
        assert!(graph.show_content(p).unwrap().events.is_empty());
        graph.hide_content(p, &IdPlan::default()).unwrap();
        let edges = graph.edge_count();
        assert!(graph.hide_content(p, &IdPlan::default()).unwrap().events.is_empty());
        assert_eq!(graph.edge_count(), edges);
    }

    #[test]
    fn test_internal_edges_not_split() {
        let mut graph = Graph::new();
        let kind = NodeKind::State { name: String::new() };
        let p = graph.add_node(kind.clone(), Vec2::ZERO, Vec2::new(300.0, 200.0));
        let a = graph.add_node(kind.clone(), Vec2::new(10.0, 10.0), Vec2::new(50.0, 50.0));
        let b = graph.add_node(kind, Vec2::new(100.0, 10.0), Vec2::new(50.0, 50.0));
        graph.set_parent(a, Some(p)).unwrap();
        graph.set_parent(b, Some(p)).unwrap();
        graph
            .add_edge(ConnectionState::wall(a, Wall::Right), ConnectionState::wall(b, Wall::Left))
            .unwrap();
        graph
            .add_edge(ConnectionState::wall(a, Wall::Top), ConnectionState::wall(p, Wall::Top))
            .unwrap();

        let change = graph.hide_content(p, &IdPlan::default()).unwrap();
        assert!(change.plan.is_empty());
        assert_eq!(change.events.len(), 1);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_nested_boundaries_round_trip() {
        let mut graph = Graph::new();
        let kind = NodeKind::State { name: String::new() };
        let outer = graph.add_node(kind.clone(), Vec2::ZERO, Vec2::new(400.0, 400.0));
        let inner = graph.add_node(kind.clone(), Vec2::new(20.0, 20.0), Vec2::new(200.0, 200.0));
        let deep = graph.add_node(kind.clone(), Vec2::new(40.0, 40.0), Vec2::new(50.0, 50.0));
        let far = graph.add_node(kind, Vec2::new(800.0, 0.0), Vec2::new(50.0, 50.0));
        graph.set_parent(inner, Some(outer)).unwrap();
        graph.set_parent(deep, Some(inner)).unwrap();
        let edge = graph
            .add_edge(ConnectionState::wall(far, Wall::Left), ConnectionState::wall(deep, Wall::Right))
            .unwrap();
        graph.recalculate_all().unwrap();

        graph.hide_content(inner, &IdPlan::default()).unwrap();
        graph.recalculate_all().unwrap();
        graph.hide_content(outer, &IdPlan::default()).unwrap();
        assert_eq!(graph.edge_count(), 3);
        assert!(graph.check_invariants().is_empty());

        // Opening the outer level leaves the edge crossing the inner one.
        graph.show_content(outer).unwrap();
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(endpoint_nodes(&graph, edge), (Some(far), Some(inner)));
        assert_eq!(
            graph.edge(edge).unwrap().multipart.map(|m| m.location),
            Some(MultipartLocation::Outer)
        );

        graph.show_content(inner).unwrap();
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(endpoint_nodes(&graph, edge), (Some(far), Some(deep)));
        assert_eq!(graph.edge(edge).unwrap().multipart, None);
        assert!(graph.check_invariants().is_empty());
    }
}
