//! Undo/redo steps as plain values.

use crate::error::GraphError;
use crate::graph::Graph;
use crate::model::ConnectionState;
use crate::mutator::IdPlan;
use crate::snapshot::{EdgeRecord, NodeRecord};
use chartgraph_core::{ConnectionId, EdgeId, NodeId, Vec2};
use serde::{Deserialize, Serialize};

/// A graph mutation that can be archived and replayed.
///
/// Every variant carries the complete target state, so applying a command
/// never depends on what the graph looked like when it was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    RestoreNode {
        record: NodeRecord,
    },
    RemoveNode {
        node: NodeId,
    },
    SetGeometry {
        node: NodeId,
        position: Vec2,
        size: Vec2,
    },
    SetParent {
        node: NodeId,
        parent: Option<NodeId>,
    },
    RestoreEdge {
        record: EdgeRecord,
    },
    RemoveEdge {
        edge: EdgeId,
    },
    SetConnection {
        connection: ConnectionId,
        state: ConnectionState,
    },
    SetShapePoints {
        edge: EdgeId,
        points: Vec<Vec2>,
    },
    SetContentVisible {
        node: NodeId,
        visible: bool,
        /// Ids to reuse when the command hides content.
        plan: IdPlan,
    },
}

/// What a command touched, for follow-up recalculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Touched {
    Node(NodeId),
    Edge(EdgeId),
    /// Structural change; recalculate everything.
    All,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::RestoreNode { .. } => "restore_node",
            Command::RemoveNode { .. } => "remove_node",
            Command::SetGeometry { .. } => "set_geometry",
            Command::SetParent { .. } => "set_parent",
            Command::RestoreEdge { .. } => "restore_edge",
            Command::RemoveEdge { .. } => "remove_edge",
            Command::SetConnection { .. } => "set_connection",
            Command::SetShapePoints { .. } => "set_shape_points",
            Command::SetContentVisible { .. } => "set_content_visible",
        }
    }
}

impl Graph {
    /// Execute a command against the graph.
    pub fn apply(&mut self, command: &Command) -> Result<Touched, GraphError> {
        tracing::trace!(command = command.name(), "applying command");
        match command {
            Command::RestoreNode { record } => {
                let id = self.restore_node(record)?;
                Ok(Touched::Node(id))
            }
            Command::RemoveNode { node } => {
                self.remove_node(*node)?;
                Ok(Touched::All)
            }
            Command::SetGeometry {
                node,
                position,
                size,
            } => {
                let slot = self.require_node_mut(*node)?;
                slot.position = *position;
                slot.size = *size;
                Ok(Touched::Node(*node))
            }
            Command::SetParent { node, parent } => {
                self.set_parent(*node, *parent)?;
                Ok(Touched::Node(*node))
            }
            Command::RestoreEdge { record } => {
                let id = self.restore_edge(record)?;
                Ok(Touched::Edge(id))
            }
            Command::RemoveEdge { edge } => {
                self.remove_edge(*edge)?;
                Ok(Touched::All)
            }
            Command::SetConnection { connection, state } => {
                self.set_connection_state(*connection, *state)?;
                match self.require_connection(*connection)?.edge() {
                    Some(edge) => Ok(Touched::Edge(edge)),
                    None => Ok(Touched::All),
                }
            }
            Command::SetShapePoints { edge, points } => {
                self.set_shape_points(*edge, points.clone())?;
                Ok(Touched::Edge(*edge))
            }
            Command::SetContentVisible {
                node,
                visible,
                plan,
            } => {
                self.set_content_visible(*node, *visible, plan)?;
                Ok(Touched::All)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartgraph_core::{NodeKind, Wall};

    #[test]
    fn test_remove_then_restore_edge() {
        let mut graph = Graph::new();
        let kind = NodeKind::State { name: String::new() };
        let a = graph.add_node(kind.clone(), Vec2::ZERO, Vec2::new(50.0, 50.0));
        let b = graph.add_node(kind, Vec2::new(100.0, 0.0), Vec2::new(50.0, 50.0));
        let edge = graph
            .add_edge(ConnectionState::wall(a, Wall::Right), ConnectionState::wall(b, Wall::Left))
            .unwrap();
        let record = graph.edge_record(edge).unwrap();

        graph.apply(&Command::RemoveEdge { edge }).unwrap();
        assert_eq!(graph.edge_count(), 0);
        let touched = graph.apply(&Command::RestoreEdge { record: record.clone() }).unwrap();
        assert_eq!(touched, Touched::Edge(edge));
        assert_eq!(graph.edge_record(edge).unwrap(), record);
    }

    #[test]
    fn test_geometry_and_parent_commands() {
        let mut graph = Graph::new();
        let kind = NodeKind::Terminal;
        let a = graph.add_node(kind.clone(), Vec2::ZERO, Vec2::new(20.0, 20.0));
        let b = graph.add_node(kind, Vec2::ZERO, Vec2::new(20.0, 20.0));

        graph
            .apply(&Command::SetGeometry {
                node: a,
                position: Vec2::new(5.0, 6.0),
                size: Vec2::new(7.0, 8.0),
            })
            .unwrap();
        graph
            .apply(&Command::SetParent {
                node: a,
                parent: Some(b),
            })
            .unwrap();
        let node = graph.node(a).unwrap();
        assert_eq!(node.position, Vec2::new(5.0, 6.0));
        assert_eq!(node.parent(), Some(b));

        assert_eq!(
            graph.apply(&Command::RemoveNode { node: NodeId(77) }),
            Err(GraphError::UnknownNode(NodeId(77)))
        );
    }

    #[test]
    fn test_command_serializes_with_tag() {
        let command = Command::RemoveEdge { edge: EdgeId(4) };
        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(json["command"], "remove_edge");
        let back: Command = serde_json::from_value(json).unwrap();
        assert_eq!(back, command);
    }
}
