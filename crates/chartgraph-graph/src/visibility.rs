//! Which nodes and edges are present at the open sub-chart level.
//!
//! Pure queries; nothing here mutates the graph. Renderers build and destroy
//! their output from these answers, and the node rule agrees with the
//! spatial index's top-level set.

use crate::graph::Graph;
use crate::model::{Edge, MultipartLocation};
use chartgraph_core::{EdgeId, NodeId};

/// A node is visible when it is the open level itself, or when walking up
/// its ancestors reaches the open level before any closed sub-chart. At the
/// root level (`current == None`) the walk may also end at the root.
pub fn is_node_visible(graph: &Graph, node: NodeId, current: Option<NodeId>) -> bool {
    if graph.node(node).is_none() {
        return false;
    }
    if Some(node) == current {
        return true;
    }
    for ancestor in graph.ancestors(node) {
        if Some(ancestor) == current {
            return true;
        }
        if graph.node(ancestor).is_some_and(|a| a.is_subchart()) {
            return false;
        }
    }
    current.is_none()
}

pub fn is_edge_visible(graph: &Graph, edge: EdgeId, current: Option<NodeId>) -> bool {
    graph
        .edge(edge)
        .is_some_and(|edge| edge_visible(graph, edge, current))
}

fn edge_visible(graph: &Graph, edge: &Edge, current: Option<NodeId>) -> bool {
    let node_of = |conn| graph.connection(graph.instance(conn)).and_then(|c| c.node());
    let source = node_of(edge.source());
    let target = node_of(edge.target());

    // A start edge has no source node and belongs to its target's level.
    if source.is_none() && !edge.is_multipart() {
        return match target {
            Some(target) => {
                is_node_visible(graph, target, current)
                    && graph.node(target).and_then(|n| n.parent()) == current
            }
            None => current.is_none(),
        };
    }

    let endpoints_visible = [source, target]
        .into_iter()
        .flatten()
        .all(|n| is_node_visible(graph, n, current));

    let Some(multipart) = edge.multipart else {
        return endpoints_visible;
    };
    let boundary = edge.boundary_connection().and_then(node_of);
    match multipart.location {
        MultipartLocation::Inner => {
            // Only the local end has to be checked; the boundary end is the
            // open level itself.
            let local = if Some(edge.source()) == edge.boundary_connection() {
                target
            } else {
                source
            };
            boundary.is_some()
                && boundary == current
                && local.is_none_or(|n| is_node_visible(graph, n, current))
        }
        MultipartLocation::Outer => boundary != current && endpoints_visible,
    }
}

pub fn visible_nodes(graph: &Graph, current: Option<NodeId>) -> Vec<NodeId> {
    graph
        .nodes()
        .filter(|n| is_node_visible(graph, n.id, current))
        .map(|n| n.id)
        .collect()
}

pub fn visible_edges(graph: &Graph, current: Option<NodeId>) -> Vec<EdgeId> {
    graph
        .edges()
        .filter(|e| edge_visible(graph, e, current))
        .map(|e| e.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConnectionState;
    use chartgraph_core::{NodeKind, Vec2, Wall};

    fn add(graph: &mut Graph, parent: Option<NodeId>) -> NodeId {
        let id = graph.add_node(
            NodeKind::State { name: String::new() },
            Vec2::ZERO,
            Vec2::new(100.0, 100.0),
        );
        graph.set_parent(id, parent).unwrap();
        id
    }

    #[test]
    fn test_closed_subchart_hides_descendants() {
        let mut graph = Graph::new();
        let p = add(&mut graph, None);
        let c = add(&mut graph, Some(p));
        let g = add(&mut graph, Some(c));

        assert!(is_node_visible(&graph, g, None));
        graph.node_mut(p).unwrap().show_content = false;
        assert!(is_node_visible(&graph, p, None));
        assert!(!is_node_visible(&graph, c, None));
        assert!(!is_node_visible(&graph, g, None));

        // Entering the sub-chart shows its content again.
        assert!(is_node_visible(&graph, p, Some(p)));
        assert!(is_node_visible(&graph, c, Some(p)));
        assert!(is_node_visible(&graph, g, Some(p)));
    }

    #[test]
    fn test_nodes_outside_open_level_hidden() {
        let mut graph = Graph::new();
        let p = add(&mut graph, None);
        let outside = add(&mut graph, None);
        assert!(!is_node_visible(&graph, outside, Some(p)));
        assert_eq!(visible_nodes(&graph, Some(p)), vec![p]);
    }

    #[test]
    fn test_start_edge_follows_target_level() {
        let mut graph = Graph::new();
        let p = add(&mut graph, None);
        let c = add(&mut graph, Some(p));
        let edge = graph
            .add_edge(ConnectionState::at(Vec2::ZERO), ConnectionState::wall(c, Wall::Top))
            .unwrap();

        assert!(!is_edge_visible(&graph, edge, None));
        assert!(is_edge_visible(&graph, edge, Some(p)));
    }

    #[test]
    fn test_plain_edge_needs_both_ends() {
        let mut graph = Graph::new();
        let p = add(&mut graph, None);
        let c = add(&mut graph, Some(p));
        let e = add(&mut graph, None);
        let edge = graph
            .add_edge(ConnectionState::wall(c, Wall::Right), ConnectionState::wall(e, Wall::Left))
            .unwrap();

        assert!(is_edge_visible(&graph, edge, None));
        graph.node_mut(p).unwrap().show_content = false;
        assert!(!is_edge_visible(&graph, edge, None));
        assert!(visible_edges(&graph, None).is_empty());
    }
}
