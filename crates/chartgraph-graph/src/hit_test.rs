use crate::graph::Graph;
use crate::spatial::SpatialIndex;
use crate::visibility;
use chartgraph_core::{EdgeId, NodeId, Rect, Vec2, Wall};

/// Result of a hit test at a given position.
///
/// Priority order: Wall > Node > Edge > None
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HitResult {
    /// Nothing was hit at the tested position.
    None,
    Node(NodeId),
    /// The position is within wall-touch distance of a node's side.
    Wall { node: NodeId, wall: Wall },
    Edge(EdgeId),
}

/// Hit testing over the open sub-chart level.
///
/// Top-level candidates come from the spatial index; their visible children
/// are walked so the innermost node under a point is found.
#[derive(Debug, Clone, Copy)]
pub struct HitTester<'a> {
    graph: &'a Graph,
    index: &'a SpatialIndex,
    current: Option<NodeId>,
    /// Half-size of the box a point query is widened to.
    point_radius: f32,
    /// Maximum distance from a wall that still counts as touching it.
    wall_radius: f32,
    edge_tolerance: f32,
}

impl<'a> HitTester<'a> {
    pub fn new(graph: &'a Graph, index: &'a SpatialIndex, current: Option<NodeId>) -> Self {
        Self {
            graph,
            index,
            current,
            point_radius: 1.0,
            wall_radius: 8.0,
            edge_tolerance: 8.0,
        }
    }

    pub fn with_radii(mut self, point_radius: f32, wall_radius: f32) -> Self {
        self.point_radius = point_radius;
        self.wall_radius = wall_radius;
        self.edge_tolerance = wall_radius;
        self
    }

    pub fn hit_test(&self, pos: Vec2) -> HitResult {
        if let Some((node, wall)) = self.wall_at(pos) {
            return HitResult::Wall { node, wall };
        }
        if let Some(node) = self.node_at(pos) {
            return HitResult::Node(node);
        }
        if let Some(edge) = self.edge_at(pos) {
            return HitResult::Edge(edge);
        }
        HitResult::None
    }

    /// Innermost visible node under `pos`.
    pub fn node_at(&self, pos: Vec2) -> Option<NodeId> {
        self.node_at_excluding(pos, &[])
    }

    /// Innermost visible node under `pos`, ignoring `excluded` and
    /// everything below them. Used when dropping a dragged node so it never
    /// lands inside itself.
    pub fn node_at_excluding(&self, pos: Vec2, excluded: &[NodeId]) -> Option<NodeId> {
        let probe = Rect::around(pos, self.point_radius);
        // If multiple nodes overlap, the one with the smallest area wins.
        self.candidates(&probe, excluded)
            .into_iter()
            .filter_map(|id| self.graph.node(id).map(|n| (id, n.rect())))
            .filter(|(_, rect)| rect.intersects(&probe))
            .min_by(|a, b| a.1.area().total_cmp(&b.1.area()))
            .map(|(id, _)| id)
    }

    /// Closest node wall within the wall radius of `pos`.
    pub fn wall_at(&self, pos: Vec2) -> Option<(NodeId, Wall)> {
        let probe = Rect::around(pos, self.wall_radius);
        let mut best: Option<(NodeId, Wall, f32, f32)> = None;
        for id in self.candidates(&probe, &[]) {
            let Some(node) = self.graph.node(id) else {
                continue;
            };
            let rect = node.rect();
            for wall in Wall::ALL {
                let distance = distance_to_wall(&rect, wall, pos);
                if distance > self.wall_radius {
                    continue;
                }
                let area = rect.area();
                let better = match best {
                    None => true,
                    Some((_, _, d, a)) => distance < d || (distance == d && area < a),
                };
                if better {
                    best = Some((id, wall, distance, area));
                }
            }
        }
        best.map(|(id, wall, _, _)| (id, wall))
    }

    /// Visible nodes lying entirely inside `area`.
    pub fn nodes_in(&self, area: Rect) -> Vec<NodeId> {
        let mut found: Vec<NodeId> = self
            .candidates(&area, &[])
            .into_iter()
            .filter(|id| {
                self.graph.node(*id).is_some_and(|n| {
                    let r = n.rect();
                    area.contains(r.min) && area.contains(r.max)
                })
            })
            .collect();
        found.sort();
        found
    }

    /// Closest visible edge whose polyline passes within tolerance of `pos`.
    pub fn edge_at(&self, pos: Vec2) -> Option<EdgeId> {
        let mut best_id = None;
        let mut best_dist = self.edge_tolerance;
        for edge in visibility::visible_edges(self.graph, self.current) {
            let Some(e) = self.graph.edge(edge) else {
                continue;
            };
            let mut points = vec![self.graph.coordinates(e.source(), false)];
            points.extend(e.shape_points.iter().copied());
            points.push(self.graph.coordinates(e.target(), false));
            let dist = points
                .windows(2)
                .map(|w| distance_to_segment(pos, w[0], w[1]))
                .fold(f32::INFINITY, f32::min);
            if dist < best_dist {
                best_dist = dist;
                best_id = Some(edge);
            }
        }
        best_id
    }

    /// Indexed top-level nodes touching `probe`, plus their visible
    /// descendants that touch it.
    fn candidates(&self, probe: &Rect, excluded: &[NodeId]) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self
            .index
            .search(*probe)
            .into_iter()
            .filter(|id| !excluded.contains(id))
            .collect();
        while let Some(id) = stack.pop() {
            let Some(node) = self.graph.node(id) else {
                continue;
            };
            out.push(id);
            let descend = node.show_content || Some(id) == self.current;
            if !descend {
                continue;
            }
            for child in node.children() {
                if excluded.contains(child) {
                    continue;
                }
                if self
                    .graph
                    .node(*child)
                    .is_some_and(|c| c.rect().intersects(probe))
                {
                    stack.push(*child);
                }
            }
        }
        out
    }
}

fn distance_to_wall(rect: &Rect, wall: Wall, pos: Vec2) -> f32 {
    let (a, b) = match wall {
        Wall::Top => (rect.min, Vec2::new(rect.max.x, rect.min.y)),
        Wall::Bottom => (Vec2::new(rect.min.x, rect.max.y), rect.max),
        Wall::Left => (rect.min, Vec2::new(rect.min.x, rect.max.y)),
        Wall::Right => (Vec2::new(rect.max.x, rect.min.y), rect.max),
    };
    distance_to_segment(pos, a, b)
}

fn distance_to_segment(p: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ab = b - a;
    let len_sq = ab.x * ab.x + ab.y * ab.y;
    if len_sq <= f32::EPSILON {
        return p.distance(a);
    }
    let ap = p - a;
    let t = ((ap.x * ab.x + ap.y * ab.y) / len_sq).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConnectionState;
    use chartgraph_core::NodeKind;

    fn kind() -> NodeKind {
        NodeKind::State { name: String::new() }
    }

    fn scene() -> (Graph, SpatialIndex, NodeId, NodeId, NodeId) {
        let mut graph = Graph::new();
        let outer = graph.add_node(kind(), Vec2::ZERO, Vec2::new(300.0, 300.0));
        let inner = graph.add_node(kind(), Vec2::new(50.0, 50.0), Vec2::new(100.0, 100.0));
        let side = graph.add_node(kind(), Vec2::new(500.0, 0.0), Vec2::new(100.0, 100.0));
        graph.set_parent(inner, Some(outer)).unwrap();
        let mut index = SpatialIndex::new();
        index.rebuild(&graph, None);
        (graph, index, outer, inner, side)
    }

    #[test]
    fn test_innermost_node_wins() {
        let (graph, index, outer, inner, side) = scene();
        let hits = HitTester::new(&graph, &index, None);
        assert_eq!(hits.node_at(Vec2::new(100.0, 100.0)), Some(inner));
        assert_eq!(hits.node_at(Vec2::new(20.0, 250.0)), Some(outer));
        assert_eq!(hits.node_at(Vec2::new(550.0, 50.0)), Some(side));
        assert_eq!(hits.node_at(Vec2::new(400.0, 50.0)), None);
        assert_eq!(hits.node_at_excluding(Vec2::new(100.0, 100.0), &[outer]), None);
        assert_eq!(hits.node_at_excluding(Vec2::new(100.0, 100.0), &[inner]), Some(outer));
    }

    #[test]
    fn test_closed_subchart_is_opaque() {
        let (mut graph, index, outer, _, _) = scene();
        graph.node_mut(outer).unwrap().show_content = false;
        let hits = HitTester::new(&graph, &index, None);
        assert_eq!(hits.node_at(Vec2::new(100.0, 100.0)), Some(outer));
    }

    #[test]
    fn test_wall_touch() {
        let (graph, index, _, _, side) = scene();
        let hits = HitTester::new(&graph, &index, None);
        assert_eq!(hits.wall_at(Vec2::new(495.0, 50.0)), Some((side, Wall::Left)));
        assert_eq!(
            hits.hit_test(Vec2::new(550.0, 104.0)),
            HitResult::Wall { node: side, wall: Wall::Bottom }
        );
        assert_eq!(hits.wall_at(Vec2::new(450.0, 50.0)), None);
    }

    #[test]
    fn test_box_selection() {
        let (graph, index, outer, inner, side) = scene();
        let hits = HitTester::new(&graph, &index, None);
        let all = Rect::from_min_max(Vec2::new(-10.0, -10.0), Vec2::new(700.0, 400.0));
        assert_eq!(hits.nodes_in(all), vec![outer, inner, side]);
        let part = Rect::from_min_max(Vec2::new(40.0, 40.0), Vec2::new(200.0, 200.0));
        assert_eq!(hits.nodes_in(part), vec![inner]);
    }

    #[test]
    fn test_edge_hit() {
        let (mut graph, index, outer, _, side) = scene();
        let edge = graph
            .add_edge(ConnectionState::wall(outer, Wall::Right), ConnectionState::wall(side, Wall::Left))
            .unwrap();
        graph.recalculate_all().unwrap();
        let hits = HitTester::new(&graph, &index, None);
        // The edge runs from (300,150) to (500,50).
        assert_eq!(hits.hit_test(Vec2::new(400.0, 102.0)), HitResult::Edge(edge));
        assert_eq!(hits.hit_test(Vec2::new(400.0, 200.0)), HitResult::None);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use chartgraph_core::NodeKind;
    use proptest::prelude::*;

    proptest! {
        /// A point inside exactly one top-level node reports that node.
        #[test]
        fn prop_node_at_finds_containing_node(
            x in 0.0f32..1000.0,
            y in 0.0f32..1000.0,
            px in 5.0f32..995.0,
            py in 5.0f32..995.0,
        ) {
            let mut graph = Graph::new();
            let id = graph.add_node(
                NodeKind::State { name: String::new() },
                Vec2::new(x, y),
                Vec2::new(50.0, 50.0),
            );
            let mut index = SpatialIndex::new();
            index.rebuild(&graph, None);
            let hits = HitTester::new(&graph, &index, None).with_radii(0.0, 8.0);
            let pos = Vec2::new(px, py);
            let inside = graph.node(id).unwrap().rect().contains(pos);
            prop_assert_eq!(hits.node_at(pos) == Some(id), inside);
        }
    }
}
