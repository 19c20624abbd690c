//! Seams the host application provides.

use chartgraph_core::{ComponentId, Vec2};
use chartgraph_graph::ZoomTransform;

/// Maps a client-space point (pointer position) into diagram space.
pub trait CoordinateTransform {
    fn to_diagram(&self, client: Vec2) -> Vec2;
}

/// Answers "which component is drawn at this client point" from the
/// rendered output.
pub trait RenderedHitTest {
    fn component_at(&self, client: Vec2) -> Option<ComponentId>;
}

impl CoordinateTransform for ZoomTransform {
    /// Inverse of `client = diagram * scale + pan`.
    fn to_diagram(&self, client: Vec2) -> Vec2 {
        let moved = client - self.pan;
        if self.scale.abs() <= f32::EPSILON {
            return moved;
        }
        moved * (1.0 / self.scale)
    }
}

impl<F> RenderedHitTest for F
where
    F: Fn(Vec2) -> Option<ComponentId>,
{
    fn component_at(&self, client: Vec2) -> Option<ComponentId> {
        self(client)
    }
}
