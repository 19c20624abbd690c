use serde::{Deserialize, Serialize};
use std::fmt;

pub mod error;
pub mod geometry;
pub mod node_kind;

pub use error::CoreError;
pub use geometry::{Axis, Rect, Vec2, Wall};
pub use node_kind::{KindCapabilities, NodeKind};

/// Raw id shared by every component of a diagram. Nodes, edges and edge
/// connections all draw from the same counter, so a raw value is unique
/// across kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub u64);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<NodeId> for ComponentId {
    fn from(id: NodeId) -> Self {
        ComponentId(id.0)
    }
}

impl From<EdgeId> for ComponentId {
    fn from(id: EdgeId) -> Self {
        ComponentId(id.0)
    }
}

/// Discriminator carried by every selectable component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentType {
    Node,
    Edge,
}

/// Monotonic id source for nodes, edges and connections.
///
/// The allocator is owned by the diagram rather than being process-global.
/// Loading a snapshot resets it to the snapshot's recorded value so that
/// ids stay stable and conflict-free across save/load and undo replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdAllocator {
    next: u64,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn starting_at(next: u64) -> Self {
        Self { next }
    }

    pub fn next_raw(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    pub fn next_node(&mut self) -> NodeId {
        NodeId(self.next_raw())
    }

    pub fn next_edge(&mut self) -> EdgeId {
        EdgeId(self.next_raw())
    }

    pub fn next_connection(&mut self) -> ConnectionId {
        ConnectionId(self.next_raw())
    }

    /// The value the next allocation will return.
    pub fn peek(&self) -> u64 {
        self.next
    }

    pub fn reset_to(&mut self, next: u64) {
        self.next = next;
    }

    /// Make sure future ids never collide with `used`.
    pub fn bump_past(&mut self, used: u64) {
        if used >= self.next {
            self.next = used + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_is_shared_across_kinds() {
        let mut ids = IdAllocator::new();
        let node = ids.next_node();
        let edge = ids.next_edge();
        let conn = ids.next_connection();
        assert_eq!(node, NodeId(1));
        assert_eq!(edge, EdgeId(2));
        assert_eq!(conn, ConnectionId(3));
        assert_eq!(ids.peek(), 4);
    }

    #[test]
    fn reset_and_bump() {
        let mut ids = IdAllocator::new();
        ids.reset_to(100);
        assert_eq!(ids.next_raw(), 100);
        ids.bump_past(50);
        assert_eq!(ids.peek(), 101);
        ids.bump_past(200);
        assert_eq!(ids.peek(), 201);
    }

    #[test]
    fn ids_roundtrip_through_json() {
        let id = NodeId(42);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "42");
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
