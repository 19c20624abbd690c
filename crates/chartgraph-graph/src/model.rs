use chartgraph_core::{ConnectionId, EdgeId, NodeId, NodeKind, Rect, Vec2, Wall};
use serde::{Deserialize, Serialize};

/// Position and size of a node, as cached for the closed and open
/// sub-chart states.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeGeometry {
    pub position: Vec2,
    pub size: Vec2,
}

impl NodeGeometry {
    pub fn new(position: Vec2, size: Vec2) -> Self {
        Self { position, size }
    }

    pub fn rect(&self) -> Rect {
        Rect::from_pos_size(self.position, self.size)
    }
}

/// A rectangle (or circle) in the diagram.
///
/// Hierarchy fields are only changed through [`crate::Graph`] so that
/// `children` and `parent` stay consistent in both directions.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub position: Vec2,
    pub size: Vec2,
    pub circular: bool,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) edges: Vec<ConnectionId>,
    /// Whether the node is the currently entered sub-chart.
    pub is_open: bool,
    pub normal_state: Option<NodeGeometry>,
    pub open_state: Option<NodeGeometry>,
    /// When false the node's content is collapsed and the node acts as a
    /// closed sub-chart.
    pub show_content: bool,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind, position: Vec2, size: Vec2) -> Self {
        let circular = kind.capabilities().circular;
        Self {
            id,
            kind,
            position,
            size,
            circular,
            parent: None,
            children: Vec::new(),
            edges: Vec::new(),
            is_open: false,
            normal_state: None,
            open_state: None,
            show_content: true,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn connections(&self) -> &[ConnectionId] {
        &self.edges
    }

    pub fn rect(&self) -> Rect {
        Rect::from_pos_size(self.position, self.size)
    }

    pub fn center(&self) -> Vec2 {
        self.rect().center()
    }

    pub fn geometry(&self) -> NodeGeometry {
        NodeGeometry::new(self.position, self.size)
    }

    /// A node whose content is hidden behaves as an opaque sub-chart box.
    pub fn is_subchart(&self) -> bool {
        !self.show_content
    }
}

/// How an [`EdgeConnection`] derives its coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttachType {
    /// A fixed point stored on the connection.
    Position,
    /// The node body; rim of a circular node, wall of a rectangular one.
    NodeBody,
    /// The midpoint of one wall.
    NodeWall,
    /// The node's top-left corner.
    Node,
}

/// The user-settable part of an edge connection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub attach: AttachType,
    pub node: Option<NodeId>,
    pub wall: Wall,
    pub position: Vec2,
    pub offset: Option<Vec2>,
}

impl ConnectionState {
    pub fn at(position: Vec2) -> Self {
        Self {
            attach: AttachType::Position,
            node: None,
            wall: Wall::Top,
            position,
            offset: None,
        }
    }

    pub fn wall(node: NodeId, wall: Wall) -> Self {
        Self {
            attach: AttachType::NodeWall,
            node: Some(node),
            wall,
            position: Vec2::ZERO,
            offset: None,
        }
    }

    pub fn body(node: NodeId, wall: Wall) -> Self {
        Self {
            attach: AttachType::NodeBody,
            ..Self::wall(node, wall)
        }
    }

    pub fn origin(node: NodeId) -> Self {
        Self {
            attach: AttachType::Node,
            ..Self::wall(node, Wall::Top)
        }
    }

    pub fn with_offset(mut self, offset: Vec2) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// An edge endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeConnection {
    pub id: ConnectionId,
    pub attach: AttachType,
    pub(crate) node: Option<NodeId>,
    pub wall: Wall,
    pub position: Vec2,
    pub offset: Option<Vec2>,
    pub(crate) bridge_to: Option<ConnectionId>,
    pub(crate) bridge_from: Option<ConnectionId>,
    pub(crate) edge: Option<EdgeId>,
    /// Last computed absolute coordinates.
    pub(crate) coordinates: Option<Vec2>,
}

impl EdgeConnection {
    pub(crate) fn from_state(id: ConnectionId, state: ConnectionState) -> Self {
        Self {
            id,
            attach: state.attach,
            node: state.node,
            wall: state.wall,
            position: state.position,
            offset: state.offset,
            bridge_to: None,
            bridge_from: None,
            edge: None,
            coordinates: None,
        }
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    pub fn edge(&self) -> Option<EdgeId> {
        self.edge
    }

    pub fn bridge_to(&self) -> Option<ConnectionId> {
        self.bridge_to
    }

    pub fn bridge_from(&self) -> Option<ConnectionId> {
        self.bridge_from
    }

    pub fn cached_coordinates(&self) -> Option<Vec2> {
        self.coordinates
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState {
            attach: self.attach,
            node: self.node,
            wall: self.wall,
            position: self.position,
            offset: self.offset,
        }
    }

    pub fn is_bridged(&self) -> bool {
        self.bridge_to.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MultipartLocation {
    /// The half outside the closed sub-chart.
    Outer,
    /// The half inside the sub-chart.
    Inner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MultipartType {
    /// The half starts on the boundary node (its source sits on the boundary).
    Starting,
    /// The half ends on the boundary node.
    Ending,
}

impl MultipartType {
    pub fn opposite(&self) -> Self {
        match self {
            MultipartType::Starting => MultipartType::Ending,
            MultipartType::Ending => MultipartType::Starting,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Multipart {
    pub location: MultipartLocation,
    pub kind: MultipartType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub(crate) source: ConnectionId,
    pub(crate) target: ConnectionId,
    pub multipart: Option<Multipart>,
    /// User adjustable waypoints between source and target.
    pub shape_points: Vec<Vec2>,
    pub center_point: Option<Vec2>,
    pub offsetted_start_point: Option<Vec2>,
}

impl Edge {
    pub fn source(&self) -> ConnectionId {
        self.source
    }

    pub fn target(&self) -> ConnectionId {
        self.target
    }

    pub fn is_multipart(&self) -> bool {
        self.multipart.is_some()
    }

    /// The endpoint that sits on the sub-chart boundary, for multipart halves.
    pub fn boundary_connection(&self) -> Option<ConnectionId> {
        self.multipart.map(|mp| match mp.kind {
            MultipartType::Starting => self.source,
            MultipartType::Ending => self.target,
        })
    }

    /// The endpoint opposite `connection`, if `connection` belongs to this edge.
    pub fn opposite(&self, connection: ConnectionId) -> Option<ConnectionId> {
        if connection == self.source {
            Some(self.target)
        } else if connection == self.target {
            Some(self.source)
        } else {
            None
        }
    }
}
