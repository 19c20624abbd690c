use chartgraph_core::{ConnectionId, EdgeId, NodeId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Unknown node {0}")]
    UnknownNode(NodeId),
    #[error("Unknown edge {0}")]
    UnknownEdge(EdgeId),
    #[error("Unknown edge connection {0}")]
    UnknownConnection(ConnectionId),
    #[error("Node {node} does not own edge connection {connection}")]
    ConnectionNotOwned {
        node: NodeId,
        connection: ConnectionId,
    },
    #[error("Edge connection {0} is already bridged; bridges cannot chain")]
    BridgeChain(ConnectionId),
    #[error("Cannot make {parent} the parent of {child}: it would create a cycle")]
    ParentCycle { child: NodeId, parent: NodeId },
    #[error("Component id {0} is already in use")]
    DuplicateId(u64),
}
