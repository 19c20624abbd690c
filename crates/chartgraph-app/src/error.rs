use chartgraph_core::{ComponentId, NodeId};
use chartgraph_graph::GraphError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("No render handle registered for component {0}")]
    HandleNotRegistered(ComponentId),
    #[error("Root render element is already set")]
    RootAlreadySet,
    #[error("Node {0} cannot host a sub-chart")]
    NotASubChart(NodeId),
    #[error("Edges cannot attach to node {0}")]
    NotConnectable(NodeId),
    #[error("Node {0} is an open level and cannot be deleted")]
    OpenLevel(NodeId),
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Config(#[from] serde_json::Error),
}
