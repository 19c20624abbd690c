//! Hierarchical diagram graph: entities, geometry, indexing, visibility,
//! sub-chart navigation and the edge split/merge rules.

pub mod command;
pub mod error;
pub mod graph;
pub mod hit_test;
pub mod model;
pub mod mutator;
pub mod navigator;
pub mod resolver;
pub mod snapshot;
pub mod spatial;
pub mod visibility;

pub use command::{Command, Touched};
pub use error::GraphError;
pub use graph::Graph;
pub use hit_test::{HitResult, HitTester};
pub use model::{
    AttachType, ConnectionState, Edge, EdgeConnection, Multipart, MultipartLocation,
    MultipartType, Node, NodeGeometry,
};
pub use mutator::{ContentChange, IdPlan, SplitIds};
pub use navigator::{Jump, NavigatorSettings, SubChartNavigator, ZoomTransform};
pub use resolver::ResolveSettings;
pub use snapshot::{
    ConnectionRecord, CraftReport, EdgeRecord, GraphSnapshot, IdMode, NodeRecord,
};
pub use spatial::SpatialIndex;
pub use visibility::{is_edge_visible, is_node_visible, visible_edges, visible_nodes};
