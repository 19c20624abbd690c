//! GUI-agnostic diagram controller.
//!
//! Any shell (renderer, CLI, tests) drives a [`Diagram`] through its
//! operations and subscribes to the events it publishes.

pub mod config;
pub mod diagram;
pub mod error;
pub mod handles;
pub mod host;

pub use config::DiagramConfig;
pub use diagram::{Deferred, Diagram, DiagramState};
pub use error::AppError;
pub use handles::RenderHandles;
pub use host::{CoordinateTransform, RenderedHitTest};
