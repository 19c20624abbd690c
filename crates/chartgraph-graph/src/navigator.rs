//! Stack of entered sub-chart levels.
//!
//! Entering a node swaps its closed geometry for its open geometry, makes
//! it the current level and remembers the level that was left together with
//! its spatial index. Going back truncates the stack instead of pushing.

use crate::error::GraphError;
use crate::graph::Graph;
use crate::model::NodeGeometry;
use crate::spatial::SpatialIndex;
use chartgraph_core::{NodeId, Rect, Vec2};
use chartgraph_events::Event;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Pan and zoom of one level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomTransform {
    pub pan: Vec2,
    pub scale: f32,
}

impl Default for ZoomTransform {
    fn default() -> Self {
        Self {
            pan: Vec2::ZERO,
            scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NavigatorSettings {
    /// Margin around the children when a node is opened for the first time.
    pub open_padding: f32,
    /// Open size used when the node has no children to wrap.
    pub default_open_size: Vec2,
    pub default_zoom: ZoomTransform,
}

impl Default for NavigatorSettings {
    fn default() -> Self {
        Self {
            open_padding: 40.0,
            default_open_size: Vec2::new(800.0, 600.0),
            default_zoom: ZoomTransform::default(),
        }
    }
}

#[derive(Debug, Clone)]
struct Frame {
    node: Option<NodeId>,
    index: SpatialIndex,
}

/// Result of a level change.
#[derive(Debug, Clone, PartialEq)]
pub struct Jump {
    pub from: Option<NodeId>,
    pub to: Option<NodeId>,
    /// Zoom to apply for the new level.
    pub zoom: ZoomTransform,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Default)]
pub struct SubChartNavigator {
    stack: Vec<Frame>,
    current: Option<NodeId>,
    zooms: HashMap<u64, ZoomTransform>,
    settings: NavigatorSettings,
}

/// Zoom cache key; the root level is 0.
fn level_key(level: Option<NodeId>) -> u64 {
    level.map_or(0, |n| n.0)
}

impl SubChartNavigator {
    pub fn new(settings: NavigatorSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn current(&self) -> Option<NodeId> {
        self.current
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Levels that can be navigated back to, outermost first.
    pub fn trail(&self) -> Vec<Option<NodeId>> {
        self.stack.iter().map(|f| f.node).collect()
    }

    pub fn zoom(&self, level: Option<NodeId>) -> ZoomTransform {
        self.zooms
            .get(&level_key(level))
            .copied()
            .unwrap_or(self.settings.default_zoom)
    }

    pub fn set_zoom(&mut self, level: Option<NodeId>, zoom: ZoomTransform) {
        self.zooms.insert(level_key(level), zoom);
    }

    /// Whether `node` is the current level or one the stack leads back to.
    pub fn is_on_path(&self, node: NodeId) -> bool {
        self.current == Some(node) || self.stack.iter().any(|f| f.node == Some(node))
    }

    /// Forget every level and return to the root without touching geometry.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.current = None;
    }

    /// Make `target` the current level (`None` for the root).
    ///
    /// `zoom_now` is the zoom of the level being left; it is restored when
    /// that level is visited again. `index` is swapped for the target's
    /// remembered index when going back. Callers rebuild the index over the
    /// new level before the next query. Returns `None` when `target` already
    /// is the current level.
    pub fn jump_to(
        &mut self,
        graph: &mut Graph,
        index: &mut SpatialIndex,
        target: Option<NodeId>,
        zoom_now: ZoomTransform,
    ) -> Result<Option<Jump>, GraphError> {
        if target == self.current {
            return Ok(None);
        }
        if let Some(target) = target {
            graph.require_node(target)?;
        }

        let from = self.current;
        self.set_zoom(from, zoom_now);

        match self.stack.iter().position(|f| f.node == target) {
            Some(position) => {
                let mut dropped = self.stack.split_off(position);
                if !dropped.is_empty() {
                    *index = dropped.swap_remove(0).index;
                }
            }
            None => self.stack.push(Frame {
                node: from,
                index: index.clone(),
            }),
        }

        let mut events = Vec::new();
        if let Some(from) = from
            && let Some(node) = graph.node_mut(from)
        {
            node.open_state = Some(node.geometry());
            if let Some(normal) = node.normal_state {
                node.position = normal.position;
                node.size = normal.size;
            }
            node.is_open = false;
            events.push(Event::SubChartClosed { node: from });
            events.push(Event::NodeBBoxChanged { node: from });
        }

        if let Some(target) = target {
            let open = self.open_geometry(graph, target)?;
            let node = graph.require_node_mut(target)?;
            node.normal_state = Some(node.geometry());
            node.position = open.position;
            node.size = open.size;
            node.is_open = true;
            events.push(Event::SubChartOpened { node: target });
            events.push(Event::NodeBBoxChanged { node: target });
        }

        self.current = target;
        tracing::debug!(from = ?from, to = ?target, depth = self.stack.len(), "jumped to level");
        Ok(Some(Jump {
            from,
            to: target,
            zoom: self.zoom(target),
            events,
        }))
    }

    /// Step back to the deepest level on the path whose node still exists.
    ///
    /// Replaying history can remove a node the navigator stands on. The
    /// first missing level and everything below it are dropped. Returns the
    /// removed level together with the jump, or `None` when the path is
    /// intact.
    pub fn retreat_to_existing(
        &mut self,
        graph: &mut Graph,
        index: &mut SpatialIndex,
        zoom_now: ZoomTransform,
    ) -> Result<Option<(NodeId, Jump)>, GraphError> {
        let path: Vec<Option<NodeId>> = self
            .stack
            .iter()
            .map(|f| f.node)
            .chain(std::iter::once(self.current))
            .collect();
        let Some((depth, removed)) = path
            .iter()
            .enumerate()
            .find_map(|(i, level)| level.filter(|n| graph.node(*n).is_none()).map(|n| (i, n)))
        else {
            return Ok(None);
        };
        let target = path[..depth].last().copied().flatten();
        tracing::warn!(removed = %removed, to = ?target, "open level no longer exists");
        let jump = self.jump_to(graph, index, target, zoom_now)?;
        if target.is_none() {
            // The root keeps no frames, even when the path never passed it.
            self.stack.clear();
        }
        Ok(jump.map(|jump| (removed, jump)))
    }

    /// Geometry a node takes while it is the open level.
    fn open_geometry(&self, graph: &Graph, id: NodeId) -> Result<NodeGeometry, GraphError> {
        let node = graph.require_node(id)?;
        if let Some(open) = node.open_state {
            return Ok(open);
        }
        let bounds = node
            .children()
            .iter()
            .filter_map(|c| graph.node(*c))
            .map(|c| c.rect())
            .reduce(|a, b| a.union(&b));
        Ok(match bounds {
            Some(bounds) => {
                let padded: Rect = bounds.expand(self.settings.open_padding);
                NodeGeometry::new(padded.min, padded.size())
            }
            None => NodeGeometry::new(node.position, self.settings.default_open_size),
        })
    }
}
