//! Headless diagram controller.
//!
//! [`Diagram`] owns the graph together with everything that has to stay in
//! step with it: the spatial index of the open level, the sub-chart
//! navigator, the undo log, the event bus and the queue of work deferred
//! until an operation settles. Every public operation records its inverse,
//! publishes its events and settles before returning.

use crate::config::DiagramConfig;
use crate::error::AppError;
use crate::host::{CoordinateTransform, RenderedHitTest};
use chartgraph_core::{ComponentId, ConnectionId, EdgeId, NodeId, NodeKind, Rect, Vec2, Wall};
use chartgraph_events::telemetry::{
    self, OP_ADD_EDGE, OP_ADD_NODE, OP_DELETE_EDGE, OP_DELETE_NODE, OP_JUMP_TO, OP_MOVE_NODE,
    OP_PASTE, OP_REDO, OP_REPARENT_NODE, OP_RESIZE_NODE, OP_SET_CONTENT_VISIBLE,
    OP_SET_SHAPE_POINTS, OP_UNDO, OP_UPDATE_CONNECTION,
};
use chartgraph_events::{DeferredQueue, Event, EventBus, EventEnvelope, EventListener};
use chartgraph_graph::{
    Command, ConnectionRecord, ConnectionState, ContentChange, CraftReport, EdgeRecord, Graph,
    GraphError, GraphSnapshot, HitResult, HitTester, IdMode, IdPlan, NodeRecord, SpatialIndex,
    SubChartNavigator, Touched, ZoomTransform,
};
use chartgraph_history::{Action, ActionTask, ActionsArchiver, TaskRunner};
use crossbeam_channel::Receiver;
use std::collections::{BTreeSet, VecDeque};

type Task = ActionTask<Command, Event>;

/// Work postponed until the current operation settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferred {
    RebuildIndex,
    RecalculateNode(NodeId),
    RecalculateEdge(EdgeId),
    RecalculateAll,
}

/// The parts of a diagram that archived commands act on.
#[derive(Debug)]
pub struct DiagramState {
    graph: Graph,
    index: SpatialIndex,
    navigator: SubChartNavigator,
    bus: EventBus,
    deferred: DeferredQueue<Deferred>,
}

impl DiagramState {
    fn new(config: &DiagramConfig) -> Self {
        Self {
            graph: Graph::with_settings(config.resolve_settings()),
            index: SpatialIndex::new(),
            navigator: SubChartNavigator::new(config.navigator),
            bus: EventBus::new(),
            deferred: DeferredQueue::new(),
        }
    }

    /// Run everything deferred so far, coalescing duplicates.
    fn settle(&mut self) -> Result<(), GraphError> {
        loop {
            let tasks = self.deferred.drain_unique();
            if tasks.is_empty() {
                return Ok(());
            }
            let everything = tasks.contains(&Deferred::RecalculateAll);
            if everything {
                self.graph.recalculate_all()?;
            }
            let mut rebuild = false;
            for task in tasks {
                match task {
                    Deferred::RebuildIndex => rebuild = true,
                    Deferred::RecalculateAll => {}
                    Deferred::RecalculateNode(node) => {
                        if !everything && self.graph.node(node).is_some() {
                            self.graph.recalculate_node(node)?;
                        }
                    }
                    Deferred::RecalculateEdge(edge) => {
                        if !everything && self.graph.edge(edge).is_some() {
                            self.graph.recalculate_edge(edge)?;
                        }
                    }
                }
            }
            if rebuild {
                self.index.rebuild(&self.graph, self.navigator.current());
            }
        }
    }
}

impl TaskRunner<Command, Event> for DiagramState {
    type Error = GraphError;

    fn run(&mut self, command: &Command) -> Result<(), GraphError> {
        let touched = self.graph.apply(command)?;
        self.deferred.defer(Deferred::RebuildIndex);
        self.deferred.defer(match touched {
            Touched::Node(node) => Deferred::RecalculateNode(node),
            Touched::Edge(edge) => Deferred::RecalculateEdge(edge),
            Touched::All => Deferred::RecalculateAll,
        });
        Ok(())
    }

    fn replay(&mut self, event: &Event) {
        self.bus.publish(EventEnvelope::restored(event.clone()));
    }
}

#[derive(Debug)]
pub struct Diagram {
    state: DiagramState,
    history: ActionsArchiver<Command, Event>,
    config: DiagramConfig,
    selection: Vec<ComponentId>,
    /// Pan and zoom of the open level.
    zoom: ZoomTransform,
}

impl Default for Diagram {
    fn default() -> Self {
        Self::new(DiagramConfig::default())
    }
}

impl Diagram {
    pub fn new(config: DiagramConfig) -> Self {
        Self {
            state: DiagramState::new(&config),
            history: ActionsArchiver::with_limit(config.history_limit),
            zoom: config.navigator.default_zoom,
            selection: Vec::new(),
            config,
        }
    }

    /// Load a snapshot as a fresh diagram at the root level. Nodes that were
    /// open when the snapshot was taken are closed again.
    pub fn from_snapshot(
        snapshot: &GraphSnapshot,
        config: DiagramConfig,
    ) -> Result<(Self, CraftReport), AppError> {
        let (mut graph, report) = Graph::from_snapshot(snapshot)?;
        graph.settings = config.resolve_settings();
        for id in graph.node_ids() {
            if let Some(node) = graph.node_mut(id)
                && node.is_open
            {
                node.open_state = Some(node.geometry());
                if let Some(normal) = node.normal_state {
                    node.position = normal.position;
                    node.size = normal.size;
                }
                node.is_open = false;
                tracing::debug!(node = %id, "closed level recorded as open");
            }
        }
        if !report.is_complete() {
            tracing::warn!(
                skipped_edges = report.skipped_edges.len(),
                orphaned = report.orphaned_parents.len(),
                "snapshot loaded with missing references"
            );
        }

        let mut diagram = Self::new(config);
        diagram.state.graph = graph;
        diagram.state.deferred.defer(Deferred::RecalculateAll);
        diagram.state.deferred.defer(Deferred::RebuildIndex);
        diagram.settle()?;
        Ok((diagram, report))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn graph(&self) -> &Graph {
        &self.state.graph
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.state.index
    }

    pub fn navigator(&self) -> &SubChartNavigator {
        &self.state.navigator
    }

    pub fn history(&self) -> &ActionsArchiver<Command, Event> {
        &self.history
    }

    pub fn config(&self) -> &DiagramConfig {
        &self.config
    }

    pub fn selection(&self) -> &[ComponentId] {
        &self.selection
    }

    /// The open level, `None` for the root.
    pub fn current_level(&self) -> Option<NodeId> {
        self.state.navigator.current()
    }

    pub fn zoom(&self) -> ZoomTransform {
        self.zoom
    }

    pub fn set_zoom(&mut self, zoom: ZoomTransform) {
        self.zoom = zoom;
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn subscribe<L: EventListener + 'static>(&mut self, listener: L) {
        self.state.bus.subscribe(listener);
    }

    pub fn tap(&mut self) -> Receiver<EventEnvelope> {
        self.state.bus.tap()
    }

    /// Drain the deferred queue: recalculate what changed and rebuild the
    /// spatial index over the open level.
    pub fn settle(&mut self) -> Result<(), AppError> {
        self.state.settle()?;
        Ok(())
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Add a node of the kind's default size to the open level.
    pub fn add_node(&mut self, kind: NodeKind, position: Vec2) -> Result<NodeId, AppError> {
        let size = kind.capabilities().default_size;
        self.add_node_sized(kind, position, size)
    }

    pub fn add_node_sized(
        &mut self,
        kind: NodeKind,
        position: Vec2,
        size: Vec2,
    ) -> Result<NodeId, AppError> {
        self.traced(OP_ADD_NODE, |d| {
            let id = d.state.graph.ids_mut().next_node();
            let record = NodeRecord {
                id,
                circular: kind.capabilities().circular,
                kind,
                position,
                size: clamp_size(size),
                parent: d.current_level(),
                is_open: false,
                normal_state: None,
                open_state: None,
                show_content: true,
            };
            d.perform(
                vec![ActionTask::new(
                    Command::RestoreNode { record },
                    vec![Event::NodeAdded { node: id }],
                )],
                vec![ActionTask::new(
                    Command::RemoveNode { node: id },
                    vec![Event::NodeDeleted { node: id }],
                )],
            )?;
            d.commit()?;
            Ok(id)
        })
    }

    /// Move a node to `position`, carrying its descendants along.
    pub fn move_node(&mut self, node: NodeId, position: Vec2) -> Result<(), AppError> {
        self.traced(OP_MOVE_NODE, |d| {
            let graph = &d.state.graph;
            let delta = position - graph.require_node(node)?.position;
            if delta == Vec2::ZERO {
                return Ok(());
            }
            let mut redo = Vec::new();
            let mut undo = Vec::new();
            for id in std::iter::once(node).chain(graph.descendants(node)) {
                let moved = graph.require_node(id)?;
                let events = vec![Event::NodeBBoxChanged { node: id }];
                redo.push(ActionTask::new(
                    Command::SetGeometry {
                        node: id,
                        position: moved.position + delta,
                        size: moved.size,
                    },
                    events.clone(),
                ));
                undo.push(ActionTask::new(
                    Command::SetGeometry {
                        node: id,
                        position: moved.position,
                        size: moved.size,
                    },
                    events,
                ));
            }
            undo.reverse();
            d.perform(redo, undo)?;
            d.commit()
        })
    }

    pub fn resize_node(&mut self, node: NodeId, size: Vec2) -> Result<(), AppError> {
        self.traced(OP_RESIZE_NODE, |d| {
            let current = d.state.graph.require_node(node)?;
            let (position, old) = (current.position, current.size);
            let size = clamp_size(size);
            if size == old {
                return Ok(());
            }
            let events = vec![Event::NodeBBoxChanged { node }];
            d.perform(
                vec![ActionTask::new(
                    Command::SetGeometry {
                        node,
                        position,
                        size,
                    },
                    events.clone(),
                )],
                vec![ActionTask::new(
                    Command::SetGeometry {
                        node,
                        position,
                        size: old,
                    },
                    events,
                )],
            )?;
            d.commit()
        })
    }

    /// Move `node` under `parent`, or to the top of the hierarchy with `None`.
    pub fn reparent(&mut self, node: NodeId, parent: Option<NodeId>) -> Result<(), AppError> {
        self.traced(OP_REPARENT_NODE, |d| {
            let from = d.state.graph.require_node(node)?.parent();
            if from == parent {
                return Ok(());
            }
            d.perform(
                vec![ActionTask::new(
                    Command::SetParent { node, parent },
                    vec![Event::NodeReparented {
                        node,
                        from,
                        to: parent,
                    }],
                )],
                vec![ActionTask::new(
                    Command::SetParent { node, parent: from },
                    vec![Event::NodeReparented {
                        node,
                        from: parent,
                        to: from,
                    }],
                )],
            )?;
            d.commit()
        })
    }

    /// Reparent a dragged node according to what lies under the drop point:
    /// the innermost node there that can host a sub-chart, or the open level
    /// when there is none. Returns the new parent.
    pub fn drop_node(&mut self, node: NodeId, at: Vec2) -> Result<Option<NodeId>, AppError> {
        self.state.graph.require_node(node)?;
        let level = self.current_level();
        let target = self
            .hit_tester()
            .node_at_excluding(at, &[node])
            .and_then(|hit| self.host_for(hit))
            .or(level);
        self.reparent(node, target)?;
        Ok(target)
    }

    /// `hit` or its nearest ancestor below the open level that can host
    /// children.
    fn host_for(&self, hit: NodeId) -> Option<NodeId> {
        let graph = &self.state.graph;
        let level = self.current_level();
        std::iter::once(hit)
            .chain(graph.ancestors(hit))
            .take_while(|id| Some(*id) != level)
            .find(|id| {
                graph
                    .node(*id)
                    .is_some_and(|n| n.kind.capabilities().hosts_subchart)
            })
    }

    /// Delete a node, everything below it and every edge touching that
    /// subtree as one undo step.
    pub fn delete_node(&mut self, node: NodeId) -> Result<(), AppError> {
        self.traced(OP_DELETE_NODE, |d| {
            let graph = &d.state.graph;
            graph.require_node(node)?;
            let order: Vec<NodeId> = std::iter::once(node).chain(graph.descendants(node)).collect();
            if let Some(open) = order.iter().find(|id| d.state.navigator.is_on_path(**id)) {
                return Err(AppError::OpenLevel(*open));
            }
            let mut edges = Vec::new();
            for id in &order {
                for edge in graph.edges_of_node(*id) {
                    for member in edge_family(graph, edge) {
                        if !edges.contains(&member) {
                            edges.push(member);
                        }
                    }
                }
            }

            d.grouped(|d| {
                for edge in &edges {
                    d.remove_edge_step(*edge)?;
                }
                // Deepest first, so a node never loses children it still has.
                for id in order.iter().rev() {
                    d.remove_node_step(*id)?;
                }
                Ok(())
            })?;
            tracing::debug!(node = %node, nodes = order.len(), edges = edges.len(), "node deleted");
            d.prune_selection();
            d.commit()
        })
    }

    fn remove_node_step(&mut self, node: NodeId) -> Result<(), AppError> {
        let record = self.state.graph.node_record(node)?;
        self.perform(
            vec![ActionTask::new(
                Command::RemoveNode { node },
                vec![Event::NodeDeleted { node }],
            )],
            vec![ActionTask::new(
                Command::RestoreNode { record },
                vec![Event::NodeAdded { node }],
            )],
        )
    }

    // ========================================================================
    // Edges
    // ========================================================================

    pub fn add_edge(
        &mut self,
        source: ConnectionState,
        target: ConnectionState,
    ) -> Result<EdgeId, AppError> {
        self.traced(OP_ADD_EDGE, |d| {
            for node in [source.node, target.node].into_iter().flatten() {
                let kind = &d.state.graph.require_node(node)?.kind;
                if !kind.capabilities().connectable {
                    return Err(AppError::NotConnectable(node));
                }
            }
            let ids = d.state.graph.ids_mut();
            let id = ids.next_edge();
            let (source_id, target_id) = (ids.next_connection(), ids.next_connection());
            let record = EdgeRecord {
                id,
                source: fresh_connection(source_id, source),
                target: fresh_connection(target_id, target),
                multipart: None,
                shape_points: Vec::new(),
            };
            d.perform(
                vec![ActionTask::new(
                    Command::RestoreEdge { record },
                    vec![Event::EdgeAdded { edge: id }],
                )],
                vec![ActionTask::new(
                    Command::RemoveEdge { edge: id },
                    vec![Event::EdgeDeleted { edge: id }],
                )],
            )?;
            d.commit()?;
            Ok(id)
        })
    }

    /// Wall-to-wall edge between two nodes.
    pub fn connect(
        &mut self,
        source: (NodeId, Wall),
        target: (NodeId, Wall),
    ) -> Result<EdgeId, AppError> {
        self.add_edge(
            ConnectionState::wall(source.0, source.1),
            ConnectionState::wall(target.0, target.1),
        )
    }

    /// Delete an edge. Deleting one half of a split edge deletes every half
    /// bridged to it as well.
    pub fn delete_edge(&mut self, edge: EdgeId) -> Result<(), AppError> {
        self.traced(OP_DELETE_EDGE, |d| {
            d.state.graph.require_edge(edge)?;
            let family = edge_family(&d.state.graph, edge);
            d.grouped(|d| {
                for member in &family {
                    d.remove_edge_step(*member)?;
                }
                Ok(())
            })?;
            d.prune_selection();
            d.commit()
        })
    }

    fn remove_edge_step(&mut self, edge: EdgeId) -> Result<(), AppError> {
        if self.state.graph.edge(edge).is_none() {
            return Ok(());
        }
        let record = self.state.graph.edge_record(edge)?;
        self.perform(
            vec![ActionTask::new(
                Command::RemoveEdge { edge },
                vec![Event::EdgeDeleted { edge }],
            )],
            vec![ActionTask::new(
                Command::RestoreEdge { record },
                vec![Event::EdgeAdded { edge }],
            )],
        )
    }

    /// Re-anchor one end of an edge.
    pub fn update_connection(
        &mut self,
        connection: ConnectionId,
        state: ConnectionState,
    ) -> Result<(), AppError> {
        self.traced(OP_UPDATE_CONNECTION, |d| {
            let conn = d.state.graph.require_connection(connection)?;
            let previous = conn.state();
            if previous == state {
                return Ok(());
            }
            let events: Vec<Event> = conn
                .edge()
                .map(|edge| Event::EdgeConnectionsChanged { edge })
                .into_iter()
                .collect();
            d.perform(
                vec![ActionTask::new(
                    Command::SetConnection { connection, state },
                    events.clone(),
                )],
                vec![ActionTask::new(
                    Command::SetConnection {
                        connection,
                        state: previous,
                    },
                    events,
                )],
            )?;
            d.commit()
        })
    }

    pub fn set_shape_points(&mut self, edge: EdgeId, points: Vec<Vec2>) -> Result<(), AppError> {
        self.traced(OP_SET_SHAPE_POINTS, |d| {
            let old = d.state.graph.require_edge(edge)?.shape_points.clone();
            if old == points {
                return Ok(());
            }
            let events = vec![Event::EdgeShapeChanged { edge }];
            d.perform(
                vec![ActionTask::new(
                    Command::SetShapePoints { edge, points },
                    events.clone(),
                )],
                vec![ActionTask::new(
                    Command::SetShapePoints { edge, points: old },
                    events,
                )],
            )?;
            d.commit()
        })
    }

    // ========================================================================
    // Sub-charts
    // ========================================================================

    /// Collapse (`false`) or expand (`true`) a node's content, splitting or
    /// merging the edges that cross its boundary.
    pub fn set_content_visible(&mut self, node: NodeId, visible: bool) -> Result<(), AppError> {
        self.traced(OP_SET_CONTENT_VISIBLE, |d| {
            let target = d.state.graph.require_node(node)?;
            if !target.kind.capabilities().hosts_subchart {
                return Err(AppError::NotASubChart(node));
            }
            if target.show_content == visible {
                return Ok(());
            }

            let change = d
                .state
                .graph
                .set_content_visible(node, visible, &IdPlan::default())?;
            d.state.deferred.defer(Deferred::RecalculateAll);
            d.state.deferred.defer(Deferred::RebuildIndex);
            for event in &change.events {
                d.state.bus.emit(event.clone());
            }

            let undo_events = inverse_content_events(&change, node, visible);
            d.history.push(Action::new(
                vec![ActionTask::new(
                    Command::SetContentVisible {
                        node,
                        visible: !visible,
                        plan: change.plan.clone(),
                    },
                    undo_events,
                )],
                vec![ActionTask::new(
                    Command::SetContentVisible {
                        node,
                        visible,
                        plan: change.plan,
                    },
                    change.events,
                )],
            ));
            d.prune_selection();
            d.commit()
        })
    }

    /// Make `target` the open level (`None` for the root). Navigation is not
    /// recorded in the undo log. Returns whether the level changed.
    pub fn jump_to(&mut self, target: Option<NodeId>) -> Result<bool, AppError> {
        self.traced(OP_JUMP_TO, |d| {
            if let Some(target) = target
                && !d
                    .state
                    .graph
                    .require_node(target)?
                    .kind
                    .capabilities()
                    .hosts_subchart
            {
                return Err(AppError::NotASubChart(target));
            }
            let state = &mut d.state;
            let Some(jump) =
                state
                    .navigator
                    .jump_to(&mut state.graph, &mut state.index, target, d.zoom)?
            else {
                return Ok(false);
            };
            d.zoom = jump.zoom;
            for event in jump.events {
                d.state.bus.emit(event);
            }
            d.state.deferred.defer(Deferred::RecalculateAll);
            d.state.deferred.defer(Deferred::RebuildIndex);
            if !d.selection.is_empty() {
                d.select(Vec::new());
            }
            d.settle()?;
            Ok(true)
        })
    }

    // ========================================================================
    // History
    // ========================================================================

    pub fn undo(&mut self) -> Result<bool, AppError> {
        self.traced(OP_UNDO, |d| {
            let done = d.history.undo(&mut d.state)?;
            d.leave_removed_levels()?;
            d.prune_selection();
            d.commit()?;
            Ok(done)
        })
    }

    pub fn redo(&mut self) -> Result<bool, AppError> {
        self.traced(OP_REDO, |d| {
            let done = d.history.redo(&mut d.state)?;
            d.leave_removed_levels()?;
            d.prune_selection();
            d.commit()?;
            Ok(done)
        })
    }

    /// Replayed history may remove a level the navigator is standing on.
    /// Fall back to the deepest level that still exists.
    fn leave_removed_levels(&mut self) -> Result<(), AppError> {
        let state = &mut self.state;
        let Some((removed, jump)) =
            state
                .navigator
                .retreat_to_existing(&mut state.graph, &mut state.index, self.zoom)?
        else {
            return Ok(());
        };
        self.zoom = jump.zoom;
        let cause = Event::NodeDeleted { node: removed };
        for event in jump.events {
            self.state
                .bus
                .publish(EventEnvelope::simulated(event).caused_by(cause.clone()));
        }
        self.state.deferred.defer(Deferred::RecalculateAll);
        self.state.deferred.defer(Deferred::RebuildIndex);
        if !self.selection.is_empty() {
            self.select(Vec::new());
        }
        Ok(())
    }

    // ========================================================================
    // Selection and hit testing
    // ========================================================================

    /// Replace the selection. Ids that name no live node or edge are dropped.
    pub fn select(&mut self, ids: Vec<ComponentId>) {
        let mut selected: Vec<ComponentId> = Vec::new();
        for id in ids {
            if self.component_exists(id) && !selected.contains(&id) {
                selected.push(id);
            }
        }
        self.selection = selected.clone();
        self.state.bus.emit(Event::SelectionChanged { selected });
    }

    fn component_exists(&self, id: ComponentId) -> bool {
        self.state.graph.node(NodeId(id.0)).is_some() || self.state.graph.edge(EdgeId(id.0)).is_some()
    }

    fn prune_selection(&mut self) {
        let before = self.selection.len();
        let selection = std::mem::take(&mut self.selection);
        self.selection = selection
            .into_iter()
            .filter(|id| self.component_exists(*id))
            .collect();
        if self.selection.len() != before {
            self.state.bus.emit(Event::SelectionChanged {
                selected: self.selection.clone(),
            });
        }
    }

    fn hit_tester(&self) -> HitTester<'_> {
        HitTester::new(&self.state.graph, &self.state.index, self.current_level())
            .with_radii(self.config.hit_radius, self.config.wall_radius)
    }

    pub fn hit_test(&self, at: Vec2) -> HitResult {
        self.hit_tester().hit_test(at)
    }

    pub fn node_at(&self, at: Vec2) -> Option<NodeId> {
        self.hit_tester().node_at(at)
    }

    pub fn wall_at(&self, at: Vec2) -> Option<(NodeId, Wall)> {
        self.hit_tester().wall_at(at)
    }

    pub fn nodes_in(&self, area: Rect) -> Vec<NodeId> {
        self.hit_tester().nodes_in(area)
    }

    /// Node under a pointer position given in client space.
    pub fn node_at_client(
        &self,
        transform: &impl CoordinateTransform,
        client: Vec2,
    ) -> Option<NodeId> {
        self.node_at(transform.to_diagram(client))
    }

    /// Select whatever the renderer reports at `client`, or clear the
    /// selection when it reports nothing known.
    pub fn select_at_client(
        &mut self,
        rendered: &impl RenderedHitTest,
        client: Vec2,
    ) -> Option<ComponentId> {
        let hit = rendered
            .component_at(client)
            .filter(|id| self.component_exists(*id));
        self.select(hit.into_iter().collect());
        hit
    }

    // ========================================================================
    // Clipboard and snapshots
    // ========================================================================

    pub fn copy(&self, nodes: &[NodeId]) -> GraphSnapshot {
        self.state.graph.copy_nodes(nodes)
    }

    /// Craft `snapshot` into the open level under fresh ids, shifted by
    /// `offset`, as a single undo step.
    pub fn paste(&mut self, snapshot: &GraphSnapshot, offset: Vec2) -> Result<CraftReport, AppError> {
        self.traced(OP_PASTE, |d| {
            let level = d.current_level();
            let report = d.state.graph.craft(snapshot, IdMode::Fresh, offset, level)?;
            if !report.is_complete() {
                tracing::warn!(
                    skipped_edges = report.skipped_edges.len(),
                    "pasted snapshot had dangling references"
                );
            }
            d.grouped(|d| {
                for node in &report.nodes {
                    let record = d.state.graph.node_record(*node)?;
                    let node = *node;
                    d.state.bus.emit(Event::NodeAdded { node });
                    d.history.push(Action::new(
                        vec![ActionTask::new(
                            Command::RemoveNode { node },
                            vec![Event::NodeDeleted { node }],
                        )],
                        vec![ActionTask::new(
                            Command::RestoreNode { record },
                            vec![Event::NodeAdded { node }],
                        )],
                    ));
                }
                for edge in &report.edges {
                    let record = d.state.graph.edge_record(*edge)?;
                    let edge = *edge;
                    d.state.bus.emit(Event::EdgeAdded { edge });
                    d.history.push(Action::new(
                        vec![ActionTask::new(
                            Command::RemoveEdge { edge },
                            vec![Event::EdgeDeleted { edge }],
                        )],
                        vec![ActionTask::new(
                            Command::RestoreEdge { record },
                            vec![Event::EdgeAdded { edge }],
                        )],
                    ));
                }
                Ok(())
            })?;
            d.state.deferred.defer(Deferred::RecalculateAll);
            d.state.deferred.defer(Deferred::RebuildIndex);
            d.commit()?;
            Ok(report)
        })
    }

    /// Reference-resolved copy of the whole diagram.
    pub fn snapshot(&self) -> GraphSnapshot {
        self.state.graph.copy_graph()
    }

    // ========================================================================
    // Plumbing
    // ========================================================================

    fn traced<T>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut Self) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let span = telemetry::operation_start(operation);
        let result = f(self);
        span.finish(result)
    }

    /// Coalesce every action pushed by `f` into one undo step, unless an
    /// enclosing group is already open.
    fn grouped<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let owned = !self.history.is_grouping();
        if owned {
            self.history.begin_group();
        }
        let result = f(self);
        if owned {
            self.history.end_group();
        }
        result
    }

    /// Run `redo` as a fresh user action, publish its events and archive it
    /// together with `undo`.
    fn perform(&mut self, redo: Vec<Task>, undo: Vec<Task>) -> Result<(), AppError> {
        for task in &redo {
            self.state.run(&task.command)?;
            for event in &task.events {
                self.state.bus.emit(event.clone());
            }
        }
        self.history.push(Action::new(undo, redo));
        Ok(())
    }

    fn commit(&mut self) -> Result<(), AppError> {
        self.settle()?;
        self.state.bus.emit(Event::UndoStackChanged {
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
        });
        Ok(())
    }
}

/// Negative sizes collapse to zero.
fn clamp_size(size: Vec2) -> Vec2 {
    Vec2::new(size.x.max(0.0), size.y.max(0.0))
}

fn fresh_connection(id: ConnectionId, state: ConnectionState) -> ConnectionRecord {
    ConnectionRecord {
        id,
        attach: state.attach,
        node: state.node,
        wall: state.wall,
        position: state.position,
        offset: state.offset,
        bridge_to: None,
        bridge_from: None,
    }
}

/// `edge` and every edge reachable from it through bridges: all halves of
/// one logical edge.
fn edge_family(graph: &Graph, edge: EdgeId) -> Vec<EdgeId> {
    let mut found = vec![edge];
    let mut seen = BTreeSet::from([edge]);
    let mut queue = VecDeque::from([edge]);
    while let Some(current) = queue.pop_front() {
        let Some(e) = graph.edge(current) else {
            continue;
        };
        for conn in [e.source(), e.target()] {
            let Some(conn) = graph.connection(conn) else {
                continue;
            };
            for partner in [conn.bridge_to(), conn.bridge_from()].into_iter().flatten() {
                if let Some(other) = graph.connection(partner).and_then(|p| p.edge())
                    && seen.insert(other)
                {
                    found.push(other);
                    queue.push_back(other);
                }
            }
        }
    }
    found
}

/// Events that describe undoing `change`.
fn inverse_content_events(change: &ContentChange, node: NodeId, visible: bool) -> Vec<Event> {
    let inner: BTreeSet<EdgeId> = change.plan.0.values().map(|ids| ids.inner_edge).collect();
    let toggled = Event::NodeContentToggled {
        node,
        visible: !visible,
    };
    let mut events = Vec::new();
    if visible {
        events.push(toggled.clone());
    }
    for edge in &inner {
        events.push(if visible {
            Event::EdgeAdded { edge: *edge }
        } else {
            Event::EdgeDeleted { edge: *edge }
        });
    }
    let mut seen = BTreeSet::new();
    for edge in &change.touched_edges {
        if !inner.contains(edge) && seen.insert(*edge) {
            events.push(Event::EdgeConnectionsChanged { edge: *edge });
        }
    }
    if !visible {
        events.push(toggled);
    }
    events
}
