use chartgraph_core::{ComponentId, EdgeId, NodeId};
use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::{Deserialize, Serialize};

pub mod deferred;
pub mod telemetry;

pub use deferred::DeferredQueue;

/// Closed vocabulary of structural changes published by the diagram engine.
///
/// Renderers and UI code subscribe to these to build, update or destroy
/// their own representation of the diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // Nodes
    NodeAdded {
        node: NodeId,
    },
    NodeDeleted {
        node: NodeId,
    },
    NodeReparented {
        node: NodeId,
        from: Option<NodeId>,
        to: Option<NodeId>,
    },
    NodeBBoxChanged {
        node: NodeId,
    },
    NodeContentToggled {
        node: NodeId,
        visible: bool,
    },

    // Edges
    EdgeAdded {
        edge: EdgeId,
    },
    EdgeDeleted {
        edge: EdgeId,
    },
    EdgeConnectionsChanged {
        edge: EdgeId,
    },
    EdgeShapeChanged {
        edge: EdgeId,
    },

    // Sub-chart navigation
    SubChartOpened {
        node: NodeId,
    },
    SubChartClosed {
        node: NodeId,
    },

    // Selection
    SelectionChanged {
        selected: Vec<ComponentId>,
    },

    // ========================================================================
    // Undo/Redo Events
    // ========================================================================
    UndoStackChanged {
        can_undo: bool,
        can_redo: bool,
    },
}

impl Event {
    /// Node the event is about, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Event::NodeAdded { node }
            | Event::NodeDeleted { node }
            | Event::NodeReparented { node, .. }
            | Event::NodeBBoxChanged { node }
            | Event::NodeContentToggled { node, .. }
            | Event::SubChartOpened { node }
            | Event::SubChartClosed { node } => Some(*node),
            _ => None,
        }
    }

    /// Edge the event is about, if any.
    pub fn edge(&self) -> Option<EdgeId> {
        match self {
            Event::EdgeAdded { edge }
            | Event::EdgeDeleted { edge }
            | Event::EdgeConnectionsChanged { edge }
            | Event::EdgeShapeChanged { edge } => Some(*edge),
            _ => None,
        }
    }
}

/// An [`Event`] together with delivery metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event: Event,
    /// Set when the event is re-emitted while replaying undo/redo history.
    pub is_restore: bool,
    /// Set when the event was produced programmatically rather than by user input.
    pub simulated: bool,
    /// The event this one was derived from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_event: Option<Box<Event>>,
}

impl EventEnvelope {
    pub fn new(event: Event) -> Self {
        Self {
            event,
            is_restore: false,
            simulated: false,
            source_event: None,
        }
    }

    pub fn restored(event: Event) -> Self {
        Self {
            event,
            is_restore: true,
            simulated: false,
            source_event: None,
        }
    }

    pub fn simulated(event: Event) -> Self {
        Self {
            event,
            is_restore: false,
            simulated: true,
            source_event: None,
        }
    }

    /// Record the event that caused this one.
    pub fn caused_by(mut self, source: Event) -> Self {
        self.source_event = Some(Box::new(source));
        self
    }
}

/// Trait for components that respond to events.
/// Implement this to receive events from the EventBus.
pub trait EventListener {
    fn handle_event(&mut self, envelope: &EventEnvelope);
}

impl<F> EventListener for F
where
    F: FnMut(&EventEnvelope),
{
    fn handle_event(&mut self, envelope: &EventEnvelope) {
        self(envelope)
    }
}

/// Synchronous publish/subscribe bus.
///
/// Listeners run inline, in registration order, before `publish` returns.
/// Channel taps receive a copy of every envelope afterwards, for consumers
/// that drain events on their own schedule.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Box<dyn EventListener>>,
    taps: Vec<Sender<EventEnvelope>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .field("taps", &self.taps.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<L: EventListener + 'static>(&mut self, listener: L) {
        self.listeners.push(Box::new(listener));
    }

    /// Open a channel that receives every envelope published from now on.
    pub fn tap(&mut self) -> Receiver<EventEnvelope> {
        let (tx, rx) = unbounded();
        self.taps.push(tx);
        rx
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn emit(&mut self, event: Event) {
        self.publish(EventEnvelope::new(event));
    }

    pub fn publish(&mut self, envelope: EventEnvelope) {
        tracing::trace!(event = ?envelope.event, restore = envelope.is_restore, "publish");
        for listener in self.listeners.iter_mut() {
            listener.handle_event(&envelope);
        }
        // Receivers that were dropped are pruned here.
        self.taps.retain(|tap| tap.send(envelope.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_listeners_run_in_registration_order() {
        let mut bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let first = Rc::clone(&seen);
        bus.subscribe(move |env: &EventEnvelope| {
            first.borrow_mut().push(("first", env.event.clone()));
        });
        let second = Rc::clone(&seen);
        bus.subscribe(move |env: &EventEnvelope| {
            second.borrow_mut().push(("second", env.event.clone()));
        });

        bus.emit(Event::NodeAdded { node: NodeId(7) });

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "first");
        assert_eq!(seen[1].0, "second");
        assert_eq!(seen[1].1, Event::NodeAdded { node: NodeId(7) });
    }

    #[test]
    fn test_tap_receives_envelopes() {
        let mut bus = EventBus::new();
        let rx = bus.tap();

        bus.emit(Event::EdgeAdded { edge: EdgeId(3) });
        bus.publish(EventEnvelope::restored(Event::EdgeDeleted { edge: EdgeId(3) }));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.event, Event::EdgeAdded { edge: EdgeId(3) });
        assert!(!first.is_restore);

        let second = rx.try_recv().unwrap();
        assert!(second.is_restore);
        assert_eq!(second.event.edge(), Some(EdgeId(3)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_tap_is_pruned() {
        let mut bus = EventBus::new();
        let rx = bus.tap();
        drop(rx);
        bus.emit(Event::NodeDeleted { node: NodeId(1) });
        assert_eq!(bus.taps.len(), 0);
    }

    #[test]
    fn test_envelope_serializes() {
        let env = EventEnvelope::simulated(Event::SubChartOpened { node: NodeId(2) });
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("SubChartOpened"));
        assert!(json.contains("\"simulated\":true"));
        assert!(!json.contains("source_event"));
    }

    #[test]
    fn test_source_event_round_trips() {
        let env = EventEnvelope::simulated(Event::SubChartOpened { node: NodeId(2) })
            .caused_by(Event::NodeDeleted { node: NodeId(5) });
        let json = serde_json::to_string(&env).unwrap();
        let back: EventEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.source_event.as_deref(), Some(&Event::NodeDeleted { node: NodeId(5) }));
        assert!(back.simulated);
    }
}
