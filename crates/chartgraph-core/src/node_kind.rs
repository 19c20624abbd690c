use crate::{CoreError, Vec2};
use serde::{Deserialize, Serialize};

/// Business kind of a node. Kind-specific behaviour is looked up through
/// [`NodeKind::capabilities`] instead of being spread over the graph code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    State { name: String },
    Message { text: String },
    Event { name: String },
    Junction,
    Terminal,
    Note { text: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KindCapabilities {
    pub default_size: Vec2,
    pub circular: bool,
    /// Whether the kind may hide its content and act as a sub-chart.
    pub hosts_subchart: bool,
    /// Whether edges may attach to the kind at all.
    pub connectable: bool,
    pub export_tag: &'static str,
}

const STATE: KindCapabilities = KindCapabilities {
    default_size: Vec2 { x: 160.0, y: 80.0 },
    circular: false,
    hosts_subchart: true,
    connectable: true,
    export_tag: "state",
};

const MESSAGE: KindCapabilities = KindCapabilities {
    default_size: Vec2 { x: 140.0, y: 40.0 },
    circular: false,
    hosts_subchart: false,
    connectable: true,
    export_tag: "message",
};

const EVENT: KindCapabilities = KindCapabilities {
    default_size: Vec2 { x: 120.0, y: 40.0 },
    circular: false,
    hosts_subchart: false,
    connectable: true,
    export_tag: "event",
};

const JUNCTION: KindCapabilities = KindCapabilities {
    default_size: Vec2 { x: 15.0, y: 15.0 },
    circular: true,
    hosts_subchart: false,
    connectable: true,
    export_tag: "junction",
};

const TERMINAL: KindCapabilities = KindCapabilities {
    default_size: Vec2 { x: 20.0, y: 20.0 },
    circular: true,
    hosts_subchart: false,
    connectable: true,
    export_tag: "terminal",
};

const NOTE: KindCapabilities = KindCapabilities {
    default_size: Vec2 { x: 180.0, y: 100.0 },
    circular: false,
    hosts_subchart: false,
    connectable: false,
    export_tag: "note",
};

impl NodeKind {
    pub fn capabilities(&self) -> &'static KindCapabilities {
        match self {
            NodeKind::State { .. } => &STATE,
            NodeKind::Message { .. } => &MESSAGE,
            NodeKind::Event { .. } => &EVENT,
            NodeKind::Junction => &JUNCTION,
            NodeKind::Terminal => &TERMINAL,
            NodeKind::Note { .. } => &NOTE,
        }
    }

    pub fn export_tag(&self) -> &'static str {
        self.capabilities().export_tag
    }

    /// Human readable label, empty for kinds that carry no text.
    pub fn label(&self) -> &str {
        match self {
            NodeKind::State { name } | NodeKind::Event { name } => name,
            NodeKind::Message { text } | NodeKind::Note { text } => text,
            NodeKind::Junction | NodeKind::Terminal => "",
        }
    }

    /// Validate an export tag, as accepted by filters on the command line.
    pub fn check_tag(tag: &str) -> Result<&'static str, CoreError> {
        [STATE, MESSAGE, EVENT, JUNCTION, TERMINAL, NOTE]
            .iter()
            .map(|caps| caps.export_tag)
            .find(|known| known.eq_ignore_ascii_case(tag))
            .ok_or_else(|| CoreError::InvalidKindTag(tag.to_string()))
    }
}

impl Default for NodeKind {
    fn default() -> Self {
        NodeKind::State {
            name: String::new(),
        }
    }
}
