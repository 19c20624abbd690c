use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

const TELEMETRY_TARGET: &str = "chartgraph::events::telemetry";

/// Operation names recorded by the diagram facade.
pub const OP_ADD_NODE: &str = "AddNode";
pub const OP_MOVE_NODE: &str = "MoveNode";
pub const OP_RESIZE_NODE: &str = "ResizeNode";
pub const OP_REPARENT_NODE: &str = "ReparentNode";
pub const OP_DELETE_NODE: &str = "DeleteNode";
pub const OP_ADD_EDGE: &str = "AddEdge";
pub const OP_DELETE_EDGE: &str = "DeleteEdge";
pub const OP_UPDATE_CONNECTION: &str = "UpdateConnection";
pub const OP_SET_SHAPE_POINTS: &str = "SetShapePoints";
pub const OP_SET_CONTENT_VISIBLE: &str = "SetContentVisible";
pub const OP_JUMP_TO: &str = "JumpTo";
pub const OP_PASTE: &str = "Paste";
pub const OP_UNDO: &str = "Undo";
pub const OP_REDO: &str = "Redo";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OperationLifecycle {
    Start,
    Success,
    Failure,
}

impl fmt::Display for OperationLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "operation_start"),
            Self::Success => write!(f, "operation_success"),
            Self::Failure => write!(f, "operation_failure"),
        }
    }
}

/// A running operation. Created by [`operation_start`] and finished with
/// [`OperationSpan::success`] or [`OperationSpan::failure`].
#[derive(Debug, Clone)]
pub struct OperationSpan {
    pub operation: &'static str,
    pub correlation_id: String,
    started: Instant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationTelemetry {
    pub correlation_id: String,
    pub operation: String,
    pub lifecycle: OperationLifecycle,
    pub error_reason: Option<String>,
    pub duration_us: Option<u128>,
}

pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn operation_start(operation: &'static str) -> OperationSpan {
    let span = OperationSpan {
        operation,
        correlation_id: new_correlation_id(),
        started: Instant::now(),
    };
    debug!(
        target: TELEMETRY_TARGET,
        operation = %span.operation,
        correlation_id = %span.correlation_id,
        lifecycle = %OperationLifecycle::Start,
        "operation_start"
    );
    span
}

impl OperationSpan {
    pub fn success(self) -> OperationTelemetry {
        let duration_us = self.started.elapsed().as_micros();
        info!(
            target: TELEMETRY_TARGET,
            operation = %self.operation,
            correlation_id = %self.correlation_id,
            lifecycle = %OperationLifecycle::Success,
            duration_us,
            "operation_success"
        );
        OperationTelemetry {
            correlation_id: self.correlation_id,
            operation: self.operation.to_string(),
            lifecycle: OperationLifecycle::Success,
            error_reason: None,
            duration_us: Some(duration_us),
        }
    }

    pub fn failure(self, reason: impl fmt::Display) -> OperationTelemetry {
        let reason = reason.to_string();
        warn!(
            target: TELEMETRY_TARGET,
            operation = %self.operation,
            correlation_id = %self.correlation_id,
            lifecycle = %OperationLifecycle::Failure,
            error = %reason,
            "operation_failure"
        );
        OperationTelemetry {
            correlation_id: self.correlation_id,
            operation: self.operation.to_string(),
            lifecycle: OperationLifecycle::Failure,
            error_reason: Some(reason),
            duration_us: None,
        }
    }

    /// Finish the span from a result, passing the result through.
    pub fn finish<T, E: fmt::Display>(self, result: Result<T, E>) -> Result<T, E> {
        match &result {
            Ok(_) => {
                self.success();
            }
            Err(err) => {
                self.failure(err);
            }
        }
        result
    }
}
