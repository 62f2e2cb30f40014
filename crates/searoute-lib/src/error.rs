use std::any::Any;
use std::fmt;

use thiserror::Error;

use crate::port::PortId;

/// Convenient result alias for the sea route library.
pub type Result<T> = std::result::Result<T, Error>;

/// Maximum length of a diagnostic carried by [`Error::Internal`].
pub const MAX_DIAGNOSTIC_CHARS: usize = 500;

/// Which end of a route a port id was requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Start,
    End,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Endpoint::Start => "start",
            Endpoint::End => "end",
        };
        f.write_str(value)
    }
}

/// Validation failure while turning a loosely typed row into a port or segment.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    /// A required column was NULL, absent, or of the wrong type.
    #[error("{record} record is missing or mistyped field `{field}`")]
    MissingField {
        record: &'static str,
        field: &'static str,
    },

    /// A coordinate fell outside its valid range or was not finite.
    #[error("{record} record field `{field}` out of range: {value}")]
    OutOfRange {
        record: &'static str,
        field: &'static str,
        value: f64,
    },

    /// Segment distances must be finite and non-negative.
    #[error("segment {segment_id} has invalid distance {distance}")]
    NegativeDistance { segment_id: i64, distance: f64 },

    /// The embedded arrival port does not match the segment's arrival id.
    #[error("segment {segment_id} arrives at {to_port_id} but embeds port {embedded_id}")]
    ArrivalMismatch {
        segment_id: i64,
        to_port_id: PortId,
        embedded_id: PortId,
    },
}

/// Top-level library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// The inbound request is missing fields or has fields of the wrong type.
    #[error("malformed calculation request: {reason}")]
    MalformedRequest {
        task_id: Option<String>,
        reason: String,
    },

    /// The graph data source failed or returned no data where data was required.
    #[error("graph data unavailable while trying to {operation}: {reason}")]
    GraphUnavailable {
        operation: &'static str,
        reason: String,
    },

    /// A fetched port row could not be coerced into a valid port.
    #[error("invalid port data: {0}")]
    InvalidRecord(#[from] RecordError),

    /// The start or end port is absent from the loaded port universe.
    #[error("{role} port {port_id} not found in the loaded port set")]
    EndpointNotFound { role: Endpoint, port_id: PortId },

    /// The search exhausted the open set without reaching the goal.
    #[error("no route found between ports {start_name} (ID: {start_id}) and {goal_name} (ID: {goal_id})")]
    NoRouteExists {
        start_id: PortId,
        start_name: String,
        goal_id: PortId,
        goal_name: String,
    },

    /// The result sink had no task record to update.
    #[error("calculation task {task_id} not found")]
    TaskNotFound { task_id: String },

    /// The task record already holds a terminal status and was left untouched.
    #[error("calculation task {task_id} is already {status}")]
    TaskAlreadyTerminal { task_id: String, status: String },

    /// Anything else that went wrong inside the pipeline.
    #[error("unexpected error while processing task: {message}")]
    Internal { message: String },

    /// Wrapper for SQLite errors.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// Wrapper for JSON encoding errors.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Wrapper for IO errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build an [`Error::Internal`] with its diagnostic cut to a bounded length.
    pub fn internal(message: impl AsRef<str>) -> Self {
        Error::Internal {
            message: truncate_diagnostic(message.as_ref()),
        }
    }

    /// Wrap a gateway failure so it reads as a graph availability problem.
    pub fn graph_unavailable(operation: &'static str, source: Error) -> Self {
        match source {
            already @ Error::GraphUnavailable { .. } => already,
            other => Error::GraphUnavailable {
                operation,
                reason: other.to_string(),
            },
        }
    }
}

/// Text of a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Cut a diagnostic to [`MAX_DIAGNOSTIC_CHARS`] characters on a char boundary.
pub fn truncate_diagnostic(message: &str) -> String {
    message.chars().take(MAX_DIAGNOSTIC_CHARS).collect()
}
