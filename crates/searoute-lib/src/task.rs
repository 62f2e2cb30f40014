//! Calculation task contract: inbound request, terminal report, and the sink
//! that persists it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::itinerary::Waypoint;
use crate::port::PortId;

/// Lifecycle status of a calculation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Whether the status ends the task's lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "PENDING" => Ok(TaskStatus::Pending),
            "PROCESSING" => Ok(TaskStatus::Processing),
            "COMPLETED" => Ok(TaskStatus::Completed),
            "FAILED" => Ok(TaskStatus::Failed),
            other => Err(format!("unknown task status {other}")),
        }
    }
}

/// Validated inbound calculation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task_id: String,
    pub start_port_id: PortId,
    pub end_port_id: PortId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vessel_speed_knots: Option<f64>,
}

impl TaskRequest {
    pub fn new(task_id: impl Into<String>, start_port_id: PortId, end_port_id: PortId) -> Self {
        Self {
            task_id: task_id.into(),
            start_port_id,
            end_port_id,
            vessel_speed_knots: None,
        }
    }

    pub fn with_speed(mut self, knots: f64) -> Self {
        self.vessel_speed_knots = Some(knots);
        self
    }

    /// Validate a dynamically shaped payload into a request.
    ///
    /// Port ids must be JSON integers (floats, strings, and booleans are
    /// rejected). The returned [`Error::MalformedRequest`] carries the task id
    /// whenever one could be read, so the caller can still report a failure.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        let task_id = match payload.get("task_id") {
            Some(Value::String(id)) if !id.trim().is_empty() => Some(id.clone()),
            _ => None,
        };
        let reject = |reason: String| Error::MalformedRequest {
            task_id: task_id.clone(),
            reason,
        };

        if !payload.is_object() {
            return Err(reject("payload is not a JSON object".to_string()));
        }
        let Some(id) = task_id.clone() else {
            return Err(reject("missing or empty `task_id`".to_string()));
        };

        let start_port_id = integer_field(payload, "start_port_id").map_err(&reject)?;
        let end_port_id = integer_field(payload, "end_port_id").map_err(&reject)?;
        let vessel_speed_knots = match payload.get("vessel_speed_knots") {
            None | Some(Value::Null) => None,
            Some(Value::Number(number)) => number.as_f64(),
            Some(other) => {
                return Err(reject(format!(
                    "`vessel_speed_knots` must be a number, got {other}"
                )))
            }
        };

        Ok(Self {
            task_id: id,
            start_port_id,
            end_port_id,
            vessel_speed_knots,
        })
    }
}

fn integer_field(payload: &Value, field: &str) -> std::result::Result<PortId, String> {
    match payload.get(field) {
        Some(Value::Number(number)) => number
            .as_i64()
            .ok_or_else(|| format!("`{field}` must be an integer, got {number}")),
        Some(other) => Err(format!("`{field}` must be an integer, got {other}")),
        None => Err(format!("missing `{field}`")),
    }
}

/// Terminal outcome of a task as handed to the [`ResultSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: String,
    pub status: TaskStatus,
    pub result_path: Option<Vec<PortId>>,
    pub result_distance: Option<f64>,
    pub result_waypoints_data: Option<Vec<Waypoint>>,
    pub vessel_speed_knots: Option<f64>,
    pub error_message: Option<String>,
}

impl TaskReport {
    pub fn completed(
        task_id: impl Into<String>,
        path: Vec<PortId>,
        distance: f64,
        waypoints: Option<Vec<Waypoint>>,
        vessel_speed_knots: Option<f64>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Completed,
            result_path: Some(path),
            result_distance: Some(distance),
            result_waypoints_data: waypoints,
            vessel_speed_knots,
            error_message: None,
        }
    }

    /// Failure report. The speed is kept as given so the record explains itself.
    pub fn failed(
        task_id: impl Into<String>,
        vessel_speed_knots: Option<f64>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Failed,
            result_path: None,
            result_distance: None,
            result_waypoints_data: None,
            vessel_speed_knots,
            error_message: Some(message.into()),
        }
    }
}

/// Persisted calculation task, as read back from a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub start_port_id: PortId,
    pub end_port_id: PortId,
    pub status: TaskStatus,
    pub result_path: Option<Vec<PortId>>,
    pub result_distance: Option<f64>,
    pub result_waypoints_data: Option<Vec<Waypoint>>,
    pub vessel_speed_knots: Option<f64>,
    pub error_message: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Destination for terminal task reports.
pub trait ResultSink: Send + Sync {
    /// Persist a terminal report. Callers log and drop failures.
    fn report(&self, report: &TaskReport) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_complete_request() {
        let request = TaskRequest::from_payload(&json!({
            "task_id": "abc",
            "start_port_id": 1,
            "end_port_id": 4,
            "vessel_speed_knots": 14.5
        }))
        .unwrap();
        assert_eq!(request, TaskRequest::new("abc", 1, 4).with_speed(14.5));
    }

    #[test]
    fn speed_is_optional() {
        let request = TaskRequest::from_payload(&json!({
            "task_id": "abc",
            "start_port_id": 1,
            "end_port_id": 4,
            "vessel_speed_knots": null
        }))
        .unwrap();
        assert_eq!(request.vessel_speed_knots, None);
    }

    #[test]
    fn missing_task_id_has_no_id_to_report() {
        let error = TaskRequest::from_payload(&json!({
            "start_port_id": 1,
            "end_port_id": 4
        }))
        .unwrap_err();
        assert!(matches!(error, Error::MalformedRequest { task_id: None, .. }));
    }

    #[test]
    fn blank_task_id_is_missing() {
        let error = TaskRequest::from_payload(&json!({
            "task_id": "  ",
            "start_port_id": 1,
            "end_port_id": 4
        }))
        .unwrap_err();
        assert!(matches!(error, Error::MalformedRequest { task_id: None, .. }));
    }

    #[test]
    fn non_integer_port_ids_keep_task_id() {
        for bad in [json!(1.5), json!("1"), json!(true), json!(null)] {
            let error = TaskRequest::from_payload(&json!({
                "task_id": "abc",
                "start_port_id": bad,
                "end_port_id": 4
            }))
            .unwrap_err();
            match error {
                Error::MalformedRequest { task_id, reason } => {
                    assert_eq!(task_id.as_deref(), Some("abc"));
                    assert!(reason.contains("start_port_id"), "{reason}");
                }
                other => panic!("unexpected error {other}"),
            }
        }
    }

    #[test]
    fn non_numeric_speed_is_rejected() {
        let error = TaskRequest::from_payload(&json!({
            "task_id": "abc",
            "start_port_id": 1,
            "end_port_id": 2,
            "vessel_speed_knots": "fast"
        }))
        .unwrap_err();
        assert!(error.to_string().contains("vessel_speed_knots"));
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let error = TaskRequest::from_payload(&json!([1, 2, 3])).unwrap_err();
        assert!(matches!(error, Error::MalformedRequest { task_id: None, .. }));
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Processing,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
    }

    #[test]
    fn failure_report_keeps_speed() {
        let report = TaskReport::failed("abc", Some(12.0), "boom");
        assert_eq!(report.vessel_speed_knots, Some(12.0));
        assert!(report.result_path.is_none());
        assert_eq!(report.status, TaskStatus::Failed);
    }
}
