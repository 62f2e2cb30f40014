//! Concurrent task dispatch.
//!
//! Each request becomes its own tokio task, and the pipeline itself runs on
//! the blocking pool so searches never stall intake. The orchestrator already
//! turns planning panics into FAILED reports; a panic that still escapes (for
//! example from the result sink) is contained here and reported once more
//! when the request carried a task id.

use std::fmt;

use searoute_lib::{panic_message, TaskOrchestrator, TaskOutcome};
use serde_json::Value;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, warn};

/// Tally of processed requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub completed: usize,
    pub failed: usize,
    pub rejected: usize,
}

impl DispatchSummary {
    pub fn total(&self) -> usize {
        self.completed + self.failed + self.rejected
    }

    fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Completed(_) => self.completed += 1,
            TaskOutcome::Failed(_) => self.failed += 1,
            TaskOutcome::Rejected { .. } => self.rejected += 1,
        }
    }
}

impl fmt::Display for DispatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed {} requests: {} completed, {} failed, {} rejected",
            self.total(),
            self.completed,
            self.failed,
            self.rejected
        )
    }
}

pub struct Dispatcher {
    orchestrator: TaskOrchestrator,
    in_flight: JoinSet<TaskOutcome>,
    summary: DispatchSummary,
}

impl Dispatcher {
    pub fn new(orchestrator: TaskOrchestrator) -> Self {
        Self {
            orchestrator,
            in_flight: JoinSet::new(),
            summary: DispatchSummary::default(),
        }
    }

    /// Start processing `payload` in the background.
    pub fn submit(&mut self, payload: Value) {
        let orchestrator = self.orchestrator.clone();
        self.in_flight.spawn(run_task(orchestrator, payload));
    }

    /// Count a request that never reached the orchestrator.
    pub fn reject(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%reason, "request rejected at intake");
        self.summary.record(&TaskOutcome::Rejected { reason });
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Collect tasks that already finished without waiting for the rest.
    pub fn reap_finished(&mut self) {
        while let Some(joined) = self.in_flight.try_join_next() {
            self.collect(joined);
        }
    }

    /// Wait for every in-flight task and return the final tally.
    pub async fn drain(mut self) -> DispatchSummary {
        if !self.in_flight.is_empty() {
            debug!(in_flight = self.in_flight.len(), "draining in-flight tasks");
        }
        while let Some(joined) = self.in_flight.join_next().await {
            self.collect(joined);
        }
        self.summary
    }

    fn collect(&mut self, joined: Result<TaskOutcome, JoinError>) {
        match joined {
            Ok(outcome) => self.summary.record(&outcome),
            Err(error) => {
                // run_task handles pipeline panics itself; this only fires if
                // the wrapper task dies.
                error!(%error, "dispatch task aborted");
                self.summary.failed += 1;
            }
        }
    }
}

async fn run_task(orchestrator: TaskOrchestrator, payload: Value) -> TaskOutcome {
    let task_id = payload
        .get("task_id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .map(str::to_owned);
    let speed = payload.get("vessel_speed_knots").and_then(Value::as_f64);

    let worker = orchestrator.clone();
    let joined = tokio::task::spawn_blocking(move || worker.process_payload(&payload)).await;
    let error = match joined {
        Ok(outcome) => return outcome,
        Err(error) => error,
    };

    let diagnostic = describe_join_error(error);
    let Some(task_id) = task_id else {
        error!(%diagnostic, "pipeline aborted for request without task id");
        return TaskOutcome::Rejected { reason: diagnostic };
    };

    tokio::task::spawn_blocking(move || {
        orchestrator.report_internal_failure(&task_id, speed, &diagnostic)
    })
    .await
    .unwrap_or_else(|error| TaskOutcome::Rejected {
        reason: describe_join_error(error),
    })
}

fn describe_join_error(error: JoinError) -> String {
    if error.is_cancelled() {
        return "task was cancelled".to_string();
    }
    format!("task panicked: {}", panic_message(error.into_panic().as_ref()))
}
