//! Task pipeline: validate a request, load the port universe, search, enrich,
//! and hand exactly one terminal report to the result sink.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::{panic_message, truncate_diagnostic, Endpoint, Error, Result};
use crate::gateway::GraphGateway;
use crate::itinerary::{enrich_route, Itinerary};
use crate::path::{AStarSearch, Route, SearchStats};
use crate::port::{Port, PortId, SegmentRow};
use crate::task::{ResultSink, TaskReport, TaskRequest, TaskStatus};

/// Pipeline stage of a single task. Stages only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskStage {
    Received,
    Validating,
    LoadingGraph,
    Searching,
    Enriching,
    Reporting,
    Completed,
    Failed,
}

impl fmt::Display for TaskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            TaskStage::Received => "RECEIVED",
            TaskStage::Validating => "VALIDATING",
            TaskStage::LoadingGraph => "LOADING_GRAPH",
            TaskStage::Searching => "SEARCHING",
            TaskStage::Enriching => "ENRICHING",
            TaskStage::Reporting => "REPORTING",
            TaskStage::Completed => "COMPLETED",
            TaskStage::Failed => "FAILED",
        };
        f.write_str(value)
    }
}

struct StageLog<'a> {
    task_id: &'a str,
    stage: TaskStage,
}

impl<'a> StageLog<'a> {
    fn new(task_id: &'a str) -> Self {
        Self {
            task_id,
            stage: TaskStage::Received,
        }
    }

    fn advance(&mut self, next: TaskStage) {
        debug_assert!(next > self.stage, "{} -> {}", self.stage, next);
        debug!(task_id = self.task_id, from = %self.stage, to = %next, "task stage");
        self.stage = next;
    }
}

/// Result of a successful [`TaskOrchestrator::plan`].
#[derive(Debug, Clone)]
pub struct PlannedRoute {
    pub route: Route,
    /// `None` when the request carried no usable speed.
    pub itinerary: Option<Itinerary>,
    pub stats: SearchStats,
    /// Number of ports in the loaded universe.
    pub universe_size: usize,
}

impl PlannedRoute {
    fn into_report(self, request: &TaskRequest) -> TaskReport {
        TaskReport::completed(
            request.task_id.clone(),
            self.route.port_ids(),
            self.route.total_distance,
            self.itinerary.map(|itinerary| itinerary.waypoints),
            request.vessel_speed_knots,
        )
    }
}

/// What happened to one inbound request.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed(TaskReport),
    Failed(TaskReport),
    /// The request could not be attributed to a task; nothing was reported.
    Rejected { reason: String },
}

impl TaskOutcome {
    pub fn report(&self) -> Option<&TaskReport> {
        match self {
            TaskOutcome::Completed(report) | TaskOutcome::Failed(report) => Some(report),
            TaskOutcome::Rejected { .. } => None,
        }
    }

    pub fn status(&self) -> Option<TaskStatus> {
        self.report().map(|report| report.status)
    }

    pub fn task_id(&self) -> Option<&str> {
        self.report().map(|report| report.task_id.as_str())
    }

    /// Final pipeline stage reached.
    pub fn stage(&self) -> TaskStage {
        match self {
            TaskOutcome::Completed(_) => TaskStage::Completed,
            TaskOutcome::Failed(_) | TaskOutcome::Rejected { .. } => TaskStage::Failed,
        }
    }
}

/// Runs calculation tasks against a gateway and reports to a sink.
///
/// Cheap to clone; clones share the gateway and sink.
#[derive(Clone)]
pub struct TaskOrchestrator {
    gateway: Arc<dyn GraphGateway>,
    sink: Arc<dyn ResultSink>,
}

impl TaskOrchestrator {
    pub fn new(gateway: Arc<dyn GraphGateway>, sink: Arc<dyn ResultSink>) -> Self {
        Self { gateway, sink }
    }

    /// Parse and process a raw request payload.
    pub fn process_payload(&self, payload: &Value) -> TaskOutcome {
        match TaskRequest::from_payload(payload) {
            Ok(request) => self.process(&request),
            Err(Error::MalformedRequest {
                task_id: Some(task_id),
                reason,
            }) => {
                let speed = payload.get("vessel_speed_knots").and_then(Value::as_f64);
                let error = Error::MalformedRequest {
                    task_id: Some(task_id.clone()),
                    reason,
                };
                warn!(task_id = %task_id, %error, "rejecting malformed request");
                self.deliver(TaskReport::failed(
                    task_id,
                    speed,
                    truncate_diagnostic(&error.to_string()),
                ))
            }
            Err(error) => {
                warn!(%error, "dropping request without a usable task id");
                TaskOutcome::Rejected {
                    reason: error.to_string(),
                }
            }
        }
    }

    /// Process a validated request and report its terminal status.
    ///
    /// A panic while planning is caught here and reported as an internal
    /// failure.
    pub fn process(&self, request: &TaskRequest) -> TaskOutcome {
        info!(
            task_id = %request.task_id,
            start = request.start_port_id,
            end = request.end_port_id,
            speed = ?request.vessel_speed_knots,
            "processing calculation task"
        );

        let planned = panic::catch_unwind(AssertUnwindSafe(|| self.plan(request)))
            .unwrap_or_else(|payload| {
                Err(Error::internal(format!(
                    "task panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });

        let report = match planned {
            Ok(planned) => {
                info!(
                    task_id = %request.task_id,
                    distance = planned.route.total_distance,
                    legs = planned.route.leg_count(),
                    expanded = planned.stats.expanded,
                    "route calculated"
                );
                planned.into_report(request)
            }
            Err(error) => {
                warn!(task_id = %request.task_id, %error, "calculation task failed");
                TaskReport::failed(
                    request.task_id.clone(),
                    request.vessel_speed_knots,
                    truncate_diagnostic(&error.to_string()),
                )
            }
        };

        self.deliver(report)
    }

    /// Report an unexpected failure that happened outside [`Self::process`],
    /// such as a panic in the worker running it.
    pub fn report_internal_failure(
        &self,
        task_id: &str,
        vessel_speed_knots: Option<f64>,
        diagnostic: &str,
    ) -> TaskOutcome {
        let error = Error::internal(diagnostic);
        error!(task_id, %error, "calculation task aborted");
        self.deliver(TaskReport::failed(
            task_id,
            vessel_speed_knots,
            truncate_diagnostic(&error.to_string()),
        ))
    }

    /// Compute the route and itinerary for `request` without reporting.
    pub fn plan(&self, request: &TaskRequest) -> Result<PlannedRoute> {
        plan_route(self.gateway.as_ref(), request)
    }

    fn deliver(&self, report: TaskReport) -> TaskOutcome {
        debug!(task_id = %report.task_id, stage = %TaskStage::Reporting, status = %report.status, "task stage");
        match self.sink.report(&report) {
            Ok(()) => {}
            Err(error @ Error::TaskAlreadyTerminal { .. }) => {
                warn!(task_id = %report.task_id, status = %report.status, %error, "task already finished; report discarded");
            }
            Err(error) => {
                error!(task_id = %report.task_id, status = %report.status, %error, "failed to persist task report");
            }
        }
        match report.status {
            TaskStatus::Completed => TaskOutcome::Completed(report),
            _ => TaskOutcome::Failed(report),
        }
    }
}

/// Load the port universe, search, and enrich for one request.
///
/// Endpoints are checked against the gateway before the universe is loaded,
/// and again against the validated universe.
pub fn plan_route(gateway: &dyn GraphGateway, request: &TaskRequest) -> Result<PlannedRoute> {
    let mut stages = StageLog::new(&request.task_id);
    stages.advance(TaskStage::Validating);
    stages.advance(TaskStage::LoadingGraph);

    require_endpoint(gateway, Endpoint::Start, request.start_port_id)?;
    require_endpoint(gateway, Endpoint::End, request.end_port_id)?;
    let ports = load_universe(gateway)?;

    let start = ports
        .get(&request.start_port_id)
        .ok_or(Error::EndpointNotFound {
            role: Endpoint::Start,
            port_id: request.start_port_id,
        })?;
    let goal = ports
        .get(&request.end_port_id)
        .ok_or(Error::EndpointNotFound {
            role: Endpoint::End,
            port_id: request.end_port_id,
        })?;

    stages.advance(TaskStage::Searching);
    let mut search = AStarSearch::new(start, goal, &ports);
    let route = search
        .run(|id| segments(gateway, id))?
        .ok_or_else(|| Error::NoRouteExists {
            start_id: start.id,
            start_name: start.name.clone(),
            goal_id: goal.id,
            goal_name: goal.name.clone(),
        })?;

    stages.advance(TaskStage::Enriching);
    let itinerary = enrich_route(&route.ports, request.vessel_speed_knots, |id| {
        segments(gateway, id)
    })?;

    Ok(PlannedRoute {
        route,
        itinerary,
        stats: search.stats(),
        universe_size: ports.len(),
    })
}

fn require_endpoint(gateway: &dyn GraphGateway, role: Endpoint, port_id: PortId) -> Result<()> {
    let row = gateway
        .port(port_id)
        .map_err(|error| Error::graph_unavailable("fetch endpoint port", error))?;
    match row {
        Some(_) => Ok(()),
        None => Err(Error::EndpointNotFound { role, port_id }),
    }
}

fn load_universe(gateway: &dyn GraphGateway) -> Result<HashMap<PortId, Port>> {
    let rows = gateway
        .all_ports()
        .map_err(|error| Error::graph_unavailable("load ports", error))?;
    if rows.is_empty() {
        return Err(Error::GraphUnavailable {
            operation: "load ports",
            reason: "port table returned no rows".to_string(),
        });
    }

    let mut ports = HashMap::with_capacity(rows.len());
    for row in rows {
        let port = Port::try_from(row)?;
        ports.insert(port.id, port);
    }
    debug!(ports = ports.len(), "port universe loaded");
    Ok(ports)
}

fn segments(gateway: &dyn GraphGateway, port_id: PortId) -> Result<Vec<SegmentRow>> {
    gateway
        .outgoing_segments(port_id)
        .map_err(|error| Error::graph_unavailable("fetch outgoing segments", error))
}

impl fmt::Debug for TaskOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskOrchestrator").finish_non_exhaustive()
    }
}
