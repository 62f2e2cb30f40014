//! Sea route calculator library entry points.
//!
//! This crate exposes the port/segment data model, the great-circle heuristic,
//! the A* search over the port graph, the itinerary enricher, and the task
//! orchestrator that ties them together behind a [`GraphGateway`] and a
//! [`ResultSink`]. Higher-level consumers (the CLI worker) should only depend
//! on the functions exported here instead of reimplementing behavior.
//!

#![deny(warnings)]

pub mod db;
pub mod error;
pub mod gateway;
pub mod geo;
pub mod itinerary;
pub mod orchestrator;
pub mod path;
pub mod port;
pub mod task;

pub use db::{ConnectionPool, SqliteGateway, SqliteTaskStore};
pub use error::{panic_message, Endpoint, Error, RecordError, Result};
pub use gateway::{GraphGateway, MemoryGateway};
pub use geo::{great_circle_distance, EARTH_RADIUS_NM};
pub use itinerary::{enrich_route, Itinerary, MissingLeg, Waypoint};
pub use orchestrator::{plan_route, PlannedRoute, TaskOrchestrator, TaskOutcome, TaskStage};
pub use path::{find_route_a_star, AStarSearch, Route, SearchStats};
pub use port::{Port, PortId, PortRow, Segment, SegmentRow};
pub use task::{ResultSink, TaskRecord, TaskReport, TaskRequest, TaskStatus};
