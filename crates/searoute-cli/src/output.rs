//! Rendering of a planned route for the `route` command.

use std::fmt::Write as _;

use clap::ValueEnum;
use searoute_lib::{MissingLeg, PlannedRoute, Port, PortId, Waypoint};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Table of ports with running totals.
    #[default]
    Text,
    /// Pretty-printed JSON document.
    Json,
}

#[derive(Debug, Serialize)]
pub struct RouteSummary<'a> {
    pub start_port_id: PortId,
    pub end_port_id: PortId,
    pub path: Vec<PortId>,
    pub total_distance_nm: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vessel_speed_knots: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_travel_hours: Option<f64>,
    pub ports: &'a [Port],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waypoints: Option<&'a [Waypoint]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_legs: Option<&'a [MissingLeg]>,
    pub ports_expanded: usize,
}

impl<'a> RouteSummary<'a> {
    pub fn new(planned: &'a PlannedRoute) -> Self {
        let route = &planned.route;
        let itinerary = planned.itinerary.as_ref();
        Self {
            start_port_id: route.ports.first().map(|p| p.id).unwrap_or_default(),
            end_port_id: route.ports.last().map(|p| p.id).unwrap_or_default(),
            path: route.port_ids(),
            total_distance_nm: route.total_distance,
            vessel_speed_knots: itinerary.map(|i| i.speed_knots),
            total_travel_hours: itinerary.map(|i| i.total_hours()),
            ports: &route.ports,
            waypoints: itinerary.map(|i| i.waypoints.as_slice()),
            missing_legs: itinerary
                .map(|i| i.missing_legs.as_slice())
                .filter(|legs| !legs.is_empty()),
            ports_expanded: planned.stats.expanded,
        }
    }
}

pub fn render(planned: &PlannedRoute, format: OutputFormat) -> serde_json::Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(planned)),
        OutputFormat::Json => serde_json::to_string_pretty(&RouteSummary::new(planned)),
    }
}

fn render_text(planned: &PlannedRoute) -> String {
    let route = &planned.route;
    let mut out = String::new();
    let (Some(first), Some(last)) = (route.ports.first(), route.ports.last()) else {
        return out;
    };

    let _ = writeln!(
        out,
        "Route from {} ({}) to {} ({}): {} legs, {:.2} nm",
        first.name,
        first.id,
        last.name,
        last.id,
        route.leg_count(),
        route.total_distance
    );

    match &planned.itinerary {
        Some(itinerary) => {
            let _ = writeln!(out, "Speed: {:.2} kn", itinerary.speed_knots);
            for waypoint in &itinerary.waypoints {
                let _ = writeln!(
                    out,
                    "  {:>6}  {:<24} {:>10.2} nm {:>9.2} h",
                    waypoint.port_id,
                    waypoint.port_name,
                    waypoint.total_distance_from_start_nm,
                    waypoint.total_travel_hours_from_start
                );
            }
            let _ = writeln!(out, "Travel time: {:.2} h", itinerary.total_hours());
            for leg in &itinerary.missing_legs {
                let _ = writeln!(
                    out,
                    "Warning: no segment found for leg {} -> {}",
                    leg.from, leg.to
                );
            }
        }
        None => {
            for port in &route.ports {
                let _ = writeln!(out, "  {:>6}  {}", port.id, port.name);
            }
        }
    }
    out
}
