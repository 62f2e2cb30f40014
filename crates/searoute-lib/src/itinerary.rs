//! Per-waypoint distance and travel time along a computed route.
//!
//! The search does not keep edge weights along the reconstructed path, so the
//! enricher asks the gateway again for the outgoing segments of each leg's
//! departure port. A leg whose segment can no longer be found contributes
//! nothing and is reported in [`Itinerary::missing_legs`]; the task still
//! completes.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::port::{Port, PortId, Segment, SegmentRow};

/// Enriched itinerary entry for one port of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub port_id: PortId,
    pub port_name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Distance of the leg arriving at this port.
    pub segment_distance_nm: f64,
    /// Travel time of the leg arriving at this port.
    pub segment_travel_hours: f64,
    pub total_distance_from_start_nm: f64,
    pub total_travel_hours_from_start: f64,
}

impl Waypoint {
    fn departure(port: &Port) -> Self {
        Self {
            port_id: port.id,
            port_name: port.name.clone(),
            latitude: port.latitude,
            longitude: port.longitude,
            segment_distance_nm: 0.0,
            segment_travel_hours: 0.0,
            total_distance_from_start_nm: 0.0,
            total_travel_hours_from_start: 0.0,
        }
    }
}

/// Leg of a route whose segment could not be located during enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingLeg {
    pub from: PortId,
    pub to: PortId,
}

/// Waypoints for a route travelled at a fixed speed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Itinerary {
    pub speed_knots: f64,
    pub waypoints: Vec<Waypoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_legs: Vec<MissingLeg>,
}

impl Itinerary {
    /// Cumulative distance at the final waypoint.
    pub fn total_distance(&self) -> f64 {
        self.waypoints
            .last()
            .map(|w| w.total_distance_from_start_nm)
            .unwrap_or(0.0)
    }

    /// Cumulative travel time at the final waypoint.
    pub fn total_hours(&self) -> f64 {
        self.waypoints
            .last()
            .map(|w| w.total_travel_hours_from_start)
            .unwrap_or(0.0)
    }

    /// Whether every leg was resolved to a segment.
    pub fn is_complete(&self) -> bool {
        self.missing_legs.is_empty()
    }
}

/// Whether a speed permits enrichment: present, finite, and strictly positive.
pub fn usable_speed(speed_knots: Option<f64>) -> Option<f64> {
    speed_knots.filter(|speed| speed.is_finite() && *speed > 0.0)
}

/// Compute per-leg and cumulative distance/time for `route`.
///
/// Returns `Ok(None)` when no usable speed is supplied. `neighbours` is
/// queried once per leg with the leg's departure port.
pub fn enrich_route<F>(
    route: &[Port],
    speed_knots: Option<f64>,
    mut neighbours: F,
) -> Result<Option<Itinerary>>
where
    F: FnMut(PortId) -> Result<Vec<SegmentRow>>,
{
    let Some(speed) = usable_speed(speed_knots) else {
        return Ok(None);
    };

    let mut waypoints: Vec<Waypoint> = Vec::with_capacity(route.len());
    let mut missing_legs = Vec::new();

    for (index, port) in route.iter().enumerate() {
        let mut waypoint = Waypoint::departure(port);

        if let Some(previous) = index.checked_sub(1).and_then(|i| waypoints.get(i)) {
            let from = &route[index - 1];
            waypoint.total_distance_from_start_nm = previous.total_distance_from_start_nm;
            waypoint.total_travel_hours_from_start = previous.total_travel_hours_from_start;

            match leg_segment(neighbours(from.id)?, from.id, port.id) {
                Some(segment) => {
                    let hours = segment.distance / speed;
                    waypoint.segment_distance_nm = segment.distance;
                    waypoint.segment_travel_hours = hours;
                    waypoint.total_distance_from_start_nm += segment.distance;
                    waypoint.total_travel_hours_from_start += hours;
                }
                None => {
                    warn!(
                        from = from.id,
                        from_name = %from.name,
                        to = port.id,
                        to_name = %port.name,
                        "segment for route leg not found; leg contributes no distance"
                    );
                    missing_legs.push(MissingLeg {
                        from: from.id,
                        to: port.id,
                    });
                }
            }
        }

        waypoints.push(waypoint);
    }

    Ok(Some(Itinerary {
        speed_knots: speed,
        waypoints,
        missing_legs,
    }))
}

/// Pick the segment for a leg. Parallel segments resolve to the shortest,
/// which is the one the search relaxed through.
fn leg_segment(rows: Vec<SegmentRow>, from: PortId, to: PortId) -> Option<Segment> {
    rows.into_iter()
        .filter(|row| row.from_port_id == Some(from) && row.to_port_id == Some(to))
        .filter_map(|row| match Segment::try_from(row) {
            Ok(segment) => Some(segment),
            Err(error) => {
                warn!(from, to, %error, "skipping malformed segment during enrichment");
                None
            }
        })
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
}
