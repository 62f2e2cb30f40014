//! Port and segment records.
//!
//! Rows arrive from the graph data source loosely typed ([`PortRow`],
//! [`SegmentRow`]): every column is optional because the store may hold NULLs
//! or values of the wrong type. Converting a row into a [`Port`] or
//! [`Segment`] is the validation boundary; nothing downstream sees an
//! unvalidated record.

use serde::{Deserialize, Serialize};

use crate::error::RecordError;
use crate::geo::great_circle_distance;

/// Numeric identifier for a port.
pub type PortId = i64;

/// A validated port with geographic coordinates in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub id: PortId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Port {
    /// Build a port, checking coordinate ranges.
    pub fn new(
        id: PortId,
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Result<Self, RecordError> {
        check_range("latitude", latitude, 90.0)?;
        check_range("longitude", longitude, 180.0)?;
        Ok(Self {
            id,
            name: name.into(),
            latitude,
            longitude,
        })
    }
}

fn check_range(field: &'static str, value: f64, limit: f64) -> Result<(), RecordError> {
    if value.is_finite() && (-limit..=limit).contains(&value) {
        Ok(())
    } else {
        Err(RecordError::OutOfRange {
            record: "port",
            field,
            value,
        })
    }
}

/// Port row as fetched from the graph data source, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortRow {
    pub id: Option<PortId>,
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl From<&Port> for PortRow {
    fn from(port: &Port) -> Self {
        Self {
            id: Some(port.id),
            name: Some(port.name.clone()),
            latitude: Some(port.latitude),
            longitude: Some(port.longitude),
        }
    }
}

impl TryFrom<PortRow> for Port {
    type Error = RecordError;

    fn try_from(row: PortRow) -> Result<Self, Self::Error> {
        let id = require("port", "id", row.id)?;
        let name = require("port", "name", row.name)?;
        let latitude = require("port", "latitude", row.latitude)?;
        let longitude = require("port", "longitude", row.longitude)?;
        Port::new(id, name, latitude, longitude)
    }
}

/// Directed, weighted connection between two ports.
///
/// The destination port is embedded in full so the search can evaluate the
/// heuristic without another lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: i64,
    pub from_port_id: PortId,
    pub to_port_id: PortId,
    /// Length in nautical miles.
    pub distance: f64,
    pub to_port: Port,
}

impl Segment {
    /// Whether the stored distance is shorter than the great-circle distance
    /// between the endpoints, which makes the A* heuristic inadmissible for
    /// this edge.
    pub fn undercuts_great_circle(&self, from: &Port) -> bool {
        self.distance < great_circle_distance(from, &self.to_port)
    }
}

/// Segment row as fetched from the graph data source, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentRow {
    pub id: Option<i64>,
    pub from_port_id: Option<PortId>,
    pub to_port_id: Option<PortId>,
    pub distance: Option<f64>,
    pub to_port: PortRow,
}

impl SegmentRow {
    /// Build a well-formed row for a segment between two known ports.
    pub fn between(id: i64, from: PortId, to: &Port, distance: f64) -> Self {
        Self {
            id: Some(id),
            from_port_id: Some(from),
            to_port_id: Some(to.id),
            distance: Some(distance),
            to_port: PortRow::from(to),
        }
    }
}

impl TryFrom<SegmentRow> for Segment {
    type Error = RecordError;

    fn try_from(row: SegmentRow) -> Result<Self, Self::Error> {
        let id = require("segment", "id", row.id)?;
        let from_port_id = require("segment", "from_port_id", row.from_port_id)?;
        let to_port_id = require("segment", "to_port_id", row.to_port_id)?;
        let distance = require("segment", "distance", row.distance)?;
        if !distance.is_finite() || distance < 0.0 {
            return Err(RecordError::NegativeDistance {
                segment_id: id,
                distance,
            });
        }

        let to_port = Port::try_from(row.to_port)?;
        if to_port.id != to_port_id {
            return Err(RecordError::ArrivalMismatch {
                segment_id: id,
                to_port_id,
                embedded_id: to_port.id,
            });
        }

        Ok(Self {
            id,
            from_port_id,
            to_port_id,
            distance,
            to_port,
        })
    }
}

fn require<T>(
    record: &'static str,
    field: &'static str,
    value: Option<T>,
) -> Result<T, RecordError> {
    value.ok_or(RecordError::MissingField { record, field })
}
