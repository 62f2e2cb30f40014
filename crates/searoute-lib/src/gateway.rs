//! Graph data gateway abstraction.
//!
//! The orchestrator and the enricher only ever talk to a [`GraphGateway`].
//! Implementations must be safe to share between concurrently running tasks;
//! consistency between consecutive reads is the implementation's business.

use std::collections::{BTreeMap, HashMap};

use crate::error::Result;
use crate::port::{Port, PortId, PortRow, SegmentRow};

/// Supplies port rows and outgoing segment rows on demand.
pub trait GraphGateway: Send + Sync {
    /// Fetch a single port row, or `None` when the id is unknown.
    fn port(&self, id: PortId) -> Result<Option<PortRow>>;

    /// Fetch every port row, ordered by id.
    fn all_ports(&self) -> Result<Vec<PortRow>>;

    /// Fetch the segments departing from `port_id`, each embedding its
    /// arrival port.
    fn outgoing_segments(&self, port_id: PortId) -> Result<Vec<SegmentRow>>;
}

/// Immutable in-memory graph snapshot.
///
/// Holds raw rows so callers can exercise the same validation path as a
/// database-backed gateway, including deliberately malformed rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    ports: BTreeMap<PortId, PortRow>,
    segments: HashMap<PortId, Vec<SegmentRow>>,
    next_segment_id: i64,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a port.
    pub fn with_port(mut self, port: Port) -> Self {
        self.ports.insert(port.id, PortRow::from(&port));
        self
    }

    /// Add a raw port row keyed by `id`, bypassing validation.
    pub fn with_port_row(mut self, id: PortId, row: PortRow) -> Self {
        self.ports.insert(id, row);
        self
    }

    /// Add a directed segment between two ports already present.
    ///
    /// A segment whose arrival port is not in the table is not recorded,
    /// matching the inner join a database-backed gateway performs.
    pub fn with_segment(mut self, from: PortId, to: PortId, distance: f64) -> Self {
        let Some(to_port) = self.ports.get(&to).cloned() else {
            return self;
        };
        self.next_segment_id += 1;
        let row = SegmentRow {
            id: Some(self.next_segment_id),
            from_port_id: Some(from),
            to_port_id: Some(to),
            distance: Some(distance),
            to_port,
        };
        self.segments.entry(from).or_default().push(row);
        self
    }

    /// Add a raw segment row departing from `from`, bypassing validation.
    pub fn with_segment_row(mut self, from: PortId, row: SegmentRow) -> Self {
        self.segments.entry(from).or_default().push(row);
        self
    }

    /// Drop a port from the port table while leaving its segments in place.
    pub fn without_port(mut self, id: PortId) -> Self {
        self.ports.remove(&id);
        self
    }

    /// Remove every segment from `from` to `to`.
    pub fn without_segment(mut self, from: PortId, to: PortId) -> Self {
        if let Some(rows) = self.segments.get_mut(&from) {
            rows.retain(|row| row.to_port_id != Some(to));
        }
        self
    }

    /// Number of ports held.
    pub fn port_count(&self) -> usize {
        self.ports.len()
    }
}

impl GraphGateway for MemoryGateway {
    fn port(&self, id: PortId) -> Result<Option<PortRow>> {
        Ok(self.ports.get(&id).cloned())
    }

    fn all_ports(&self) -> Result<Vec<PortRow>> {
        Ok(self.ports.values().cloned().collect())
    }

    fn outgoing_segments(&self, port_id: PortId) -> Result<Vec<SegmentRow>> {
        Ok(self.segments.get(&port_id).cloned().unwrap_or_default())
    }
}
