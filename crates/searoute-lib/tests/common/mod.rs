//! Shared fixtures for the integration tests.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Mutex;

use rusqlite::Connection;
use searoute_lib::{
    great_circle_distance, GraphGateway, MemoryGateway, Port, PortId, PortRow, ResultSink,
    Result, Segment, SegmentRow, TaskReport,
};
use tempfile::TempDir;

/// SQL script seeding the sample port network.
#[allow(dead_code)]
pub fn fixture_sql_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../docs/fixtures/ports.sql")
}

/// Temporary SQLite database seeded from the fixture script.
#[allow(dead_code)]
pub struct FixtureDb {
    _temp_dir: TempDir,
    pub path: PathBuf,
}

#[allow(dead_code)]
impl FixtureDb {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let path = temp_dir.path().join("routes.db");
        let script = std::fs::read_to_string(fixture_sql_path()).expect("read fixture script");
        Connection::open(&path)
            .expect("create database")
            .execute_batch(&script)
            .expect("seed database");
        Self {
            _temp_dir: temp_dir,
            path,
        }
    }

    pub fn execute(&self, sql: &str) {
        Connection::open(&self.path)
            .expect("open database")
            .execute_batch(sql)
            .expect("run statement");
    }
}

/// Sink keeping every report it receives.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<TaskReport>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn reports(&self) -> Vec<TaskReport> {
        self.reports.lock().expect("sink lock").clone()
    }
}

impl ResultSink for RecordingSink {
    fn report(&self, report: &TaskReport) -> Result<()> {
        self.reports.lock().expect("sink lock").push(report.clone());
        Ok(())
    }
}

/// Gateway wrapper counting segment fetches.
#[allow(dead_code)]
pub struct CountingGateway<G> {
    inner: G,
    segment_calls: AtomicUsize,
}

#[allow(dead_code)]
impl<G: GraphGateway> CountingGateway<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            segment_calls: AtomicUsize::new(0),
        }
    }

    pub fn segment_calls(&self) -> usize {
        self.segment_calls.load(AtomicOrdering::SeqCst)
    }
}

impl<G: GraphGateway> GraphGateway for CountingGateway<G> {
    fn port(&self, id: PortId) -> Result<Option<PortRow>> {
        self.inner.port(id)
    }

    fn all_ports(&self) -> Result<Vec<PortRow>> {
        self.inner.all_ports()
    }

    fn outgoing_segments(&self, port_id: PortId) -> Result<Vec<SegmentRow>> {
        self.segment_calls.fetch_add(1, AtomicOrdering::SeqCst);
        self.inner.outgoing_segments(port_id)
    }
}

/// Small deterministic generator so graph tests need no extra crates.
#[allow(dead_code)]
pub struct Lcg(u64);

#[allow(dead_code)]
impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(6364136223846793005).wrapping_add(1))
    }

    pub fn next_u32(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }

    /// Uniform value in `[low, high)`.
    pub fn range(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * (self.next_u32() as f64 / (u32::MAX as f64 + 1.0))
    }
}

/// Random directed graph whose segment distances never undercut the
/// great-circle distance, so A* must agree with Dijkstra.
#[allow(dead_code)]
pub fn random_graph(seed: u64, port_count: i64, edges_per_port: usize) -> (MemoryGateway, Vec<Port>) {
    let mut rng = Lcg::new(seed);
    let ports: Vec<Port> = (1..=port_count)
        .map(|id| {
            Port::new(
                id,
                format!("R{id}"),
                rng.range(-10.0, 10.0),
                rng.range(-10.0, 10.0),
            )
            .expect("generated coordinates are valid")
        })
        .collect();

    let mut gateway = MemoryGateway::new();
    for port in &ports {
        gateway = gateway.with_port(port.clone());
    }
    for from in &ports {
        for _ in 0..edges_per_port {
            let index = (rng.next_u32() as usize) % ports.len();
            let to = &ports[index];
            if to.id == from.id {
                continue;
            }
            let distance = great_circle_distance(from, to) * rng.range(1.0, 1.6);
            gateway = gateway.with_segment(from.id, to.id, distance);
        }
    }
    (gateway, ports)
}

#[allow(dead_code)]
pub fn universe(ports: &[Port]) -> HashMap<PortId, Port> {
    ports.iter().map(|port| (port.id, port.clone())).collect()
}

#[derive(PartialEq)]
struct Frontier(f64, PortId);

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.total_cmp(&self.0).then_with(|| other.1.cmp(&self.1))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Reference shortest distance computed with plain Dijkstra.
#[allow(dead_code)]
pub fn dijkstra_distance(gateway: &impl GraphGateway, start: PortId, goal: PortId) -> Option<f64> {
    let mut best: HashMap<PortId, f64> = HashMap::new();
    let mut heap = BinaryHeap::new();
    best.insert(start, 0.0);
    heap.push(Frontier(0.0, start));

    while let Some(Frontier(cost, node)) = heap.pop() {
        if node == goal {
            return Some(cost);
        }
        if cost > best.get(&node).copied().unwrap_or(f64::INFINITY) {
            continue;
        }
        for row in gateway.outgoing_segments(node).expect("memory gateway") {
            let Ok(segment) = Segment::try_from(row) else {
                continue;
            };
            let next = cost + segment.distance;
            if next < best.get(&segment.to_port_id).copied().unwrap_or(f64::INFINITY) {
                best.insert(segment.to_port_id, next);
                heap.push(Frontier(next, segment.to_port_id));
            }
        }
    }
    None
}
