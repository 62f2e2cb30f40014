use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::geo::great_circle_distance;
use crate::port::{Port, PortId, Segment, SegmentRow};

/// Optimal route found by the search.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// Ports from start to goal, inclusive.
    pub ports: Vec<Port>,
    /// Sum of the segment distances along `ports`, in nautical miles.
    pub total_distance: f64,
}

impl Route {
    /// Port identifiers in travel order.
    pub fn port_ids(&self) -> Vec<PortId> {
        self.ports.iter().map(|port| port.id).collect()
    }

    /// Number of legs in the route.
    pub fn leg_count(&self) -> usize {
        self.ports.len().saturating_sub(1)
    }
}

/// Counters collected while running a search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Ports popped from the open set and expanded.
    pub expanded: usize,
    /// Entries pushed onto the open set, including the start.
    pub pushed: usize,
    /// Popped entries discarded because their port was no longer open.
    pub stale_skipped: usize,
    /// Segment rows dropped because they failed validation or did not
    /// depart from the port being expanded.
    pub skipped_segments: usize,
}

/// Find the shortest route from `start` to `goal` with A*.
///
/// `ports` is the loaded port universe; segments leading outside it are
/// ignored. `neighbours` returns the raw outgoing segment rows of a port.
/// Returns `Ok(None)` when the goal is unreachable.
pub fn find_route_a_star<F>(
    start: &Port,
    goal: &Port,
    ports: &HashMap<PortId, Port>,
    neighbours: F,
) -> Result<Option<Route>>
where
    F: FnMut(PortId) -> Result<Vec<SegmentRow>>,
{
    AStarSearch::new(start, goal, ports).run(neighbours)
}

/// A* search over the port graph that keeps its counters for inspection.
pub struct AStarSearch<'a> {
    start: &'a Port,
    goal: &'a Port,
    ports: &'a HashMap<PortId, Port>,
    stats: SearchStats,
}

impl<'a> AStarSearch<'a> {
    pub fn new(start: &'a Port, goal: &'a Port, ports: &'a HashMap<PortId, Port>) -> Self {
        Self {
            start,
            goal,
            ports,
            stats: SearchStats::default(),
        }
    }

    /// Counters from the last call to [`AStarSearch::run`].
    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    /// Run the search, fetching outgoing segments through `neighbours`.
    pub fn run<F>(&mut self, mut neighbours: F) -> Result<Option<Route>>
    where
        F: FnMut(PortId) -> Result<Vec<SegmentRow>>,
    {
        self.stats = SearchStats::default();
        let start = self.start;
        let goal = self.goal;

        let mut g_score: HashMap<PortId, f64> = self
            .ports
            .keys()
            .map(|&id| (id, f64::INFINITY))
            .collect();
        let mut came_from: HashMap<PortId, Option<PortId>> = HashMap::new();
        let mut open_ids: HashSet<PortId> = HashSet::new();
        let mut queue = BinaryHeap::new();

        g_score.insert(start.id, 0.0);
        came_from.insert(start.id, None);
        open_ids.insert(start.id);
        queue.push(OpenEntry::new(start.id, great_circle_distance(start, goal)));
        self.stats.pushed += 1;

        while let Some(entry) = queue.pop() {
            if !open_ids.remove(&entry.node) {
                self.stats.stale_skipped += 1;
                continue;
            }

            let current_score = g_score.get(&entry.node).copied().unwrap_or(f64::INFINITY);
            if entry.node == goal.id {
                let ports = reconstruct_path(&came_from, goal.id, self.ports)?;
                debug!(
                    start = start.id,
                    goal = goal.id,
                    distance = current_score,
                    expanded = self.stats.expanded,
                    "route found"
                );
                return Ok(Some(Route {
                    ports,
                    total_distance: current_score,
                }));
            }

            self.stats.expanded += 1;
            let current_port = self.ports.get(&entry.node);

            for row in neighbours(entry.node)? {
                let segment = match Segment::try_from(row) {
                    Ok(segment) => segment,
                    Err(error) => {
                        warn!(port = entry.node, %error, "skipping malformed segment");
                        self.stats.skipped_segments += 1;
                        continue;
                    }
                };

                if segment.from_port_id != entry.node {
                    warn!(
                        port = entry.node,
                        segment = segment.id,
                        departs = segment.from_port_id,
                        "skipping segment departing from another port"
                    );
                    self.stats.skipped_segments += 1;
                    continue;
                }

                let next = segment.to_port_id;
                let Some(next_port) = self.ports.get(&next) else {
                    continue;
                };

                if let Some(from) = current_port {
                    if segment.undercuts_great_circle(from) {
                        debug!(
                            segment = segment.id,
                            distance = segment.distance,
                            "segment shorter than great-circle distance; heuristic may overestimate"
                        );
                    }
                }

                let tentative_g = current_score + segment.distance;
                let known = g_score.get(&next).copied().unwrap_or(f64::INFINITY);
                if tentative_g < known {
                    came_from.insert(next, Some(entry.node));
                    g_score.insert(next, tentative_g);
                    let estimate = tentative_g + great_circle_distance(next_port, goal);
                    queue.push(OpenEntry::new(next, estimate));
                    open_ids.insert(next);
                    self.stats.pushed += 1;
                }
            }
        }

        debug!(
            start = start.id,
            goal = goal.id,
            expanded = self.stats.expanded,
            "open set exhausted without reaching goal"
        );
        Ok(None)
    }
}

fn reconstruct_path(
    came_from: &HashMap<PortId, Option<PortId>>,
    goal: PortId,
    ports: &HashMap<PortId, Port>,
) -> Result<Vec<Port>> {
    let mut path = Vec::new();
    let mut current = Some(goal);
    while let Some(node) = current {
        let port = ports.get(&node).ok_or_else(|| {
            Error::internal(format!(
                "port {node} missing from the port set during path reconstruction"
            ))
        })?;
        path.push(port.clone());
        current = came_from.get(&node).copied().flatten();
    }
    path.reverse();
    Ok(path)
}

#[derive(Copy, Clone, Debug, Default)]
struct FloatOrd(f64);

impl PartialEq for FloatOrd {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq(&other.0)
    }
}

impl Eq for FloatOrd {}

impl PartialOrd for FloatOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct OpenEntry {
    node: PortId,
    estimate: FloatOrd,
}

impl OpenEntry {
    fn new(node: PortId, estimate: f64) -> Self {
        Self {
            node,
            estimate: FloatOrd(estimate),
        }
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering so BinaryHeap becomes a min-heap by f, then by id.
        other
            .estimate
            .cmp(&self.estimate)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GraphGateway, MemoryGateway};
    use crate::port::PortRow;

    fn port(id: PortId, latitude: f64, longitude: f64) -> Port {
        Port::new(id, format!("P{id}"), latitude, longitude).unwrap()
    }

    fn universe(ports: &[Port]) -> HashMap<PortId, Port> {
        ports.iter().map(|p| (p.id, p.clone())).collect()
    }

    #[test]
    fn open_entries_pop_lowest_estimate_then_lowest_id() {
        let mut heap = BinaryHeap::new();
        heap.push(OpenEntry::new(5, 2.0));
        heap.push(OpenEntry::new(3, 1.0));
        heap.push(OpenEntry::new(1, 1.0));
        heap.push(OpenEntry::new(2, 3.0));
        let order: Vec<_> = std::iter::from_fn(|| heap.pop().map(|e| e.node)).collect();
        assert_eq!(order, vec![1, 3, 5, 2]);
    }

    #[test]
    fn start_equal_to_goal_is_single_port_route() {
        let a = port(1, 0.0, 0.0);
        let ports = universe(&[a.clone()]);
        let mut calls = 0;
        let route = find_route_a_star(&a, &a, &ports, |_| {
            calls += 1;
            Ok(Vec::new())
        })
        .unwrap()
        .expect("trivial route");
        assert_eq!(route.port_ids(), vec![1]);
        assert_eq!(route.total_distance, 0.0);
        assert_eq!(calls, 0);
    }

    #[test]
    fn unreachable_goal_is_none() {
        let a = port(1, 0.0, 0.0);
        let b = port(2, 0.0, 1.0);
        let ports = universe(&[a.clone(), b.clone()]);
        let route = find_route_a_star(&a, &b, &ports, |_| Ok(Vec::new())).unwrap();
        assert!(route.is_none());
    }

    #[test]
    fn gateway_failure_propagates() {
        let a = port(1, 0.0, 0.0);
        let b = port(2, 0.0, 1.0);
        let ports = universe(&[a.clone(), b.clone()]);
        let error = find_route_a_star(&a, &b, &ports, |_| {
            Err(Error::GraphUnavailable {
                operation: "fetch segments",
                reason: "connection reset".to_string(),
            })
        })
        .expect_err("gateway error");
        assert!(matches!(error, Error::GraphUnavailable { .. }));
    }

    #[test]
    fn segments_outside_loaded_universe_are_ignored() {
        let a = port(1, 0.0, 0.0);
        let b = port(2, 0.0, 1.0);
        let c = port(3, 0.0, 2.0);
        let gateway = MemoryGateway::new()
            .with_port(a.clone())
            .with_port(b.clone())
            .with_port(c.clone())
            .with_segment(1, 2, 61.0)
            .with_segment(2, 3, 61.0)
            .with_segment(1, 3, 500.0);
        // Port 2 exists in the store but not in the filtered universe.
        let ports = universe(&[a.clone(), c.clone()]);
        let route = find_route_a_star(&a, &c, &ports, |id| gateway.outgoing_segments(id))
            .unwrap()
            .expect("direct segment");
        assert_eq!(route.port_ids(), vec![1, 3]);
        assert_eq!(route.total_distance, 500.0);
    }

    #[test]
    fn malformed_segments_are_skipped_and_counted() {
        let a = port(1, 0.0, 0.0);
        let b = port(2, 0.0, 1.0);
        let broken = SegmentRow {
            id: Some(99),
            from_port_id: Some(1),
            to_port_id: Some(2),
            distance: None,
            to_port: PortRow::from(&b),
        };
        let gateway = MemoryGateway::new()
            .with_port(a.clone())
            .with_port(b.clone())
            .with_segment_row(1, broken)
            .with_segment(1, 2, 75.0);
        let ports = universe(&[a.clone(), b.clone()]);
        let mut search = AStarSearch::new(&a, &b, &ports);
        let route = search
            .run(|id| gateway.outgoing_segments(id))
            .unwrap()
            .expect("valid segment still usable");
        assert_eq!(route.total_distance, 75.0);
        assert_eq!(search.stats().skipped_segments, 1);
    }

    #[test]
    fn segments_of_other_ports_are_not_relaxed() {
        let a = port(1, 0.0, 0.0);
        let b = port(2, 0.0, 1.0);
        let c = port(3, 0.0, 2.0);
        // Listed under port 1 but departs from port 2.
        let shortcut = SegmentRow::between(50, 2, &c, 10.0);
        let gateway = MemoryGateway::new()
            .with_port(a.clone())
            .with_port(b.clone())
            .with_port(c.clone())
            .with_segment_row(1, shortcut)
            .with_segment(1, 2, 61.0)
            .with_segment(2, 3, 61.0);
        let ports = universe(&[a.clone(), b.clone(), c.clone()]);

        let mut search = AStarSearch::new(&a, &c, &ports);
        let route = search
            .run(|id| gateway.outgoing_segments(id))
            .unwrap()
            .expect("route exists");
        assert_eq!(route.port_ids(), vec![1, 2, 3]);
        assert_eq!(route.total_distance, 122.0);
        assert_eq!(search.stats().skipped_segments, 1);
    }

    #[test]
    fn cost_improvement_pushes_duplicate_entry() {
        // S reaches X directly at a high cost and via M more cheaply. M is
        // expanded after X was first pushed, so X gets pushed twice.
        let s = port(1, 0.0, 0.0);
        let m = port(2, 0.0, 0.5);
        let x = port(3, 0.0, 1.0);
        let g = port(4, 0.0, 3.0);
        let gateway = MemoryGateway::new()
            .with_port(s.clone())
            .with_port(m.clone())
            .with_port(x.clone())
            .with_port(g.clone())
            .with_segment(1, 3, 200.0)
            .with_segment(1, 2, 31.0)
            .with_segment(2, 3, 31.0)
            .with_segment(3, 4, 121.0);
        let ports = universe(&[s.clone(), m.clone(), x.clone(), g.clone()]);

        let mut search = AStarSearch::new(&s, &g, &ports);
        let route = search
            .run(|id| gateway.outgoing_segments(id))
            .unwrap()
            .expect("route exists");

        assert_eq!(route.port_ids(), vec![1, 2, 3, 4]);
        assert!((route.total_distance - 183.0).abs() < 1e-9);
        let stats = search.stats();
        assert_eq!(stats.pushed, 5);
        // The superseded copy of X has a larger f than the goal and is never popped.
        assert_eq!(stats.stale_skipped, 0);
    }

    #[test]
    fn stale_entry_popped_before_goal_is_discarded() {
        // X is pushed twice (200 direct, 62 via M). Its stale copy has an f
        // lower than the goal's, so it is popped and must be skipped.
        let s = port(1, 0.0, 0.0);
        let m = port(2, 0.0, 0.5);
        let x = port(3, 0.0, 1.0);
        let g = port(4, 0.0, 1.0);
        let gateway = MemoryGateway::new()
            .with_port(s.clone())
            .with_port(m.clone())
            .with_port(x.clone())
            .with_port(g.clone())
            .with_segment(1, 3, 200.0)
            .with_segment(1, 2, 31.0)
            .with_segment(2, 3, 31.0)
            .with_segment(3, 4, 500.0);
        let ports = universe(&[s.clone(), m.clone(), x.clone(), g.clone()]);

        let mut search = AStarSearch::new(&s, &g, &ports);
        let route = search
            .run(|id| gateway.outgoing_segments(id))
            .unwrap()
            .expect("route exists");

        assert_eq!(route.port_ids(), vec![1, 2, 3, 4]);
        assert!((route.total_distance - 562.0).abs() < 1e-9);
        assert_eq!(search.stats().stale_skipped, 1);
    }
}
