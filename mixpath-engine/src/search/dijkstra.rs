//! Single-source shortest path kernel
//!
//! Binary-heap search keyed on cumulative contextual cost with lazy
//! deletion. The same loop serves Dijkstra (zero heuristic) and A*.
//!
//! # Tie-breaking
//! Among labels of equal cost the search prefers the higher harmonic score
//! of the incoming transition, then the higher energy score, then the lower
//! predecessor track id. Node indices follow track id order, so comparing
//! indices compares ids.
//!
//! # Length limits
//! With `max_nodes` set, labels are `(node, depth)` states and a node may be
//! reached at several depths; the first settled state of the target is the
//! cheapest path with at most `max_nodes` tracks.

use super::{
    legs, Algorithm, LegPlan, PathStrategy, SearchContext, StrategyOutcome, Termination,
    COST_EPSILON,
};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::debug;

/// One point-to-point search
#[derive(Debug, Clone, Copy)]
pub struct LegQuery<'a> {
    pub from: usize,
    pub to: usize,
    /// Nodes the leg may not pass through
    pub excluded: &'a HashSet<usize>,
    /// Directed edges the leg may not use
    pub blocked: Option<&'a HashSet<(usize, usize)>>,
    /// Maximum tracks in the leg, both endpoints included
    pub max_nodes: Option<usize>,
}

impl<'a> LegQuery<'a> {
    pub fn new(from: usize, to: usize, excluded: &'a HashSet<usize>) -> Self {
        Self {
            from,
            to,
            excluded,
            blocked: None,
            max_nodes: None,
        }
    }

    pub fn with_max_nodes(mut self, max_nodes: Option<usize>) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    pub fn with_blocked(mut self, blocked: &'a HashSet<(usize, usize)>) -> Self {
        self.blocked = Some(blocked);
        self
    }

    pub(crate) fn allows_step(&self, from: usize, to: usize) -> bool {
        !self.excluded.contains(&to) && !self.blocked.is_some_and(|b| b.contains(&(from, to)))
    }
}

/// A found leg
#[derive(Debug, Clone, PartialEq)]
pub struct LegPath {
    pub nodes: Vec<usize>,
    pub cost: f64,
}

/// Outcome of one point-to-point search
#[derive(Debug, Clone, PartialEq)]
pub enum LegResult {
    Found(LegPath),
    Unreachable,
    /// Search stopped early; `tentative` is the best complete leg seen so far
    Stopped {
        termination: Termination,
        tentative: Option<LegPath>,
    },
}

#[derive(Debug, Clone)]
struct Label {
    node: usize,
    depth: usize,
    cost: f64,
    harmonic: f64,
    energy: f64,
    parent: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct QueueEntry {
    priority: f64,
    harmonic: f64,
    energy: f64,
    node: usize,
    label: usize,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    // BinaryHeap pops the greatest entry: lowest priority wins
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| self.harmonic.total_cmp(&other.harmonic))
            .then_with(|| self.energy.total_cmp(&other.energy))
            .then_with(|| other.node.cmp(&self.node))
            .then_with(|| other.label.cmp(&self.label))
    }
}

/// Dijkstra search for one leg
pub fn shortest_leg(ctx: &mut SearchContext<'_>, query: &LegQuery<'_>) -> LegResult {
    search_with_heuristic(ctx, query, |_| 0.0)
}

/// Best-first search for one leg guided by `heuristic`
///
/// `heuristic` must be consistent for the result to be optimal.
pub(crate) fn search_with_heuristic<H>(
    ctx: &mut SearchContext<'_>,
    query: &LegQuery<'_>,
    heuristic: H,
) -> LegResult
where
    H: Fn(usize) -> f64,
{
    if query.from == query.to {
        return LegResult::Found(LegPath {
            nodes: vec![query.from],
            cost: 0.0,
        });
    }
    if query.max_nodes.is_some_and(|m| m < 2) || query.excluded.contains(&query.to) {
        return LegResult::Unreachable;
    }

    let graph = ctx.graph();
    let bounded = query.max_nodes.is_some();
    let key = |node: usize, depth: usize| if bounded { (node, depth) } else { (node, 0) };

    let mut labels = vec![Label {
        node: query.from,
        depth: 1,
        cost: 0.0,
        harmonic: 1.0,
        energy: 1.0,
        parent: None,
    }];
    let mut best: HashMap<(usize, usize), usize> = HashMap::new();
    let mut settled: HashSet<(usize, usize)> = HashSet::new();
    let mut heap = BinaryHeap::new();
    let mut target_best: Option<usize> = None;

    best.insert(key(query.from, 1), 0);
    heap.push(QueueEntry {
        priority: heuristic(query.from),
        harmonic: 1.0,
        energy: 1.0,
        node: query.from,
        label: 0,
    });

    while let Some(entry) = heap.pop() {
        let (node, depth, cost) = {
            let label = &labels[entry.label];
            (label.node, label.depth, label.cost)
        };
        let state = key(node, depth);
        if best.get(&state) != Some(&entry.label) || !settled.insert(state) {
            continue;
        }

        if let Some(termination) = ctx.tick() {
            let tentative = target_best.map(|i| reconstruct(&labels, i));
            return LegResult::Stopped { termination, tentative };
        }

        if node == query.to {
            return LegResult::Found(reconstruct(&labels, entry.label));
        }
        if query.max_nodes.is_some_and(|m| depth >= m) {
            continue;
        }

        for adj in graph.neighbors(node) {
            let next = adj.node;
            if !query.allows_step(node, next) || next == query.from {
                continue;
            }
            if bounded && on_chain(&labels, entry.label, next) {
                continue;
            }
            let Some(weight) = ctx.transition_via(node, *adj) else {
                continue;
            };

            let next_cost = cost + weight.cost;
            let next_state = key(next, depth + 1);
            if settled.contains(&next_state) {
                continue;
            }
            let candidate = Label {
                node: next,
                depth: depth + 1,
                cost: next_cost,
                harmonic: weight.scores.harmonic,
                energy: weight.scores.energy,
                parent: Some(entry.label),
            };
            let improves = match best.get(&next_state) {
                None => true,
                Some(&current) => preferred(&candidate, &labels[current], node, &labels),
            };
            if !improves {
                continue;
            }

            let index = labels.len();
            labels.push(candidate);
            best.insert(next_state, index);
            if next == query.to && target_best.map_or(true, |t| next_cost < labels[t].cost) {
                target_best = Some(index);
            }
            heap.push(QueueEntry {
                priority: next_cost + heuristic(next),
                harmonic: weight.scores.harmonic,
                energy: weight.scores.energy,
                node: next,
                label: index,
            });
        }
    }

    LegResult::Unreachable
}

/// Whether `candidate` (reached from `via`) beats the current label
fn preferred(candidate: &Label, current: &Label, via: usize, labels: &[Label]) -> bool {
    if candidate.cost < current.cost - COST_EPSILON {
        return true;
    }
    if candidate.cost > current.cost + COST_EPSILON {
        return false;
    }
    let current_via = current.parent.map(|p| labels[p].node).unwrap_or(usize::MAX);
    candidate
        .harmonic
        .total_cmp(&current.harmonic)
        .then_with(|| candidate.energy.total_cmp(&current.energy))
        .then_with(|| current_via.cmp(&via))
        == Ordering::Greater
}

fn on_chain(labels: &[Label], mut index: usize, node: usize) -> bool {
    loop {
        let label = &labels[index];
        if label.node == node {
            return true;
        }
        match label.parent {
            Some(parent) => index = parent,
            None => return false,
        }
    }
}

fn reconstruct(labels: &[Label], index: usize) -> LegPath {
    let cost = labels[index].cost;
    let mut nodes = Vec::with_capacity(labels[index].depth);
    let mut cursor = Some(index);
    while let Some(i) = cursor {
        nodes.push(labels[i].node);
        cursor = labels[i].parent;
    }
    nodes.reverse();
    LegPath { nodes, cost }
}

/// One-to-all shortest costs from `source` (unbounded length)
///
/// Stops early when the request is cancelled; costs found so far are
/// returned.
pub fn distances_from(
    ctx: &mut SearchContext<'_>,
    source: usize,
    excluded: &HashSet<usize>,
) -> HashMap<usize, f64> {
    let graph = ctx.graph();
    let mut dist: HashMap<usize, f64> = HashMap::new();
    let mut settled: HashSet<usize> = HashSet::new();
    let mut heap = BinaryHeap::new();

    dist.insert(source, 0.0);
    heap.push(QueueEntry {
        priority: 0.0,
        harmonic: 1.0,
        energy: 1.0,
        node: source,
        label: 0,
    });

    while let Some(entry) = heap.pop() {
        if !settled.insert(entry.node) {
            continue;
        }
        if ctx.tick().is_some() {
            break;
        }
        for adj in graph.neighbors(entry.node) {
            if excluded.contains(&adj.node) || settled.contains(&adj.node) {
                continue;
            }
            let Some(weight) = ctx.transition_via(entry.node, *adj) else {
                continue;
            };
            let cost = entry.priority + weight.cost;
            if dist.get(&adj.node).map_or(true, |&d| cost < d) {
                dist.insert(adj.node, cost);
                heap.push(QueueEntry {
                    priority: cost,
                    harmonic: weight.scores.harmonic,
                    energy: weight.scores.energy,
                    node: adj.node,
                    label: 0,
                });
            }
        }
    }

    dist.retain(|node, _| settled.contains(node));
    dist
}

/// Plain Dijkstra, leg by leg
#[derive(Debug, Clone, Copy, Default)]
pub struct Dijkstra;

impl PathStrategy for Dijkstra {
    fn name(&self) -> Algorithm {
        Algorithm::Dijkstra
    }

    fn search(&self, ctx: &mut SearchContext<'_>, plan: &LegPlan) -> StrategyOutcome {
        ctx.record_algorithm(Algorithm::Dijkstra);
        debug!(
            start = plan.start,
            end = plan.end,
            waypoints = plan.waypoints.len(),
            "Dijkstra search"
        );
        legs::run_legs(ctx, plan, shortest_leg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::graph::{BaseEdge, Track, TrackGraph};
    use crate::profile::ConstraintProfile;
    use crate::search::SearchControl;
    use crate::weight::{EdgeFilter, WeightCalculator};

    fn track(id: &str, key: &str) -> Track {
        Track::new(id, 120.0, key.parse().unwrap(), 0.5, 240.0)
    }

    /// a-b 2, b-c 1, a-c 5, c-d 1, b-d 1 (b-d blocked under strict harmonic)
    fn scenario() -> TrackGraph {
        TrackGraph::new(
            vec![
                track("a", "8A"),
                track("b", "9A"),
                track("c", "9A"),
                track("d", "10A"),
                track("e", "3B"),
            ],
            vec![
                BaseEdge::new("a", "b", 2.0),
                BaseEdge::new("b", "c", 1.0),
                BaseEdge::new("a", "c", 5.0),
                BaseEdge::new("c", "d", 1.0),
                BaseEdge::new("b", "e", 1.0),
                BaseEdge::new("e", "d", 0.5),
            ],
        )
        .unwrap()
    }

    fn strict() -> ConstraintProfile {
        let mut profile = ConstraintProfile::default();
        profile.harmonic.strict_mode = true;
        profile.harmonic.allowed_key_jumps = 1;
        // Costs equal base weights
        profile.mismatch_penalty = 0.0;
        profile
    }

    fn context<'g>(
        graph: &'g TrackGraph,
        config: &'g EngineConfig,
        profile: ConstraintProfile,
    ) -> SearchContext<'g> {
        SearchContext::new(
            graph,
            WeightCalculator::new(profile),
            EdgeFilter::default(),
            config,
            SearchControl::default(),
        )
    }

    #[test]
    fn test_shortest_leg_avoids_infeasible_shortcut() {
        let graph = scenario();
        let config = EngineConfig::default();
        let mut ctx = context(&graph, &config, strict());
        let excluded = HashSet::new();
        match shortest_leg(&mut ctx, &LegQuery::new(0, 3, &excluded)) {
            LegResult::Found(leg) => {
                assert_eq!(leg.nodes, vec![0, 1, 2, 3]);
                assert!((leg.cost - 4.0).abs() < 1e-9);
            }
            other => panic!("expected path, got {other:?}"),
        }
        assert!(ctx.stats().nodes_explored >= 4);
    }

    #[test]
    fn test_excluded_nodes_are_skipped() {
        let graph = scenario();
        let config = EngineConfig::default();
        let mut ctx = context(&graph, &config, strict());
        let excluded: HashSet<usize> = [1].into_iter().collect();
        match shortest_leg(&mut ctx, &LegQuery::new(0, 3, &excluded)) {
            LegResult::Found(leg) => assert_eq!(leg.nodes, vec![0, 2, 3]),
            other => panic!("expected path, got {other:?}"),
        }
    }

    #[test]
    fn test_max_nodes_prefers_shorter_path() {
        let graph = scenario();
        let config = EngineConfig::default();
        let mut ctx = context(&graph, &config, strict());
        let excluded = HashSet::new();
        let query = LegQuery::new(0, 3, &excluded).with_max_nodes(Some(3));
        match shortest_leg(&mut ctx, &query) {
            LegResult::Found(leg) => {
                assert_eq!(leg.nodes, vec![0, 2, 3]);
                assert!((leg.cost - 6.0).abs() < 1e-9);
            }
            other => panic!("expected path, got {other:?}"),
        }

        let too_short = LegQuery::new(0, 3, &excluded).with_max_nodes(Some(2));
        assert_eq!(shortest_leg(&mut ctx, &too_short), LegResult::Unreachable);
    }

    #[test]
    fn test_blocked_edges() {
        let graph = scenario();
        let config = EngineConfig::default();
        let mut ctx = context(&graph, &config, strict());
        let excluded = HashSet::new();
        let blocked: HashSet<(usize, usize)> = [(2, 3)].into_iter().collect();
        let query = LegQuery::new(0, 3, &excluded).with_blocked(&blocked);
        assert_eq!(shortest_leg(&mut ctx, &query), LegResult::Unreachable);
    }

    #[test]
    fn test_equal_cost_prefers_better_harmonic() {
        // Two routes of equal cost to d: via b (9A -> 8A, distance 1) and
        // via c (3B -> 8A, distance 6)
        let graph = TrackGraph::new(
            vec![track("a", "8A"), track("b", "9A"), track("c", "3B"), track("d", "8A")],
            vec![
                BaseEdge::new("a", "b", 1.0),
                BaseEdge::new("a", "c", 1.0),
                BaseEdge::new("b", "d", 1.0),
                BaseEdge::new("c", "d", 1.0),
            ],
        )
        .unwrap();
        let mut profile = ConstraintProfile::default();
        profile.mismatch_penalty = 0.0;
        let config = EngineConfig::default();
        let mut ctx = context(&graph, &config, profile);
        let excluded = HashSet::new();
        match shortest_leg(&mut ctx, &LegQuery::new(0, 3, &excluded)) {
            LegResult::Found(leg) => assert_eq!(leg.nodes, vec![0, 1, 3]),
            other => panic!("expected path, got {other:?}"),
        }
    }

    #[test]
    fn test_distances_from() {
        let graph = scenario();
        let config = EngineConfig::default();
        let mut ctx = context(&graph, &config, strict());
        let dist = distances_from(&mut ctx, 0, &HashSet::new());
        assert_eq!(dist.get(&0), Some(&0.0));
        assert!((dist[&3] - 4.0).abs() < 1e-9);
        // e (3B) is unreachable under strict harmonic
        assert!(!dist.contains_key(&4));
    }
}
