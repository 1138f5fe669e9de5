//! Bidirectional Dijkstra
//!
//! A forward search from the start over outgoing transition costs and a
//! backward search from the end over incoming transition costs, expanding
//! whichever frontier is smaller. `μ` holds the cheapest start→end cost seen
//! through any node labelled by both sides; the search stops once the two
//! frontier minima together reach `μ`.
//!
//! Length limits are not tracked here: when the result is longer than the
//! leg allows, the leg is re-run with the depth-bounded Dijkstra kernel.

use super::dijkstra::{shortest_leg, LegPath, LegQuery, LegResult};
use super::{legs, Algorithm, LegPlan, PathStrategy, SearchContext, StrategyOutcome};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Frontier {
    cost: f64,
    node: usize,
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost.total_cmp(&other.cost).then_with(|| self.node.cmp(&other.node))
    }
}

#[derive(Debug, Default)]
struct Side {
    dist: HashMap<usize, f64>,
    parent: HashMap<usize, usize>,
    settled: HashSet<usize>,
    heap: BinaryHeap<Reverse<Frontier>>,
}

impl Side {
    fn rooted_at(node: usize) -> Self {
        let mut side = Side::default();
        side.dist.insert(node, 0.0);
        side.heap.push(Reverse(Frontier { cost: 0.0, node }));
        side
    }

    fn top(&mut self) -> f64 {
        while let Some(Reverse(entry)) = self.heap.peek() {
            if self.settled.contains(&entry.node) {
                self.heap.pop();
            } else {
                return entry.cost;
            }
        }
        f64::INFINITY
    }

    fn chain(&self, mut node: usize) -> Vec<usize> {
        let mut nodes = vec![node];
        while let Some(&p) = self.parent.get(&node) {
            nodes.push(p);
            node = p;
        }
        nodes
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// Bidirectional search for one leg
pub fn bidirectional_leg(ctx: &mut SearchContext<'_>, query: &LegQuery<'_>) -> LegResult {
    if query.from == query.to {
        return shortest_leg(ctx, query);
    }
    if query.excluded.contains(&query.to) {
        return LegResult::Unreachable;
    }

    let graph = ctx.graph();
    let mut forward = Side::rooted_at(query.from);
    let mut backward = Side::rooted_at(query.to);
    let mut mu = f64::INFINITY;
    let mut meeting: Option<usize> = None;

    loop {
        let (top_f, top_b) = (forward.top(), backward.top());
        // An exhausted side has final labels; the other continues alone
        let done = match (top_f.is_finite(), top_b.is_finite()) {
            (true, true) => top_f + top_b >= mu,
            (true, false) => top_f >= mu,
            (false, true) => top_b >= mu,
            (false, false) => true,
        };
        if done {
            break;
        }
        let direction = if top_b.is_infinite()
            || (top_f.is_finite() && forward.heap.len() <= backward.heap.len())
        {
            Direction::Forward
        } else {
            Direction::Backward
        };

        let entry = {
            let side = match direction {
                Direction::Forward => &mut forward,
                Direction::Backward => &mut backward,
            };
            let Some(Reverse(entry)) = side.heap.pop() else {
                break;
            };
            if !side.settled.insert(entry.node) {
                continue;
            }
            entry
        };

        if let Some(termination) = ctx.tick() {
            let tentative = meeting.and_then(|m| join(ctx, &forward, &backward, m));
            return LegResult::Stopped { termination, tentative };
        }

        let (side, other) = match direction {
            Direction::Forward => (&mut forward, &backward),
            Direction::Backward => (&mut backward, &forward),
        };

        for adj in graph.neighbors(entry.node) {
            let next = adj.node;
            let (from, to) = match direction {
                Direction::Forward => (entry.node, next),
                Direction::Backward => (next, entry.node),
            };
            if !query.allows_step(from, to) || side.settled.contains(&next) {
                continue;
            }
            if (direction == Direction::Forward && next == query.from)
                || (direction == Direction::Backward && next == query.to)
            {
                continue;
            }
            let Some(weight) = ctx.transition(from, to) else {
                continue;
            };
            let cost = entry.cost + weight.cost;
            if side.dist.get(&next).map_or(true, |&d| cost < d) {
                side.dist.insert(next, cost);
                side.parent.insert(next, entry.node);
                side.heap.push(Reverse(Frontier { cost, node: next }));
                if let Some(&other_cost) = other.dist.get(&next) {
                    if cost + other_cost < mu {
                        mu = cost + other_cost;
                        meeting = Some(next);
                    }
                }
            }
        }
    }

    match meeting.and_then(|m| join(ctx, &forward, &backward, m)) {
        Some(leg) if query.max_nodes.is_some_and(|m| leg.nodes.len() > m) => {
            debug!(
                length = leg.nodes.len(),
                max_nodes = ?query.max_nodes,
                "Bidirectional path too long, re-running depth-bounded"
            );
            shortest_leg(ctx, query)
        }
        Some(leg) => LegResult::Found(leg),
        None if meeting.is_some() => shortest_leg(ctx, query),
        None => LegResult::Unreachable,
    }
}

/// Forward chain to `meeting` followed by backward chain to the end
///
/// `None` when the two chains overlap (possible with zero-cost edges).
fn join(
    ctx: &SearchContext<'_>,
    forward: &Side,
    backward: &Side,
    meeting: usize,
) -> Option<LegPath> {
    let mut nodes = forward.chain(meeting);
    nodes.reverse();
    nodes.extend(backward.chain(meeting).into_iter().skip(1));

    let mut seen = HashSet::with_capacity(nodes.len());
    if !nodes.iter().all(|n| seen.insert(*n)) {
        return None;
    }
    let cost = ctx.path_cost(&nodes)?;
    Some(LegPath { nodes, cost })
}

/// Bidirectional Dijkstra, leg by leg
#[derive(Debug, Clone, Copy, Default)]
pub struct Bidirectional;

impl PathStrategy for Bidirectional {
    fn name(&self) -> Algorithm {
        Algorithm::Bidirectional
    }

    fn search(&self, ctx: &mut SearchContext<'_>, plan: &LegPlan) -> StrategyOutcome {
        ctx.record_algorithm(Algorithm::Bidirectional);
        debug!(
            start = plan.start,
            end = plan.end,
            waypoints = plan.waypoints.len(),
            "Bidirectional search"
        );
        legs::run_legs(ctx, plan, bidirectional_leg)
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

    fn grid(n: usize) -> TrackGraph {
        // n x n grid with unit weights and slowly rising tempo
        let id = |r: usize, c: usize| format!("r{r:02}c{c:02}");
        let mut tracks = Vec::new();
        let mut edges = Vec::new();
        for r in 0..n {
            for c in 0..n {
                let bpm = 120.0 + (r + c) as f64 * 0.5;
                tracks.push(Track::new(id(r, c), bpm, "8A".parse().unwrap(), 0.5, 240.0));
                if c + 1 < n {
                    let weight = 1.0 + ((r * 7 + c) % 3) as f64 * 0.25;
                    edges.push(BaseEdge::new(id(r, c), id(r, c + 1), weight));
                }
                if r + 1 < n {
                    let weight = 1.0 + ((c * 5 + r) % 4) as f64 * 0.25;
                    edges.push(BaseEdge::new(id(r, c), id(r + 1, c), weight));
                }
            }
        }
        TrackGraph::new(tracks, edges).unwrap()
    }

    fn context<'g>(graph: &'g TrackGraph, config: &'g EngineConfig) -> SearchContext<'g> {
        SearchContext::new(
            graph,
            WeightCalculator::new(ConstraintProfile::default()),
            EdgeFilter::default(),
            config,
            SearchControl::default(),
        )
    }

    #[test]
    fn test_matches_dijkstra_cost() {
        let graph = grid(6);
        let config = EngineConfig::default();
        let excluded = HashSet::new();
        let end = graph.node_count() - 1;
        let query = LegQuery::new(0, end, &excluded);

        let mut a = context(&graph, &config);
        let mut b = context(&graph, &config);
        let (LegResult::Found(d), LegResult::Found(bi)) =
            (shortest_leg(&mut a, &query), bidirectional_leg(&mut b, &query))
        else {
            panic!("both searches should find a path");
        };
        assert!((d.cost - bi.cost).abs() < 1e-9);
        assert_eq!(bi.nodes.first(), Some(&0));
        assert_eq!(bi.nodes.last(), Some(&end));
    }

    #[test]
    fn test_length_limit_falls_back() {
        let graph = grid(4);
        let config = EngineConfig::default();
        let excluded = HashSet::new();
        let end = graph.node_count() - 1;
        // Corner to corner needs 7 tracks on a 4x4 grid
        let query = LegQuery::new(0, end, &excluded).with_max_nodes(Some(6));
        let mut ctx = context(&graph, &config);
        assert_eq!(bidirectional_leg(&mut ctx, &query), LegResult::Unreachable);

        let query = LegQuery::new(0, end, &excluded).with_max_nodes(Some(7));
        match bidirectional_leg(&mut ctx, &query) {
            LegResult::Found(leg) => assert_eq!(leg.nodes.len(), 7),
            other => panic!("expected path, got {other:?}"),
        }
    }

    #[test]
    fn test_disconnected() {
        let graph = TrackGraph::new(
            vec![
                Track::new("a", 120.0, "8A".parse().unwrap(), 0.5, 240.0),
                Track::new("b", 120.0, "8A".parse().unwrap(), 0.5, 240.0),
            ],
            vec![],
        )
        .unwrap();
        let config = EngineConfig::default();
        let excluded = HashSet::new();
        let mut ctx = context(&graph, &config);
        assert_eq!(
            bidirectional_leg(&mut ctx, &LegQuery::new(0, 1, &excluded)),
            LegResult::Unreachable
        );
    }
}
