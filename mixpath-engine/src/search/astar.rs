//! A* search
//!
//! Runs the shared best-first kernel with a lower bound on the remaining
//! cost. Every feasible transition costs at least the smallest base edge
//! weight and moves each constrained attribute by at most its threshold, so
//! the number of transitions still needed is at least
//!
//! `L(n) = max(1, ⌈keydist/allowed_key_jumps⌉, ⌈|Δbpm|/max_change⌉, ⌈|Δe|/max_energy_jump⌉)`
//!
//! (key term only in strict harmonic mode, others only when enabled) and
//! `h(n) = min_edge_weight · L(n)`, with `h(target) = 0`. `L` changes by at
//! most one per feasible transition, which makes `h` consistent.

use super::dijkstra::{search_with_heuristic, LegQuery, LegResult};
use super::{legs, Algorithm, LegPlan, PathStrategy, SearchContext, StrategyOutcome};
use crate::graph::{Track, TrackGraph};
use crate::profile::ConstraintProfile;
use tracing::debug;

// Absorbs rounding in `delta / limit` when the delta is an exact multiple
const STEP_EPSILON: f64 = 1e-9;

/// Remaining-cost lower bound toward one target
#[derive(Debug, Clone)]
pub struct Heuristic<'g> {
    graph: &'g TrackGraph,
    target: usize,
    min_step_cost: f64,
    key_jumps: Option<u8>,
    max_bpm_change: Option<f64>,
    max_energy_jump: Option<f64>,
}

impl<'g> Heuristic<'g> {
    pub fn new(graph: &'g TrackGraph, profile: &ConstraintProfile, target: usize) -> Self {
        Self {
            graph,
            target,
            min_step_cost: graph.min_edge_weight(),
            key_jumps: (profile.harmonic.enabled && profile.harmonic.strict_mode)
                .then_some(profile.harmonic.allowed_key_jumps),
            max_bpm_change: profile.tempo.enabled.then_some(profile.tempo.max_change),
            max_energy_jump: profile.energy.enabled.then_some(profile.energy.max_energy_jump),
        }
    }

    /// Lower bound on the number of transitions from `node` to the target
    pub fn min_steps(&self, node: usize) -> f64 {
        if node == self.target {
            return 0.0;
        }
        let from = self.graph.track_at(node);
        let to = self.graph.track_at(self.target);
        let mut steps = 1.0_f64;
        if let Some(jumps) = self.key_jumps {
            let distance = f64::from(from.key.distance(&to.key));
            steps = steps.max(if jumps == 0 {
                if distance > 0.0 {
                    f64::INFINITY
                } else {
                    1.0
                }
            } else {
                ceil_steps(distance, f64::from(jumps))
            });
        }
        if let Some(limit) = self.max_bpm_change {
            steps = steps.max(ceil_steps((to.bpm - from.bpm).abs(), limit));
        }
        if let Some(limit) = self.max_energy_jump {
            steps = steps.max(ceil_steps((to.energy - from.energy).abs(), limit));
        }
        steps
    }

    pub fn estimate(&self, node: usize) -> f64 {
        let steps = self.min_steps(node);
        if steps == 0.0 {
            0.0
        } else {
            self.min_step_cost * steps
        }
    }

    pub fn target(&self) -> &Track {
        self.graph.track_at(self.target)
    }
}

fn ceil_steps(delta: f64, limit: f64) -> f64 {
    (delta / limit - STEP_EPSILON).ceil().max(0.0)
}

/// A* search for one leg
pub fn astar_leg(ctx: &mut SearchContext<'_>, query: &LegQuery<'_>) -> LegResult {
    let heuristic = Heuristic::new(ctx.graph(), ctx.profile(), query.to);
    search_with_heuristic(ctx, query, |node| heuristic.estimate(node))
}

/// A*, leg by leg
#[derive(Debug, Clone, Copy, Default)]
pub struct AStar;

impl PathStrategy for AStar {
    fn name(&self) -> Algorithm {
        Algorithm::AStar
    }

    fn search(&self, ctx: &mut SearchContext<'_>, plan: &LegPlan) -> StrategyOutcome {
        ctx.record_algorithm(Algorithm::AStar);
        debug!(start = plan.start, end = plan.end, waypoints = plan.waypoints.len(), "A* search");
        legs::run_legs(ctx, plan, astar_leg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::graph::BaseEdge;
    use crate::search::dijkstra::shortest_leg;
    use crate::search::SearchControl;
    use crate::weight::{EdgeFilter, WeightCalculator};
    use std::collections::HashSet;

    fn chain_graph() -> TrackGraph {
        // A tempo ladder: each step raises BPM by 4
        let tracks = (0..8)
            .map(|i| {
                let bpm = 100.0 + 4.0 * i as f64;
                Track::new(format!("t{i}"), bpm, "8A".parse().unwrap(), 0.5, 240.0)
            })
            .collect();
        let mut edges: Vec<BaseEdge> = (0..7)
            .map(|i| BaseEdge::new(format!("t{i}"), format!("t{}", i + 1), 1.0))
            .collect();
        edges.push(BaseEdge::new("t0", "t2", 1.5));
        edges.push(BaseEdge::new("t3", "t7", 0.5));
        TrackGraph::new(tracks, edges).unwrap()
    }

    #[test]
    fn test_min_steps_counts_tempo_jumps() {
        let graph = chain_graph();
        let profile = ConstraintProfile::default();
        let heuristic = Heuristic::new(&graph, &profile, 7);
        // 28 BPM apart, 8 BPM per step
        assert_eq!(heuristic.min_steps(0), 4.0);
        // Exactly one step apart
        assert_eq!(heuristic.min_steps(5), 1.0);
        assert_eq!(heuristic.min_steps(7), 0.0);
        assert_eq!(heuristic.estimate(7), 0.0);
    }

    #[test]
    fn test_exact_multiple_does_not_overcount() {
        assert_eq!(ceil_steps(0.6, 0.3), 2.0);
        assert_eq!(ceil_steps(0.0, 0.3), 0.0);
        assert_eq!(ceil_steps(16.0, 8.0), 2.0);
    }

    #[test]
    fn test_astar_matches_dijkstra() {
        let graph = chain_graph();
        let config = EngineConfig::default();
        let excluded = HashSet::new();
        let query = LegQuery::new(0, 6, &excluded);

        let ctx_for = || {
            SearchContext::new(
                &graph,
                WeightCalculator::new(ConstraintProfile::default()),
                EdgeFilter::default(),
                &config,
                SearchControl::default(),
            )
        };

        let mut dijkstra_ctx = ctx_for();
        let mut astar_ctx = ctx_for();
        let (LegResult::Found(d), LegResult::Found(a)) =
            (shortest_leg(&mut dijkstra_ctx, &query), astar_leg(&mut astar_ctx, &query))
        else {
            panic!("both searches should find a path");
        };
        assert!((d.cost - a.cost).abs() < 1e-9);
        assert!(astar_ctx.stats().nodes_explored <= dijkstra_ctx.stats().nodes_explored);
    }
}
