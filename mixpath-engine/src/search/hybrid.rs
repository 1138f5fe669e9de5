//! Hybrid strategy selection
//!
//! | Situation                                          | Strategy      |
//! |----------------------------------------------------|---------------|
//! | `thorough`, or more waypoints than the GA threshold | genetic       |
//! | no waypoints, graph above `large_graph_nodes`      | bidirectional |
//! | at most one waypoint                               | dijkstra      |
//! | otherwise                                          | A* per leg    |

use super::astar::AStar;
use super::bidirectional::Bidirectional;
use super::dijkstra::Dijkstra;
use super::genetic::Genetic;
use super::{
    Algorithm, LegPlan, OptimizationLevel, PathStrategy, SearchContext, Strategy, StrategyOutcome,
};
use tracing::debug;

/// Picks a concrete strategy from request and graph shape
#[derive(Debug, Clone, Copy, Default)]
pub struct Hybrid;

impl Hybrid {
    /// Strategy the hybrid would delegate to
    pub fn select(&self, ctx: &SearchContext<'_>, plan: &LegPlan) -> Strategy {
        let waypoints = plan.waypoints.len();
        let config = ctx.config();
        let level = ctx.level();

        if level == OptimizationLevel::Thorough || waypoints > config.genetic_waypoint_threshold {
            Strategy::Genetic(Genetic)
        } else if waypoints <= 1 {
            if waypoints == 0 && ctx.graph().node_count() > config.large_graph_nodes {
                Strategy::Bidirectional(Bidirectional)
            } else {
                Strategy::Dijkstra(Dijkstra)
            }
        } else {
            Strategy::AStar(AStar)
        }
    }
}

impl PathStrategy for Hybrid {
    fn name(&self) -> Algorithm {
        Algorithm::Hybrid
    }

    fn search(&self, ctx: &mut SearchContext<'_>, plan: &LegPlan) -> StrategyOutcome {
        ctx.record_algorithm(Algorithm::Hybrid);
        let strategy = self.select(ctx, plan);
        debug!(
            selected = %strategy.name(),
            waypoints = plan.waypoints.len(),
            level = ?ctx.level(),
            nodes = ctx.graph().node_count(),
            "Hybrid strategy selected"
        );
        strategy.search(ctx, plan)
    }
}
