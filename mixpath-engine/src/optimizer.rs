//! Path Optimizer
//!
//! Suggests local improvements to a found path and applies them. An
//! optimization is plain data (`PathOptimization`); applying one returns a
//! new `PathResult` and never touches the input.
//!
//! - `SwapWaypoints` exchanges two consecutive waypoints and re-routes the
//!   three legs around them
//! - `SubstituteTrack` replaces an interior non-waypoint track with a common
//!   neighbour that makes both of its transitions cheaper
//! - `RelaxConstraint` re-scores the path with one sub-constraint disabled
//!   (only when the caller allows relaxation)

use crate::error::OptimizeError;
use crate::graph::TrackId;
use crate::profile::ConstraintKind;
use crate::result::PathResult;
use crate::search::dijkstra::{shortest_leg, LegQuery, LegResult};
use crate::search::{SearchContext, COST_EPSILON};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// One local change to a path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptimizationKind {
    /// Swap the waypoints at two path positions (consecutive waypoints)
    SwapWaypoints { first: usize, second: usize },
    /// Replace the track at `position`
    SubstituteTrack { position: usize, replacement: TrackId },
    /// Re-score with one sub-constraint disabled
    RelaxConstraint { constraint: ConstraintKind },
}

/// Suggested optimization with its expected effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathOptimization {
    pub kind: OptimizationKind,
    /// Expected reduction of total weight
    pub estimated_improvement: f64,
    pub tradeoffs: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizeOptions {
    pub allow_relaxation: bool,
    pub max_passes: usize,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            allow_relaxation: false,
            max_passes: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PathOptimizer;

impl PathOptimizer {
    /// All improving optimizations for `result`, best first
    pub fn suggest(
        &self,
        ctx: &mut SearchContext<'_>,
        result: &PathResult,
        options: &OptimizeOptions,
    ) -> Vec<PathOptimization> {
        let Ok(path) = resolve_path(ctx, result) else {
            return Vec::new();
        };
        let mut suggestions = Vec::new();

        let waypoint_positions: Vec<usize> = result
            .nodes
            .iter()
            .filter(|n| n.is_waypoint)
            .map(|n| n.position)
            .collect();
        for pair in waypoint_positions.windows(2) {
            let (first, second) = (pair[0], pair[1]);
            let Ok(candidate) = swapped_path(ctx, &path, &waypoint_positions, first, second) else {
                continue;
            };
            let Some(cost) = ctx.path_cost(&candidate) else {
                continue;
            };
            let improvement = result.total_weight - cost;
            if improvement > COST_EPSILON {
                suggestions.push(PathOptimization {
                    kind: OptimizationKind::SwapWaypoints { first, second },
                    estimated_improvement: improvement,
                    tradeoffs: format!(
                        "Visits {} before {}",
                        result.nodes[second].track_id, result.nodes[first].track_id
                    ),
                });
            }
        }

        let on_path: HashSet<usize> = path.iter().copied().collect();
        for position in 1..path.len().saturating_sub(1) {
            if result.nodes[position].is_waypoint {
                continue;
            }
            if let Some((replacement, improvement)) =
                best_substitute(ctx, &path, &on_path, position)
            {
                suggestions.push(PathOptimization {
                    kind: OptimizationKind::SubstituteTrack {
                        position,
                        replacement: ctx.graph().track_at(replacement).id.clone(),
                    },
                    estimated_improvement: improvement,
                    tradeoffs: format!(
                        "Replaces {} with {}",
                        result.nodes[position].track_id,
                        ctx.graph().track_at(replacement).id
                    ),
                });
            }
        }

        if options.allow_relaxation {
            for constraint in ConstraintKind::ALL {
                if !ctx.profile().is_enabled(constraint) {
                    continue;
                }
                let relaxed = ctx.fork(ctx.profile().relaxed(constraint));
                let Some(cost) = relaxed.path_cost(&path) else {
                    continue;
                };
                let improvement = result.total_weight - cost;
                if improvement > COST_EPSILON {
                    suggestions.push(PathOptimization {
                        kind: OptimizationKind::RelaxConstraint { constraint },
                        estimated_improvement: improvement,
                        tradeoffs: format!(
                            "{} compatibility is no longer scored or enforced",
                            constraint
                        ),
                    });
                }
            }
        }

        suggestions.sort_by(|a, b| b.estimated_improvement.total_cmp(&a.estimated_improvement));
        debug!(count = suggestions.len(), "Optimization suggestions");
        suggestions
    }

    /// Result of applying `optimization` to `result`
    pub fn apply(
        &self,
        ctx: &mut SearchContext<'_>,
        result: &PathResult,
        optimization: &PathOptimization,
    ) -> Result<PathResult, OptimizeError> {
        let path = resolve_path(ctx, result)?;
        match &optimization.kind {
            OptimizationKind::SwapWaypoints { first, second } => {
                let waypoint_positions: Vec<usize> =
                    result.nodes.iter().filter(|n| n.is_waypoint).map(|n| n.position).collect();
                let candidate = swapped_path(ctx, &path, &waypoint_positions, *first, *second)?;
                rebuild(ctx, result, &candidate)
            }
            OptimizationKind::SubstituteTrack { position, replacement } => {
                let position = *position;
                if position == 0
                    || position + 1 >= path.len()
                    || result.nodes[position].is_waypoint
                {
                    return Err(OptimizeError::Stale(format!(
                        "position {} is not an interior non-waypoint track",
                        position
                    )));
                }
                let graph = ctx.graph();
                let replacement_idx = graph
                    .index_of(replacement)
                    .ok_or_else(|| OptimizeError::Stale(format!("unknown track {}", replacement)))?;
                if path.contains(&replacement_idx) {
                    return Err(OptimizeError::Stale(format!(
                        "{} is already on the path",
                        replacement
                    )));
                }
                let (prev, next) = (path[position - 1], path[position + 1]);
                for (from, to) in [(prev, replacement_idx), (replacement_idx, next)] {
                    if ctx.transition(from, to).is_none() {
                        return Err(OptimizeError::InfeasibleTransition {
                            from: graph.track_at(from).id.clone(),
                            to: graph.track_at(to).id.clone(),
                        });
                    }
                }
                let mut candidate = path.clone();
                candidate[position] = replacement_idx;
                rebuild(ctx, result, &candidate)
            }
            OptimizationKind::RelaxConstraint { constraint } => {
                if !ctx.profile().is_enabled(*constraint) {
                    return Err(OptimizeError::AlreadyRelaxed(*constraint));
                }
                let relaxed = ctx.fork(ctx.profile().relaxed(*constraint));
                let mut rescored = rebuild(&relaxed, result, &path)?;
                rescored.warnings.push(format!("{} constraint relaxed", constraint));
                Ok(rescored)
            }
        }
    }

    /// Apply the best improving suggestion up to `max_passes` times
    pub fn optimize<'g>(
        &self,
        ctx: &mut SearchContext<'g>,
        result: &PathResult,
        options: &OptimizeOptions,
    ) -> PathResult {
        let mut current = result.clone();
        let mut relaxed: Option<SearchContext<'g>> = None;
        let mut passes = 0;

        while passes < options.max_passes {
            if ctx.check_now().is_some() {
                break;
            }
            let active = match relaxed.as_mut() {
                Some(r) => r,
                None => &mut *ctx,
            };
            let Some(best) = self.suggest(active, &current, options).into_iter().next() else {
                break;
            };
            match self.apply(active, &current, &best) {
                Ok(next) => {
                    debug!(
                        pass = passes + 1,
                        kind = ?best.kind,
                        improvement = best.estimated_improvement,
                        "Applied optimization"
                    );
                    if let OptimizationKind::RelaxConstraint { constraint } = best.kind {
                        let profile = active.profile().relaxed(constraint);
                        relaxed = Some(active.fork(profile));
                    }
                    current = next;
                    passes += 1;
                }
                Err(e) => {
                    debug!(error = %e, "Best optimization could not be applied");
                    break;
                }
            }
        }

        if let Some(r) = relaxed {
            ctx.absorb(r.into_stats());
        }
        current.metadata.optimization_passes += passes;
        if passes > 0 {
            current.optimal = false;
            info!(
                passes,
                before = result.total_weight,
                after = current.total_weight,
                "Path optimized"
            );
        }
        current
    }
}

/// Node indices of a result's path
fn resolve_path(ctx: &SearchContext<'_>, result: &PathResult) -> Result<Vec<usize>, OptimizeError> {
    result
        .nodes
        .iter()
        .map(|n| {
            ctx.graph()
                .index_of(&n.track_id)
                .ok_or_else(|| OptimizeError::Stale(format!("unknown track {}", n.track_id)))
        })
        .collect()
}

/// Path with the waypoints at `first` and `second` exchanged and the legs
/// between the surrounding anchors re-routed
fn swapped_path(
    ctx: &mut SearchContext<'_>,
    path: &[usize],
    waypoint_positions: &[usize],
    first: usize,
    second: usize,
) -> Result<Vec<usize>, OptimizeError> {
    let graph = ctx.graph();
    let i = waypoint_positions
        .iter()
        .position(|&p| p == first)
        .filter(|&i| waypoint_positions.get(i + 1) == Some(&second))
        .ok_or_else(|| {
            OptimizeError::Stale(format!(
                "positions {} and {} are not consecutive waypoints",
                first, second
            ))
        })?;

    let before = if i == 0 { 0 } else { waypoint_positions[i - 1] };
    let after = waypoint_positions.get(i + 2).copied().unwrap_or(path.len() - 1);
    let (w1, w2) = (path[first], path[second]);

    let mut candidate: Vec<usize> = path[..=before].to_vec();
    let suffix = &path[after..];
    let mut used: HashSet<usize> = candidate.iter().chain(suffix).copied().collect();

    for (to, pending) in [(w2, Some(w1)), (w1, None), (path[after], None)] {
        let Some(&from) = candidate.last() else {
            break;
        };
        let mut excluded = used.clone();
        excluded.remove(&from);
        excluded.remove(&to);
        if let Some(p) = pending {
            excluded.insert(p);
        }
        match shortest_leg(ctx, &LegQuery::new(from, to, &excluded)) {
            LegResult::Found(leg) => {
                for &node in leg.nodes.iter().skip(1) {
                    candidate.push(node);
                    used.insert(node);
                }
            }
            _ => {
                return Err(OptimizeError::NoRoute {
                    from: graph.track_at(from).id.clone(),
                    to: graph.track_at(to).id.clone(),
                })
            }
        }
    }
    candidate.extend(suffix.iter().skip(1));

    if ctx.max_length().is_some_and(|m| candidate.len() > m) {
        return Err(OptimizeError::NoRoute {
            from: graph.track_at(path[before]).id.clone(),
            to: graph.track_at(path[after]).id.clone(),
        });
    }
    Ok(candidate)
}

/// Cheapest common neighbour that improves both transitions around `position`
fn best_substitute(
    ctx: &SearchContext<'_>,
    path: &[usize],
    on_path: &HashSet<usize>,
    position: usize,
) -> Option<(usize, f64)> {
    let (prev, current, next) = (path[position - 1], path[position], path[position + 1]);
    let old = ctx.transition(prev, current)?.cost + ctx.transition(current, next)?.cost;

    let mut best: Option<(usize, f64)> = None;
    for adj in ctx.graph().neighbors(prev) {
        let candidate = adj.node;
        if on_path.contains(&candidate) {
            continue;
        }
        let (Some(into), Some(out)) =
            (ctx.transition(prev, candidate), ctx.transition(candidate, next))
        else {
            continue;
        };
        let improvement = old - (into.cost + out.cost);
        if improvement > COST_EPSILON && best.map_or(true, |(_, b)| improvement > b) {
            best = Some((candidate, improvement));
        }
    }
    best
}

/// New result for `path`, keeping the request-level fields of `base`
fn rebuild(
    ctx: &SearchContext<'_>,
    base: &PathResult,
    path: &[usize],
) -> Result<PathResult, OptimizeError> {
    let graph = ctx.graph();
    let waypoints: HashSet<usize> = base
        .nodes
        .iter()
        .filter(|n| n.is_waypoint)
        .filter_map(|n| graph.index_of(&n.track_id))
        .collect();

    let mut rebuilt = PathResult::from_path(ctx, base.request_id, path, &waypoints).ok_or_else(|| {
        let (from, to) = path
            .windows(2)
            .find(|pair| ctx.transition(pair[0], pair[1]).is_none())
            .map_or((path[0], path[0]), |pair| (pair[0], pair[1]));
        OptimizeError::InfeasibleTransition {
            from: graph.track_at(from).id.clone(),
            to: graph.track_at(to).id.clone(),
        }
    })?;

    rebuilt.waypoints_included = rebuilt
        .nodes
        .iter()
        .filter(|n| n.is_waypoint)
        .map(|n| n.track_id.clone())
        .collect();
    rebuilt.waypoints_skipped = base.waypoints_skipped.clone();
    rebuilt.waypoint_validations = base.waypoint_validations.clone();
    rebuilt.warnings = base.warnings.clone();
    rebuilt.alternatives = base.alternatives.clone();
    rebuilt.metadata = crate::result::SearchMetadata {
        profile: rebuilt.metadata.profile,
        ..base.metadata.clone()
    };
    Ok(rebuilt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::graph::{BaseEdge, Track, TrackGraph};
    use crate::profile::ConstraintProfile;
    use crate::search::SearchControl;
    use crate::weight::{EdgeFilter, WeightCalculator};
    use uuid::Uuid;

    /// s - x - t with a cheaper common neighbour y of s and t;
    /// waypoints p and q hang off s and t
    fn graph() -> TrackGraph {
        let ids = ["p", "q", "s", "t", "x", "y"];
        let tracks = ids
            .iter()
            .map(|id| Track::new(*id, 120.0, "8A".parse().unwrap(), 0.5, 240.0))
            .collect();
        let edges = vec![
            BaseEdge::new("s", "x", 2.0),
            BaseEdge::new("x", "t", 2.0),
            BaseEdge::new("s", "y", 1.0),
            BaseEdge::new("y", "t", 1.0),
            BaseEdge::new("s", "q", 1.0),
            BaseEdge::new("q", "p", 1.0),
            BaseEdge::new("p", "t", 1.0),
            BaseEdge::new("s", "p", 3.0),
            BaseEdge::new("q", "t", 3.0),
        ];
        TrackGraph::new(tracks, edges).unwrap()
    }

    fn context<'g>(graph: &'g TrackGraph, config: &'g EngineConfig) -> SearchContext<'g> {
        let mut profile = ConstraintProfile::default();
        profile.mismatch_penalty = 0.0;
        SearchContext::new(
            graph,
            WeightCalculator::new(profile),
            EdgeFilter::default(),
            config,
            SearchControl::default(),
        )
    }

    fn result_for(ctx: &SearchContext<'_>, ids: &[&str], waypoints: &[&str]) -> PathResult {
        let graph = ctx.graph();
        let index = |id: &&str| graph.index_of(&(*id).into()).unwrap();
        let path: Vec<usize> = ids.iter().map(index).collect();
        let waypoints: HashSet<usize> = waypoints.iter().map(index).collect();
        PathResult::from_path(ctx, Uuid::new_v4(), &path, &waypoints).unwrap()
    }

    fn ids(result: &PathResult) -> Vec<String> {
        result.nodes.iter().map(|n| n.track_id.to_string()).collect()
    }

    #[test]
    fn test_substitute_cheaper_neighbour() {
        let graph = graph();
        let config = EngineConfig::default();
        let mut ctx = context(&graph, &config);
        let result = result_for(&ctx, &["s", "x", "t"], &[]);

        let suggestions = PathOptimizer.suggest(&mut ctx, &result, &OptimizeOptions::default());
        let best = &suggestions[0];
        assert_eq!(
            best.kind,
            OptimizationKind::SubstituteTrack {
                position: 1,
                replacement: "y".into()
            }
        );
        assert!((best.estimated_improvement - 2.0).abs() < 1e-9);

        let applied = PathOptimizer.apply(&mut ctx, &result, best).unwrap();
        assert_eq!(ids(&applied), vec!["s", "y", "t"]);
        assert!((applied.total_weight - 2.0).abs() < 1e-9);
        // Input untouched
        assert_eq!(ids(&result), vec!["s", "x", "t"]);
    }

    #[test]
    fn test_swap_waypoints() {
        let graph = graph();
        let config = EngineConfig::default();
        let mut ctx = context(&graph, &config);
        // s -> p -> q -> t costs 3 + 1 + 3; visiting q first costs 1 + 1 + 1
        let result = result_for(&ctx, &["s", "p", "q", "t"], &["p", "q"]);
        assert!((result.total_weight - 7.0).abs() < 1e-9);

        let suggestions = PathOptimizer.suggest(&mut ctx, &result, &OptimizeOptions::default());
        let swap = suggestions
            .iter()
            .find(|s| matches!(s.kind, OptimizationKind::SwapWaypoints { .. }))
            .unwrap();
        assert!((swap.estimated_improvement - 4.0).abs() < 1e-9);

        let applied = PathOptimizer.apply(&mut ctx, &result, swap).unwrap();
        assert_eq!(ids(&applied), vec!["s", "q", "p", "t"]);
        assert_eq!(applied.waypoints_included, vec![TrackId::from("q"), TrackId::from("p")]);
    }

    #[test]
    fn test_stale_substitution_rejected() {
        let graph = graph();
        let config = EngineConfig::default();
        let mut ctx = context(&graph, &config);
        let result = result_for(&ctx, &["s", "x", "t"], &[]);
        let bogus = PathOptimization {
            kind: OptimizationKind::SubstituteTrack {
                position: 0,
                replacement: "y".into(),
            },
            estimated_improvement: 1.0,
            tradeoffs: String::new(),
        };
        assert!(matches!(
            PathOptimizer.apply(&mut ctx, &result, &bogus),
            Err(OptimizeError::Stale(_))
        ));
    }

    #[test]
    fn test_relaxation_only_when_allowed() {
        let key_a = "8A".parse().unwrap();
        let key_b = "3B".parse().unwrap();
        let tracks = vec![
            Track::new("a", 120.0, key_a, 0.5, 240.0),
            Track::new("b", 120.0, key_b, 0.5, 240.0),
        ];
        let graph = TrackGraph::new(tracks, vec![BaseEdge::new("a", "b", 1.0)]).unwrap();
        let config = EngineConfig::default();
        let mut ctx = SearchContext::new(
            &graph,
            WeightCalculator::new(ConstraintProfile::default()),
            EdgeFilter::default(),
            &config,
            SearchControl::default(),
        );
        let result = result_for(&ctx, &["a", "b"], &[]);
        assert!(PathOptimizer.suggest(&mut ctx, &result, &OptimizeOptions::default()).is_empty());

        let options = OptimizeOptions {
            allow_relaxation: true,
            max_passes: 1,
        };
        let suggestions = PathOptimizer.suggest(&mut ctx, &result, &options);
        assert_eq!(
            suggestions[0].kind,
            OptimizationKind::RelaxConstraint {
                constraint: ConstraintKind::Harmonic
            }
        );

        let optimized = PathOptimizer.optimize(&mut ctx, &result, &options);
        assert_eq!(optimized.metadata.optimization_passes, 1);
        assert!(optimized.total_weight < result.total_weight);
        assert!(optimized.warnings.iter().any(|w| w.contains("harmonic")));
    }

    #[test]
    fn test_optimize_stops_without_improvement() {
        let graph = graph();
        let config = EngineConfig::default();
        let mut ctx = context(&graph, &config);
        let result = result_for(&ctx, &["s", "y", "t"], &[]);
        let optimized = PathOptimizer.optimize(&mut ctx, &result, &OptimizeOptions::default());
        assert_eq!(optimized.metadata.optimization_passes, 0);
        assert_eq!(ids(&optimized), ids(&result));
    }
}
