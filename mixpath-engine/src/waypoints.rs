//! Waypoint Resolver
//!
//! Normalizes the requested waypoints before search: duplicates and copies
//! of the start/end are dropped, every remaining waypoint is checked for at
//! least one usable transition, and unreachable ones get a reason plus a few
//! substitute suggestions. When the caller allows it, reachable waypoints are
//! reordered by cheapest insertion between start and end.

use crate::graph::TrackId;
use crate::search::dijkstra::distances_from;
use crate::search::SearchContext;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Maximum substitute suggestions per unreachable waypoint
pub const MAX_ALTERNATIVES: usize = 3;

/// Reachability verdict for one requested waypoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaypointValidation {
    pub track_id: TrackId,
    pub reachable: bool,
    /// Best compatibility over the waypoint's usable transitions (0 when none)
    pub reachability_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Similar tracks that can be reached, best first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<TrackId>,
}

/// Resolved waypoints
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaypointPlan {
    /// Reachable waypoints in visiting order
    pub ordered: Vec<usize>,
    /// One record per distinct requested waypoint (start/end excluded)
    pub validations: Vec<WaypointValidation>,
    /// Unreachable waypoints, in request order
    pub dropped: Vec<usize>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WaypointResolver;

impl WaypointResolver {
    /// Validate and order `waypoints` for a start → end search
    pub fn resolve(
        &self,
        ctx: &mut SearchContext<'_>,
        start: usize,
        end: usize,
        waypoints: &[usize],
        pinned: bool,
    ) -> WaypointPlan {
        let graph = ctx.graph();
        let mut seen = HashSet::new();
        let distinct: Vec<usize> = waypoints
            .iter()
            .copied()
            .filter(|&w| w != start && w != end && seen.insert(w))
            .collect();
        if distinct.len() < waypoints.len() {
            debug!(
                requested = waypoints.len(),
                distinct = distinct.len(),
                "Dropped duplicate or endpoint waypoints"
            );
        }

        let mut plan = WaypointPlan::default();
        let mut reachable = Vec::new();
        for &waypoint in &distinct {
            let validation = self.validate(ctx, waypoint, start, end, &distinct);
            if validation.reachable {
                reachable.push(waypoint);
            } else {
                warn!(
                    waypoint = %graph.track_at(waypoint).id,
                    reason = validation.reason.as_deref().unwrap_or_default(),
                    "Waypoint unreachable"
                );
                plan.dropped.push(waypoint);
            }
            plan.validations.push(validation);
        }

        plan.ordered = if reachable.len() > 1 && !pinned {
            cheapest_insertion(ctx, start, end, &reachable)
        } else {
            reachable
        };
        plan
    }

    fn validate(
        &self,
        ctx: &SearchContext<'_>,
        waypoint: usize,
        start: usize,
        end: usize,
        requested: &[usize],
    ) -> WaypointValidation {
        let graph = ctx.graph();
        let track_id = graph.track_at(waypoint).id.clone();

        let reason = if ctx.is_avoided(waypoint) {
            Some("track is in the avoid list".to_string())
        } else if graph.neighbors(waypoint).is_empty() {
            Some("track has no connections".to_string())
        } else {
            None
        };

        let best = match reason {
            Some(_) => None,
            None => best_compatibility(ctx, waypoint),
        };
        if let Some(score) = best {
            return WaypointValidation {
                track_id,
                reachable: true,
                reachability_score: score,
                reason: None,
                alternatives: Vec::new(),
            };
        }

        let reason = reason.unwrap_or_else(|| {
            format!(
                "no transition to or from this track satisfies profile '{}'",
                ctx.profile().name
            )
        });
        WaypointValidation {
            track_id,
            reachable: false,
            reachability_score: 0.0,
            reason: Some(reason),
            alternatives: alternatives(ctx, waypoint, start, end, requested),
        }
    }
}

/// Highest compatibility over usable transitions touching `node`, either
/// direction
fn best_compatibility(ctx: &SearchContext<'_>, node: usize) -> Option<f64> {
    ctx.graph()
        .neighbors(node)
        .iter()
        .flat_map(|adj| [ctx.transition(node, adj.node), ctx.transition(adj.node, node)])
        .flatten()
        .map(|w| w.compatibility)
        .reduce(f64::max)
}

/// Reachable tracks most similar to `waypoint`
fn alternatives(
    ctx: &SearchContext<'_>,
    waypoint: usize,
    start: usize,
    end: usize,
    requested: &[usize],
) -> Vec<TrackId> {
    let graph = ctx.graph();
    let target = graph.track_at(waypoint);
    let mut ranked: Vec<(f64, usize)> = (0..graph.node_count())
        .filter(|&n| n != waypoint && n != start && n != end && !requested.contains(&n))
        .filter(|&n| !ctx.is_avoided(n) && best_compatibility(ctx, n).is_some())
        .map(|n| (ctx.calculator().raw_similarity(target, graph.track_at(n)), n))
        .collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    ranked
        .into_iter()
        .take(MAX_ALTERNATIVES)
        .map(|(_, n)| graph.track_at(n).id.clone())
        .collect()
}

/// Build start → … → end by inserting each waypoint (request order) where it
/// adds the least cost. Pairs without a route make a slot unusable; a
/// waypoint with no usable slot goes just before the end.
fn cheapest_insertion(
    ctx: &mut SearchContext<'_>,
    start: usize,
    end: usize,
    waypoints: &[usize],
) -> Vec<usize> {
    let none = HashSet::new();
    let mut costs: HashMap<usize, HashMap<usize, f64>> = HashMap::new();
    for &source in std::iter::once(&start).chain(waypoints) {
        costs.insert(source, distances_from(ctx, source, &none));
    }
    let cost = |a: usize, b: usize| costs.get(&a).and_then(|d| d.get(&b)).copied();

    let mut tour = vec![start, end];
    for &waypoint in waypoints {
        let mut best: Option<(f64, usize)> = None;
        for slot in 1..tour.len() {
            let (prev, next) = (tour[slot - 1], tour[slot]);
            let (Some(into), Some(out)) = (cost(prev, waypoint), cost(waypoint, next)) else {
                continue;
            };
            let delta = into + out - cost(prev, next).unwrap_or(0.0);
            if best.map_or(true, |(d, _)| delta < d) {
                best = Some((delta, slot));
            }
        }
        let slot = best.map_or(tour.len() - 1, |(_, slot)| slot);
        tour.insert(slot, waypoint);
    }

    let ordered = tour[1..tour.len() - 1].to_vec();
    debug!(?ordered, "Waypoints reordered by cheapest insertion");
    ordered
}
