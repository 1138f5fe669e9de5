//! Multi-leg execution
//!
//! Chains point-to-point searches start → w1 → … → end. Each leg excludes
//! the tracks already on the path (and the end, until the final leg), so the
//! assembled path never repeats a track. A waypoint whose leg fails is
//! skipped and the next leg starts from the last reached track. When the
//! final leg fails the whole request is retried as a direct start → end leg.

use super::dijkstra::{LegQuery, LegResult};
use super::{LegPlan, SearchContext, StrategyOutcome, Termination};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Run `leg_search` for every leg of `plan`
pub fn run_legs<F>(
    ctx: &mut SearchContext<'_>,
    plan: &LegPlan,
    mut leg_search: F,
) -> StrategyOutcome
where
    F: FnMut(&mut SearchContext<'_>, &LegQuery<'_>) -> LegResult,
{
    let max_length = ctx.max_length();
    let mut path = vec![plan.start];
    let mut used: HashSet<usize> = [plan.start].into_iter().collect();
    let mut current = plan.start;

    let targets: Vec<usize> = plan
        .waypoints
        .iter()
        .copied()
        .filter(|&w| w != plan.start && w != plan.end)
        .collect();

    for (i, &waypoint) in targets.iter().enumerate() {
        if used.contains(&waypoint) {
            // Visited on an earlier leg
            continue;
        }
        let still_needed = targets[i + 1..].iter().filter(|w| !used.contains(w)).count() + 1;
        let max_nodes = max_length.map(|m| (m + 1).saturating_sub(path.len() + still_needed));

        let mut excluded = used.clone();
        excluded.remove(&current);
        excluded.insert(plan.end);

        let query = LegQuery::new(current, waypoint, &excluded).with_max_nodes(max_nodes);
        match leg_search(ctx, &query) {
            LegResult::Found(leg) => {
                debug!(
                    from = current,
                    to = waypoint,
                    tracks = leg.nodes.len(),
                    cost = leg.cost,
                    "Leg found"
                );
                append(&mut path, &mut used, &leg.nodes);
                current = waypoint;
            }
            LegResult::Unreachable => {
                warn!(from = current, waypoint, "No feasible leg to waypoint, skipping it");
            }
            LegResult::Stopped { termination, .. } => {
                return StrategyOutcome::no_path(plan, termination);
            }
        }
    }

    let mut excluded = used.clone();
    excluded.remove(&current);
    // Round trips end where they started
    excluded.remove(&plan.end);
    let max_nodes = max_length.map(|m| (m + 1).saturating_sub(path.len()));
    let query = LegQuery::new(current, plan.end, &excluded).with_max_nodes(max_nodes);

    match leg_search(ctx, &query) {
        LegResult::Found(leg) => {
            append(&mut path, &mut used, &leg.nodes);
            finish(plan, path, Termination::Completed)
        }
        LegResult::Stopped {
            termination,
            tentative: Some(leg),
        } => {
            append(&mut path, &mut used, &leg.nodes);
            finish(plan, path, termination)
        }
        LegResult::Stopped { termination, .. } => StrategyOutcome::no_path(plan, termination),
        LegResult::Unreachable if current != plan.start => {
            warn!(
                from = current,
                end = plan.end,
                "Final leg failed, retrying start to end directly"
            );
            direct(ctx, plan, &mut leg_search)
        }
        LegResult::Unreachable => StrategyOutcome::no_path(plan, Termination::Completed),
    }
}

fn direct<F>(ctx: &mut SearchContext<'_>, plan: &LegPlan, leg_search: &mut F) -> StrategyOutcome
where
    F: FnMut(&mut SearchContext<'_>, &LegQuery<'_>) -> LegResult,
{
    let excluded = HashSet::new();
    let query = LegQuery::new(plan.start, plan.end, &excluded).with_max_nodes(ctx.max_length());
    match leg_search(ctx, &query) {
        LegResult::Found(leg) => finish(plan, leg.nodes, Termination::Completed),
        LegResult::Stopped {
            termination,
            tentative: Some(leg),
        } => finish(plan, leg.nodes, termination),
        LegResult::Stopped { termination, .. } => StrategyOutcome::no_path(plan, termination),
        LegResult::Unreachable => StrategyOutcome::no_path(plan, Termination::Completed),
    }
}

fn append(path: &mut Vec<usize>, used: &mut HashSet<usize>, leg: &[usize]) {
    for &node in leg.iter().skip(1) {
        path.push(node);
        used.insert(node);
    }
}

fn finish(plan: &LegPlan, path: Vec<usize>, termination: Termination) -> StrategyOutcome {
    let (included, skipped) = classify(&path, &plan.waypoints);
    let optimal = termination == Termination::Completed && plan.waypoints.is_empty();
    StrategyOutcome {
        path: Some(path),
        included,
        skipped,
        termination,
        optimal,
    }
}

/// Split waypoints into those on `path` (in path order) and the rest
/// (in plan order)
pub(crate) fn classify(path: &[usize], waypoints: &[usize]) -> (Vec<usize>, Vec<usize>) {
    let wanted: HashSet<usize> = waypoints.iter().copied().collect();
    let on_path: HashSet<usize> = path.iter().copied().collect();
    let mut seen = HashSet::new();
    let included = path
        .iter()
        .copied()
        .filter(|n| wanted.contains(n) && seen.insert(*n))
        .collect();
    let skipped = waypoints.iter().copied().filter(|w| !on_path.contains(w)).collect();
    (included, skipped)
}
