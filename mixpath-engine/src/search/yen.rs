//! K shortest simple paths (Yen's algorithm)
//!
//! Candidates come from spur searches with the Dijkstra kernel: for every
//! prefix of the last accepted path, the edges that accepted paths take out
//! of the spur node are blocked and the prefix is excluded. With a non-zero
//! `diversity` a larger pool of cheapest paths is collected first and then
//! re-ranked greedily: each next path minimizes
//! `cost · (1 + diversity · max Jaccard overlap)` against the paths already
//! chosen.

use super::dijkstra::{shortest_leg, LegPath, LegQuery, LegResult};
use super::{Algorithm, SearchContext, Termination};
use std::collections::HashSet;
use tracing::debug;

/// Pool size multiplier when re-ranking for diversity
const DIVERSITY_POOL_FACTOR: usize = 3;

/// Accepted paths plus how the search ended
#[derive(Debug, Clone, PartialEq)]
pub struct KShortest {
    pub paths: Vec<LegPath>,
    pub termination: Termination,
}

/// Up to `k` loopless start → end paths, best first
pub fn k_shortest_paths(
    ctx: &mut SearchContext<'_>,
    start: usize,
    end: usize,
    k: usize,
    diversity: f64,
) -> KShortest {
    ctx.record_algorithm(Algorithm::Dijkstra);
    let max_length = ctx.max_length();
    let none = HashSet::new();

    let query = LegQuery::new(start, end, &none).with_max_nodes(max_length);
    let first = match shortest_leg(ctx, &query) {
        LegResult::Found(leg) => leg,
        LegResult::Unreachable => {
            return KShortest {
                paths: Vec::new(),
                termination: Termination::Completed,
            }
        }
        LegResult::Stopped { termination, tentative } => {
            return KShortest {
                paths: tentative.into_iter().collect(),
                termination,
            }
        }
    };

    let pool_size = if diversity > 0.0 { k.saturating_mul(DIVERSITY_POOL_FACTOR) } else { k };
    let mut accepted = vec![first];
    let mut candidates: Vec<LegPath> = Vec::new();
    let mut termination = Termination::Completed;

    'outer: while accepted.len() < pool_size {
        let last = accepted[accepted.len() - 1].nodes.clone();
        for i in 0..last.len().saturating_sub(1) {
            let spur = last[i];
            let root = &last[..=i];

            let blocked: HashSet<(usize, usize)> = accepted
                .iter()
                .chain(candidates.iter())
                .filter(|p| p.nodes.len() > i + 1 && p.nodes[..=i] == *root)
                .map(|p| (p.nodes[i], p.nodes[i + 1]))
                .collect();
            let excluded: HashSet<usize> = root[..i].iter().copied().collect();
            let max_nodes = max_length.map(|m| m.saturating_sub(i));

            let query = LegQuery::new(spur, end, &excluded)
                .with_blocked(&blocked)
                .with_max_nodes(max_nodes);
            let spur_path = match shortest_leg(ctx, &query) {
                LegResult::Found(leg) => leg,
                LegResult::Unreachable => continue,
                LegResult::Stopped { termination: stop, .. } => {
                    termination = stop;
                    break 'outer;
                }
            };

            let mut nodes = root[..i].to_vec();
            nodes.extend(spur_path.nodes);
            let Some(cost) = ctx.path_cost(&nodes) else {
                continue;
            };
            let known = accepted.iter().chain(candidates.iter()).any(|p| p.nodes == nodes);
            if !known {
                candidates.push(LegPath { nodes, cost });
            }
        }

        let Some(next) = pick(&candidates, &[], 0.0) else {
            break;
        };
        accepted.push(candidates.swap_remove(next));
    }

    let paths = if diversity > 0.0 { rerank(accepted, k, diversity) } else { accepted };
    debug!(
        requested = k,
        found = paths.len(),
        pool_size,
        diversity,
        "K shortest paths finished"
    );
    KShortest { paths, termination }
}

/// Greedy diversity-aware selection of `k` paths; the cheapest always leads
fn rerank(mut pool: Vec<LegPath>, k: usize, diversity: f64) -> Vec<LegPath> {
    let mut chosen = Vec::with_capacity(k.min(pool.len()));
    while chosen.len() < k {
        let Some(next) = pick(&pool, &chosen, diversity) else {
            break;
        };
        chosen.push(pool.swap_remove(next));
    }
    chosen
}

/// Index of the best remaining candidate
fn pick(candidates: &[LegPath], accepted: &[LegPath], diversity: f64) -> Option<usize> {
    let score = |p: &LegPath| {
        let overlap = accepted.iter().map(|a| jaccard(&p.nodes, &a.nodes)).fold(0.0, f64::max);
        p.cost * (1.0 + diversity * overlap)
    };
    candidates
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            score(a)
                .total_cmp(&score(b))
                .then_with(|| a.cost.total_cmp(&b.cost))
                .then_with(|| a.nodes.cmp(&b.nodes))
        })
        .map(|(i, _)| i)
}

/// Jaccard similarity of two node sets
pub fn jaccard(a: &[usize], b: &[usize]) -> f64 {
    let a: HashSet<usize> = a.iter().copied().collect();
    let b: HashSet<usize> = b.iter().copied().collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::graph::{BaseEdge, Track, TrackGraph};
    use crate::profile::ConstraintProfile;
    use crate::search::SearchControl;
    use crate::weight::{EdgeFilter, WeightCalculator};

    /// Diamond ladder: s -> {a, b} -> m -> {c, d} -> t plus a slow bypass s - x - t
    fn ladder() -> TrackGraph {
        let ids = ["a", "b", "c", "d", "m", "s", "t", "x"];
        let tracks = ids
            .iter()
            .map(|id| Track::new(*id, 120.0, "8A".parse().unwrap(), 0.5, 240.0))
            .collect();
        let edges = vec![
            BaseEdge::new("s", "a", 1.0),
            BaseEdge::new("s", "b", 1.2),
            BaseEdge::new("a", "m", 1.0),
            BaseEdge::new("b", "m", 1.0),
            BaseEdge::new("m", "c", 1.0),
            BaseEdge::new("m", "d", 1.1),
            BaseEdge::new("c", "t", 1.0),
            BaseEdge::new("d", "t", 1.0),
            BaseEdge::new("s", "x", 2.5),
            BaseEdge::new("x", "t", 2.5),
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

    fn ids(graph: &TrackGraph, path: &LegPath) -> Vec<String> {
        path.nodes.iter().map(|&n| graph.track_at(n).id.to_string()).collect()
    }

    #[test]
    fn test_paths_in_cost_order() {
        let graph = ladder();
        let config = EngineConfig::default();
        let mut ctx = context(&graph, &config);
        let s = graph.index_of(&"s".into()).unwrap();
        let t = graph.index_of(&"t".into()).unwrap();

        let result = k_shortest_paths(&mut ctx, s, t, 5, 0.0);
        assert_eq!(result.paths.len(), 5);
        assert_eq!(ids(&graph, &result.paths[0]), vec!["s", "a", "m", "c", "t"]);
        assert_eq!(ids(&graph, &result.paths[4]), vec!["s", "x", "t"]);
        for pair in result.paths.windows(2) {
            assert!(pair[0].cost <= pair[1].cost + 1e-9);
        }
        let unique: HashSet<Vec<usize>> = result.paths.iter().map(|p| p.nodes.clone()).collect();
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn test_diversity_reduces_overlap() {
        let graph = ladder();
        let config = EngineConfig::default();
        let s = graph.index_of(&"s".into()).unwrap();
        let t = graph.index_of(&"t".into()).unwrap();

        let plain = k_shortest_paths(&mut context(&graph, &config), s, t, 2, 0.0);
        let diverse = k_shortest_paths(&mut context(&graph, &config), s, t, 2, 1.0);

        assert_eq!(plain.paths[0], diverse.paths[0]);
        let plain_overlap = jaccard(&plain.paths[0].nodes, &plain.paths[1].nodes);
        let diverse_overlap = jaccard(&diverse.paths[0].nodes, &diverse.paths[1].nodes);
        assert!(diverse_overlap < plain_overlap);
        // s-b-m-d-t shares only s, m and t with the cheapest path
        assert_eq!(ids(&graph, &diverse.paths[1]), vec!["s", "b", "m", "d", "t"]);
    }

    #[test]
    fn test_fewer_paths_than_requested() {
        let graph = ladder();
        let config = EngineConfig::default();
        let mut ctx = context(&graph, &config);
        let a = graph.index_of(&"a".into()).unwrap();
        let m = graph.index_of(&"m".into()).unwrap();
        let result = k_shortest_paths(&mut ctx, a, m, 10, 0.0);
        assert!(!result.paths.is_empty());
        assert!(result.paths.len() < 10);
        assert_eq!(result.termination, Termination::Completed);
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard(&[1, 2, 3], &[1, 2, 3]), 1.0);
        assert_eq!(jaccard(&[1, 2], &[3, 4]), 0.0);
        assert!((jaccard(&[1, 2, 3], &[2, 3, 4]) - 0.5).abs() < 1e-9);
    }
}
