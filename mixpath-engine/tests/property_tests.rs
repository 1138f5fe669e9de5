//! Path properties checked over seeded random graphs
//!
//! Covers:
//! - Endpoints match the request
//! - Included and skipped waypoints are disjoint and cover the request
//! - Total weight equals the sum of transition costs
//! - Dijkstra and A* agree on cost; A* explores no more nodes
//! - Relaxing tempo or energy limits never makes the best path worse
//! - Identical requests give identical paths
//! - Round trips, k-shortest ranking, cancellation, and deadlines

mod helpers;

use helpers::*;
use mixpath_engine::{
    Algorithm, KShortestRequest, MultiWaypointRequest, PathFailure, PathRequest, PathResult,
    PathfindingEngine, SearchControl, Termination, TrackId,
};
use std::collections::HashSet;
use std::time::Instant;

const SEEDS: [u64; 6] = [1, 7, 42, 99, 1234, 2024];
const NODES: usize = 40;

fn rid(i: usize) -> TrackId {
    TrackId::from(format!("r{:03}", i).as_str())
}

fn run(engine: &PathfindingEngine, request: &PathRequest) -> PathResult {
    engine.find_path(request, SearchControl::default()).unwrap()
}

fn assert_accounting(result: &PathResult) {
    let sum: f64 = result.transitions.iter().map(|t| t.cost).sum();
    assert!(
        (result.total_weight - sum).abs() < 1e-9,
        "total {} != sum {}",
        result.total_weight,
        sum
    );
    assert_eq!(result.transitions.len() + 1, result.nodes.len());
    if let Some(last) = result.nodes.last() {
        assert!((last.cumulative_weight - result.total_weight).abs() < 1e-9);
    }
}

#[test]
fn test_endpoints_and_accounting() {
    for seed in SEEDS {
        let engine = random_engine(seed, NODES);
        for algorithm in [
            Algorithm::Dijkstra,
            Algorithm::AStar,
            Algorithm::Bidirectional,
            Algorithm::Genetic,
            Algorithm::Hybrid,
        ] {
            let request = PathRequest::new(rid(0), rid(NODES / 2)).with_algorithm(algorithm);
            let result = run(&engine, &request);
            if !result.success {
                continue;
            }
            assert_eq!(result.track_ids().first(), Some(&rid(0)), "seed {} {}", seed, algorithm);
            assert_eq!(
                result.track_ids().last(),
                Some(&rid(NODES / 2)),
                "seed {} {}",
                seed,
                algorithm
            );
            assert_accounting(&result);

            let unique: HashSet<_> = result.track_ids().into_iter().collect();
            assert_eq!(unique.len(), result.len(), "seed {} {} repeats a track", seed, algorithm);
        }
    }
}

#[test]
fn test_dijkstra_astar_equivalence() {
    for seed in SEEDS {
        let engine = random_engine(seed, NODES);
        for target in [5, NODES / 2, NODES - 3] {
            let request = PathRequest::new(rid(0), rid(target));
            let dijkstra = run(&engine, &request.clone().with_algorithm(Algorithm::Dijkstra));
            let astar = run(&engine, &request.with_algorithm(Algorithm::AStar));

            assert_eq!(dijkstra.success, astar.success, "seed {} target {}", seed, target);
            if !dijkstra.success {
                continue;
            }
            assert!(
                (dijkstra.total_weight - astar.total_weight).abs() < 1e-9,
                "seed {} target {}: {} vs {}",
                seed,
                target,
                dijkstra.total_weight,
                astar.total_weight
            );
            assert!(
                astar.metadata.nodes_explored <= dijkstra.metadata.nodes_explored,
                "seed {} target {}: A* explored {} > {}",
                seed,
                target,
                astar.metadata.nodes_explored,
                dijkstra.metadata.nodes_explored
            );
        }
    }
}

#[test]
fn test_relaxing_limits_is_monotonic() {
    for seed in SEEDS {
        let engine = random_engine(seed, NODES);
        let best = |bpm: Option<f64>, energy: Option<f64>| -> Option<f64> {
            let mut request =
                PathRequest::new(rid(0), rid(NODES / 2)).with_algorithm(Algorithm::Dijkstra);
            request.constraints.tolerances.bpm = bpm;
            request.constraints.tolerances.energy = energy;
            let result = run(&engine, &request);
            result.success.then_some(result.total_weight)
        };

        let mut previous: Option<f64> = None;
        for bpm in [3.0, 5.0, 8.0, 12.0, 20.0] {
            let current = best(Some(bpm), None);
            if let Some(before) = previous {
                let after = current.expect("relaxing tempo lost a feasible path");
                assert!(
                    after <= before + 1e-9,
                    "seed {} bpm {}: {} > {}",
                    seed,
                    bpm,
                    after,
                    before
                );
            }
            previous = current.or(previous);
        }

        let mut previous: Option<f64> = None;
        for energy in [0.1, 0.2, 0.3, 0.6] {
            let current = best(None, Some(energy));
            if let Some(before) = previous {
                let after = current.expect("relaxing energy lost a feasible path");
                assert!(
                    after <= before + 1e-9,
                    "seed {} energy {}: {} > {}",
                    seed,
                    energy,
                    after,
                    before
                );
            }
            previous = current.or(previous);
        }
    }
}

#[test]
fn test_identical_requests_identical_paths() {
    for seed in SEEDS {
        let engine = random_engine(seed, NODES);
        for algorithm in [Algorithm::Hybrid, Algorithm::Genetic, Algorithm::Bidirectional] {
            let request = PathRequest::new(rid(1), rid(NODES - 1))
                .with_algorithm(algorithm)
                .with_waypoints([rid(10), rid(20)]);
            let first = run(&engine, &request);
            let second = run(&engine, &request);
            assert_eq!(first.success, second.success);
            assert_eq!(first.track_ids(), second.track_ids(), "seed {} {}", seed, algorithm);
            assert_eq!(first.waypoints_included, second.waypoints_included);
        }
    }
}

#[test]
fn test_waypoints_included_xor_skipped() {
    for seed in SEEDS {
        let engine = random_engine(seed, NODES);
        let waypoints = [rid(8), rid(16), rid(24), rid(32)];
        for algorithm in [Algorithm::Dijkstra, Algorithm::AStar, Algorithm::Genetic] {
            let request = PathRequest::new(rid(0), rid(NODES - 1))
                .with_algorithm(algorithm)
                .with_waypoints(waypoints.clone());
            let result = run(&engine, &request);
            if !result.success {
                continue;
            }

            let included: HashSet<_> = result.waypoints_included.iter().cloned().collect();
            let skipped: HashSet<_> = result.waypoints_skipped.iter().cloned().collect();
            assert!(included.is_disjoint(&skipped), "seed {} {}", seed, algorithm);
            let covered: HashSet<_> = included.union(&skipped).cloned().collect();
            let requested: HashSet<_> = waypoints.iter().cloned().collect();
            assert_eq!(covered, requested, "seed {} {}", seed, algorithm);

            let on_path: HashSet<_> = result.track_ids().into_iter().collect();
            assert!(included.iter().all(|w| on_path.contains(w)));
            assert!(skipped.iter().all(|w| !on_path.contains(w)));
            assert_accounting(&result);
        }
    }
}

#[test]
fn test_feasible_waypoints_all_included() {
    let engine = complete_engine(10);
    for algorithm in [
        Algorithm::Dijkstra,
        Algorithm::AStar,
        Algorithm::Genetic,
        Algorithm::Hybrid,
    ] {
        let request = PathRequest::new("t00", "t09")
            .with_algorithm(algorithm)
            .with_waypoints(["t02", "t05", "t07"]);
        let result = run(&engine, &request);

        assert!(result.success, "{}", algorithm);
        let included: HashSet<_> = result.waypoints_included.iter().cloned().collect();
        let expected: HashSet<TrackId> =
            ["t02", "t05", "t07"].into_iter().map(TrackId::from).collect();
        assert_eq!(included, expected, "{}", algorithm);
        assert!(result.waypoints_skipped.is_empty(), "{}", algorithm);
    }
}

#[test]
fn test_round_trip_tour() {
    let engine = complete_engine(10);
    let mut tour = MultiWaypointRequest::new(["t00", "t03", "t06"]);
    tour.return_to_start = true;
    tour.allow_reordering = true;
    let result = engine.multi_waypoint(&tour, SearchControl::default()).unwrap();

    assert!(result.success);
    let path = result.track_ids();
    assert_eq!(path.first(), Some(&TrackId::from("t00")));
    assert_eq!(path.last(), Some(&TrackId::from("t00")));
    let interior: HashSet<_> = path[1..path.len() - 1].iter().cloned().collect();
    assert_eq!(interior.len(), path.len() - 2, "interior repeats a track");
    assert!(interior.contains(&TrackId::from("t03")));
    assert!(interior.contains(&TrackId::from("t06")));
    assert_accounting(&result);
}

#[test]
fn test_k_shortest_distinct_and_ranked() {
    for seed in SEEDS {
        let engine = random_engine(seed, NODES);
        let request = KShortestRequest::new(rid(0), rid(NODES / 2), 4);
        let result = engine.k_shortest_paths(&request, SearchControl::default()).unwrap();
        if !result.success {
            continue;
        }

        let mut all = vec![result.clone()];
        all.extend(result.alternatives.iter().cloned());
        assert!(all.len() <= 4);

        let mut seen = HashSet::new();
        let mut previous = 0.0;
        for path in &all {
            assert!(seen.insert(path.track_ids()), "seed {} duplicate path", seed);
            assert!(path.total_weight >= previous - 1e-9, "seed {} out of order", seed);
            previous = path.total_weight;
            assert_eq!(path.track_ids().first(), Some(&rid(0)));
            assert_eq!(path.track_ids().last(), Some(&rid(NODES / 2)));
            assert_accounting(path);
        }
    }
}

#[test]
fn test_cancelled_request_reports_cancelled() {
    let engine = random_engine(7, NODES);
    let control = SearchControl::default();
    control.cancel.cancel();

    let result = engine
        .find_path(&PathRequest::new(rid(0), rid(NODES / 2)), control)
        .unwrap();
    assert!(!result.success);
    assert!(!result.optimal);
    assert_eq!(result.failure, Some(PathFailure::Cancelled));
    assert_eq!(result.metadata.termination, Termination::Cancelled);
}

#[test]
fn test_expired_deadline_reports_timeout() {
    let engine = random_engine(7, NODES);
    let mut control = SearchControl::default();
    control.deadline = Some(Instant::now());

    let result = engine
        .k_shortest_paths(&KShortestRequest::new(rid(0), rid(NODES / 2), 3), control)
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.failure, Some(PathFailure::TimedOut));
}
