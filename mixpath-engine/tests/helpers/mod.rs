//! Shared fixtures for mixpath-engine integration tests
//!
//! Provides:
//! - Track and graph builders
//! - The five-track A–E scenario graph and its flat-cost strict profile
//! - Complete and seeded random graphs for property checks

#![allow(dead_code)]

use mixpath_engine::profile::HarmonicConstraint;
use mixpath_engine::{BaseEdge, ConstraintProfile, MusicalKey, PathfindingEngine, Track, TrackGraph};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::Arc;

const KEYS: [&str; 6] = ["7A", "8A", "9A", "8B", "9B", "10A"];
const GENRES: [&str; 3] = ["house", "techno", "disco"];

pub fn key(notation: &str) -> MusicalKey {
    notation.parse().expect("valid key notation")
}

pub fn track(id: &str, bpm: f64, key_notation: &str, energy: f64) -> Track {
    Track::new(id, bpm, key(key_notation), energy, 240.0)
}

pub fn engine(tracks: Vec<Track>, edges: Vec<BaseEdge>) -> PathfindingEngine {
    let graph = TrackGraph::new(tracks, edges).expect("valid test graph");
    PathfindingEngine::new(Arc::new(graph))
}

/// Strict harmonic mixing (one Camelot step) where every feasible
/// transition costs exactly its base weight
pub fn strict_flat_profile() -> ConstraintProfile {
    ConstraintProfile {
        name: "strict_flat".to_string(),
        harmonic: HarmonicConstraint {
            enabled: true,
            weight: 1.0,
            strict_mode: true,
            allowed_key_jumps: 1,
        },
        mismatch_penalty: 0.0,
        ..ConstraintProfile::default()
    }
}

/// A–E scenario tracks
///
/// B → D jumps two Camelot steps, which strict mixing forbids.
pub fn scenario_tracks() -> Vec<Track> {
    vec![
        track("A", 124.0, "8A", 0.5),
        track("B", 124.0, "8A", 0.5),
        track("C", 124.0, "9A", 0.5),
        track("D", 124.0, "10A", 0.5),
        track("E", 124.0, "10A", 0.5),
    ]
}

pub fn scenario_edges() -> Vec<BaseEdge> {
    vec![
        BaseEdge::new("A", "B", 2.0),
        BaseEdge::new("B", "C", 1.0),
        BaseEdge::new("A", "C", 5.0),
        BaseEdge::new("C", "D", 1.0),
        BaseEdge::new("B", "D", 0.5),
        BaseEdge::new("D", "E", 1.0),
    ]
}

pub fn scenario_engine() -> PathfindingEngine {
    engine(scenario_tracks(), scenario_edges())
}

/// Every pair of `n` compatible tracks connected
///
/// Weights vary with the pair so the cheapest route is unique.
pub fn complete_engine(n: usize) -> PathfindingEngine {
    let tracks = (0..n)
        .map(|i| {
            track(&format!("t{:02}", i), 122.0 + (i % 3) as f64, "8A", 0.5).with_genres(["house"])
        })
        .collect();
    let mut edges = Vec::new();
    for a in 0..n {
        for b in a + 1..n {
            let weight = 1.0 + ((a * 7 + b * 3) % 11) as f64 / 10.0;
            edges.push(BaseEdge::new(format!("t{:02}", a), format!("t{:02}", b), weight));
        }
    }
    engine(tracks, edges)
}

/// Seeded random graph: a ring plus `2 * nodes` random chords
///
/// Tempos spread over ±6 BPM, so some transitions exceed the default 8 BPM
/// limit.
pub fn random_engine(seed: u64, nodes: usize) -> PathfindingEngine {
    let mut rng = StdRng::seed_from_u64(seed);
    let id = |i: usize| format!("r{:03}", i);

    let tracks = (0..nodes)
        .map(|i| {
            let bpm = 120.0 + rng.gen_range(-6.0..6.0);
            let key_notation = KEYS[rng.gen_range(0..KEYS.len())];
            let energy = rng.gen_range(0.4..0.7);
            let genre = GENRES[rng.gen_range(0..GENRES.len())];
            track(&id(i), bpm, key_notation, energy).with_genres([genre])
        })
        .collect();

    let mut pairs = HashSet::new();
    let mut edges = Vec::new();
    let mut connect = |a: usize, b: usize, weight: f64, edges: &mut Vec<BaseEdge>| {
        if a != b && pairs.insert((a.min(b), a.max(b))) {
            edges.push(BaseEdge::new(id(a), id(b), weight));
        }
    };
    for i in 0..nodes {
        let weight = rng.gen_range(0.5..3.0);
        connect(i, (i + 1) % nodes, weight, &mut edges);
    }
    for _ in 0..nodes * 2 {
        let a = rng.gen_range(0..nodes);
        let b = rng.gen_range(0..nodes);
        let weight = rng.gen_range(0.5..3.0);
        connect(a, b, weight, &mut edges);
    }
    engine(tracks, edges)
}
