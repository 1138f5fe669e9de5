//! Path Analyzer
//!
//! Summarizes a finished path: average transition quality per category,
//! tempo range, the shape of the energy curve, genre diversity, and short
//! human-readable strengths, weaknesses, and recommendations. Pure function
//! of the graph and the result.

use crate::graph::{Track, TrackGraph};
use crate::result::PathResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Energy changes at or below this are treated as flat
const ENERGY_NOISE: f64 = 0.02;
/// Curves whose total range stays within this are flat
const FLAT_RANGE: f64 = 0.1;
/// Minimum swing of each run for a curve to count as a wave
const WAVE_AMPLITUDE: f64 = 0.1;

const STRONG: f64 = 0.8;
const WEAK: f64 = 0.5;

/// Average transition quality per category (0.0-1.0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryQuality {
    pub harmonic: f64,
    pub tempo: f64,
    pub energy: f64,
    pub genre: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BpmStats {
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

/// Overall shape of the energy curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyShape {
    Flat,
    Ascending,
    Descending,
    /// Rises then falls
    Peak,
    /// Falls then rises
    Valley,
    /// Repeated rises and falls of similar size
    Wave,
    Irregular,
}

/// Quality summary of a path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathAnalysis {
    pub quality: CategoryQuality,
    pub bpm: BpmStats,
    pub energy_shape: EnergyShape,
    /// Gini–Simpson index of genre tags (0 = single genre)
    pub genre_diversity: f64,
    /// Combined score (0.0-1.0)
    pub overall_score: f64,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PathAnalyzer;

impl PathAnalyzer {
    /// Analyze `result`; tracks missing from `graph` are ignored
    pub fn analyze(&self, graph: &TrackGraph, result: &PathResult) -> PathAnalysis {
        let tracks: Vec<&Track> = result
            .nodes
            .iter()
            .filter_map(|n| graph.track(&n.track_id))
            .collect();

        let quality = category_quality(result);
        let bpm = bpm_stats(&tracks);
        let energies: Vec<f64> = tracks.iter().map(|t| t.energy).collect();
        let energy_shape = classify_energy(&energies);
        let genre_diversity = gini_simpson(&tracks);

        let mean_compatibility = if result.transitions.is_empty() {
            1.0
        } else {
            let total: f64 = result.transitions.iter().map(|t| t.compatibility).sum();
            total / result.transitions.len() as f64
        };
        let shape_score = if energy_shape == EnergyShape::Irregular { 0.5 } else { 1.0 };
        let blended = 0.7 * mean_compatibility + 0.15 * shape_score + 0.15 * genre_diversity;
        let overall_score = blended.clamp(0.0, 1.0);

        let mut analysis = PathAnalysis {
            quality,
            bpm,
            energy_shape,
            genre_diversity,
            overall_score,
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            recommendations: Vec::new(),
        };
        if !result.transitions.is_empty() {
            describe(&mut analysis, tracks.len());
        }
        analysis
    }
}

fn category_quality(result: &PathResult) -> CategoryQuality {
    let n = result.transitions.len();
    if n == 0 {
        return CategoryQuality {
            harmonic: 1.0,
            tempo: 1.0,
            energy: 1.0,
            genre: 1.0,
        };
    }
    let avg = |f: fn(&crate::weight::ComponentScores) -> f64| {
        result.transitions.iter().map(|t| f(&t.scores)).sum::<f64>() / n as f64
    };
    CategoryQuality {
        harmonic: avg(|s| s.harmonic),
        tempo: avg(|s| s.tempo),
        energy: avg(|s| s.energy),
        genre: avg(|s| s.genre),
    }
}

fn bpm_stats(tracks: &[&Track]) -> BpmStats {
    if tracks.is_empty() {
        return BpmStats {
            average: 0.0,
            min: 0.0,
            max: 0.0,
        };
    }
    let initial = (f64::INFINITY, f64::NEG_INFINITY, 0.0);
    let (min, max, sum) = tracks.iter().fold(initial, |(lo, hi, sum), t| {
        (lo.min(t.bpm), hi.max(t.bpm), sum + t.bpm)
    });
    BpmStats {
        average: sum / tracks.len() as f64,
        min,
        max,
    }
}

/// Shape of an energy sequence
pub fn classify_energy(energies: &[f64]) -> EnergyShape {
    if energies.len() < 2 {
        return EnergyShape::Flat;
    }
    let (lo, hi) = energies
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &e| (lo.min(e), hi.max(e)));
    if hi - lo <= FLAT_RANGE {
        return EnergyShape::Flat;
    }

    // Runs of consecutive significant moves in the same direction
    let mut runs: Vec<f64> = Vec::new();
    for pair in energies.windows(2) {
        let delta = pair[1] - pair[0];
        if delta.abs() <= ENERGY_NOISE {
            continue;
        }
        match runs.last_mut() {
            Some(run) if run.signum() == delta.signum() => *run += delta,
            _ => runs.push(delta),
        }
    }

    match runs.as_slice() {
        [] => EnergyShape::Flat,
        [only] if *only > 0.0 => EnergyShape::Ascending,
        [_] => EnergyShape::Descending,
        [first, _] if *first > 0.0 => EnergyShape::Peak,
        [_, _] => EnergyShape::Valley,
        _ if runs.iter().all(|r| r.abs() >= WAVE_AMPLITUDE) => EnergyShape::Wave,
        _ => EnergyShape::Irregular,
    }
}

/// `1 - Σ p²` over genre tag frequencies
fn gini_simpson(tracks: &[&Track]) -> f64 {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for genre in tracks.iter().flat_map(|t| t.genres.iter()) {
        *counts.entry(genre.as_str()).or_default() += 1;
    }
    let total: usize = counts.values().sum();
    if total == 0 {
        return 0.0;
    }
    1.0 - counts
        .values()
        .map(|&c| {
            let p = c as f64 / total as f64;
            p * p
        })
        .sum::<f64>()
}

fn describe(analysis: &mut PathAnalysis, track_count: usize) {
    let q = analysis.quality;
    let categories = [
        ("harmonic", q.harmonic, "key changes", "a profile with strict harmonic mixing"),
        ("tempo", q.tempo, "tempo changes", "a lower tempo tolerance"),
        ("energy", q.energy, "energy changes", "the energy_focused profile"),
        ("genre", q.genre, "genre transitions", "the genre_focused profile"),
    ];
    for (name, score, subject, remedy) in categories {
        if score >= STRONG {
            analysis.strengths.push(format!(
                "Smooth {} ({:.0}% average {} quality)",
                subject,
                score * 100.0,
                name
            ));
        } else if score < WEAK {
            analysis.weaknesses.push(format!(
                "Rough {} ({:.0}% average {} quality)",
                subject,
                score * 100.0,
                name
            ));
            analysis.recommendations.push(format!("Try {} to improve {} flow", remedy, name));
        }
    }

    match analysis.energy_shape {
        EnergyShape::Irregular => {
            analysis.weaknesses.push("Energy curve has no clear direction".to_string());
            analysis
                .recommendations
                .push("Add energy waypoints or choose an ascending or wave energy flow".into());
        }
        EnergyShape::Flat => {}
        shape => analysis.strengths.push(format!("Clear {:?} energy shape", shape).to_lowercase()),
    }

    if analysis.genre_diversity >= 0.5 {
        analysis.strengths.push("Good genre variety".to_string());
    } else if analysis.genre_diversity == 0.0 && track_count > 2 {
        analysis.weaknesses.push("Single-genre path".to_string());
        analysis
            .recommendations
            .push("Use the diverse tour goal for more genre variety".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::graph::BaseEdge;
    use crate::profile::ConstraintProfile;
    use crate::search::{SearchContext, SearchControl};
    use crate::weight::{EdgeFilter, WeightCalculator};
    use std::collections::HashSet;
    use uuid::Uuid;

    #[test]
    fn test_energy_shapes() {
        assert_eq!(classify_energy(&[0.5]), EnergyShape::Flat);
        assert_eq!(classify_energy(&[0.5, 0.52, 0.55]), EnergyShape::Flat);
        assert_eq!(classify_energy(&[0.2, 0.4, 0.6, 0.8]), EnergyShape::Ascending);
        assert_eq!(classify_energy(&[0.8, 0.6, 0.6, 0.3]), EnergyShape::Descending);
        assert_eq!(classify_energy(&[0.3, 0.6, 0.9, 0.5]), EnergyShape::Peak);
        assert_eq!(classify_energy(&[0.8, 0.4, 0.7]), EnergyShape::Valley);
        assert_eq!(classify_energy(&[0.3, 0.7, 0.3, 0.7, 0.3]), EnergyShape::Wave);
        assert_eq!(classify_energy(&[0.3, 0.7, 0.65, 0.9, 0.4]), EnergyShape::Irregular);
    }

    #[test]
    fn test_gini_simpson() {
        let one = Track::new("a", 120.0, "8A".parse().unwrap(), 0.5, 200.0).with_genres(["house"]);
        let two = Track::new("b", 120.0, "8A".parse().unwrap(), 0.5, 200.0).with_genres(["techno"]);
        assert_eq!(gini_simpson(&[&one, &one.clone()]), 0.0);
        assert!((gini_simpson(&[&one, &two]) - 0.5).abs() < 1e-9);
        assert_eq!(gini_simpson(&[]), 0.0);
    }

    #[test]
    fn test_analyze_path() {
        let key = "8A".parse().unwrap();
        let tracks = vec![
            Track::new("a", 120.0, key, 0.3, 200.0).with_genres(["house"]),
            Track::new("b", 122.0, key, 0.5, 200.0).with_genres(["house"]),
            Track::new("c", 124.0, key, 0.7, 200.0).with_genres(["techno"]),
        ];
        let edges = vec![BaseEdge::new("a", "b", 1.0), BaseEdge::new("b", "c", 1.0)];
        let graph = TrackGraph::new(tracks, edges).unwrap();
        let config = EngineConfig::default();
        let ctx = SearchContext::new(
            &graph,
            WeightCalculator::new(ConstraintProfile::default()),
            EdgeFilter::default(),
            &config,
            SearchControl::default(),
        );
        let result =
            PathResult::from_path(&ctx, Uuid::new_v4(), &[0, 1, 2], &HashSet::new()).unwrap();

        let analysis = PathAnalyzer.analyze(&graph, &result);
        assert_eq!(analysis.energy_shape, EnergyShape::Ascending);
        assert_eq!(analysis.bpm.min, 120.0);
        assert_eq!(analysis.bpm.max, 124.0);
        assert!((analysis.bpm.average - 122.0).abs() < 1e-9);
        assert_eq!(analysis.quality.harmonic, 1.0);
        assert!(analysis.overall_score > 0.0 && analysis.overall_score <= 1.0);
        assert!(analysis.strengths.iter().any(|s| s.contains("key changes")));
        assert!(analysis.strengths.iter().any(|s| s.contains("ascending")));
    }
}
