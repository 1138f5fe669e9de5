//! Path results
//!
//! Everything returned to the caller is an owned, serializable value. A
//! `PathResult` is produced for every accepted request, successful or not;
//! search failures are described by `failure` rather than an error.

use crate::analyzer::PathAnalysis;
use crate::graph::TrackId;
use crate::profile::ConstraintKind;
use crate::search::{Algorithm, SearchContext, Termination};
use crate::waypoints::WaypointValidation;
use crate::weight::ComponentScores;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

/// One track of a path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathNode {
    pub track_id: TrackId,
    /// Zero-based index in the path
    pub position: usize,
    pub is_waypoint: bool,
    /// Cost from the start up to and including the transition into this track
    pub cumulative_weight: f64,
    /// Compatibility with the previous track (`None` for the first)
    pub transition_score: Option<f64>,
    /// Position of the previous track
    pub previous: Option<usize>,
}

/// Detailed view of one transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionBreakdown {
    pub from: TrackId,
    pub to: TrackId,
    pub cost: f64,
    pub compatibility: f64,
    pub scores: ComponentScores,
    pub key_distance: u8,
    pub bpm_delta: f64,
    pub energy_delta: f64,
    pub shared_genres: Vec<String>,
}

/// Why a result carries no path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PathFailure {
    /// Start and end are not connected by feasible transitions
    NoPathExists { start: TrackId, end: TrackId },
    /// The profile removes every usable transition around start, end, or the
    /// whole graph
    InfeasibleConstraintCombination { constraint: ConstraintKind, detail: String },
    Cancelled,
    TimedOut,
}

impl fmt::Display for PathFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathFailure::NoPathExists { start, end } => {
                write!(f, "no path exists from {} to {}", start, end)
            }
            PathFailure::InfeasibleConstraintCombination { constraint, detail } => {
                write!(f, "{} constraint eliminates every route: {}", constraint, detail)
            }
            PathFailure::Cancelled => write!(f, "search cancelled"),
            PathFailure::TimedOut => write!(f, "search deadline expired"),
        }
    }
}

/// How the result was produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchMetadata {
    pub search_time_ms: u64,
    pub nodes_explored: u64,
    pub algorithms_used: Vec<Algorithm>,
    pub optimization_passes: usize,
    pub termination: Termination,
    /// Name of the constraint profile used for scoring
    pub profile: String,
}

/// Response to a path request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathResult {
    pub request_id: Uuid,
    pub success: bool,
    pub nodes: Vec<PathNode>,
    pub total_weight: f64,
    pub total_duration_secs: f64,
    pub transitions: Vec<TransitionBreakdown>,
    pub waypoints_included: Vec<TrackId>,
    pub waypoints_skipped: Vec<TrackId>,
    #[serde(default)]
    pub waypoint_validations: Vec<WaypointValidation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<PathFailure>,
    /// Whether the path is provably the cheapest for the request
    pub optimal: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<PathResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<PathAnalysis>,
    pub metadata: SearchMetadata,
}

impl PathResult {
    /// Empty unsuccessful result
    pub fn failed(request_id: Uuid, failure: PathFailure) -> Self {
        Self {
            request_id,
            success: false,
            nodes: Vec::new(),
            total_weight: 0.0,
            total_duration_secs: 0.0,
            transitions: Vec::new(),
            waypoints_included: Vec::new(),
            waypoints_skipped: Vec::new(),
            waypoint_validations: Vec::new(),
            failure: Some(failure),
            optimal: false,
            warnings: Vec::new(),
            alternatives: Vec::new(),
            analysis: None,
            metadata: SearchMetadata::default(),
        }
    }

    /// Successful result for `path`, scored with the context's profile
    ///
    /// `None` when a transition of `path` is not usable under the context.
    /// Waypoint lists and metadata are left for the caller to fill in.
    pub fn from_path(
        ctx: &SearchContext<'_>,
        request_id: Uuid,
        path: &[usize],
        waypoints: &HashSet<usize>,
    ) -> Option<Self> {
        let graph = ctx.graph();
        let mut nodes = Vec::with_capacity(path.len());
        let mut transitions = Vec::with_capacity(path.len().saturating_sub(1));
        let mut total = 0.0;

        for (position, &node) in path.iter().enumerate() {
            let track = graph.track_at(node);
            let mut transition_score = None;
            if position > 0 {
                let prev = path[position - 1];
                let weight = ctx.transition(prev, node)?;
                total += weight.cost;
                transition_score = Some(weight.compatibility);

                let from = graph.track_at(prev);
                transitions.push(TransitionBreakdown {
                    from: from.id.clone(),
                    to: track.id.clone(),
                    cost: weight.cost,
                    compatibility: weight.compatibility,
                    scores: weight.scores,
                    key_distance: from.key.distance(&track.key),
                    bpm_delta: track.bpm - from.bpm,
                    energy_delta: track.energy - from.energy,
                    shared_genres: from.genres.intersection(&track.genres).cloned().collect(),
                });
            }
            nodes.push(PathNode {
                track_id: track.id.clone(),
                position,
                is_waypoint: waypoints.contains(&node),
                cumulative_weight: total,
                transition_score,
                previous: position.checked_sub(1),
            });
        }

        let total_duration_secs = path.iter().map(|&n| graph.track_at(n).duration_secs).sum();
        Some(Self {
            request_id,
            success: true,
            nodes,
            total_weight: total,
            total_duration_secs,
            transitions,
            waypoints_included: Vec::new(),
            waypoints_skipped: Vec::new(),
            waypoint_validations: Vec::new(),
            failure: None,
            optimal: false,
            warnings: Vec::new(),
            alternatives: Vec::new(),
            analysis: None,
            metadata: SearchMetadata {
                profile: ctx.profile().name.clone(),
                ..SearchMetadata::default()
            },
        })
    }

    /// Track ids in path order
    pub fn track_ids(&self) -> Vec<TrackId> {
        self.nodes.iter().map(|n| n.track_id.clone()).collect()
    }

    /// Number of tracks on the path
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
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

    fn graph() -> TrackGraph {
        let tracks = vec![
            Track::new("a", 120.0, "8A".parse().unwrap(), 0.5, 200.0).with_genres(["house"]),
            Track::new("b", 122.0, "9A".parse().unwrap(), 0.6, 210.0)
                .with_genres(["house", "disco"]),
            Track::new("c", 124.0, "9A".parse().unwrap(), 0.6, 220.0).with_genres(["disco"]),
        ];
        let edges = vec![BaseEdge::new("a", "b", 1.0), BaseEdge::new("b", "c", 2.0)];
        TrackGraph::new(tracks, edges).unwrap()
    }

    #[test]
    fn test_from_path_accumulates() {
        let graph = graph();
        let config = EngineConfig::default();
        let ctx = SearchContext::new(
            &graph,
            WeightCalculator::new(ConstraintProfile::default()),
            EdgeFilter::default(),
            &config,
            SearchControl::default(),
        );
        let waypoints: HashSet<usize> = [1].into_iter().collect();
        let result = PathResult::from_path(&ctx, Uuid::new_v4(), &[0, 1, 2], &waypoints).unwrap();

        assert!(result.success);
        assert_eq!(result.len(), 3);
        assert_eq!(result.transitions.len(), 2);
        assert!(result.nodes[1].is_waypoint);
        assert_eq!(result.nodes[0].transition_score, None);
        assert_eq!(result.nodes[2].previous, Some(1));
        assert_eq!(result.total_duration_secs, 630.0);

        let sum: f64 = result.transitions.iter().map(|t| t.cost).sum();
        assert!((result.total_weight - sum).abs() < 1e-9);
        assert!((result.nodes[2].cumulative_weight - result.total_weight).abs() < 1e-9);

        let first = &result.transitions[0];
        assert_eq!(first.key_distance, 1);
        assert_eq!(first.bpm_delta, 2.0);
        assert_eq!(first.shared_genres, vec!["house".to_string()]);
    }

    #[test]
    fn test_from_path_rejects_missing_edge() {
        let graph = graph();
        let config = EngineConfig::default();
        let ctx = SearchContext::new(
            &graph,
            WeightCalculator::new(ConstraintProfile::default()),
            EdgeFilter::default(),
            &config,
            SearchControl::default(),
        );
        assert!(PathResult::from_path(&ctx, Uuid::new_v4(), &[0, 2], &HashSet::new()).is_none());
    }

    #[test]
    fn test_failure_serializes_tagged() {
        let result = PathResult::failed(
            Uuid::nil(),
            PathFailure::NoPathExists {
                start: "a".into(),
                end: "b".into(),
            },
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["failure"]["type"], "no_path_exists");
        assert_eq!(json["failure"]["start"], "a");
        assert!(json.get("alternatives").is_none());
    }
}
