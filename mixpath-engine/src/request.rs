//! Path requests
//!
//! Requests are plain serde values so a presentation layer can pass them
//! straight through from JSON. Every field except the endpoints has a
//! default.

use crate::graph::{RelationshipKind, TrackId};
use crate::profile::{AttributeTolerances, ProfileSelection};
use crate::search::{Algorithm, OptimizationLevel};
use serde::{Deserialize, Serialize};

/// Default cap on returned alternatives
pub const DEFAULT_MAX_ALTERNATIVES: usize = 3;

/// Restrictions on the constructed path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConstraints {
    /// Maximum number of tracks, endpoints included
    pub max_length: Option<usize>,
    /// Minimum compatibility (0.0-1.0) of every transition
    pub min_weight: Option<f64>,
    /// Only traverse edges of these kinds
    pub allowed_kinds: Option<Vec<RelationshipKind>>,
    /// Tracks that must not appear on the path
    pub avoid: Vec<TrackId>,
    /// Overrides of the profile's main thresholds
    pub tolerances: AttributeTolerances,
    /// Tracks to visit between start and end
    pub waypoints: Vec<TrackId>,
    /// Visit waypoints in the given order instead of reordering them
    pub pin_waypoint_order: bool,
}

/// Output and effort options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathOptions {
    pub return_alternatives: bool,
    pub max_alternatives: usize,
    /// Attach a `PathAnalysis` to the result
    pub include_metrics: bool,
    /// Run optimizer passes on the found path
    pub optimize: bool,
    /// Let the optimizer disable single constraints
    pub allow_relaxation: bool,
    pub optimization_level: OptimizationLevel,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            return_alternatives: false,
            max_alternatives: DEFAULT_MAX_ALTERNATIVES,
            include_metrics: false,
            optimize: false,
            allow_relaxation: false,
            optimization_level: OptimizationLevel::default(),
        }
    }
}

/// Start → end path request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathRequest {
    pub start: TrackId,
    pub end: TrackId,
    #[serde(default)]
    pub algorithm: Algorithm,
    #[serde(default)]
    pub profile: ProfileSelection,
    #[serde(default)]
    pub constraints: PathConstraints,
    #[serde(default)]
    pub options: PathOptions,
}

impl PathRequest {
    pub fn new(start: impl Into<TrackId>, end: impl Into<TrackId>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            algorithm: Algorithm::default(),
            profile: ProfileSelection::default(),
            constraints: PathConstraints::default(),
            options: PathOptions::default(),
        }
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_profile(mut self, profile: impl Into<ProfileSelection>) -> Self {
        self.profile = profile.into();
        self
    }

    pub fn with_waypoints<I, T>(mut self, waypoints: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TrackId>,
    {
        self.constraints.waypoints = waypoints.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_constraints(mut self, constraints: PathConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_options(mut self, options: PathOptions) -> Self {
        self.options = options;
        self
    }
}

/// Several ranked start → end paths
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KShortestRequest {
    pub start: TrackId,
    pub end: TrackId,
    pub k: usize,
    /// 0.0 ranks by cost only; 1.0 strongly favours paths unlike the ones
    /// already chosen
    #[serde(default)]
    pub diversity: f64,
    #[serde(default)]
    pub profile: ProfileSelection,
    #[serde(default)]
    pub constraints: PathConstraints,
}

impl KShortestRequest {
    pub fn new(start: impl Into<TrackId>, end: impl Into<TrackId>, k: usize) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            k,
            diversity: 0.0,
            profile: ProfileSelection::default(),
            constraints: PathConstraints::default(),
        }
    }

    pub fn with_diversity(mut self, diversity: f64) -> Self {
        self.diversity = diversity;
        self
    }
}

/// What a multi-waypoint tour optimizes for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TourGoal {
    /// Lowest total cost
    #[default]
    Shortest,
    /// Penalize weak transitions harder
    Smoothest,
    /// Penalize staying within one genre
    Diverse,
}

impl std::str::FromStr for TourGoal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "shortest" => Ok(TourGoal::Shortest),
            "smoothest" => Ok(TourGoal::Smoothest),
            "diverse" => Ok(TourGoal::Diverse),
            other => Err(format!("unknown tour goal: {}", other)),
        }
    }
}

/// Tour through a list of tracks
///
/// The first waypoint is the start. The last one is the end, unless
/// `return_to_start` is set, in which case the tour closes at the start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiWaypointRequest {
    pub waypoints: Vec<TrackId>,
    #[serde(default)]
    pub goal: TourGoal,
    #[serde(default)]
    pub allow_reordering: bool,
    #[serde(default)]
    pub return_to_start: bool,
    /// Total cost above which the result carries a warning
    #[serde(default)]
    pub max_total_distance: Option<f64>,
    /// Extra mismatch penalty factor for the `smoothest` goal
    #[serde(default = "default_smoothness_weight")]
    pub smoothness_weight: f64,
    /// Same-genre penalty for the `diverse` goal
    #[serde(default = "default_diversity_weight")]
    pub diversity_weight: f64,
    #[serde(default)]
    pub algorithm: Algorithm,
    #[serde(default)]
    pub profile: ProfileSelection,
    #[serde(default)]
    pub constraints: PathConstraints,
    #[serde(default)]
    pub options: PathOptions,
}

fn default_smoothness_weight() -> f64 {
    1.0
}

fn default_diversity_weight() -> f64 {
    0.5
}

impl MultiWaypointRequest {
    pub fn new<I, T>(waypoints: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TrackId>,
    {
        Self {
            waypoints: waypoints.into_iter().map(Into::into).collect(),
            goal: TourGoal::default(),
            allow_reordering: false,
            return_to_start: false,
            max_total_distance: None,
            smoothness_weight: default_smoothness_weight(),
            diversity_weight: default_diversity_weight(),
            algorithm: Algorithm::default(),
            profile: ProfileSelection::default(),
            constraints: PathConstraints::default(),
            options: PathOptions::default(),
        }
    }

    pub fn with_goal(mut self, goal: TourGoal) -> Self {
        self.goal = goal;
        self
    }
}
