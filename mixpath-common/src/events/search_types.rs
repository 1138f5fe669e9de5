//! Supporting types for search progress events

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status reported on the progress channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    /// Search is running
    Calculating,
    /// Search finished (with or without a path)
    Complete,
    /// Search was rejected or aborted
    Error,
}

impl fmt::Display for SearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchStatus::Calculating => write!(f, "calculating"),
            SearchStatus::Complete => write!(f, "complete"),
            SearchStatus::Error => write!(f, "error"),
        }
    }
}

/// Snapshot of a running search
///
/// Carried by `EngineEvent::SearchProgress`. All fields are best-effort
/// estimates; consumers must not treat a missing update as a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Fraction of the estimated work done (0.0-1.0)
    pub progress: f32,
    /// Nodes settled so far
    pub nodes_explored: u64,
    /// Cost of the best complete path found so far
    pub current_best: Option<f64>,
    /// Track count of the best complete path found so far
    pub current_length: Option<usize>,
    /// Estimated time remaining (milliseconds)
    pub estimated_remaining_ms: Option<u64>,
}

impl ProgressSnapshot {
    /// Snapshot with only the exploration counter set
    pub fn explored(progress: f32, nodes_explored: u64) -> Self {
        Self {
            progress: progress.clamp(0.0, 1.0),
            nodes_explored,
            current_best: None,
            current_length: None,
            estimated_remaining_ms: None,
        }
    }
}
