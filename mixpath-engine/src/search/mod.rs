//! Search strategies
//!
//! Every strategy implements `PathStrategy` over a per-request
//! `SearchContext` and a `LegPlan` (start, ordered reachable waypoints, end).
//! The set of strategies is closed: `Algorithm::strategy()` maps the request
//! field onto the `Strategy` enum, and `Hybrid` delegates to the others.
//!
//! Point-to-point kernels live in `dijkstra` (also used by A*), and
//! `bidirectional`; `legs` chains them through waypoints; `genetic` searches
//! over waypoint orderings; `yen` builds k-shortest lists on top of Dijkstra.

pub mod astar;
pub mod bidirectional;
pub mod context;
pub mod dijkstra;
pub mod genetic;
pub mod hybrid;
pub mod legs;
pub mod yen;

pub use context::{SearchContext, SearchControl, SearchStats};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tolerance for cost comparisons
pub(crate) const COST_EPSILON: f64 = 1e-9;

/// Search algorithm requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Dijkstra,
    #[serde(rename = "astar", alias = "a_star")]
    AStar,
    Bidirectional,
    Genetic,
    #[default]
    Hybrid,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Dijkstra => "dijkstra",
            Algorithm::AStar => "astar",
            Algorithm::Bidirectional => "bidirectional",
            Algorithm::Genetic => "genetic",
            Algorithm::Hybrid => "hybrid",
        }
    }

    /// Strategy implementing this algorithm
    pub fn strategy(self) -> Strategy {
        match self {
            Algorithm::Dijkstra => Strategy::Dijkstra(dijkstra::Dijkstra),
            Algorithm::AStar => Strategy::AStar(astar::AStar),
            Algorithm::Bidirectional => Strategy::Bidirectional(bidirectional::Bidirectional),
            Algorithm::Genetic => Strategy::Genetic(genetic::Genetic),
            Algorithm::Hybrid => Strategy::Hybrid(hybrid::Hybrid),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dijkstra" => Ok(Algorithm::Dijkstra),
            "astar" | "a_star" | "a*" => Ok(Algorithm::AStar),
            "bidirectional" => Ok(Algorithm::Bidirectional),
            "genetic" => Ok(Algorithm::Genetic),
            "hybrid" => Ok(Algorithm::Hybrid),
            other => Err(format!("unknown algorithm: {}", other)),
        }
    }
}

/// Effort level of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationLevel {
    Fast,
    #[default]
    Balanced,
    Thorough,
}

impl std::str::FromStr for OptimizationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(OptimizationLevel::Fast),
            "balanced" => Ok(OptimizationLevel::Balanced),
            "thorough" => Ok(OptimizationLevel::Thorough),
            other => Err(format!("unknown optimization level: {}", other)),
        }
    }
}

/// How a search ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Search ran to completion
    #[default]
    Completed,
    /// Genetic search stopped improving
    Converged,
    /// Genetic search used its generation budget
    GenerationLimit,
    /// Request deadline passed
    TimedOut,
    /// Caller cancelled the request
    Cancelled,
}

impl Termination {
    /// Whether the search was cut short from outside
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Termination::TimedOut | Termination::Cancelled)
    }
}

/// Start, ordered waypoints, and end of one search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegPlan {
    pub start: usize,
    pub end: usize,
    /// Reachable waypoints in visiting order
    pub waypoints: Vec<usize>,
}

impl LegPlan {
    pub fn direct(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            waypoints: Vec::new(),
        }
    }
}

/// Result of running one strategy
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutcome {
    /// Node indices from start to end
    pub path: Option<Vec<usize>>,
    /// Waypoints on the path, in path order
    pub included: Vec<usize>,
    /// Waypoints the path does not visit
    pub skipped: Vec<usize>,
    pub termination: Termination,
    /// Whether the path is provably optimal for the plan
    pub optimal: bool,
}

impl StrategyOutcome {
    /// Outcome without a path; every waypoint counts as skipped
    pub fn no_path(plan: &LegPlan, termination: Termination) -> Self {
        Self {
            path: None,
            included: Vec::new(),
            skipped: plan.waypoints.clone(),
            termination,
            optimal: false,
        }
    }
}

/// Common contract of all search strategies
pub trait PathStrategy {
    fn name(&self) -> Algorithm;
    fn search(&self, ctx: &mut SearchContext<'_>, plan: &LegPlan) -> StrategyOutcome;
}

/// Closed set of strategies
#[derive(Debug, Clone, Copy)]
pub enum Strategy {
    Dijkstra(dijkstra::Dijkstra),
    AStar(astar::AStar),
    Bidirectional(bidirectional::Bidirectional),
    Genetic(genetic::Genetic),
    Hybrid(hybrid::Hybrid),
}

impl PathStrategy for Strategy {
    fn name(&self) -> Algorithm {
        match self {
            Strategy::Dijkstra(s) => s.name(),
            Strategy::AStar(s) => s.name(),
            Strategy::Bidirectional(s) => s.name(),
            Strategy::Genetic(s) => s.name(),
            Strategy::Hybrid(s) => s.name(),
        }
    }

    fn search(&self, ctx: &mut SearchContext<'_>, plan: &LegPlan) -> StrategyOutcome {
        match self {
            Strategy::Dijkstra(s) => s.search(ctx, plan),
            Strategy::AStar(s) => s.search(ctx, plan),
            Strategy::Bidirectional(s) => s.search(ctx, plan),
            Strategy::Genetic(s) => s.search(ctx, plan),
            Strategy::Hybrid(s) => s.search(ctx, plan),
        }
    }
}
