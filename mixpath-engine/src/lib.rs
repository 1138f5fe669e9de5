//! # mixpath Engine Library (mixpath-engine)
//!
//! Constrained multi-criteria path construction over a graph of music
//! tracks.
//!
//! **Purpose:** Build listening paths between two tracks that respect key,
//! tempo, energy, genre, and duration constraints, optionally through
//! waypoints, and explain how good the resulting path is.
//!
//! **Architecture:** Immutable `TrackGraph` shared behind an `Arc`; every
//! request runs on its own `SearchContext` (profile-aware edge weights,
//! cancellation, deadline, progress events) so one `PathfindingEngine`
//! serves concurrent requests.
//!
//! ```no_run
//! use std::sync::Arc;
//! use mixpath_engine::{PathRequest, PathfindingEngine, SearchControl, TrackGraph};
//!
//! # fn main() -> anyhow::Result<()> {
//! let graph = TrackGraph::from_json_file("library.json".as_ref())?;
//! let engine = PathfindingEngine::new(Arc::new(graph));
//! let result = engine.find_path(&PathRequest::new("intro", "peak"), SearchControl::default())?;
//! println!("{} tracks, cost {:.2}", result.len(), result.total_weight);
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod optimizer;
pub mod profile;
pub mod request;
pub mod result;
pub mod search;
pub mod waypoints;
pub mod weight;

pub use analyzer::{PathAnalysis, PathAnalyzer};
pub use config::EngineConfig;
pub use engine::PathfindingEngine;
pub use error::{GraphError, OptimizeError, PathfindingError, Result};
pub use graph::{BaseEdge, MusicalKey, RelationshipKind, Track, TrackGraph, TrackId};
pub use optimizer::{OptimizeOptions, PathOptimization, PathOptimizer};
pub use profile::{ConstraintKind, ConstraintProfile, ProfileRegistry, ProfileSelection};
pub use request::{
    KShortestRequest, MultiWaypointRequest, PathConstraints, PathOptions, PathRequest, TourGoal,
};
pub use result::{PathFailure, PathNode, PathResult};
pub use search::{Algorithm, OptimizationLevel, SearchControl, Termination};
pub use waypoints::{WaypointResolver, WaypointValidation};
pub use weight::{EdgeFilter, WeightCalculator};
