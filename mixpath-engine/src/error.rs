//! Error types for mixpath-engine
//!
//! Request-level rejections (`PathfindingError`) happen before any search
//! work starts. Search outcomes that merely fail to produce a path are not
//! errors: they are reported inside the `PathResult` as a `PathFailure`.

use crate::graph::TrackId;
use crate::profile::ConstraintKind;
use thiserror::Error;

/// Graph loading and validation errors
#[derive(Error, Debug)]
pub enum GraphError {
    /// Two tracks share an id
    #[error("Duplicate track id: {0}")]
    DuplicateTrack(TrackId),

    /// Track attribute out of range
    #[error("Invalid track {id}: {reason}")]
    InvalidTrack { id: TrackId, reason: String },

    /// Edge references a track that does not exist
    #[error("Edge {from}-{to} references unknown track {missing}")]
    UnknownEndpoint {
        from: TrackId,
        to: TrackId,
        missing: TrackId,
    },

    /// Edge connects a track to itself
    #[error("Self loop on track {0}")]
    SelfLoop(TrackId),

    /// Edge weight is negative or not finite
    #[error("Invalid weight {weight} on edge {from}-{to}")]
    InvalidWeight {
        from: TrackId,
        to: TrackId,
        weight: f64,
    },

    /// Snapshot could not be decoded
    #[error("Graph JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Snapshot could not be read
    #[error("Graph IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request rejected before search
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathfindingError {
    /// Malformed request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Request references a track missing from the graph
    #[error("Unknown track: {0}")]
    UnknownTrack(TrackId),

    /// Named profile does not exist
    #[error("Unknown constraint profile: {0}")]
    UnknownProfile(String),

    /// Profile values out of range
    #[error("Invalid constraint profile: {0}")]
    InvalidProfile(String),
}

/// Convenience Result type for request handling
pub type Result<T> = std::result::Result<T, PathfindingError>;

/// Failure to apply a path optimization
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizeError {
    /// Optimization refers to positions or tracks that no longer match the path
    #[error("Optimization no longer matches the path: {0}")]
    Stale(String),

    /// A rewritten transition violates a hard constraint
    #[error("Transition {from} -> {to} is infeasible")]
    InfeasibleTransition { from: TrackId, to: TrackId },

    /// Re-routing the swapped waypoints found no path
    #[error("No route between {from} and {to} after reordering")]
    NoRoute { from: TrackId, to: TrackId },

    /// Relaxation requested for a constraint that is already disabled
    #[error("Constraint {0} is already disabled")]
    AlreadyRelaxed(ConstraintKind),
}
