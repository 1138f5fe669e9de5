//! Edge Weight Calculator
//!
//! Turns a base edge into a context-sensitive traversal cost under a
//! constraint profile.
//!
//! # Scoring
//! Each enabled sub-constraint scores the transition `from → to` in [0, 1]:
//! - **Harmonic**: wheel distance looked up in `HARMONIC_SCORES`; strict mode
//!   blocks distances above `allowed_key_jumps`
//! - **Tempo**: `1 - |Δbpm| / max_change` (linear); blocks larger deltas and
//!   disallowed directions
//! - **Energy**: `1 - |Δe| / max_energy_jump` plus a flow adjustment; blocks
//!   larger jumps. Wave flow rewards swings of at least `WAVE_SWING` and
//!   penalizes flat moves
//! - **Genre**: 1.0 for shared genres or a configured transition, otherwise
//!   `default_score` (lenient) or blocked (strict)
//! - **Timing**: 1.0 inside `[min, max]`, linear falloff outside; never blocks
//!
//! # Combination
//! `compatibility = Σ(wᵢ·sᵢ) / Σwᵢ` over enabled sub-constraints with a
//! positive weight (1.0 when none are active), then
//!
//! `cost = base · (1 + mismatch_penalty · (1 - compatibility))
//!        + same_genre_penalty · base · [shared genre]`
//!
//! so a transition scoring 1.0 on every active sub-constraint costs exactly
//! its base weight and no cost is ever below it. Untagged tracks score
//! `default_score` on genre, so they pay a little more than tagged neighbours
//! with a shared genre. Any blocked sub-constraint makes the edge
//! infeasible; infeasible edges are absent from every search.

use crate::graph::{BaseEdge, RelationshipKind, Track};
use crate::profile::{ConstraintKind, ConstraintProfile, EnergyFlow};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Harmonic score by wheel distance (index = distance)
pub const HARMONIC_SCORES: [f64; 8] = [1.0, 0.9, 0.7, 0.45, 0.25, 0.1, 0.05, 0.0];

const FLOW_BONUS: f64 = 0.1;
const FLOW_AGAINST_PENALTY: f64 = 0.3;
const PLATEAU_TOLERANCE: f64 = 0.05;
const PLATEAU_PENALTY: f64 = 0.2;
/// Smallest energy move a wave flow rewards
const WAVE_SWING: f64 = 0.1;

/// Per-constraint compatibility scores (each 0.0-1.0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub harmonic: f64,
    pub tempo: f64,
    pub energy: f64,
    pub genre: f64,
    pub timing: f64,
}

impl ComponentScores {
    /// Score of one sub-constraint
    pub fn get(&self, kind: ConstraintKind) -> f64 {
        match kind {
            ConstraintKind::Harmonic => self.harmonic,
            ConstraintKind::Tempo => self.tempo,
            ConstraintKind::Energy => self.energy,
            ConstraintKind::Genre => self.genre,
            ConstraintKind::Timing => self.timing,
        }
    }
}

/// Cost of one directed transition plus the scores behind it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextualWeight {
    /// Traversal cost (lower is better)
    pub cost: f64,
    /// Weighted compatibility (0.0-1.0)
    pub compatibility: f64,
    /// Per-constraint breakdown
    pub scores: ComponentScores,
}

/// Outcome of evaluating a directed transition
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeEvaluation {
    Feasible(ContextualWeight),
    Infeasible { violations: Vec<ConstraintKind> },
}

impl EdgeEvaluation {
    pub fn feasible(&self) -> Option<&ContextualWeight> {
        match self {
            EdgeEvaluation::Feasible(w) => Some(w),
            EdgeEvaluation::Infeasible { .. } => None,
        }
    }
}

/// Per-request calculator; owns its (already adjusted) profile
#[derive(Debug, Clone)]
pub struct WeightCalculator {
    profile: ConstraintProfile,
}

impl WeightCalculator {
    pub fn new(profile: ConstraintProfile) -> Self {
        Self { profile }
    }

    /// Profile in effect
    pub fn profile(&self) -> &ConstraintProfile {
        &self.profile
    }

    /// Evaluate the directed transition `from → to` over `edge`
    pub fn evaluate(&self, edge: &BaseEdge, from: &Track, to: &Track) -> EdgeEvaluation {
        let (scores, violations) = self.score(from, to);
        if !violations.is_empty() {
            return EdgeEvaluation::Infeasible { violations };
        }

        let compatibility = self.combine(&scores);
        let mismatch = self.profile.mismatch_penalty * (1.0 - compatibility);
        let mut cost = edge.weight * (1.0 + mismatch);
        if self.profile.same_genre_penalty > 0.0 && from.shares_genre(to) {
            cost += self.profile.same_genre_penalty * edge.weight;
        }

        EdgeEvaluation::Feasible(ContextualWeight {
            cost,
            compatibility,
            scores,
        })
    }

    /// Weighted compatibility ignoring hard constraints
    ///
    /// Used to rank substitutes for tracks that cannot be reached.
    pub fn raw_similarity(&self, from: &Track, to: &Track) -> f64 {
        let (scores, _) = self.score(from, to);
        self.combine(&scores)
    }

    /// Component scores plus the list of violated hard constraints
    pub fn score(&self, from: &Track, to: &Track) -> (ComponentScores, Vec<ConstraintKind>) {
        let mut violations = Vec::new();
        let mut check = |kind: ConstraintKind, enabled: bool, (score, ok): (f64, bool)| {
            if !enabled {
                return 1.0;
            }
            if !ok {
                violations.push(kind);
            }
            score
        };

        let p = &self.profile;
        let scores = ComponentScores {
            harmonic: check(
                ConstraintKind::Harmonic,
                p.harmonic.enabled,
                self.harmonic(from, to),
            ),
            tempo: check(ConstraintKind::Tempo, p.tempo.enabled, self.tempo(from, to)),
            energy: check(ConstraintKind::Energy, p.energy.enabled, self.energy(from, to)),
            genre: check(ConstraintKind::Genre, p.genre.enabled, self.genre(from, to)),
            timing: check(
                ConstraintKind::Timing,
                p.timing.enabled,
                (self.timing(to), true),
            ),
        };
        (scores, violations)
    }

    fn combine(&self, scores: &ComponentScores) -> f64 {
        let (weighted, total) = ConstraintKind::ALL
            .iter()
            .filter(|&&kind| self.profile.is_enabled(kind))
            .map(|&kind| (self.profile.weight_of(kind), scores.get(kind)))
            .filter(|(w, _)| *w > 0.0)
            .fold((0.0, 0.0), |(ws, t), (w, s)| (ws + w * s, t + w));
        if total > 0.0 {
            (weighted / total).clamp(0.0, 1.0)
        } else {
            1.0
        }
    }

    fn harmonic(&self, from: &Track, to: &Track) -> (f64, bool) {
        let rule = &self.profile.harmonic;
        let distance = from.key.distance(&to.key);
        let score = HARMONIC_SCORES[usize::from(distance).min(HARMONIC_SCORES.len() - 1)];
        let ok = !rule.strict_mode || distance <= rule.allowed_key_jumps;
        (score, ok)
    }

    fn tempo(&self, from: &Track, to: &Track) -> (f64, bool) {
        let rule = &self.profile.tempo;
        let delta = to.bpm - from.bpm;
        let direction_ok = (delta <= 0.0 || rule.allow_acceleration)
            && (delta >= 0.0 || rule.allow_deceleration);
        let magnitude = delta.abs();
        let ok = direction_ok && magnitude <= rule.max_change;
        let score = (1.0 - magnitude / rule.max_change).clamp(0.0, 1.0);
        (score, ok)
    }

    fn energy(&self, from: &Track, to: &Track) -> (f64, bool) {
        let rule = &self.profile.energy;
        let delta = to.energy - from.energy;
        let magnitude = delta.abs();
        let ok = magnitude <= rule.max_energy_jump;
        let base = 1.0 - magnitude / rule.max_energy_jump;
        let adjustment = match rule.flow_type {
            EnergyFlow::Ascending if delta >= 0.0 => FLOW_BONUS,
            EnergyFlow::Ascending => -FLOW_AGAINST_PENALTY,
            EnergyFlow::Descending if delta <= 0.0 => FLOW_BONUS,
            EnergyFlow::Descending => -FLOW_AGAINST_PENALTY,
            EnergyFlow::Plateau if magnitude <= PLATEAU_TOLERANCE => FLOW_BONUS,
            EnergyFlow::Plateau => -PLATEAU_PENALTY,
            EnergyFlow::Wave if magnitude >= WAVE_SWING => FLOW_BONUS,
            EnergyFlow::Wave if magnitude <= PLATEAU_TOLERANCE => -PLATEAU_PENALTY,
            EnergyFlow::Wave | EnergyFlow::Any => 0.0,
        };
        ((base + adjustment).clamp(0.0, 1.0), ok)
    }

    fn genre(&self, from: &Track, to: &Track) -> (f64, bool) {
        let rule = &self.profile.genre;
        if from.genres.is_empty() || to.genres.is_empty() {
            return (rule.default_score, true);
        }
        let related = from.shares_genre(to)
            || from
                .genres
                .iter()
                .any(|a| to.genres.iter().any(|b| rule.has_transition(a, b)));
        if related {
            (1.0, true)
        } else if rule.strict_mode {
            (0.0, false)
        } else {
            (rule.default_score, true)
        }
    }

    fn timing(&self, to: &Track) -> f64 {
        let rule = &self.profile.timing;
        let d = to.duration_secs;
        let overshoot = if d < rule.min_track_secs {
            rule.min_track_secs - d
        } else if d > rule.max_track_secs {
            d - rule.max_track_secs
        } else {
            0.0
        };
        (1.0 - overshoot / rule.falloff_secs).clamp(0.0, 1.0)
    }
}

/// Request-level edge filter applied on top of feasibility
#[derive(Debug, Clone, Default)]
pub struct EdgeFilter {
    /// Node indices that may not appear in the path
    pub avoid: HashSet<usize>,
    /// Relationship kinds allowed (`None` = all)
    pub allowed_kinds: Option<HashSet<RelationshipKind>>,
    /// Minimum compatibility for an edge to be usable
    pub min_compatibility: Option<f64>,
}

impl EdgeFilter {
    /// Whether the edge's relationship kind is allowed
    pub fn allows_kind(&self, kind: RelationshipKind) -> bool {
        self.allowed_kinds.as_ref().map_or(true, |kinds| kinds.contains(&kind))
    }

    /// Whether a feasible weight passes the compatibility floor
    pub fn allows_weight(&self, weight: &ContextualWeight) -> bool {
        self.min_compatibility.map_or(true, |min| weight.compatibility >= min)
    }
}
