//! Constraint profiles
//!
//! A profile bundles five independently toggleable, independently weighted
//! compatibility rules (harmonic, tempo, energy, genre, timing) plus the two
//! knobs that turn compatibility into cost. Profiles are immutable values:
//! request-level adjustments (tolerances, relaxation, goals) produce a new
//! profile rather than mutating a shared one.
//!
//! Every field has a serde default, so TOML tables and inline request
//! profiles only need to name what they change.

mod presets;

pub use presets::{preset, preset_names, DEFAULT_PROFILE};

use crate::error::PathfindingError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// The five sub-constraints of a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Harmonic,
    Tempo,
    Energy,
    Genre,
    Timing,
}

impl ConstraintKind {
    /// All kinds in scoring order
    pub const ALL: [ConstraintKind; 5] = [
        ConstraintKind::Harmonic,
        ConstraintKind::Tempo,
        ConstraintKind::Energy,
        ConstraintKind::Genre,
        ConstraintKind::Timing,
    ];
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintKind::Harmonic => "harmonic",
            ConstraintKind::Tempo => "tempo",
            ConstraintKind::Energy => "energy",
            ConstraintKind::Genre => "genre",
            ConstraintKind::Timing => "timing",
        };
        f.write_str(name)
    }
}

/// Key compatibility rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonicConstraint {
    pub enabled: bool,
    pub weight: f64,
    /// Distances beyond `allowed_key_jumps` make the edge infeasible
    pub strict_mode: bool,
    /// Largest wheel distance allowed in strict mode
    pub allowed_key_jumps: u8,
}

impl Default for HarmonicConstraint {
    fn default() -> Self {
        Self {
            enabled: true,
            weight: 0.8,
            strict_mode: false,
            allowed_key_jumps: 2,
        }
    }
}

/// Tempo compatibility rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConstraint {
    pub enabled: bool,
    pub weight: f64,
    /// Largest BPM change per transition
    pub max_change: f64,
    pub allow_acceleration: bool,
    pub allow_deceleration: bool,
}

impl Default for TempoConstraint {
    fn default() -> Self {
        Self {
            enabled: true,
            weight: 0.7,
            max_change: 8.0,
            allow_acceleration: true,
            allow_deceleration: true,
        }
    }
}

/// Desired shape of the energy curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnergyFlow {
    #[default]
    Any,
    Ascending,
    Descending,
    Plateau,
    Wave,
}

/// Energy compatibility rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyConstraint {
    pub enabled: bool,
    pub weight: f64,
    /// Largest energy change per transition (0.0-1.0)
    pub max_energy_jump: f64,
    pub flow_type: EnergyFlow,
}

impl Default for EnergyConstraint {
    fn default() -> Self {
        Self {
            enabled: true,
            weight: 0.5,
            max_energy_jump: 0.3,
            flow_type: EnergyFlow::Any,
        }
    }
}

/// Allowed transition between two genres (symmetric)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreTransition {
    pub from: String,
    pub to: String,
}

/// Genre compatibility rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenreConstraint {
    pub enabled: bool,
    pub weight: f64,
    /// Unrelated genres make the edge infeasible
    pub strict_mode: bool,
    /// Score for unrelated genres in lenient mode
    pub default_score: f64,
    /// Genre pairs treated as compatible
    pub transitions: Vec<GenreTransition>,
}

impl Default for GenreConstraint {
    fn default() -> Self {
        Self {
            enabled: true,
            weight: 0.4,
            strict_mode: false,
            default_score: 0.5,
            transitions: Vec::new(),
        }
    }
}

impl GenreConstraint {
    /// Whether the transition table links the two genres (either direction)
    pub fn has_transition(&self, a: &str, b: &str) -> bool {
        self.transitions.iter().any(|t| {
            (t.from.eq_ignore_ascii_case(a) && t.to.eq_ignore_ascii_case(b))
                || (t.from.eq_ignore_ascii_case(b) && t.to.eq_ignore_ascii_case(a))
        })
    }
}

/// Track duration rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConstraint {
    pub enabled: bool,
    pub weight: f64,
    pub min_track_secs: f64,
    pub max_track_secs: f64,
    /// Seconds outside the range over which the score falls to zero
    pub falloff_secs: f64,
}

impl Default for TimingConstraint {
    fn default() -> Self {
        Self {
            enabled: false,
            weight: 0.2,
            min_track_secs: 120.0,
            max_track_secs: 480.0,
            falloff_secs: 60.0,
        }
    }
}

/// Request-level overrides of the main thresholds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeTolerances {
    /// Overrides `tempo.max_change`
    pub bpm: Option<f64>,
    /// Overrides `energy.max_energy_jump`
    pub energy: Option<f64>,
    /// Overrides `harmonic.allowed_key_jumps`
    pub key_steps: Option<u8>,
}

impl AttributeTolerances {
    pub fn is_empty(&self) -> bool {
        self.bpm.is_none() && self.energy.is_none() && self.key_steps.is_none()
    }
}

/// Named bundle of the five sub-constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintProfile {
    pub name: String,
    pub harmonic: HarmonicConstraint,
    pub tempo: TempoConstraint,
    pub energy: EnergyConstraint,
    pub genre: GenreConstraint,
    pub timing: TimingConstraint,
    /// Cost multiplier applied to `1 - compatibility`
    pub mismatch_penalty: f64,
    /// Extra cost (fraction of base weight) for same-genre transitions
    pub same_genre_penalty: f64,
}

impl Default for ConstraintProfile {
    fn default() -> Self {
        Self {
            name: "custom".to_string(),
            harmonic: HarmonicConstraint::default(),
            tempo: TempoConstraint::default(),
            energy: EnergyConstraint::default(),
            genre: GenreConstraint::default(),
            timing: TimingConstraint::default(),
            mismatch_penalty: 2.0,
            same_genre_penalty: 0.0,
        }
    }
}

impl ConstraintProfile {
    /// Whether a sub-constraint takes part in scoring
    pub fn is_enabled(&self, kind: ConstraintKind) -> bool {
        match kind {
            ConstraintKind::Harmonic => self.harmonic.enabled,
            ConstraintKind::Tempo => self.tempo.enabled,
            ConstraintKind::Energy => self.energy.enabled,
            ConstraintKind::Genre => self.genre.enabled,
            ConstraintKind::Timing => self.timing.enabled,
        }
    }

    /// Configured weight of a sub-constraint (regardless of `enabled`)
    pub fn weight_of(&self, kind: ConstraintKind) -> f64 {
        match kind {
            ConstraintKind::Harmonic => self.harmonic.weight,
            ConstraintKind::Tempo => self.tempo.weight,
            ConstraintKind::Energy => self.energy.weight,
            ConstraintKind::Genre => self.genre.weight,
            ConstraintKind::Timing => self.timing.weight,
        }
    }

    /// Copy with one sub-constraint disabled
    pub fn relaxed(&self, kind: ConstraintKind) -> Self {
        let mut profile = self.clone();
        match kind {
            ConstraintKind::Harmonic => profile.harmonic.enabled = false,
            ConstraintKind::Tempo => profile.tempo.enabled = false,
            ConstraintKind::Energy => profile.energy.enabled = false,
            ConstraintKind::Genre => profile.genre.enabled = false,
            ConstraintKind::Timing => profile.timing.enabled = false,
        }
        profile.name = format!("{}-without-{}", self.name, kind);
        profile
    }

    /// Copy with request tolerances applied
    pub fn with_tolerances(&self, tolerances: &AttributeTolerances) -> Self {
        let mut profile = self.clone();
        if let Some(bpm) = tolerances.bpm {
            profile.tempo.max_change = bpm;
        }
        if let Some(energy) = tolerances.energy {
            profile.energy.max_energy_jump = energy;
        }
        if let Some(steps) = tolerances.key_steps {
            profile.harmonic.allowed_key_jumps = steps;
        }
        profile
    }

    /// Check thresholds and weights are in range
    pub fn validate(&self) -> Result<(), PathfindingError> {
        let invalid =
            |msg: String| Err(PathfindingError::InvalidProfile(format!("{}: {}", self.name, msg)));

        for kind in ConstraintKind::ALL {
            let weight = self.weight_of(kind);
            if !(0.0..=1.0).contains(&weight) {
                return invalid(format!("{} weight must be within [0, 1], got {}", kind, weight));
            }
        }
        if self.harmonic.allowed_key_jumps > crate::graph::MAX_KEY_DISTANCE {
            return invalid(format!(
                "harmonic.allowed_key_jumps must be at most {}",
                crate::graph::MAX_KEY_DISTANCE
            ));
        }
        if !self.tempo.max_change.is_finite() || self.tempo.max_change <= 0.0 {
            return invalid("tempo.max_change must be positive".to_string());
        }
        if !(self.energy.max_energy_jump > 0.0 && self.energy.max_energy_jump <= 1.0) {
            return invalid("energy.max_energy_jump must be within (0, 1]".to_string());
        }
        if !(0.0..=1.0).contains(&self.genre.default_score) {
            return invalid("genre.default_score must be within [0, 1]".to_string());
        }
        if self.timing.min_track_secs < 0.0
            || self.timing.max_track_secs < self.timing.min_track_secs
            || self.timing.falloff_secs <= 0.0
        {
            return invalid("timing range must satisfy 0 <= min <= max and falloff > 0".to_string());
        }
        if !self.mismatch_penalty.is_finite() || self.mismatch_penalty < 0.0 {
            return invalid("mismatch_penalty must be non-negative".to_string());
        }
        if !self.same_genre_penalty.is_finite() || self.same_genre_penalty < 0.0 {
            return invalid("same_genre_penalty must be non-negative".to_string());
        }
        Ok(())
    }
}

/// Named profile or an ad hoc one supplied with the request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfileSelection {
    Named(String),
    Inline(Box<ConstraintProfile>),
}

impl Default for ProfileSelection {
    fn default() -> Self {
        ProfileSelection::Named(DEFAULT_PROFILE.to_string())
    }
}

impl From<&str> for ProfileSelection {
    fn from(name: &str) -> Self {
        ProfileSelection::Named(name.to_string())
    }
}

impl From<ConstraintProfile> for ProfileSelection {
    fn from(profile: ConstraintProfile) -> Self {
        ProfileSelection::Inline(Box::new(profile))
    }
}

/// Available profiles: presets plus configured ones
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, ConstraintProfile>,
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::with_presets()
    }
}

impl ProfileRegistry {
    /// Registry containing only the built-in presets
    pub fn with_presets() -> Self {
        let profiles = preset_names()
            .iter()
            .filter_map(|name| preset(name).map(|p| (name.to_string(), p)))
            .collect();
        Self { profiles }
    }

    /// Presets plus profiles from the `[profiles.<name>]` config tables
    ///
    /// A table may set `extends = "<preset>"` to start from a preset other
    /// than the default one; every other key overrides the base.
    pub fn from_config(tables: &BTreeMap<String, toml::Value>) -> Result<Self, PathfindingError> {
        let mut registry = Self::with_presets();
        for (name, table) in tables {
            let profile = registry.decode_table(name, table)?;
            registry.insert(profile)?;
        }
        Ok(registry)
    }

    fn decode_table(
        &self,
        name: &str,
        table: &toml::Value,
    ) -> Result<ConstraintProfile, PathfindingError> {
        let mut overrides = table
            .as_table()
            .cloned()
            .ok_or_else(|| {
                PathfindingError::InvalidProfile(format!("{}: profile must be a table", name))
            })?;

        let base_name = match overrides.remove("extends") {
            Some(toml::Value::String(base)) => base,
            Some(_) => {
                return Err(PathfindingError::InvalidProfile(format!(
                    "{}: extends must be a string",
                    name
                )))
            }
            None => DEFAULT_PROFILE.to_string(),
        };
        let base = self
            .get(&base_name)
            .ok_or_else(|| PathfindingError::UnknownProfile(base_name.clone()))?;

        let mut merged = toml::Value::try_from(base)
            .map_err(|e| PathfindingError::InvalidProfile(format!("{}: {}", name, e)))?;
        merge_toml(&mut merged, toml::Value::Table(overrides));

        let mut profile: ConstraintProfile = merged
            .try_into()
            .map_err(|e| PathfindingError::InvalidProfile(format!("{}: {}", name, e)))?;
        profile.name = name.to_string();

        debug!(profile = %name, base = %base_name, "Decoded configured profile");
        Ok(profile)
    }

    /// Add or replace a profile after validating it
    pub fn insert(&mut self, profile: ConstraintProfile) -> Result<(), PathfindingError> {
        profile.validate()?;
        self.profiles.insert(profile.name.clone(), profile);
        Ok(())
    }

    /// Look up a profile by name
    pub fn get(&self, name: &str) -> Option<&ConstraintProfile> {
        self.profiles.get(name)
    }

    /// All profile names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    /// Resolve a request's profile selection
    pub fn resolve(
        &self,
        selection: &ProfileSelection,
    ) -> Result<ConstraintProfile, PathfindingError> {
        let profile = match selection {
            ProfileSelection::Named(name) => self
                .get(name)
                .cloned()
                .ok_or_else(|| PathfindingError::UnknownProfile(name.clone()))?,
            ProfileSelection::Inline(profile) => (**profile).clone(),
        };
        profile.validate()?;
        Ok(profile)
    }
}

fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
