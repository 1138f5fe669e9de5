//! Built-in constraint profile presets

use super::{
    ConstraintProfile, EnergyConstraint, EnergyFlow, GenreConstraint, HarmonicConstraint,
    TempoConstraint, TimingConstraint,
};
use once_cell::sync::Lazy;

/// Profile used when a request names none
pub const DEFAULT_PROFILE: &str = "balanced";

static PRESETS: Lazy<Vec<ConstraintProfile>> = Lazy::new(|| {
    vec![
        ConstraintProfile {
            name: "balanced".to_string(),
            ..ConstraintProfile::default()
        },
        ConstraintProfile {
            name: "strict_harmonic".to_string(),
            harmonic: HarmonicConstraint {
                enabled: true,
                weight: 1.0,
                strict_mode: true,
                allowed_key_jumps: 1,
            },
            tempo: TempoConstraint {
                max_change: 6.0,
                ..TempoConstraint::default()
            },
            ..ConstraintProfile::default()
        },
        ConstraintProfile {
            name: "flexible".to_string(),
            harmonic: HarmonicConstraint {
                weight: 0.4,
                ..HarmonicConstraint::default()
            },
            tempo: TempoConstraint {
                weight: 0.5,
                max_change: 20.0,
                ..TempoConstraint::default()
            },
            energy: EnergyConstraint {
                weight: 0.3,
                max_energy_jump: 0.6,
                ..EnergyConstraint::default()
            },
            genre: GenreConstraint {
                weight: 0.2,
                default_score: 0.7,
                ..GenreConstraint::default()
            },
            mismatch_penalty: 1.0,
            ..ConstraintProfile::default()
        },
        ConstraintProfile {
            name: "energy_focused".to_string(),
            harmonic: HarmonicConstraint {
                weight: 0.5,
                ..HarmonicConstraint::default()
            },
            energy: EnergyConstraint {
                enabled: true,
                weight: 1.0,
                max_energy_jump: 0.2,
                flow_type: EnergyFlow::Ascending,
            },
            ..ConstraintProfile::default()
        },
        ConstraintProfile {
            name: "genre_focused".to_string(),
            genre: GenreConstraint {
                weight: 1.0,
                strict_mode: true,
                ..GenreConstraint::default()
            },
            harmonic: HarmonicConstraint {
                weight: 0.5,
                ..HarmonicConstraint::default()
            },
            ..ConstraintProfile::default()
        },
        ConstraintProfile {
            name: "dj_set".to_string(),
            harmonic: HarmonicConstraint {
                enabled: true,
                weight: 0.9,
                strict_mode: true,
                allowed_key_jumps: 1,
            },
            tempo: TempoConstraint {
                weight: 1.0,
                max_change: 4.0,
                ..TempoConstraint::default()
            },
            energy: EnergyConstraint {
                weight: 0.6,
                max_energy_jump: 0.25,
                flow_type: EnergyFlow::Wave,
                ..EnergyConstraint::default()
            },
            timing: TimingConstraint {
                enabled: true,
                ..TimingConstraint::default()
            },
            ..ConstraintProfile::default()
        },
    ]
});

/// Copy of a preset by name
pub fn preset(name: &str) -> Option<ConstraintProfile> {
    PRESETS.iter().find(|p| p.name == name).cloned()
}

/// Names of all presets, in declaration order
pub fn preset_names() -> Vec<&'static str> {
    PRESETS.iter().map(|p| p.name.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_presets_valid() {
        for name in preset_names() {
            let profile = preset(name).unwrap();
            assert!(profile.validate().is_ok(), "preset {name} invalid");
        }
    }

    #[test]
    fn test_default_preset_exists() {
        assert!(preset(DEFAULT_PROFILE).is_some());
        assert!(preset("no_such_preset").is_none());
    }
}
