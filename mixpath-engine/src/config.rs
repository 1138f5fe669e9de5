//! Engine configuration
//!
//! Runtime view of the `[search]` TOML table. `SearchSettings` keeps the
//! serialized shape (milliseconds, plain numbers); `EngineConfig` converts it
//! once into the types the search code works with.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line `--config <file>`
//! 2. `MIXPATH_CONFIG` environment variable
//! 3. `<config_dir>/mixpath/config.toml`
//! 4. Built-in defaults (see `SearchSettings::default`)

use crate::search::OptimizationLevel;
use mixpath_common::config::{GeneticSettings, SearchSettings};
use std::time::Duration;

/// Default capacity of the progress event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Generation budget of one genetic run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneticBudget {
    /// Maximum generations
    pub generations: usize,
    /// Individuals per generation
    pub population: usize,
    /// Generations without improvement before stopping
    pub stall_limit: usize,
}

/// Search configuration shared by all requests of an engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    // === Deadlines ===
    pub fast_deadline: Duration,
    pub balanced_deadline: Duration,
    pub thorough_deadline: Duration,

    // === Strategy selection ===
    pub large_graph_nodes: usize,
    pub genetic_waypoint_threshold: usize,

    // === Post-processing ===
    pub max_optimization_passes: usize,

    // === Cancellation and progress ===
    pub check_interval: usize,
    pub event_capacity: usize,

    // === Genetic search ===
    pub genetic: GeneticSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_settings(&SearchSettings::default())
    }
}

impl EngineConfig {
    /// Convert the TOML search table
    pub fn from_settings(settings: &SearchSettings) -> Self {
        Self {
            fast_deadline: Duration::from_millis(settings.fast_deadline_ms),
            balanced_deadline: Duration::from_millis(settings.balanced_deadline_ms),
            thorough_deadline: Duration::from_millis(settings.thorough_deadline_ms),
            large_graph_nodes: settings.large_graph_nodes,
            genetic_waypoint_threshold: settings.genetic_waypoint_threshold,
            max_optimization_passes: settings.max_optimization_passes,
            check_interval: settings.check_interval.max(1),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            genetic: settings.genetic.clone(),
        }
    }

    /// Wall-clock budget of a request
    pub fn deadline(&self, level: OptimizationLevel) -> Duration {
        match level {
            OptimizationLevel::Fast => self.fast_deadline,
            OptimizationLevel::Balanced => self.balanced_deadline,
            OptimizationLevel::Thorough => self.thorough_deadline,
        }
    }

    /// Genetic generation budget for a level
    pub fn genetic_budget(&self, level: OptimizationLevel) -> GeneticBudget {
        match level {
            OptimizationLevel::Fast => GeneticBudget {
                generations: 30,
                population: 16,
                stall_limit: 10,
            },
            OptimizationLevel::Balanced => GeneticBudget {
                generations: 80,
                population: 32,
                stall_limit: 20,
            },
            OptimizationLevel::Thorough => GeneticBudget {
                generations: 200,
                population: 48,
                stall_limit: 30,
            },
        }
    }
}
