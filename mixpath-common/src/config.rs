//! Configuration loading and config file resolution
//!
//! Bootstrap configuration lives in a single TOML file. Resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `MIXPATH_CONFIG` environment variable
//! 3. Platform config directory (`<config_dir>/mixpath/config.toml`)
//! 4. Compiled defaults (fallback)
//!
//! A missing file is never fatal: a warning is logged and compiled defaults
//! are used. A file that exists but cannot be parsed is a configuration error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "MIXPATH_CONFIG";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Search budgets and strategy tuning (optional)
    #[serde(default)]
    pub search: SearchSettings,

    /// Ad hoc constraint profiles keyed by name
    ///
    /// Kept as raw TOML here; the engine decodes each table into a
    /// constraint profile and merges it over the built-in presets.
    #[serde(default)]
    pub profiles: BTreeMap<String, toml::Value>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter directive (trace, debug, info, warn, error, or an EnvFilter string)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Search budgets and strategy tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Deadline for `fast` requests (milliseconds)
    pub fast_deadline_ms: u64,
    /// Deadline for `balanced` requests (milliseconds)
    pub balanced_deadline_ms: u64,
    /// Deadline for `thorough` requests (milliseconds)
    pub thorough_deadline_ms: u64,

    /// Graphs with more nodes than this use bidirectional search in hybrid mode
    pub large_graph_nodes: usize,

    /// Waypoint count above which hybrid mode switches to the genetic search
    pub genetic_waypoint_threshold: usize,

    /// Maximum optimizer passes applied after a search
    pub max_optimization_passes: usize,

    /// Settled nodes between cancellation checks and progress events
    pub check_interval: usize,

    /// Genetic search parameters
    pub genetic: GeneticSettings,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            fast_deadline_ms: 250,
            balanced_deadline_ms: 2_000,
            thorough_deadline_ms: 10_000,
            large_graph_nodes: 5_000,
            genetic_waypoint_threshold: 5,
            max_optimization_passes: 3,
            check_interval: 256,
            genetic: GeneticSettings::default(),
        }
    }
}

/// Genetic search parameters
///
/// Generation budget and population size are derived from the request's
/// optimization level; the values here shape scoring and reproduction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneticSettings {
    /// RNG seed; identical seeds give identical results for identical requests
    pub seed: u64,
    /// Fitness penalty per skipped waypoint
    pub skip_penalty: f64,
    /// Tournament size for parent selection
    pub tournament_size: usize,
    /// Individuals copied unchanged into the next generation
    pub elitism: usize,
    /// Probability that a child is mutated
    pub mutation_rate: f64,
}

impl Default for GeneticSettings {
    fn default() -> Self {
        Self {
            seed: 0x5EED_CAFE,
            skip_penalty: 100.0,
            tournament_size: 3,
            elitism: 2,
            mutation_rate: 0.3,
        }
    }
}

/// Config file resolver following the documented priority order
pub struct ConfigResolver {
    cli_arg: Option<PathBuf>,
}

impl ConfigResolver {
    /// Create resolver with an optional command-line path
    pub fn new(cli_arg: Option<PathBuf>) -> Self {
        Self { cli_arg }
    }

    /// Resolve the config file path, or `None` when compiled defaults apply
    ///
    /// CLI and environment paths are returned even if the file does not
    /// exist, so that `load_config` can warn about the missing file. The
    /// platform path is only returned when it exists.
    pub fn resolve(&self) -> Option<PathBuf> {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_arg {
            return Some(path.clone());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        // Priority 3: Platform config directory
        default_config_path().filter(|p| p.exists())
    }
}

/// Platform config file location (`~/.config/mixpath/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mixpath").join("config.toml"))
}

/// Load configuration with graceful degradation
///
/// - `None` → compiled defaults
/// - path that does not exist → warning + compiled defaults
/// - path that exists but fails to parse → `Error::Config`
pub fn load_config(path: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = path else {
        info!("No config file found, using compiled defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!(
            path = %path.display(),
            "Config file not found, using compiled defaults"
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

    info!(
        path = %path.display(),
        profiles = config.profiles.len(),
        "Loaded configuration"
    );
    Ok(config)
}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<TomlConfig> {
    let config: TomlConfig = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &TomlConfig) -> Result<()> {
    let search = &config.search;
    if search.fast_deadline_ms == 0
        || search.balanced_deadline_ms == 0
        || search.thorough_deadline_ms == 0
    {
        return Err(Error::Config("search deadlines must be greater than zero".to_string()));
    }
    if search.check_interval == 0 {
        return Err(Error::Config("search.check_interval must be greater than zero".to_string()));
    }
    let genetic = &search.genetic;
    if genetic.tournament_size == 0 {
        return Err(Error::Config("search.genetic.tournament_size must be at least 1".to_string()));
    }
    if !(0.0..=1.0).contains(&genetic.mutation_rate) {
        return Err(Error::Config(format!(
            "search.genetic.mutation_rate must be within [0, 1], got {}",
            genetic.mutation_rate
        )));
    }
    if genetic.skip_penalty < 0.0 {
        return Err(Error::Config("search.genetic.skip_penalty must be non-negative".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TomlConfig::default();
        assert!(validate(&config).is_ok());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.search.balanced_deadline_ms, 2_000);
    }

    #[test]
    fn test_partial_search_table_keeps_defaults() {
        let config = parse_config(
            r#"
            [search]
            fast_deadline_ms = 100

            [search.genetic]
            seed = 42
            "#,
        )
        .unwrap();

        assert_eq!(config.search.fast_deadline_ms, 100);
        assert_eq!(config.search.thorough_deadline_ms, 10_000);
        assert_eq!(config.search.genetic.seed, 42);
        assert_eq!(config.search.genetic.tournament_size, 3);
    }

    #[test]
    fn test_invalid_mutation_rate_rejected() {
        let err = parse_config(
            r#"
            [search.genetic]
            mutation_rate = 1.5
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_deadline_rejected() {
        let err = parse_config("[search]\nbalanced_deadline_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("deadlines"));
    }
}
