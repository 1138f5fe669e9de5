//! mixpath - Main entry point
//!
//! Command-line front end over the pathfinding engine: loads a track graph
//! snapshot, runs one request, and prints the `PathResult` as JSON on
//! stdout. Logs go to stderr (or the configured log file).
//!
//! ```bash
//! mixpath --graph library.json path --from intro --to peak --via a --via b --metrics
//! mixpath --graph library.json k-shortest --from intro --to peak -k 5 --diversity 0.4
//! mixpath --graph library.json tour --waypoints a,b,c,d --goal smoothest --reorder
//! mixpath profiles --show dj_set
//! ```

use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mixpath_common::config::{load_config, ConfigResolver, LoggingConfig};
use mixpath_common::events::{EngineEvent, EventBus};
use mixpath_engine::{
    Algorithm, EngineConfig, KShortestRequest, MultiWaypointRequest, OptimizationLevel,
    PathConstraints, PathOptions, PathRequest, PathResult, PathfindingEngine, PathfindingError,
    ProfileRegistry, ProfileSelection, SearchControl, TourGoal, TrackGraph, TrackId,
};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for mixpath
#[derive(Parser, Debug)]
#[command(name = "mixpath")]
#[command(about = "Build constrained listening paths through a track graph")]
#[command(version)]
struct Args {
    /// Track graph snapshot (JSON with `tracks` and `edges`)
    #[arg(short, long, env = "MIXPATH_GRAPH")]
    graph: Option<PathBuf>,

    /// Configuration file (overrides MIXPATH_CONFIG and the platform path)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

/// Options shared by the search subcommands
#[derive(clap::Args, Debug)]
struct SearchArgs {
    /// Constraint profile name
    #[arg(short, long)]
    profile: Option<String>,

    /// Maximum number of tracks, endpoints included
    #[arg(long)]
    max_length: Option<usize>,

    /// Minimum compatibility (0.0-1.0) of every transition
    #[arg(long)]
    min_weight: Option<f64>,

    /// Tracks to keep off the path
    #[arg(long, value_delimiter = ',')]
    avoid: Vec<String>,

    /// Override the profile's BPM tolerance
    #[arg(long)]
    bpm_tolerance: Option<f64>,
}

impl SearchArgs {
    fn profile(&self) -> ProfileSelection {
        self.profile
            .as_deref()
            .map(ProfileSelection::from)
            .unwrap_or_default()
    }

    fn constraints(&self) -> PathConstraints {
        let mut constraints = PathConstraints {
            max_length: self.max_length,
            min_weight: self.min_weight,
            avoid: self.avoid.iter().map(|id| TrackId::from(id.as_str())).collect(),
            ..PathConstraints::default()
        };
        constraints.tolerances.bpm = self.bpm_tolerance;
        constraints
    }
}

/// Output options shared by path and tour
#[derive(clap::Args, Debug)]
struct OutputArgs {
    /// Search strategy
    #[arg(short, long, default_value = "hybrid")]
    algorithm: Algorithm,

    /// Effort level (fast, balanced, thorough)
    #[arg(long, default_value = "balanced")]
    level: OptimizationLevel,

    /// Attach a quality analysis
    #[arg(long)]
    metrics: bool,

    /// Run optimizer passes on the found path
    #[arg(long)]
    optimize: bool,

    /// Let the optimizer disable single constraints
    #[arg(long, requires = "optimize")]
    allow_relaxation: bool,

    /// Number of alternative paths to include
    #[arg(long)]
    alternatives: Option<usize>,
}

impl OutputArgs {
    fn options(&self) -> PathOptions {
        let mut options = PathOptions {
            include_metrics: self.metrics,
            optimize: self.optimize,
            allow_relaxation: self.allow_relaxation,
            optimization_level: self.level,
            ..PathOptions::default()
        };
        if let Some(count) = self.alternatives {
            options.return_alternatives = count > 0;
            options.max_alternatives = count;
        }
        options
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find a path between two tracks
    Path {
        #[arg(long = "from")]
        start: String,
        #[arg(long = "to")]
        end: String,

        /// Track to visit on the way (repeatable)
        #[arg(long = "via", value_delimiter = ',')]
        waypoints: Vec<String>,

        /// Keep the waypoint order as given
        #[arg(long)]
        pin_order: bool,

        #[command(flatten)]
        search: SearchArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Rank several paths between two tracks
    KShortest {
        #[arg(long = "from")]
        start: String,
        #[arg(long = "to")]
        end: String,

        /// Number of paths
        #[arg(short, default_value = "3")]
        k: usize,

        /// Preference for paths unlike each other (0.0-1.0)
        #[arg(long, default_value = "0.0")]
        diversity: f64,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// Tour through several tracks; the first is the start
    Tour {
        /// Stops in visiting order
        #[arg(long, value_delimiter = ',', required = true)]
        waypoints: Vec<String>,

        /// shortest, smoothest, or diverse
        #[arg(long, default_value = "shortest")]
        goal: TourGoal,

        /// Allow visiting the stops in a different order
        #[arg(long)]
        reorder: bool,

        /// Close the tour at the first stop
        #[arg(long = "round-trip")]
        return_to_start: bool,

        /// Warn when the total cost exceeds this
        #[arg(long)]
        max_total: Option<f64>,

        #[command(flatten)]
        search: SearchArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Run a JSON path request from a file
    Request {
        file: PathBuf,
    },

    /// List constraint profiles, or print one
    Profiles {
        #[arg(long)]
        show: Option<String>,
    },
}

/// Initialize tracing from the config file's logging table
///
/// `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!(
            "mixpath_engine={level},mixpath_common={level},mixpath={level}",
            level = logging.level
        ))
        .or_else(|_| EnvFilter::try_new(&logging.level))
    })?;

    let file_layer = match &logging.file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    let stderr_layer = logging
        .file
        .is_none()
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(())
}

/// Log progress events until the bus closes
async fn log_progress(bus: EventBus) {
    let mut rx = bus.subscribe();
    loop {
        match rx.recv().await {
            Ok(EngineEvent::SearchProgress {
                request_id,
                status,
                snapshot,
                ..
            }) => {
                debug!(
                    request_id = %request_id,
                    status = %status,
                    progress = snapshot.progress,
                    nodes_explored = snapshot.nodes_explored,
                    current_best = ?snapshot.current_best,
                    "Search progress"
                );
            }
            Ok(event) => debug!(
                event = event.event_type(),
                request_id = %event.request_id(),
                "Engine event"
            ),
            Err(RecvError::Lagged(skipped)) => debug!(skipped, "Progress log lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Cancel running searches on Ctrl+C
fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, cancelling search");
                cancel.cancel();
            }
            Err(e) => warn!("Failed to install Ctrl+C handler: {}", e),
        }
    });
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", json);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config_path = ConfigResolver::new(args.config.clone()).resolve();
    let config = load_config(config_path.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.logging)?;
    if let Some(path) = &config_path {
        info!(path = %path.display(), "Using configuration file");
    }

    let profiles = ProfileRegistry::from_config(&config.profiles)
        .context("Invalid profile in configuration")?;
    if let Command::Profiles { show } = &args.command {
        match show {
            Some(name) => {
                let profile = profiles
                    .get(name)
                    .with_context(|| format!("Unknown constraint profile: {}", name))?;
                print_json(profile, args.pretty)?;
            }
            None => print_json(&profiles.names(), args.pretty)?,
        }
        return Ok(ExitCode::SUCCESS);
    }

    let graph_path = args
        .graph
        .as_ref()
        .context("A track graph is required (--graph or MIXPATH_GRAPH)")?;
    let graph = TrackGraph::from_json_file(graph_path)
        .with_context(|| format!("Failed to load track graph {}", graph_path.display()))?;
    info!(
        path = %graph_path.display(),
        tracks = graph.node_count(),
        edges = graph.edge_count(),
        "Track graph loaded"
    );

    let engine_config = EngineConfig::from_settings(&config.search);
    let bus = EventBus::new(engine_config.event_capacity);
    tokio::spawn(log_progress(bus.clone()));

    let engine = Arc::new(
        PathfindingEngine::new(Arc::new(graph))
            .with_config(engine_config)
            .with_profiles(profiles)
            .with_events(bus),
    );

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());
    let control = SearchControl::new(cancel);

    let command = args.command;
    let result: PathResult = tokio::task::spawn_blocking(move || match command {
        Command::Path {
            start,
            end,
            waypoints,
            pin_order,
            search,
            output,
        } => {
            let mut constraints = search.constraints();
            constraints.waypoints = waypoints.into_iter().map(TrackId::from).collect();
            constraints.pin_waypoint_order = pin_order;
            let request = PathRequest::new(start, end)
                .with_algorithm(output.algorithm)
                .with_profile(search.profile())
                .with_constraints(constraints)
                .with_options(output.options());
            engine.find_path(&request, control)
        }
        Command::KShortest {
            start,
            end,
            k,
            diversity,
            search,
        } => {
            let mut request = KShortestRequest::new(start, end, k).with_diversity(diversity);
            request.profile = search.profile();
            request.constraints = search.constraints();
            engine.k_shortest_paths(&request, control)
        }
        Command::Tour {
            waypoints,
            goal,
            reorder,
            return_to_start,
            max_total,
            search,
            output,
        } => {
            let mut request = MultiWaypointRequest::new(waypoints).with_goal(goal);
            request.allow_reordering = reorder;
            request.return_to_start = return_to_start;
            request.max_total_distance = max_total;
            request.algorithm = output.algorithm;
            request.profile = search.profile();
            request.constraints = search.constraints();
            request.options = output.options();
            engine.multi_waypoint(&request, control)
        }
        Command::Request { file } => {
            use PathfindingError::InvalidRequest;
            let request = std::fs::read_to_string(&file)
                .map_err(|e| InvalidRequest(format!("{}: {}", file.display(), e)))
                .and_then(|json| {
                    serde_json::from_str::<PathRequest>(&json)
                        .map_err(|e| InvalidRequest(e.to_string()))
                })?;
            engine.find_path(&request, control)
        }
        Command::Profiles { .. } => unreachable!("handled before the graph is loaded"),
    })
    .await
    .context("Search task failed")??;

    print_json(&result, args.pretty)?;
    if result.success {
        Ok(ExitCode::SUCCESS)
    } else {
        warn!(failure = ?result.failure, "No path produced");
        Ok(ExitCode::from(2))
    }
}
