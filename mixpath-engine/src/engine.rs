//! Pathfinding engine
//!
//! Entry point for path requests. The engine owns the shared graph, the
//! engine configuration, and the profile registry; every request gets its
//! own `SearchContext`, so one engine can serve concurrent requests from
//! several threads.
//!
//! Request flow: validation → waypoint resolution → search strategy →
//! optional optimizer passes → optional alternatives and analysis.

use crate::analyzer::PathAnalyzer;
use crate::config::EngineConfig;
use crate::error::{PathfindingError, Result};
use crate::graph::{TrackGraph, TrackId};
use crate::optimizer::{OptimizeOptions, PathOptimizer};
use crate::profile::{ConstraintKind, ConstraintProfile, ProfileRegistry, ProfileSelection};
use crate::request::{
    KShortestRequest, MultiWaypointRequest, PathConstraints, PathOptions, PathRequest, TourGoal,
};
use crate::result::{PathFailure, PathResult, SearchMetadata};
use crate::search::yen::{self, KShortest};
use crate::search::{
    LegPlan, OptimizationLevel, PathStrategy, SearchContext, SearchControl, StrategyOutcome,
    Termination,
};
use crate::waypoints::WaypointResolver;
use crate::weight::{EdgeEvaluation, EdgeFilter, WeightCalculator};
use mixpath_common::events::{EngineEvent, EventBus, ProgressSnapshot, SearchStatus};
use mixpath_common::time;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Validated request, ready to search
struct Prepared {
    request_id: Uuid,
    start: usize,
    end: usize,
    waypoints: Vec<usize>,
    filter: EdgeFilter,
    profile: ConstraintProfile,
}

/// Path construction over a shared track graph
#[derive(Debug, Clone)]
pub struct PathfindingEngine {
    graph: Arc<TrackGraph>,
    config: EngineConfig,
    profiles: ProfileRegistry,
    events: Option<EventBus>,
}

impl PathfindingEngine {
    /// Engine with default configuration and the preset profiles
    pub fn new(graph: Arc<TrackGraph>) -> Self {
        Self {
            graph,
            config: EngineConfig::default(),
            profiles: ProfileRegistry::with_presets(),
            events: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_profiles(mut self, profiles: ProfileRegistry) -> Self {
        self.profiles = profiles;
        self
    }

    /// Publish search events on `bus` for every request
    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn graph(&self) -> &Arc<TrackGraph> {
        &self.graph
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn profiles(&self) -> &ProfileRegistry {
        &self.profiles
    }

    /// Find a start → end path
    pub fn find_path(&self, request: &PathRequest, control: SearchControl) -> Result<PathResult> {
        let profile = self.resolve_profile(&request.profile, &request.constraints)?;
        self.run(request, profile, control)
    }

    /// Up to `k` ranked start → end paths
    ///
    /// The best path is the returned result; the others are its
    /// `alternatives`, in rank order.
    pub fn k_shortest_paths(
        &self,
        request: &KShortestRequest,
        control: SearchControl,
    ) -> Result<PathResult> {
        let began = Instant::now();
        if request.k == 0 {
            return Err(PathfindingError::InvalidRequest("k must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&request.diversity) {
            return Err(PathfindingError::InvalidRequest(format!(
                "diversity must be within [0, 1], got {}",
                request.diversity
            )));
        }
        if !request.constraints.waypoints.is_empty() {
            return Err(PathfindingError::InvalidRequest(
                "k-shortest requests do not take waypoints".to_string(),
            ));
        }
        let profile = self.resolve_profile(&request.profile, &request.constraints)?;
        let prepared = self.prepare(&request.start, &request.end, &request.constraints, profile)?;

        let level = OptimizationLevel::default();
        let (control, bus) = self.attach_events(control, level);
        let mut ctx = self.context(&prepared, &request.constraints, level, control);
        emit_started(bus.as_ref(), prepared.request_id, "k_shortest");

        let found = match ctx.check_now() {
            Some(termination) => KShortest {
                paths: Vec::new(),
                termination,
            },
            None => yen::k_shortest_paths(
                &mut ctx,
                prepared.start,
                prepared.end,
                request.k,
                request.diversity,
            ),
        };
        let none = HashSet::new();
        let mut results: Vec<PathResult> = found
            .paths
            .iter()
            .filter_map(|leg| PathResult::from_path(&ctx, prepared.request_id, &leg.nodes, &none))
            .collect();

        let mut result = if results.is_empty() {
            PathResult::failed(
                prepared.request_id,
                failure_for(&ctx, prepared.start, prepared.end, found.termination),
            )
        } else {
            let mut primary = results.remove(0);
            primary.optimal = found.termination == Termination::Completed;
            for alternative in &mut results {
                alternative.metadata.termination = found.termination;
            }
            primary.alternatives = results;
            primary
        };
        if found.termination.is_interrupted() && result.success {
            result.warnings.push(interrupted_warning(found.termination));
        }
        if result.success && result.alternatives.len() + 1 < request.k {
            result.warnings.push(format!(
                "Only {} of {} requested paths exist",
                result.alternatives.len() + 1,
                request.k
            ));
        }

        Ok(self.finish(ctx, result, found.termination, false, began, bus.as_ref()))
    }

    /// Tour through several tracks
    pub fn multi_waypoint(
        &self,
        request: &MultiWaypointRequest,
        control: SearchControl,
    ) -> Result<PathResult> {
        let Some(first) = request.waypoints.first() else {
            return Err(PathfindingError::InvalidRequest(
                "multi-waypoint request needs at least one waypoint".to_string(),
            ));
        };
        if !request.constraints.waypoints.is_empty() {
            return Err(PathfindingError::InvalidRequest(
                "tour stops belong in `waypoints`, not in constraints".to_string(),
            ));
        }
        for (name, value) in [
            ("smoothness_weight", request.smoothness_weight),
            ("diversity_weight", request.diversity_weight),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PathfindingError::InvalidRequest(format!(
                    "{} must be non-negative, got {}",
                    name, value
                )));
            }
        }
        if request.max_total_distance.is_some_and(|d| !d.is_finite() || d <= 0.0) {
            return Err(PathfindingError::InvalidRequest(
                "max_total_distance must be positive".to_string(),
            ));
        }

        let (end, interior) = if request.return_to_start {
            (first.clone(), &request.waypoints[1..])
        } else {
            let last = request.waypoints.len() - 1;
            (request.waypoints[last].clone(), &request.waypoints[1.min(last)..last])
        };

        let mut profile = self.resolve_profile(&request.profile, &request.constraints)?;
        match request.goal {
            TourGoal::Shortest => {}
            TourGoal::Smoothest => {
                profile.mismatch_penalty *= 1.0 + request.smoothness_weight;
                profile.name.push_str("+smoothest");
            }
            TourGoal::Diverse => {
                profile.same_genre_penalty = request.diversity_weight;
                profile.name.push_str("+diverse");
            }
        }

        let mut constraints = request.constraints.clone();
        constraints.waypoints = interior.to_vec();
        constraints.pin_waypoint_order = !request.allow_reordering;
        let path_request = PathRequest {
            start: first.clone(),
            end,
            algorithm: request.algorithm,
            profile: ProfileSelection::Inline(Box::new(profile.clone())),
            constraints,
            options: request.options.clone(),
        };

        let mut result = self.run(&path_request, profile, control)?;
        if let Some(limit) = request.max_total_distance {
            if result.success && result.total_weight > limit {
                warn!(
                    request_id = %result.request_id,
                    total_weight = result.total_weight,
                    limit,
                    "Tour exceeds max total distance"
                );
                result.warnings.push(format!(
                    "Total weight {:.3} exceeds max_total_distance {:.3}",
                    result.total_weight, limit
                ));
            }
        }
        Ok(result)
    }

    fn resolve_profile(
        &self,
        selection: &ProfileSelection,
        constraints: &PathConstraints,
    ) -> Result<ConstraintProfile> {
        let profile = self.profiles.resolve(selection)?;
        if constraints.tolerances.is_empty() {
            return Ok(profile);
        }
        let adjusted = profile.with_tolerances(&constraints.tolerances);
        adjusted.validate()?;
        Ok(adjusted)
    }

    fn index(&self, id: &TrackId) -> Result<usize> {
        self.graph
            .index_of(id)
            .ok_or_else(|| PathfindingError::UnknownTrack(id.clone()))
    }

    /// Check ids and constraint ranges before any search work
    fn prepare(
        &self,
        start: &TrackId,
        end: &TrackId,
        constraints: &PathConstraints,
        profile: ConstraintProfile,
    ) -> Result<Prepared> {
        let start_idx = self.index(start)?;
        let end_idx = self.index(end)?;

        if let Some(max_length) = constraints.max_length {
            let needed = if start_idx == end_idx { 1 } else { 2 };
            if max_length < needed {
                return Err(PathfindingError::InvalidRequest(format!(
                    "max_length {} cannot hold start and end",
                    max_length
                )));
            }
        }
        if let Some(min) = constraints.min_weight {
            if !(0.0..=1.0).contains(&min) {
                return Err(PathfindingError::InvalidRequest(format!(
                    "min_weight must be within [0, 1], got {}",
                    min
                )));
            }
        }

        let waypoints = constraints
            .waypoints
            .iter()
            .map(|id| self.index(id))
            .collect::<Result<Vec<_>>>()?;
        let avoid = constraints
            .avoid
            .iter()
            .map(|id| self.index(id))
            .collect::<Result<HashSet<_>>>()?;
        if avoid.contains(&start_idx) || avoid.contains(&end_idx) {
            return Err(PathfindingError::InvalidRequest(
                "start and end cannot be avoided".to_string(),
            ));
        }

        Ok(Prepared {
            request_id: Uuid::new_v4(),
            start: start_idx,
            end: end_idx,
            waypoints,
            filter: EdgeFilter {
                avoid,
                allowed_kinds: constraints
                    .allowed_kinds
                    .as_ref()
                    .map(|k| k.iter().copied().collect()),
                min_compatibility: constraints.min_weight,
            },
            profile,
        })
    }

    /// Route progress to the engine bus unless the caller brought one, and
    /// apply the level's deadline unless the caller set one
    fn attach_events(
        &self,
        mut control: SearchControl,
        level: OptimizationLevel) -> (SearchControl, Option<EventBus>,
    ) {
        if control.progress.is_none() {
            control.progress = self.events.clone();
        }
        if control.deadline.is_none() {
            control.deadline = Some(Instant::now() + self.config.deadline(level));
        }
        let bus = control.progress.clone();
        (control, bus)
    }

    fn context(
        &self,
        prepared: &Prepared,
        constraints: &PathConstraints,
        level: OptimizationLevel,
        control: SearchControl,
    ) -> SearchContext<'_> {
        SearchContext::new(
            &self.graph,
            WeightCalculator::new(prepared.profile.clone()),
            prepared.filter.clone(),
            &self.config,
            control,
        )
        .with_level(level)
        .with_max_length(constraints.max_length)
        .with_request_id(prepared.request_id)
    }

    fn run(
        &self,
        request: &PathRequest,
        profile: ConstraintProfile,
        control: SearchControl,
    ) -> Result<PathResult> {
        let began = Instant::now();
        let options = &request.options;
        let prepared = self.prepare(&request.start, &request.end, &request.constraints, profile)?;

        let (control, bus) = self.attach_events(control, options.optimization_level);
        let mut ctx = self.context(
            &prepared,
            &request.constraints,
            options.optimization_level,
            control,
        );
        emit_started(bus.as_ref(), prepared.request_id, request.algorithm.as_str());
        debug!(
            request_id = %prepared.request_id,
            start = %request.start,
            end = %request.end,
            waypoints = prepared.waypoints.len(),
            algorithm = %request.algorithm,
            profile = %prepared.profile.name,
            "Path search started"
        );

        let plan = WaypointResolver.resolve(
            &mut ctx,
            prepared.start,
            prepared.end,
            &prepared.waypoints,
            request.constraints.pin_waypoint_order,
        );
        let leg_plan = LegPlan {
            start: prepared.start,
            end: prepared.end,
            waypoints: plan.ordered.clone(),
        };
        let outcome = match ctx.check_now() {
            Some(termination) => StrategyOutcome::no_path(&leg_plan, termination),
            None => request.algorithm.strategy().search(&mut ctx, &leg_plan),
        };

        let graph = ctx.graph();
        let ids = |nodes: &[usize]| -> Vec<TrackId> {
            nodes.iter().map(|&n| graph.track_at(n).id.clone()).collect()
        };
        let waypoint_set: HashSet<usize> = leg_plan.waypoints.iter().copied().collect();

        let built = outcome
            .path
            .as_deref()
            .and_then(|path| PathResult::from_path(&ctx, prepared.request_id, path, &waypoint_set));
        let mut result = match built {
            Some(mut result) => {
                result.optimal = outcome.optimal;
                if outcome.termination.is_interrupted() {
                    result.warnings.push(interrupted_warning(outcome.termination));
                }
                result
            }
            None => PathResult::failed(
                prepared.request_id,
                failure_for(&ctx, prepared.start, prepared.end, outcome.termination),
            ),
        };

        let mut skipped = outcome.skipped.clone();
        for &dropped in &plan.dropped {
            if !skipped.contains(&dropped) {
                skipped.push(dropped);
            }
        }
        if result.success {
            result.waypoints_included = ids(&outcome.included);
            for &waypoint in &skipped {
                result
                    .warnings
                    .push(format!(
                        "Waypoint {} could not be included",
                        graph.track_at(waypoint).id
                    ));
            }
        }
        result.waypoints_skipped = ids(&skipped);
        result.waypoint_validations = plan.validations;
        result.metadata.termination = outcome.termination;
        result.metadata.profile = prepared.profile.name.clone();

        if result.success && options.optimize {
            let optimize_options = OptimizeOptions {
                allow_relaxation: options.allow_relaxation,
                max_passes: self.config.max_optimization_passes,
            };
            result = PathOptimizer.optimize(&mut ctx, &result, &optimize_options);
        }

        if result.success && options.return_alternatives && options.max_alternatives > 0 {
            self.add_alternatives(&mut ctx, &mut result, &leg_plan, options);
        }

        Ok(self.finish(
            ctx,
            result,
            outcome.termination,
            options.include_metrics,
            began,
            bus.as_ref(),
        ))
    }

    /// Ranked alternatives to the primary path from k-shortest search
    ///
    /// Only direct requests get alternatives; waypoint requests carry a
    /// warning instead.
    fn add_alternatives(
        &self,
        ctx: &mut SearchContext<'_>,
        result: &mut PathResult,
        plan: &LegPlan,
        options: &PathOptions,
    ) {
        if !plan.waypoints.is_empty() {
            result
                .warnings
                .push("Alternatives are only computed for requests without waypoints".to_string());
            return;
        }
        let primary = result.track_ids();
        let found =
            yen::k_shortest_paths(ctx, plan.start, plan.end, options.max_alternatives + 1, 0.0);
        let none = HashSet::new();
        result.alternatives = found
            .paths
            .iter()
            .filter_map(|leg| PathResult::from_path(ctx, result.request_id, &leg.nodes, &none))
            .filter(|alt| alt.track_ids() != primary)
            .take(options.max_alternatives)
            .map(|mut alt| {
                alt.metadata.termination = found.termination;
                alt
            })
            .collect();
    }

    /// Analysis, metadata, completion event, and log line
    fn finish(
        &self,
        ctx: SearchContext<'_>,
        mut result: PathResult,
        termination: Termination,
        include_metrics: bool,
        began: Instant,
        bus: Option<&EventBus>,
    ) -> PathResult {
        if result.success && include_metrics {
            result.analysis = Some(PathAnalyzer.analyze(ctx.graph(), &result));
        }
        let stats = ctx.into_stats();
        let search_time_ms = time::elapsed_ms(began);
        result.metadata = SearchMetadata {
            search_time_ms,
            nodes_explored: stats.nodes_explored,
            algorithms_used: stats.algorithms_used,
            optimization_passes: result.metadata.optimization_passes,
            termination,
            profile: std::mem::take(&mut result.metadata.profile),
        };

        if let Some(bus) = bus {
            bus.emit_lossy(EngineEvent::SearchProgress {
                request_id: result.request_id,
                status: if result.success {
                    SearchStatus::Complete
                } else {
                    SearchStatus::Error
                },
                snapshot: ProgressSnapshot {
                    progress: 1.0,
                    nodes_explored: stats.nodes_explored,
                    current_best: result.success.then_some(result.total_weight),
                    current_length: result.success.then_some(result.len()),
                    estimated_remaining_ms: Some(0),
                },
                timestamp: time::now(),
            });
            bus.emit_lossy(EngineEvent::SearchCompleted {
                request_id: result.request_id,
                success: result.success,
                total_weight: result.success.then_some(result.total_weight),
                nodes_explored: stats.nodes_explored,
                search_time_ms,
                timestamp: time::now(),
            });
        }

        info!(
            request_id = %result.request_id,
            success = result.success,
            tracks = result.len(),
            total_weight = result.total_weight,
            nodes_explored = stats.nodes_explored,
            search_time_ms,
            termination = ?termination,
            failure = ?result.failure,
            "Path search completed"
        );
        result
    }
}

fn emit_started(bus: Option<&EventBus>, request_id: Uuid, algorithm: &str) {
    if let Some(bus) = bus {
        bus.emit_lossy(EngineEvent::SearchStarted {
            request_id,
            algorithm: algorithm.to_string(),
            timestamp: time::now(),
        });
    }
}

fn interrupted_warning(termination: Termination) -> String {
    match termination {
        Termination::Cancelled => {
            "Search cancelled; returning the best path found so far".to_string()
        }
        _ => "Search deadline expired; returning the best path found so far".to_string(),
    }
}

/// Explain why no path was produced
fn failure_for(
    ctx: &SearchContext<'_>,
    start: usize,
    end: usize,
    termination: Termination,
) -> PathFailure {
    match termination {
        Termination::Cancelled => return PathFailure::Cancelled,
        Termination::TimedOut => return PathFailure::TimedOut,
        _ => {}
    }
    let graph = ctx.graph();
    let blocked_around = |node: usize, outgoing: bool| -> Option<BTreeMap<ConstraintKind, usize>> {
        let mut tally = BTreeMap::new();
        let neighbors = graph.neighbors(node);
        if neighbors.is_empty() {
            return None;
        }
        for adj in neighbors {
            let (from, to) = if outgoing { (node, adj.node) } else { (adj.node, node) };
            match ctx.evaluate_edge(from, to) {
                Some(EdgeEvaluation::Infeasible { violations }) => {
                    for kind in violations {
                        *tally.entry(kind).or_insert(0) += 1;
                    }
                }
                // A usable edge means the profile is not to blame here
                _ => return None,
            }
        }
        Some(tally)
    };

    let start_id = &graph.track_at(start).id;
    let end_id = &graph.track_at(end).id;
    if let Some(tally) = blocked_around(start, true) {
        if let Some(kind) = dominant(&tally) {
            return PathFailure::InfeasibleConstraintCombination {
                constraint: kind,
                detail: format!("no transition leaving {} satisfies the profile", start_id),
            };
        }
    }
    if let Some(tally) = blocked_around(end, false) {
        if let Some(kind) = dominant(&tally) {
            return PathFailure::InfeasibleConstraintCombination {
                constraint: kind,
                detail: format!("no transition entering {} satisfies the profile", end_id),
            };
        }
    }

    let mut tally = BTreeMap::new();
    let mut any_feasible = false;
    for from in 0..graph.node_count() {
        for adj in graph.neighbors(from) {
            match ctx.evaluate_edge(from, adj.node) {
                Some(EdgeEvaluation::Infeasible { violations }) => {
                    for kind in violations {
                        *tally.entry(kind).or_insert(0) += 1;
                    }
                }
                Some(EdgeEvaluation::Feasible(_)) => any_feasible = true,
                None => {}
            }
        }
    }
    if !any_feasible {
        if let Some(kind) = dominant(&tally) {
            return PathFailure::InfeasibleConstraintCombination {
                constraint: kind,
                detail: "the profile eliminates every transition in the graph".to_string(),
            };
        }
    }

    PathFailure::NoPathExists {
        start: start_id.clone(),
        end: end_id.clone(),
    }
}

/// Constraint with the most violations; scoring order breaks ties
fn dominant(tally: &BTreeMap<ConstraintKind, usize>) -> Option<ConstraintKind> {
    let mut best: Option<(ConstraintKind, usize)> = None;
    for kind in ConstraintKind::ALL {
        let count = tally.get(&kind).copied().unwrap_or(0);
        if count > 0 && best.map_or(true, |(_, c)| count > c) {
            best = Some((kind, count));
        }
    }
    best.map(|(kind, _)| kind)
}
