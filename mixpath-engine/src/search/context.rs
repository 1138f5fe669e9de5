//! Per-request search context
//!
//! A `SearchContext` bundles everything one request's searches read (graph,
//! weight calculator, edge filter, configuration) with the mutable state they
//! share (exploration statistics, cancellation status). Contexts are never
//! shared between requests; the graph is borrowed from the engine's `Arc`.

use super::{Algorithm, OptimizationLevel, Termination};
use crate::config::EngineConfig;
use crate::graph::{Adjacent, TrackGraph};
use crate::profile::ConstraintProfile;
use crate::weight::{ContextualWeight, EdgeEvaluation, EdgeFilter, WeightCalculator};
use mixpath_common::events::{EngineEvent, EventBus, ProgressSnapshot, SearchStatus};
use mixpath_common::time;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Cancellation, deadline, and progress reporting for one request
#[derive(Debug, Clone, Default)]
pub struct SearchControl {
    pub cancel: CancellationToken,
    pub deadline: Option<Instant>,
    pub progress: Option<EventBus>,
}

impl SearchControl {
    /// Control tied to a caller's cancellation token
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
            progress: None,
        }
    }

    /// Set the deadline relative to now
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Publish progress events on `bus`
    pub fn with_progress(mut self, bus: EventBus) -> Self {
        self.progress = Some(bus);
        self
    }

    /// Reason to stop, if any
    pub fn check(&self) -> Option<Termination> {
        if self.cancel.is_cancelled() {
            return Some(Termination::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Termination::TimedOut),
            _ => None,
        }
    }

    pub fn should_stop(&self) -> bool {
        self.check().is_some()
    }

    fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }
}

/// Exploration statistics accumulated over a request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchStats {
    /// Nodes settled (or individuals evaluated) across all searches
    pub nodes_explored: u64,
    /// Strategies that ran, in first-use order
    pub algorithms_used: Vec<Algorithm>,
}

/// Mutable per-request search state
pub struct SearchContext<'g> {
    graph: &'g TrackGraph,
    calculator: WeightCalculator,
    filter: EdgeFilter,
    config: &'g EngineConfig,
    control: SearchControl,
    level: OptimizationLevel,
    max_length: Option<usize>,
    request_id: Uuid,
    stats: SearchStats,
    since_check: usize,
    stopped: Option<Termination>,
}

impl std::fmt::Debug for SearchContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchContext")
            .field("request_id", &self.request_id)
            .field("profile", &self.calculator.profile().name)
            .field("level", &self.level)
            .field("max_length", &self.max_length)
            .field("stats", &self.stats)
            .field("stopped", &self.stopped)
            .field(
                "progress_subscribers",
                &self.control.progress.as_ref().map(EventBus::subscriber_count),
            )
            .finish()
    }
}

impl<'g> SearchContext<'g> {
    pub fn new(
        graph: &'g TrackGraph,
        calculator: WeightCalculator,
        filter: EdgeFilter,
        config: &'g EngineConfig,
        control: SearchControl,
    ) -> Self {
        Self {
            graph,
            calculator,
            filter,
            config,
            control,
            level: OptimizationLevel::default(),
            max_length: None,
            request_id: Uuid::new_v4(),
            stats: SearchStats::default(),
            since_check: 0,
            stopped: None,
        }
    }

    pub fn with_level(mut self, level: OptimizationLevel) -> Self {
        self.level = level;
        self
    }

    /// Limit paths to at most `max_length` tracks
    pub fn with_max_length(mut self, max_length: Option<usize>) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }

    /// New context for the same request scored under a different profile
    ///
    /// Statistics start from zero; cancellation and deadline are shared.
    pub fn fork(&self, profile: ConstraintProfile) -> SearchContext<'g> {
        SearchContext {
            graph: self.graph,
            calculator: WeightCalculator::new(profile),
            filter: self.filter.clone(),
            config: self.config,
            control: self.control.clone(),
            level: self.level,
            max_length: self.max_length,
            request_id: self.request_id,
            stats: SearchStats::default(),
            since_check: 0,
            stopped: None,
        }
    }

    pub fn graph(&self) -> &'g TrackGraph {
        self.graph
    }

    pub fn calculator(&self) -> &WeightCalculator {
        &self.calculator
    }

    pub fn profile(&self) -> &ConstraintProfile {
        self.calculator.profile()
    }

    pub fn filter(&self) -> &EdgeFilter {
        &self.filter
    }

    pub fn config(&self) -> &'g EngineConfig {
        self.config
    }

    pub fn level(&self) -> OptimizationLevel {
        self.level
    }

    pub fn max_length(&self) -> Option<usize> {
        self.max_length
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    pub fn into_stats(self) -> SearchStats {
        self.stats
    }

    /// Add statistics gathered by a forked context
    pub fn absorb(&mut self, other: SearchStats) {
        self.stats.nodes_explored += other.nodes_explored;
        for algorithm in other.algorithms_used {
            self.record_algorithm(algorithm);
        }
    }

    /// Note that a strategy ran
    pub fn record_algorithm(&mut self, algorithm: Algorithm) {
        if !self.stats.algorithms_used.contains(&algorithm) {
            self.stats.algorithms_used.push(algorithm);
        }
    }

    pub fn is_avoided(&self, node: usize) -> bool {
        self.filter.avoid.contains(&node)
    }

    /// Cost of the directed transition `from → to`, or `None` when the edge
    /// is missing, filtered out, or infeasible
    pub fn transition(&self, from: usize, to: usize) -> Option<ContextualWeight> {
        let edge = self.graph.edge_between(from, to)?;
        if !self.filter.allows_kind(edge.kind) || self.is_avoided(from) || self.is_avoided(to) {
            return None;
        }
        let weight = *self
            .calculator
            .evaluate(edge, self.graph.track_at(from), self.graph.track_at(to))
            .feasible()?;
        self.filter.allows_weight(&weight).then_some(weight)
    }

    /// `transition` for an adjacency entry of `from`
    pub fn transition_via(&self, from: usize, adj: Adjacent) -> Option<ContextualWeight> {
        let edge = self.graph.edge_at(adj.edge);
        if !self.filter.allows_kind(edge.kind)
            || self.is_avoided(from)
            || self.is_avoided(adj.node)
        {
            return None;
        }
        let weight = *self
            .calculator
            .evaluate(edge, self.graph.track_at(from), self.graph.track_at(adj.node))
            .feasible()?;
        self.filter.allows_weight(&weight).then_some(weight)
    }

    /// Profile evaluation of an existing edge, ignoring request filters
    pub fn evaluate_edge(&self, from: usize, to: usize) -> Option<EdgeEvaluation> {
        let edge = self.graph.edge_between(from, to)?;
        Some(
            self.calculator
                .evaluate(edge, self.graph.track_at(from), self.graph.track_at(to)),
        )
    }

    /// Total cost of a node sequence, `None` if any transition is unusable
    pub fn path_cost(&self, path: &[usize]) -> Option<f64> {
        path.windows(2)
            .map(|pair| self.transition(pair[0], pair[1]).map(|w| w.cost))
            .sum()
    }

    /// Count one settled node; every `check_interval` nodes, poll the
    /// control and publish progress
    pub fn tick(&mut self) -> Option<Termination> {
        self.stats.nodes_explored += 1;
        self.since_check += 1;
        if self.since_check >= self.config.check_interval {
            self.since_check = 0;
            self.report_progress(None, None);
            return self.check_now();
        }
        self.stopped
    }

    /// Poll the control immediately
    pub fn check_now(&mut self) -> Option<Termination> {
        if self.stopped.is_none() {
            if let Some(reason) = self.control.check() {
                match reason {
                    Termination::TimedOut => warn!(
                        request_id = %self.request_id,
                        nodes_explored = self.stats.nodes_explored,
                        "Search deadline expired"
                    ),
                    _ => debug!(request_id = %self.request_id, "Search cancelled"),
                }
                self.stopped = Some(reason);
            }
        }
        self.stopped
    }

    /// Why the request stopped early, if it did
    pub fn stopped(&self) -> Option<Termination> {
        self.stopped
    }

    /// Publish a progress snapshot (no-op without a progress bus)
    pub fn report_progress(&self, current_best: Option<f64>, current_length: Option<usize>) {
        let Some(bus) = &self.control.progress else {
            return;
        };
        let nodes = self.graph.node_count().max(1) as f32;
        let fraction = (self.stats.nodes_explored as f32 / nodes).min(0.99);
        let mut snapshot = ProgressSnapshot::explored(fraction, self.stats.nodes_explored);
        snapshot.current_best = current_best;
        snapshot.current_length = current_length;
        snapshot.estimated_remaining_ms = self.control.remaining().map(|d| d.as_millis() as u64);

        bus.emit_lossy(EngineEvent::SearchProgress {
            request_id: self.request_id,
            status: SearchStatus::Calculating,
            snapshot,
            timestamp: time::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{BaseEdge, Track};

    fn graph() -> TrackGraph {
        let track = |id: &str, bpm: f64| Track::new(id, bpm, "8A".parse().unwrap(), 0.5, 200.0);
        TrackGraph::new(
            vec![track("a", 120.0), track("b", 122.0), track("c", 140.0)],
            vec![BaseEdge::new("a", "b", 1.0), BaseEdge::new("b", "c", 1.0)],
        )
        .unwrap()
    }

    fn context<'g>(
        graph: &'g TrackGraph,
        config: &'g EngineConfig,
        control: SearchControl,
    ) -> SearchContext<'g> {
        SearchContext::new(
            graph,
            WeightCalculator::new(ConstraintProfile::default()),
            EdgeFilter::default(),
            config,
            control,
        )
    }

    #[test]
    fn test_transition_respects_feasibility_and_avoid() {
        let graph = graph();
        let config = EngineConfig::default();
        let ctx = context(&graph, &config, SearchControl::default());
        assert!(ctx.transition(0, 1).is_some());
        // 122 -> 140 BPM exceeds the default tempo limit
        assert!(ctx.transition(1, 2).is_none());
        assert!(ctx.transition(0, 2).is_none());

        let mut filter = EdgeFilter::default();
        filter.avoid.insert(1);
        let avoided = SearchContext::new(
            &graph,
            WeightCalculator::new(ConstraintProfile::default()),
            filter,
            &config,
            SearchControl::default(),
        );
        assert!(avoided.transition(0, 1).is_none());
    }

    #[test]
    fn test_path_cost() {
        let graph = graph();
        let config = EngineConfig::default();
        let ctx = context(&graph, &config, SearchControl::default());
        let cost = ctx.path_cost(&[0, 1]).unwrap();
        assert!(cost >= 1.0);
        assert!(ctx.path_cost(&[0, 1, 2]).is_none());
        assert_eq!(ctx.path_cost(&[0]), Some(0.0));
    }

    #[test]
    fn test_cancellation_is_sticky() {
        let graph = graph();
        let config = EngineConfig::default();
        let token = CancellationToken::new();
        let mut ctx = context(&graph, &config, SearchControl::new(token.clone()));
        assert_eq!(ctx.check_now(), None);
        token.cancel();
        assert_eq!(ctx.check_now(), Some(Termination::Cancelled));
        assert_eq!(ctx.tick(), Some(Termination::Cancelled));
        assert_eq!(ctx.stats().nodes_explored, 1);
    }

    #[test]
    fn test_expired_deadline_times_out() {
        let graph = graph();
        let config = EngineConfig::default();
        let control = SearchControl::default().with_timeout(Duration::ZERO);
        assert!(control.should_stop());
        let mut ctx = context(&graph, &config, control);
        assert_eq!(ctx.check_now(), Some(Termination::TimedOut));
    }

    #[test]
    fn test_progress_published_every_interval() {
        let graph = graph();
        let config = EngineConfig {
            check_interval: 2,
            ..EngineConfig::default()
        };
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let mut ctx = context(&graph, &config, SearchControl::default().with_progress(bus));
        ctx.tick();
        assert!(rx.try_recv().is_err());
        ctx.tick();
        assert_eq!(rx.try_recv().unwrap().event_type(), "SearchProgress");
    }

    #[test]
    fn test_record_algorithm_dedupes() {
        let graph = graph();
        let config = EngineConfig::default();
        let mut ctx = context(&graph, &config, SearchControl::default());
        ctx.record_algorithm(Algorithm::AStar);
        ctx.record_algorithm(Algorithm::Dijkstra);
        ctx.record_algorithm(Algorithm::AStar);
        assert_eq!(ctx.stats().algorithms_used, vec![Algorithm::AStar, Algorithm::Dijkstra]);
    }
}
