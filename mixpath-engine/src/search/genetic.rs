//! Genetic search over waypoint orderings
//!
//! An individual is a sequence of genes, one per waypoint: the waypoint's
//! position in the visiting order, whether it is included, and an optional
//! detour track visited just before it. Individuals are decoded into full
//! paths by chaining A* legs, each leg kept off the tracks already on the
//! path, and scored as
//!
//! `fitness = path cost + skip_penalty · (skipped + tracks over max_length)`
//!
//! Reproduction uses tournament selection, elitism, order crossover (OX) on
//! the visiting order, and three mutations: swap two waypoints, substitute
//! the detour with a compatible neighbour, toggle inclusion. The RNG is
//! seeded from configuration, so identical requests give identical paths.

use super::astar::astar_leg;
use super::dijkstra::{LegPath, LegQuery, LegResult};
use super::{
    legs, Algorithm, LegPlan, PathStrategy, SearchContext, StrategyOutcome, Termination,
    COST_EPSILON,
};
use mixpath_common::config::GeneticSettings;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

// Fitness of an individual whose path never reaches the end
const UNREACHABLE_FITNESS: f64 = 1e12;

#[derive(Debug, Clone, PartialEq)]
struct Gene {
    waypoint: usize,
    included: bool,
    detour: Option<usize>,
}

#[derive(Debug, Clone)]
struct Individual {
    genes: Vec<Gene>,
    fitness: f64,
}

/// Decoded individual
#[derive(Debug, Clone, Default)]
struct Decoded {
    nodes: Vec<usize>,
    cost: f64,
    skipped: usize,
    reaches_end: bool,
}

impl Decoded {
    fn append(&mut self, leg: LegPath, used: &mut HashSet<usize>) {
        for &node in leg.nodes.iter().skip(1) {
            used.insert(node);
        }
        self.nodes.extend(leg.nodes.into_iter().skip(1));
        self.cost += leg.cost;
    }
}

/// Exclusion set of a constrained leg, sorted so it can key the cache
type ExclusionKey = Vec<usize>;

/// Leg caches shared by all individuals of one run
///
/// `free` holds legs searched without exclusions. A free leg is reused when
/// it stays off the excluded tracks; otherwise the leg is searched again
/// under the exclusions and kept in `constrained`.
struct Decoder<'p> {
    plan: &'p LegPlan,
    settings: GeneticSettings,
    max_length: Option<usize>,
    free: HashMap<(usize, usize), Option<LegPath>>,
    constrained: HashMap<(usize, usize, ExclusionKey), Option<LegPath>>,
}

impl<'p> Decoder<'p> {
    fn search(
        ctx: &mut SearchContext<'_>,
        from: usize,
        to: usize,
        excluded: &HashSet<usize>,
    ) -> Result<Option<LegPath>, Termination> {
        match astar_leg(ctx, &LegQuery::new(from, to, excluded)) {
            LegResult::Found(leg) => Ok(Some(leg)),
            LegResult::Unreachable => Ok(None),
            LegResult::Stopped { termination, .. } => Err(termination),
        }
    }

    /// Cheapest `from → to` leg avoiding `excluded`
    fn leg(
        &mut self,
        ctx: &mut SearchContext<'_>,
        from: usize,
        to: usize,
        excluded: &HashSet<usize>,
    ) -> Result<Option<LegPath>, Termination> {
        let free = match self.free.get(&(from, to)) {
            Some(cached) => cached.clone(),
            None => {
                let leg = Self::search(ctx, from, to, &HashSet::new())?;
                self.free.insert((from, to), leg.clone());
                leg
            }
        };
        let Some(free) = free else {
            // Unreachable without exclusions stays unreachable with them
            return Ok(None);
        };
        if free.nodes.iter().skip(1).all(|n| !excluded.contains(n)) {
            return Ok(Some(free));
        }

        let mut key: ExclusionKey = excluded.iter().copied().collect();
        key.sort_unstable();
        let key = (from, to, key);
        if let Some(cached) = self.constrained.get(&key) {
            return Ok(cached.clone());
        }
        let leg = Self::search(ctx, from, to, excluded)?;
        self.constrained.insert(key, leg.clone());
        Ok(leg)
    }

    fn decode(
        &mut self,
        ctx: &mut SearchContext<'_>,
        genes: &[Gene],
    ) -> Result<Decoded, Termination> {
        let (start, end) = (self.plan.start, self.plan.end);
        let mut decoded = Decoded {
            nodes: vec![start],
            ..Decoded::default()
        };
        let mut used: HashSet<usize> = [start].into_iter().collect();
        let mut current = start;

        for gene in genes {
            if !gene.included {
                decoded.skipped += 1;
                continue;
            }
            if used.contains(&gene.waypoint) || gene.waypoint == end {
                // Already on the path, or reached by the final leg
                continue;
            }
            // Interior legs stay off the end until the final leg
            let mut excluded = used.clone();
            excluded.remove(&current);
            excluded.insert(end);

            let mut reached = false;
            if let Some(detour) = gene.detour.filter(|d| !excluded.contains(d)) {
                if let Some(first) = self.leg(ctx, current, detour, &excluded)? {
                    let mut after = excluded.clone();
                    after.extend(first.nodes.iter().copied());
                    after.remove(&detour);
                    if let Some(second) = self.leg(ctx, detour, gene.waypoint, &after)? {
                        decoded.append(first, &mut used);
                        decoded.append(second, &mut used);
                        reached = true;
                    }
                }
            }
            if !reached {
                if let Some(leg) = self.leg(ctx, current, gene.waypoint, &excluded)? {
                    decoded.append(leg, &mut used);
                    reached = true;
                }
            }
            if reached {
                current = gene.waypoint;
            } else {
                decoded.skipped += 1;
            }
        }

        let mut excluded = used.clone();
        excluded.remove(&current);
        // Round trips end where they started
        excluded.remove(&end);
        if let Some(leg) = self.leg(ctx, current, end, &excluded)? {
            decoded.append(leg, &mut used);
            decoded.reaches_end = true;
        }
        Ok(decoded)
    }

    fn fitness(&self, decoded: &Decoded) -> f64 {
        if !decoded.reaches_end {
            return UNREACHABLE_FITNESS + self.settings.skip_penalty * decoded.skipped as f64;
        }
        let overlong = self
            .max_length
            .map_or(0, |m| decoded.nodes.len().saturating_sub(m));
        decoded.cost + self.settings.skip_penalty * (decoded.skipped + overlong) as f64
    }

    fn evaluate(
        &mut self,
        ctx: &mut SearchContext<'_>,
        genes: Vec<Gene>,
    ) -> Result<Individual, Termination> {
        let decoded = self.decode(ctx, &genes)?;
        let fitness = self.fitness(&decoded);
        Ok(Individual { genes, fitness })
    }
}

/// Genetic search
#[derive(Debug, Clone, Copy, Default)]
pub struct Genetic;

impl PathStrategy for Genetic {
    fn name(&self) -> Algorithm {
        Algorithm::Genetic
    }

    fn search(&self, ctx: &mut SearchContext<'_>, plan: &LegPlan) -> StrategyOutcome {
        ctx.record_algorithm(Algorithm::Genetic);
        if plan.waypoints.is_empty() {
            ctx.record_algorithm(Algorithm::AStar);
            return legs::run_legs(ctx, plan, astar_leg);
        }

        if let Some(stop) = ctx.check_now() {
            return StrategyOutcome::no_path(plan, stop);
        }

        let budget = ctx.config().genetic_budget(ctx.level());
        let settings = ctx.config().genetic.clone();
        let mut rng = StdRng::seed_from_u64(settings.seed);
        let mut decoder = Decoder {
            plan,
            settings: settings.clone(),
            max_length: ctx.max_length(),
            free: HashMap::new(),
            constrained: HashMap::new(),
        };

        let initial = initial_population(ctx, &mut decoder, plan, budget.population, &mut rng);
        let mut population = match initial {
            Ok(population) => population,
            Err(termination) => return StrategyOutcome::no_path(plan, termination),
        };

        let mut best = fittest(&population).clone();
        let mut stall = 0;
        let mut termination = Termination::GenerationLimit;
        let mut generations = 0;

        'generations: for generation in 0..budget.generations {
            if let Some(stop) = ctx.check_now() {
                termination = stop;
                break;
            }
            generations = generation + 1;

            let mut ranked: Vec<&Individual> = population.iter().collect();
            ranked.sort_by(|a, b| a.fitness.total_cmp(&b.fitness));
            let mut next: Vec<Individual> = ranked
                .iter()
                .take(settings.elitism)
                .map(|i| (*i).clone())
                .collect();

            while next.len() < budget.population {
                let first = tournament(&population, settings.tournament_size, &mut rng);
                let second = tournament(&population, settings.tournament_size, &mut rng);
                let mut genes = order_crossover(&first.genes, &second.genes, &mut rng);
                if rng.gen_bool(settings.mutation_rate) {
                    mutate(ctx, plan, &mut genes, &mut rng);
                }
                match decoder.evaluate(ctx, genes) {
                    Ok(child) => next.push(child),
                    Err(stop) => {
                        termination = stop;
                        break 'generations;
                    }
                }
            }
            population = next;

            let candidate = fittest(&population);
            if candidate.fitness < best.fitness - COST_EPSILON {
                best = candidate.clone();
                stall = 0;
            } else {
                stall += 1;
                if stall >= budget.stall_limit {
                    termination = Termination::Converged;
                    break;
                }
            }
            ctx.report_progress(Some(best.fitness), None);
        }

        info!(
            generations,
            best_fitness = best.fitness,
            termination = ?termination,
            cached_legs = decoder.free.len() + decoder.constrained.len(),
            "Genetic search finished"
        );

        assemble(ctx, &mut decoder, plan, &best, termination)
    }
}

fn initial_population(
    ctx: &mut SearchContext<'_>,
    decoder: &mut Decoder<'_>,
    plan: &LegPlan,
    size: usize,
    rng: &mut StdRng,
) -> Result<Vec<Individual>, Termination> {
    let base: Vec<Gene> = plan
        .waypoints
        .iter()
        .map(|&waypoint| Gene {
            waypoint,
            included: true,
            detour: None,
        })
        .collect();

    let mut population = Vec::with_capacity(size);
    population.push(decoder.evaluate(ctx, base.clone())?);
    while population.len() < size.max(2) {
        let mut genes = base.clone();
        genes.shuffle(rng);
        population.push(decoder.evaluate(ctx, genes)?);
    }
    Ok(population)
}

/// Lowest fitness; earliest individual on ties
fn fittest(population: &[Individual]) -> &Individual {
    let mut best = &population[0];
    for individual in &population[1..] {
        if individual.fitness < best.fitness {
            best = individual;
        }
    }
    best
}

fn tournament<'a>(population: &'a [Individual], size: usize, rng: &mut StdRng) -> &'a Individual {
    let mut winner = &population[rng.gen_range(0..population.len())];
    for _ in 1..size.max(1) {
        let contender = &population[rng.gen_range(0..population.len())];
        if contender.fitness < winner.fitness {
            winner = contender;
        }
    }
    winner
}

/// Order crossover: keep a slice of `first`, fill the rest in `second`'s order
fn order_crossover(first: &[Gene], second: &[Gene], rng: &mut StdRng) -> Vec<Gene> {
    let n = first.len();
    if n < 2 {
        return first.to_vec();
    }
    let (mut lo, mut hi) = (rng.gen_range(0..n), rng.gen_range(0..n));
    if lo > hi {
        std::mem::swap(&mut lo, &mut hi);
    }

    let mut child: Vec<Option<Gene>> = vec![None; n];
    let mut taken = HashSet::new();
    for i in lo..=hi {
        taken.insert(first[i].waypoint);
        child[i] = Some(first[i].clone());
    }

    let mut donors = (0..n)
        .map(|k| &second[(hi + 1 + k) % n])
        .filter(|g| !taken.contains(&g.waypoint));
    for k in 0..n {
        let slot = (hi + 1 + k) % n;
        if child[slot].is_none() {
            child[slot] = donors.next().cloned();
        }
    }
    child.into_iter().flatten().collect()
}

fn mutate(ctx: &SearchContext<'_>, plan: &LegPlan, genes: &mut [Gene], rng: &mut StdRng) {
    if genes.is_empty() {
        return;
    }
    match rng.gen_range(0..3) {
        0 if genes.len() >= 2 => {
            let a = rng.gen_range(0..genes.len());
            let b = rng.gen_range(0..genes.len());
            genes.swap(a, b);
        }
        1 => {
            let i = rng.gen_range(0..genes.len());
            let target = genes[i].waypoint;
            let reserved: HashSet<usize> = plan
                .waypoints
                .iter()
                .copied()
                .chain([plan.start, plan.end])
                .collect();
            let candidates: Vec<usize> = ctx
                .graph()
                .neighbors(target)
                .iter()
                .map(|adj| adj.node)
                .filter(|n| !reserved.contains(n) && ctx.transition(*n, target).is_some())
                .collect();
            genes[i].detour = if candidates.is_empty() || rng.gen_bool(0.25) {
                None
            } else {
                Some(candidates[rng.gen_range(0..candidates.len())])
            };
        }
        _ => {
            let i = rng.gen_range(0..genes.len());
            genes[i].included = !genes[i].included;
        }
    }
}

/// Turn the best individual into a simple path
fn assemble(
    ctx: &mut SearchContext<'_>,
    decoder: &mut Decoder<'_>,
    plan: &LegPlan,
    best: &Individual,
    termination: Termination,
) -> StrategyOutcome {
    let decoded = match decoder.decode(ctx, &best.genes) {
        Ok(decoded) => decoded,
        // Interrupted before every leg of the best individual was cached
        Err(stop) => return StrategyOutcome::no_path(plan, stop),
    };
    if !decoded.reaches_end {
        return StrategyOutcome::no_path(plan, termination);
    }

    let path = decoded.nodes;
    let too_long = ctx.max_length().is_some_and(|m| path.len() > m);
    if too_long && !termination.is_interrupted() {
        debug!(length = path.len(), "Genetic path exceeds max length, re-routing with leg search");
        let stops: Vec<usize> = best
            .genes
            .iter()
            .filter(|g| g.included)
            .map(|g| g.waypoint)
            .collect();
        let mut outcome = legs::run_legs(
            ctx,
            &LegPlan {
                start: plan.start,
                end: plan.end,
                waypoints: stops,
            },
            astar_leg,
        );
        if let Some(path) = &outcome.path {
            let (included, skipped) = legs::classify(path, &plan.waypoints);
            outcome.included = included;
            outcome.skipped = skipped;
        } else {
            outcome.skipped = plan.waypoints.clone();
        }
        outcome.optimal = false;
        return outcome;
    }
    if too_long {
        return StrategyOutcome::no_path(plan, termination);
    }

    let (included, skipped) = legs::classify(&path, &plan.waypoints);
    StrategyOutcome {
        path: Some(path),
        included,
        skipped,
        termination,
        optimal: false,
    }
}
