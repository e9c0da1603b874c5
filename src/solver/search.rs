use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::domain::solution::{Route, Solution};
use crate::error::SolveError;
use crate::solver::construct;
use crate::solver::model::{RouteStats, RoutingModel};
use crate::solver::state::{
    insertion_stats, removal_stats, replacement_stats, RouteInfo, SearchState,
};
use crate::solver::strategies::{Metaheuristic, StrategyPair};

/// One worker's search parameters.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub time_limit: Duration,
    pub log_search: bool,
    pub seed: u64,
}

/// Run one full search: construct a first solution, refine it under the
/// chosen metaheuristic until the wall-clock limit, extract routes.
pub fn solve(
    model: &RoutingModel,
    pair: StrategyPair,
    config: &SearchConfig,
) -> Result<Solution, SolveError> {
    let deadline = Instant::now() + config.time_limit;
    let state = construct::build(model, pair.first_solution);

    if config.log_search {
        info!(
            pair = %pair,
            initial_cost = state.travel_cost(),
            initial_dropped = state.unassigned.len(),
            "Search starting"
        );
    }

    let best = match pair.metaheuristic {
        Metaheuristic::Automatic | Metaheuristic::GuidedLocalSearch => {
            run_guided_local_search(model, state, deadline, config.log_search)
        }
        Metaheuristic::TabuSearch => run_tabu_search(model, state, deadline, config.seed),
        Metaheuristic::SimulatedAnnealing => run_annealing(model, state, deadline, config.seed),
    };

    let solution = extract(model, &best);
    if config.log_search {
        info!(
            pair = %pair,
            objective = solution.objective,
            served = solution.total_served_volume,
            dropped = solution.dropped_customers.len(),
            "Search finished"
        );
    }

    if solution.routes.is_empty() && model.num_customers() > 0 {
        return Err(SolveError::SolverInfeasible);
    }
    Ok(solution)
}

/// A candidate local-search step. Positions index into the current routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Move {
    /// Bring a dropped customer back onto a route.
    Insert {
        customer: usize,
        vehicle: usize,
        position: usize,
    },
    /// Move one customer between two different vehicles.
    Relocate {
        from_vehicle: usize,
        from_position: usize,
        to_vehicle: usize,
        to_position: usize,
    },
    /// Exchange customers between two different vehicles.
    Swap {
        vehicle_a: usize,
        position_a: usize,
        vehicle_b: usize,
        position_b: usize,
    },
    /// Reverse a segment inside one route.
    TwoOpt { vehicle: usize, i: usize, j: usize },
}

#[derive(Debug, Clone, Copy)]
struct MoveEval {
    /// Change in total effective travel cost.
    delta_cost: i64,
    /// Change in the guided-local-search penalty term.
    delta_extra: i64,
    /// Change in dropped-customer count (-1 for inserts).
    delta_drops: i64,
}

impl MoveEval {
    /// The value candidate selection minimizes.
    fn selection_delta(&self, drop_penalty: i64) -> i64 {
        self.delta_cost + self.delta_extra + self.delta_drops * drop_penalty
    }

    /// The true objective change.
    fn objective_delta(&self, drop_penalty: i64) -> i64 {
        self.delta_cost + self.delta_drops * drop_penalty
    }
}

/// Per-arc selection surcharge maintained by guided local search; empty for
/// the other metaheuristics.
struct ArcExtra {
    table: Vec<Vec<i64>>,
}

impl ArcExtra {
    fn none(model: &RoutingModel) -> ArcExtra {
        ArcExtra {
            table: vec![vec![0; model.num_nodes()]; model.num_nodes()],
        }
    }

    fn get(&self, from: usize, to: usize) -> i64 {
        self.table[from][to]
    }

    fn route_total(&self, model: &RoutingModel, vehicle: usize, customers: &[usize]) -> i64 {
        let depot = model.vehicles[vehicle].depot;
        let mut total = 0;
        let mut current = depot;
        for &customer in customers {
            let node = model.customer_node(customer);
            total += self.get(current, node);
            current = node;
        }
        if !customers.is_empty() {
            total += self.get(current, depot);
        }
        total
    }
}

fn node_before(model: &RoutingModel, vehicle: usize, route: &RouteInfo, position: usize) -> usize {
    if position == 0 {
        model.vehicles[vehicle].depot
    } else {
        model.customer_node(route.customers[position - 1])
    }
}

fn node_after(model: &RoutingModel, vehicle: usize, route: &RouteInfo, position: usize) -> usize {
    if position + 1 >= route.customers.len() {
        model.vehicles[vehicle].depot
    } else {
        model.customer_node(route.customers[position + 1])
    }
}

/// Evaluate one candidate move; None when it would violate a hard limit.
fn evaluate(
    model: &RoutingModel,
    state: &SearchState,
    extra: &ArcExtra,
    mv: Move,
) -> Option<MoveEval> {
    match mv {
        Move::Insert {
            customer,
            vehicle,
            position,
        } => {
            let route = &state.routes[vehicle];
            let stats = insertion_stats(model, vehicle, route, position, customer);
            if !model.within_limits(vehicle, &stats) {
                return None;
            }
            let node = model.customer_node(customer);
            let prev = node_before(model, vehicle, route, position);
            let next = if position >= route.customers.len() {
                model.vehicles[vehicle].depot
            } else {
                model.customer_node(route.customers[position])
            };
            Some(MoveEval {
                delta_cost: stats.cost - route.stats.cost,
                delta_extra: extra.get(prev, node) + extra.get(node, next) - extra.get(prev, next),
                delta_drops: -1,
            })
        }

        Move::Relocate {
            from_vehicle,
            from_position,
            to_vehicle,
            to_position,
        } => {
            let from_route = &state.routes[from_vehicle];
            let to_route = &state.routes[to_vehicle];
            let customer = from_route.customers[from_position];

            let from_stats = removal_stats(model, from_vehicle, from_route, from_position);
            let to_stats = insertion_stats(model, to_vehicle, to_route, to_position, customer);
            if !model.within_limits(from_vehicle, &from_stats)
                || !model.within_limits(to_vehicle, &to_stats)
            {
                return None;
            }

            let node = model.customer_node(customer);
            let from_prev = node_before(model, from_vehicle, from_route, from_position);
            let from_next = node_after(model, from_vehicle, from_route, from_position);
            let to_prev = node_before(model, to_vehicle, to_route, to_position);
            let to_next = if to_position >= to_route.customers.len() {
                model.vehicles[to_vehicle].depot
            } else {
                model.customer_node(to_route.customers[to_position])
            };

            Some(MoveEval {
                delta_cost: (from_stats.cost - from_route.stats.cost)
                    + (to_stats.cost - to_route.stats.cost),
                delta_extra: -extra.get(from_prev, node) - extra.get(node, from_next)
                    + extra.get(from_prev, from_next)
                    + extra.get(to_prev, node)
                    + extra.get(node, to_next)
                    - extra.get(to_prev, to_next),
                delta_drops: 0,
            })
        }

        Move::Swap {
            vehicle_a,
            position_a,
            vehicle_b,
            position_b,
        } => {
            let route_a = &state.routes[vehicle_a];
            let route_b = &state.routes[vehicle_b];
            let customer_a = route_a.customers[position_a];
            let customer_b = route_b.customers[position_b];

            let stats_a = replacement_stats(model, vehicle_a, route_a, position_a, customer_b);
            let stats_b = replacement_stats(model, vehicle_b, route_b, position_b, customer_a);
            if !model.within_limits(vehicle_a, &stats_a)
                || !model.within_limits(vehicle_b, &stats_b)
            {
                return None;
            }

            let node_a = model.customer_node(customer_a);
            let node_b = model.customer_node(customer_b);
            let a_prev = node_before(model, vehicle_a, route_a, position_a);
            let a_next = node_after(model, vehicle_a, route_a, position_a);
            let b_prev = node_before(model, vehicle_b, route_b, position_b);
            let b_next = node_after(model, vehicle_b, route_b, position_b);

            Some(MoveEval {
                delta_cost: (stats_a.cost - route_a.stats.cost)
                    + (stats_b.cost - route_b.stats.cost),
                delta_extra: -extra.get(a_prev, node_a) - extra.get(node_a, a_next)
                    + extra.get(a_prev, node_b)
                    + extra.get(node_b, a_next)
                    - extra.get(b_prev, node_b)
                    - extra.get(node_b, b_next)
                    + extra.get(b_prev, node_a)
                    + extra.get(node_a, b_next),
                delta_drops: 0,
            })
        }

        Move::TwoOpt { vehicle, i, j } => {
            let route = &state.routes[vehicle];
            let mut customers = route.customers.clone();
            customers[i..=j].reverse();
            let stats = model.route_stats(vehicle, &customers);
            if !model.within_limits(vehicle, &stats) {
                return None;
            }
            let old_extra = extra.route_total(model, vehicle, &route.customers);
            let new_extra = extra.route_total(model, vehicle, &customers);
            Some(MoveEval {
                delta_cost: stats.cost - route.stats.cost,
                delta_extra: new_extra - old_extra,
                delta_drops: 0,
            })
        }
    }
}

fn apply(model: &RoutingModel, state: &mut SearchState, mv: Move) {
    match mv {
        Move::Insert {
            customer,
            vehicle,
            position,
        } => {
            state.insert(model, vehicle, position, customer);
        }
        Move::Relocate {
            from_vehicle,
            from_position,
            to_vehicle,
            to_position,
        } => {
            let customer = state.remove(model, from_vehicle, from_position);
            state.routes[to_vehicle].customers.insert(to_position, customer);
            state.refresh_route(model, to_vehicle);
        }
        Move::Swap {
            vehicle_a,
            position_a,
            vehicle_b,
            position_b,
        } => {
            let customer_a = state.routes[vehicle_a].customers[position_a];
            let customer_b = state.routes[vehicle_b].customers[position_b];
            state.routes[vehicle_a].customers[position_a] = customer_b;
            state.routes[vehicle_b].customers[position_b] = customer_a;
            state.refresh_route(model, vehicle_a);
            state.refresh_route(model, vehicle_b);
        }
        Move::TwoOpt { vehicle, i, j } => {
            state.routes[vehicle].customers[i..=j].reverse();
            state.refresh_route(model, vehicle);
        }
    }
}

/// Customers a move touches, for tabu bookkeeping.
fn moved_customers(state: &SearchState, mv: Move) -> Vec<usize> {
    match mv {
        Move::Insert { customer, .. } => vec![customer],
        Move::Relocate {
            from_vehicle,
            from_position,
            ..
        } => vec![state.routes[from_vehicle].customers[from_position]],
        Move::Swap {
            vehicle_a,
            position_a,
            vehicle_b,
            position_b,
        } => vec![
            state.routes[vehicle_a].customers[position_a],
            state.routes[vehicle_b].customers[position_b],
        ],
        Move::TwoOpt { vehicle, i, j } => vec![
            state.routes[vehicle].customers[i],
            state.routes[vehicle].customers[j],
        ],
    }
}

/// The full candidate neighbourhood of the current state.
fn enumerate_moves(state: &SearchState) -> Vec<Move> {
    let num_vehicles = state.routes.len();
    let mut moves = Vec::new();

    for &customer in &state.unassigned {
        for vehicle in 0..num_vehicles {
            for position in 0..=state.routes[vehicle].customers.len() {
                moves.push(Move::Insert {
                    customer,
                    vehicle,
                    position,
                });
            }
        }
    }

    for from_vehicle in 0..num_vehicles {
        for from_position in 0..state.routes[from_vehicle].customers.len() {
            for to_vehicle in 0..num_vehicles {
                if to_vehicle == from_vehicle {
                    continue;
                }
                for to_position in 0..=state.routes[to_vehicle].customers.len() {
                    moves.push(Move::Relocate {
                        from_vehicle,
                        from_position,
                        to_vehicle,
                        to_position,
                    });
                }
            }
        }
    }

    for vehicle_a in 0..num_vehicles {
        for vehicle_b in (vehicle_a + 1)..num_vehicles {
            for position_a in 0..state.routes[vehicle_a].customers.len() {
                for position_b in 0..state.routes[vehicle_b].customers.len() {
                    moves.push(Move::Swap {
                        vehicle_a,
                        position_a,
                        vehicle_b,
                        position_b,
                    });
                }
            }
        }
    }

    for vehicle in 0..num_vehicles {
        let len = state.routes[vehicle].customers.len();
        for i in 0..len {
            for j in (i + 1)..len {
                moves.push(Move::TwoOpt { vehicle, i, j });
            }
        }
    }

    moves
}

/// Score the whole neighbourhood in parallel and keep the best admissible
/// candidate. Ties break on enumeration order so runs are reproducible.
fn best_move<F>(
    model: &RoutingModel,
    state: &SearchState,
    extra: &ArcExtra,
    admissible: F,
) -> Option<(Move, MoveEval)>
where
    F: Fn(Move, &MoveEval) -> bool + Sync,
{
    let moves = enumerate_moves(state);
    moves
        .par_iter()
        .enumerate()
        .filter_map(|(index, &mv)| {
            let eval = evaluate(model, state, extra, mv)?;
            if !admissible(mv, &eval) {
                return None;
            }
            Some((eval.selection_delta(model.drop_penalty), index, mv, eval))
        })
        .min_by_key(|&(delta, index, ..)| (delta, index))
        .map(|(_, _, mv, eval)| (mv, eval))
}

/// Stagnation cutoff scaled to instance size.
fn max_no_improvement(num_customers: usize) -> usize {
    let scaling = if num_customers < 50 { 15.0 } else { 9.0 };
    300usize.max((scaling * (num_customers as f64).powf(1.33)) as usize)
}

fn run_guided_local_search(
    model: &RoutingModel,
    mut state: SearchState,
    deadline: Instant,
    log_search: bool,
) -> SearchState {
    let mut extra = ArcExtra::none(model);
    let mut penalties = vec![vec![0u32; model.num_nodes()]; model.num_nodes()];
    let mut lambda = 0i64;

    let mut best = state.clone();
    let mut best_objective = state.objective(model);
    let mut stagnation = 0;
    let stagnation_limit = max_no_improvement(model.num_customers());

    while Instant::now() < deadline && stagnation < stagnation_limit {
        let improving = best_move(model, &state, &extra, |_, eval| {
            eval.selection_delta(model.drop_penalty) < 0
        });

        match improving {
            Some((mv, _)) => {
                apply(model, &mut state, mv);
                let objective = state.objective(model);
                if objective < best_objective {
                    best_objective = objective;
                    best = state.clone();
                    stagnation = 0;
                    if log_search {
                        debug!(objective, "New best under guided local search");
                    }
                } else {
                    stagnation += 1;
                }
            }
            None => {
                // Augmented local optimum: penalize the most expensive used
                // arcs (by utility) and keep searching the reshaped surface.
                if lambda == 0 {
                    let arcs: i64 = state
                        .routes
                        .iter()
                        .map(|r| r.customers.len() as i64 + 1)
                        .sum::<i64>()
                        .max(1);
                    lambda = (state.travel_cost() / (5 * arcs)).max(1);
                }
                penalize_worst_arcs(model, &state, &mut penalties, &mut extra, lambda);
                stagnation += 1;
            }
        }
    }

    best
}

fn penalize_worst_arcs(
    model: &RoutingModel,
    state: &SearchState,
    penalties: &mut [Vec<u32>],
    extra: &mut ArcExtra,
    lambda: i64,
) {
    let mut worst_utility = 0i64;
    let mut worst: Vec<(usize, usize)> = Vec::new();

    for (vehicle, route) in state.routes.iter().enumerate() {
        if route.customers.is_empty() {
            continue;
        }
        let depot = model.vehicles[vehicle].depot;
        let mut current = depot;
        for &customer in route.customers.iter().chain(std::iter::once(&usize::MAX)) {
            let node = if customer == usize::MAX {
                depot
            } else {
                model.customer_node(customer)
            };
            let utility =
                model.distance_between(current, node) / (1 + penalties[current][node] as i64);
            match utility.cmp(&worst_utility) {
                std::cmp::Ordering::Greater => {
                    worst_utility = utility;
                    worst = vec![(current, node)];
                }
                std::cmp::Ordering::Equal => worst.push((current, node)),
                std::cmp::Ordering::Less => {}
            }
            current = node;
        }
    }

    for (from, to) in worst {
        penalties[from][to] += 1;
        extra.table[from][to] = lambda * penalties[from][to] as i64;
    }
}

fn run_tabu_search(
    model: &RoutingModel,
    mut state: SearchState,
    deadline: Instant,
    seed: u64,
) -> SearchState {
    let extra = ArcExtra::none(model);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut tabu_list: VecDeque<usize> = VecDeque::new();
    let mut tenure = 20usize;
    let tenure_bounds = (11usize, 29usize);

    let mut best = state.clone();
    let mut best_objective = state.objective(model);
    let mut current_objective = best_objective;
    let mut stagnation = 0;
    let stagnation_limit = max_no_improvement(model.num_customers());
    let mut iteration = 0usize;

    while Instant::now() < deadline && stagnation < stagnation_limit {
        iteration += 1;

        let tabu = tabu_list.clone();
        let chosen = best_move(model, &state, &extra, |mv, eval| {
            let touched = moved_customers(&state, mv);
            let is_tabu = touched.iter().any(|c| tabu.contains(c));
            // Aspiration: a tabu move is allowed when it beats the best.
            !is_tabu
                || current_objective + eval.objective_delta(model.drop_penalty) < best_objective
        });

        let Some((mv, eval)) = chosen else { break };

        for customer in moved_customers(&state, mv) {
            tabu_list.push_front(customer);
        }
        while tabu_list.len() > tenure {
            tabu_list.pop_back();
        }

        apply(model, &mut state, mv);
        current_objective += eval.objective_delta(model.drop_penalty);

        if current_objective < best_objective {
            best_objective = current_objective;
            best = state.clone();
            stagnation = 0;
        } else {
            stagnation += 1;
        }

        if iteration % 20 == 0 {
            tenure = rng.gen_range(tenure_bounds.0..tenure_bounds.1);
        }
    }

    best
}

fn run_annealing(
    model: &RoutingModel,
    mut state: SearchState,
    deadline: Instant,
    seed: u64,
) -> SearchState {
    let extra = ArcExtra::none(model);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let start = Instant::now();
    let total = deadline.saturating_duration_since(start);
    if total.is_zero() {
        return state;
    }

    let mut best = state.clone();
    let mut best_objective = state.objective(model);
    let mut current_objective = best_objective;
    let mut stagnation = 0;
    let stagnation_limit = max_no_improvement(model.num_customers()) * 10;

    let initial_temperature =
        (state.travel_cost() as f64 / (model.num_customers() as f64 + 1.0)).max(1.0);

    while Instant::now() < deadline && stagnation < stagnation_limit {
        let elapsed_fraction =
            start.elapsed().as_secs_f64() / total.as_secs_f64().max(f64::EPSILON);
        let temperature = (initial_temperature * (1.0 - elapsed_fraction)).max(1e-3);

        let Some((mv, eval)) = random_move(model, &state, &extra, &mut rng) else {
            stagnation += 1;
            continue;
        };

        let delta = eval.objective_delta(model.drop_penalty);
        let accept = delta <= 0 || rng.gen::<f64>() < (-(delta as f64) / temperature).exp();
        if accept {
            apply(model, &mut state, mv);
            current_objective += delta;
            if current_objective < best_objective {
                best_objective = current_objective;
                best = state.clone();
                stagnation = 0;
                continue;
            }
        }
        stagnation += 1;
    }

    best
}

/// Sample one random feasible move, with a bounded number of attempts.
fn random_move(
    model: &RoutingModel,
    state: &SearchState,
    extra: &ArcExtra,
    rng: &mut ChaCha8Rng,
) -> Option<(Move, MoveEval)> {
    let non_empty: Vec<usize> = state
        .routes
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.customers.is_empty())
        .map(|(v, _)| v)
        .collect();

    for _ in 0..30 {
        let kind = rng.gen_range(0..4);
        let mv = match kind {
            0 if !state.unassigned.is_empty() => {
                let customer = state.unassigned[rng.gen_range(0..state.unassigned.len())];
                let vehicle = rng.gen_range(0..state.routes.len());
                let position = rng.gen_range(0..=state.routes[vehicle].customers.len());
                Move::Insert {
                    customer,
                    vehicle,
                    position,
                }
            }
            1 if !non_empty.is_empty() && state.routes.len() > 1 => {
                let from_vehicle = non_empty[rng.gen_range(0..non_empty.len())];
                let to_vehicle = loop {
                    let v = rng.gen_range(0..state.routes.len());
                    if v != from_vehicle {
                        break v;
                    }
                };
                Move::Relocate {
                    from_vehicle,
                    from_position: rng.gen_range(0..state.routes[from_vehicle].customers.len()),
                    to_vehicle,
                    to_position: rng.gen_range(0..=state.routes[to_vehicle].customers.len()),
                }
            }
            2 if non_empty.len() > 1 => {
                let a = rng.gen_range(0..non_empty.len());
                let b = loop {
                    let candidate = rng.gen_range(0..non_empty.len());
                    if candidate != a {
                        break candidate;
                    }
                };
                let (vehicle_a, vehicle_b) = (non_empty[a], non_empty[b]);
                Move::Swap {
                    vehicle_a,
                    position_a: rng.gen_range(0..state.routes[vehicle_a].customers.len()),
                    vehicle_b,
                    position_b: rng.gen_range(0..state.routes[vehicle_b].customers.len()),
                }
            }
            _ => {
                let candidates: Vec<usize> = non_empty
                    .iter()
                    .copied()
                    .filter(|&v| state.routes[v].customers.len() >= 2)
                    .collect();
                if candidates.is_empty() {
                    continue;
                }
                let vehicle = candidates[rng.gen_range(0..candidates.len())];
                let len = state.routes[vehicle].customers.len();
                let i = rng.gen_range(0..len - 1);
                let j = rng.gen_range(i + 1..len);
                Move::TwoOpt { vehicle, i, j }
            }
        };

        if let Some(eval) = evaluate(model, state, extra, mv) {
            return Some((mv, eval));
        }
    }

    None
}

/// Log and report whether a finished route respects its vehicle's limits.
pub(crate) fn validate_route_limits(
    model: &RoutingModel,
    vehicle: usize,
    stats: &RouteStats,
    context: &str,
) -> bool {
    let v = &model.vehicles[vehicle];
    let mut feasible = true;

    if stats.load > v.capacity_hundredths {
        warn!(
            vehicle,
            vehicle_type = v.vehicle_type.label(),
            load = stats.load as f64 / 100.0,
            capacity = v.capacity_hundredths as f64 / 100.0,
            "{context}: route exceeds capacity"
        );
        feasible = false;
    }
    if stats.distance_m > v.max_distance_m {
        warn!(
            vehicle,
            vehicle_type = v.vehicle_type.label(),
            distance_km = stats.distance_m as f64 / 1000.0,
            limit_km = v.max_distance_m as f64 / 1000.0,
            "{context}: route exceeds distance limit"
        );
        feasible = false;
    }
    if stats.stops > v.max_stops {
        warn!(
            vehicle,
            vehicle_type = v.vehicle_type.label(),
            stops = stats.stops,
            limit = v.max_stops,
            "{context}: route exceeds stop limit"
        );
        feasible = false;
    }
    // One minute of slack absorbs per-arc rounding.
    if stats.time_s > v.max_time_s + 60 {
        warn!(
            vehicle,
            vehicle_type = v.vehicle_type.label(),
            time_minutes = stats.time_s as f64 / 60.0,
            limit_minutes = v.max_time_s as f64 / 60.0,
            "{context}: route exceeds working time"
        );
        feasible = false;
    }

    feasible
}

/// Build the normalized Solution from the final search state.
///
/// The time totals come straight from the accumulated time dimension; the
/// walk is capped defensively so a corrupted route can never loop forever.
fn extract(model: &RoutingModel, state: &SearchState) -> Solution {
    let walk_cap = model.num_customers() + 10;
    let mut routes = Vec::new();
    let mut served = vec![false; model.num_customers()];

    for (vehicle, route) in state.routes.iter().enumerate() {
        if route.customers.is_empty() {
            continue;
        }

        let mut visited = Vec::with_capacity(route.customers.len());
        for (step, &customer) in route.customers.iter().enumerate() {
            if step >= walk_cap {
                error!(
                    vehicle,
                    steps = step,
                    "Route walk exceeded the expected node count, aborting this vehicle"
                );
                break;
            }
            visited.push(customer);
        }

        let stats = model.route_stats(vehicle, &visited);
        let is_feasible = validate_route_limits(model, vehicle, &stats, "extraction");
        let instance = &model.vehicles[vehicle];

        for &customer in &visited {
            served[customer] = true;
        }

        routes.push(Route {
            vehicle_type: instance.vehicle_type,
            vehicle_id: vehicle,
            customers: visited
                .iter()
                .map(|&c| model.customers[c].clone())
                .collect(),
            depot_location: model.registry.location(instance.depot),
            total_distance_km: stats.distance_m as f64 / 1000.0,
            total_time_minutes: stats.time_s as f64 / 60.0,
            total_volume: visited.iter().map(|&c| model.customers[c].volume).sum(),
            is_feasible,
        });
    }

    let dropped_customers: Vec<_> = (0..model.num_customers())
        .filter(|&c| !served[c])
        .map(|c| model.customers[c].clone())
        .collect();

    if !dropped_customers.is_empty() {
        warn!(
            dropped = dropped_customers.len(),
            "Solver dropped customers to find a solution"
        );
    }

    Solution::from_routes(routes, dropped_customers, state.objective(model))
}
