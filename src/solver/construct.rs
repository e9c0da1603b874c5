use std::cmp::Reverse;

use tracing::debug;

use crate::solver::model::RoutingModel;
use crate::solver::state::{best_insertion, insertion_stats, SearchState};
use crate::solver::strategies::FirstSolutionStrategy;

/// Build a first solution with the requested strategy.
///
/// Every builder honors all four hard dimensions; customers that fit
/// nowhere stay unassigned for the disjunction penalty to account for.
pub fn build(model: &RoutingModel, strategy: FirstSolutionStrategy) -> SearchState {
    let mut state = match strategy {
        FirstSolutionStrategy::Automatic | FirstSolutionStrategy::PathCheapestArc => {
            path_cheapest_arc(model)
        }
        FirstSolutionStrategy::GlobalCheapestArc => global_cheapest_arc(model),
        FirstSolutionStrategy::Savings => savings(model),
        FirstSolutionStrategy::ParallelCheapestInsertion => parallel_cheapest_insertion(model),
        FirstSolutionStrategy::BestInsertion => best_insertion_order(model),
        FirstSolutionStrategy::Sweep => sweep(model),
    };

    greedy_fill(model, &mut state);
    debug!(
        strategy = %strategy,
        unassigned = state.unassigned.len(),
        cost = state.travel_cost(),
        "First solution constructed"
    );
    state
}

/// Insert every remaining unassigned customer at its cheapest feasible
/// position, repeating until nothing more fits.
pub fn greedy_fill(model: &RoutingModel, state: &mut SearchState) {
    loop {
        let mut best: Option<(usize, usize, usize, i64)> = None;
        for &customer in &state.unassigned {
            for vehicle in 0..state.routes.len() {
                if let Some((position, stats)) =
                    best_insertion(model, vehicle, &state.routes[vehicle], customer)
                {
                    let delta = stats.cost - state.routes[vehicle].stats.cost;
                    if best.map_or(true, |(.., best_delta)| delta < best_delta) {
                        best = Some((customer, vehicle, position, delta));
                    }
                }
            }
        }
        match best {
            Some((customer, vehicle, position, _)) => {
                state.insert(model, vehicle, position, customer);
            }
            None => break,
        }
    }
}

/// Extend one vehicle at a time along its cheapest feasible outgoing arc.
fn path_cheapest_arc(model: &RoutingModel) -> SearchState {
    let mut state = SearchState::empty(model);

    for vehicle in 0..model.vehicles.len() {
        loop {
            let route = &state.routes[vehicle];
            let current = match route.customers.last() {
                Some(&c) => model.customer_node(c),
                None => model.vehicles[vehicle].depot,
            };
            let position = route.customers.len();

            let mut best: Option<(usize, i64)> = None;
            for &customer in &state.unassigned {
                let stats = insertion_stats(model, vehicle, route, position, customer);
                if !model.within_limits(vehicle, &stats) {
                    continue;
                }
                let arc = model.arc_cost(vehicle, current, model.customer_node(customer));
                if best.map_or(true, |(_, best_arc)| arc < best_arc) {
                    best = Some((customer, arc));
                }
            }

            match best {
                Some((customer, _)) => state.insert(model, vehicle, position, customer),
                None => break,
            }
        }
    }

    state
}

/// Repeatedly commit the globally cheapest feasible route extension across
/// all vehicles.
fn global_cheapest_arc(model: &RoutingModel) -> SearchState {
    let mut state = SearchState::empty(model);

    loop {
        let mut best: Option<(usize, usize, i64)> = None;
        for vehicle in 0..state.routes.len() {
            let route = &state.routes[vehicle];
            let current = match route.customers.last() {
                Some(&c) => model.customer_node(c),
                None => model.vehicles[vehicle].depot,
            };
            let position = route.customers.len();
            for &customer in &state.unassigned {
                let stats = insertion_stats(model, vehicle, route, position, customer);
                if !model.within_limits(vehicle, &stats) {
                    continue;
                }
                let arc = model.arc_cost(vehicle, current, model.customer_node(customer));
                if best.map_or(true, |(.., best_arc)| arc < best_arc) {
                    best = Some((vehicle, customer, arc));
                }
            }
        }

        match best {
            Some((vehicle, customer, _)) => {
                let position = state.routes[vehicle].customers.len();
                state.insert(model, vehicle, position, customer);
            }
            None => break,
        }
    }

    state
}

/// Clarke-Wright: merge single-customer tours in decreasing savings order,
/// then map the merged sequences onto concrete vehicle instances.
fn savings(model: &RoutingModel) -> SearchState {
    let n = model.num_customers();
    let depot = model.registry.main_depot_index();
    let node = |c: usize| model.customer_node(c);
    let d = |a: usize, b: usize| model.distance_between(a, b);

    let max_capacity = model
        .vehicles
        .iter()
        .map(|v| v.capacity_hundredths)
        .max()
        .unwrap_or(0);

    let mut savings: Vec<(i64, usize, usize)> = Vec::with_capacity(n * (n.saturating_sub(1)) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            let s = d(depot, node(i)) + d(depot, node(j)) - d(node(i), node(j));
            if s > 0 {
                savings.push((s, i, j));
            }
        }
    }
    savings.sort_by_key(|&(s, ..)| Reverse(s));

    // Each customer starts on its own tour.
    let mut tour_of: Vec<usize> = (0..n).collect();
    let mut tours: Vec<Vec<usize>> = (0..n).map(|c| vec![c]).collect();
    let mut loads: Vec<i64> = (0..n).map(|c| model.demands[c]).collect();

    for (_, i, j) in savings {
        let (ti, tj) = (tour_of[i], tour_of[j]);
        if ti == tj || loads[ti] + loads[tj] > max_capacity {
            continue;
        }

        let i_at_end = tours[ti].last() == Some(&i);
        let j_at_start = tours[tj].first() == Some(&j);
        let j_at_end = tours[tj].last() == Some(&j);
        let i_at_start = tours[ti].first() == Some(&i);

        let (from, into, reverse) = if i_at_end && j_at_start {
            (tj, ti, false)
        } else if j_at_end && i_at_start {
            (ti, tj, false)
        } else if i_at_end && j_at_end {
            (tj, ti, true)
        } else {
            continue;
        };

        let mut moved = std::mem::take(&mut tours[from]);
        if reverse {
            moved.reverse();
        }
        for &c in &moved {
            tour_of[c] = into;
        }
        loads[into] += loads[from];
        loads[from] = 0;
        tours[into].extend(moved);
    }

    // Assign merged tours to vehicles, largest loads onto the largest
    // vehicles first; tours no single vehicle can run dissolve into the
    // greedy fill afterwards.
    let mut sequences: Vec<Vec<usize>> = tours.into_iter().filter(|t| !t.is_empty()).collect();
    sequences.sort_by_key(|t| Reverse(t.iter().map(|&c| model.demands[c]).sum::<i64>()));

    let mut vehicle_order: Vec<usize> = (0..model.vehicles.len()).collect();
    vehicle_order.sort_by_key(|&v| Reverse(model.vehicles[v].capacity_hundredths));

    let mut state = SearchState::empty(model);
    let mut used = vec![false; model.vehicles.len()];

    for sequence in sequences {
        let assigned = vehicle_order.iter().copied().find(|&v| {
            !used[v] && model.feasible_stats(v, &sequence).is_some()
        });
        if let Some(vehicle) = assigned {
            used[vehicle] = true;
            for (position, &customer) in sequence.iter().enumerate() {
                state.insert(model, vehicle, position, customer);
            }
        }
    }

    state
}

/// Build all routes simultaneously by always committing the globally
/// cheapest feasible insertion.
fn parallel_cheapest_insertion(model: &RoutingModel) -> SearchState {
    let mut state = SearchState::empty(model);
    greedy_fill(model, &mut state);
    state
}

/// Insert customers one by one in input order, each at its globally
/// cheapest feasible position.
fn best_insertion_order(model: &RoutingModel) -> SearchState {
    let mut state = SearchState::empty(model);

    for customer in 0..model.num_customers() {
        let mut best: Option<(usize, usize, i64)> = None;
        for vehicle in 0..state.routes.len() {
            if let Some((position, stats)) =
                best_insertion(model, vehicle, &state.routes[vehicle], customer)
            {
                let delta = stats.cost - state.routes[vehicle].stats.cost;
                if best.map_or(true, |(.., best_delta)| delta < best_delta) {
                    best = Some((vehicle, position, delta));
                }
            }
        }
        if let Some((vehicle, position, _)) = best {
            state.insert(model, vehicle, position, customer);
        }
    }

    state
}

/// Sort customers by polar angle around the main depot and fill vehicles
/// sector by sector.
fn sweep(model: &RoutingModel) -> SearchState {
    let depot = model.registry.location(model.registry.main_depot_index());

    let mut order: Vec<usize> = (0..model.num_customers()).collect();
    order.sort_by(|&a, &b| {
        let angle = |c: usize| {
            let (lat, lon) = model.customers[c].coords;
            (lat - depot.0).atan2(lon - depot.1)
        };
        angle(a)
            .partial_cmp(&angle(b))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut state = SearchState::empty(model);
    let mut vehicle = 0;

    for customer in order {
        while vehicle < state.routes.len() {
            let position = state.routes[vehicle].customers.len();
            let stats = insertion_stats(model, vehicle, &state.routes[vehicle], position, customer);
            if model.within_limits(vehicle, &stats) {
                state.insert(model, vehicle, position, customer);
                break;
            }
            vehicle += 1;
        }
        if vehicle >= state.routes.len() {
            break;
        }
    }

    state
}
