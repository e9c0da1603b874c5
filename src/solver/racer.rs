use std::cmp::Ordering;
use std::time::Duration;

use itertools::Itertools;
use rayon::prelude::*;
use tracing::{error, info, warn};

use crate::config::CvrpConfig;
use crate::domain::solution::Solution;
use crate::solver::model::RoutingModel;
use crate::solver::search::{solve, SearchConfig};
use crate::solver::strategies::{FirstSolutionStrategy, Metaheuristic, StrategyPair};

/// Distinct strategy pairs for up to `num_workers` workers: the cartesian
/// product of the configured lists, deduplicated in order, with the base
/// pair as fallback when the lists produce nothing.
pub fn generate_strategy_pairs(config: &CvrpConfig, num_workers: usize) -> Vec<StrategyPair> {
    let first_solutions: Vec<FirstSolutionStrategy> = config
        .parallel_first_solution_strategies
        .iter()
        .map(|name| FirstSolutionStrategy::parse_or_default(name))
        .collect();
    let metaheuristics: Vec<Metaheuristic> = config
        .parallel_local_search_metaheuristics
        .iter()
        .map(|name| Metaheuristic::parse_or_default(name))
        .collect();

    let mut pairs: Vec<StrategyPair> = first_solutions
        .iter()
        .cartesian_product(metaheuristics.iter())
        .map(|(&first_solution, &metaheuristic)| StrategyPair {
            first_solution,
            metaheuristic,
        })
        .unique()
        .take(num_workers)
        .collect();

    // Top up with the base pair when the lists produced fewer distinct
    // pairs than workers.
    if pairs.len() < num_workers {
        let base = StrategyPair {
            first_solution: FirstSolutionStrategy::parse_or_default(
                &config.first_solution_strategy,
            ),
            metaheuristic: Metaheuristic::parse_or_default(&config.local_search_metaheuristic),
        };
        if !pairs.contains(&base) {
            if pairs.is_empty() {
                warn!("No parallel strategy pairs configured, falling back to {base}");
            }
            pairs.push(base);
        }
    }

    pairs
}

/// Winner ordering: most served volume first, then lower objective, fewer
/// vehicles, fewer drops, and finally the stable worker id.
fn better_of(a: &(usize, Solution), b: &(usize, Solution)) -> Ordering {
    let (id_a, sol_a) = a;
    let (id_b, sol_b) = b;
    sol_b
        .served_volume_hundredths()
        .cmp(&sol_a.served_volume_hundredths())
        .then(sol_a.objective.cmp(&sol_b.objective))
        .then(sol_a.total_vehicles_used.cmp(&sol_b.total_vehicles_used))
        .then(
            sol_a
                .dropped_customers
                .len()
                .cmp(&sol_b.dropped_customers.len()),
        )
        .then(id_a.cmp(id_b))
}

/// Pick the race winner among finished workers.
pub fn select_winner(results: Vec<(usize, Solution)>) -> Option<Solution> {
    results
        .into_iter()
        .sorted_by(|a, b| better_of(a, b))
        .next()
        .map(|(worker_id, solution)| {
            info!(
                worker_id,
                served_volume = solution.total_served_volume,
                objective = solution.objective,
                routes = solution.routes.len(),
                dropped = solution.dropped_customers.len(),
                "Race winner selected by served volume"
            );
            solution
        })
}

/// Fan out `num_workers` independent solves over distinct strategy pairs and
/// return the best solution by served volume.
///
/// Workers share the model read-only; a failed worker degrades to an empty
/// result and the race continues. If every worker fails the result is an
/// empty infeasible solution.
pub fn race(model: &RoutingModel, config: &CvrpConfig, num_workers: usize) -> Solution {
    let pairs = generate_strategy_pairs(config, num_workers);
    info!(
        workers = pairs.len(),
        time_limit_s = config.time_limit_seconds,
        "Starting parallel race"
    );

    let results: Vec<(usize, Solution)> = pairs
        .par_iter()
        .enumerate()
        .map(|(worker_id, &pair)| {
            let search = SearchConfig {
                time_limit: Duration::from_secs(config.time_limit_seconds),
                log_search: config.log_search,
                seed: 64 + worker_id as u64,
            };
            info!(worker_id, pair = %pair, "Worker starting");
            let solution = match solve(model, pair, &search) {
                Ok(solution) => solution,
                Err(e) => {
                    error!(worker_id, pair = %pair, "Worker failed: {e}");
                    Solution::empty_infeasible()
                }
            };
            info!(
                worker_id,
                pair = %pair,
                served_volume = solution.total_served_volume,
                routes = solution.routes.len(),
                dropped = solution.dropped_customers.len(),
                "Worker finished"
            );
            (worker_id, solution)
        })
        .collect();

    select_winner(results).unwrap_or_else(|| {
        error!("All race workers failed, returning infeasible empty solution");
        Solution::empty_infeasible()
    })
}
