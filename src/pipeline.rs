use std::sync::Arc;
use std::time::Duration;

use tracing::{info, span, warn, Level};

use crate::config::CoreConfig;
use crate::distance::cache::MatrixCache;
use crate::distance::matrix::{DistanceMatrix, MatrixService};
use crate::distance::registry::LocationRegistry;
use crate::domain::solution::Solution;
use crate::domain::types::Customer;
use crate::error::SolveError;
use crate::prealloc::{self, WarehouseAllocation};
use crate::solver::model::RoutingModel;
use crate::solver::postprocess;
use crate::solver::racer;
use crate::solver::search::{solve, SearchConfig};
use crate::solver::strategies::{FirstSolutionStrategy, Metaheuristic, StrategyPair};

/// Everything a run produces: the winning solution plus the pre-allocation
/// that describes what the warehouse handles directly.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub solution: Solution,
    pub allocation: WarehouseAllocation,
}

/// Full planning run: validate, pre-allocate, build the registry, acquire
/// the matrix, race the solvers, post-process.
pub async fn run(config: &CoreConfig, customers: Vec<Customer>) -> Result<RunOutput, SolveError> {
    validate_input(config, &customers)?;

    let allocation = {
        let span = span!(Level::INFO, "prealloc");
        let _guard = span.enter();
        prealloc::partition(&customers, &config.vehicles, &config.warehouse)?
    };

    if allocation.solver_set.is_empty() {
        info!("Every order was deferred to the warehouse, nothing to route");
        return Ok(RunOutput {
            solution: Solution::from_routes(vec![], vec![], 0),
            allocation,
        });
    }

    let registry = build_registry(config, &allocation.solver_set);

    let matrix = {
        let span = span!(Level::INFO, "matrix");
        let _guard = span.enter();
        fetch_matrix(config, &registry).await?
    };

    let solution = solve_from_parts(config, &allocation, registry, Arc::new(matrix))?;

    Ok(RunOutput {
        solution,
        allocation,
    })
}

/// The registry for a solver set under this configuration.
pub fn build_registry(config: &CoreConfig, solver_set: &[Customer]) -> LocationRegistry {
    LocationRegistry::build(
        config.locations.depot_location,
        Some(config.locations.center_location),
        &config.vehicles,
        solver_set,
    )
}

/// Model building, racing and post-processing over an already-acquired
/// matrix. Split from `run` so tests and callers with their own matrices
/// can drive the solver without the routing engine.
pub fn solve_from_parts(
    config: &CoreConfig,
    allocation: &WarehouseAllocation,
    registry: LocationRegistry,
    matrix: Arc<DistanceMatrix>,
) -> Result<Solution, SolveError> {
    let model = RoutingModel::build(
        allocation.solver_set.clone(),
        &config.vehicles,
        registry,
        matrix,
        &config.locations,
        &config.cvrp,
    )?;

    let num_workers = config.cvrp.resolved_num_workers();
    let solution = {
        let span = span!(Level::INFO, "solve");
        let _guard = span.enter();

        if config.cvrp.enable_parallel_solving && num_workers > 1 {
            racer::race(&model, &config.cvrp, num_workers)
        } else {
            info!("Parallel solving disabled, running a single worker");
            let pair = StrategyPair {
                first_solution: FirstSolutionStrategy::parse_or_default(
                    &config.cvrp.first_solution_strategy,
                ),
                metaheuristic: Metaheuristic::parse_or_default(
                    &config.cvrp.local_search_metaheuristic,
                ),
            };
            let search = SearchConfig {
                time_limit: Duration::from_secs(config.cvrp.time_limit_seconds),
                log_search: config.cvrp.log_search,
                seed: 64,
            };
            solve(&model, pair, &search).unwrap_or_else(|e| {
                warn!("Single worker failed: {e}");
                Solution::empty_infeasible()
            })
        }
    };

    let solution = if config.cvrp.enable_final_depot_reconfiguration {
        let span = span!(Level::INFO, "postprocess");
        let _guard = span.enter();
        postprocess::reconfigure_from_main_depot(&model, solution)
    } else {
        info!("Final depot reconfiguration disabled, keeping solver depots");
        solution
    };

    Ok(solution)
}

async fn fetch_matrix(
    config: &CoreConfig,
    registry: &LocationRegistry,
) -> Result<DistanceMatrix, SolveError> {
    let cache = if config.cache.enable_cache {
        match MatrixCache::connect(&config.cache.database_url).await {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!("Matrix cache unavailable ({e}), continuing without it");
                None
            }
        }
    } else {
        None
    };

    let service = MatrixService::new(config.matrix.clone(), cache);
    service.get_matrix(registry.locations()).await
}

fn validate_input(config: &CoreConfig, customers: &[Customer]) -> Result<(), SolveError> {
    if customers.is_empty() {
        return Err(SolveError::InvalidInput("empty customer set".into()));
    }
    if config.enabled_vehicles().is_empty() {
        return Err(SolveError::InvalidInput("no enabled vehicles".into()));
    }
    for customer in customers {
        if !customer.volume.is_finite() || customer.volume < 0.0 {
            return Err(SolveError::InvalidInput(format!(
                "customer {} has invalid volume {}",
                customer.id, customer.volume
            )));
        }
        if !customer.coords.0.is_finite() || !customer.coords.1.is_finite() {
            return Err(SolveError::InvalidInput(format!(
                "customer {} has invalid coordinates",
                customer.id
            )));
        }
    }
    Ok(())
}
