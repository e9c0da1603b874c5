use thiserror::Error;

/// Errors surfaced by the planning core.
///
/// Matrix and pre-allocation failures are fatal to a run; solver failures
/// stay local to the worker that hit them and the race continues.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("routing engine unavailable: {0}")]
    RoutingEngineUnavailable(String),

    #[error("cache corruption: {0}")]
    CacheCorruption(String),

    #[error("solver found no solution")]
    SolverInfeasible,
}
