use serde::{Deserialize, Serialize};

use crate::domain::types::{Customer, VehicleType};

/// One vehicle's planned tour: depot -> customers in order -> depot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub vehicle_type: VehicleType,
    pub vehicle_id: usize,
    pub customers: Vec<Customer>,
    pub depot_location: (f64, f64),
    pub total_distance_km: f64,
    pub total_time_minutes: f64,
    pub total_volume: f64,
    pub is_feasible: bool,
}

/// A complete CVRP solution as returned by one solver worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub routes: Vec<Route>,
    pub dropped_customers: Vec<Customer>,
    pub total_distance_km: f64,
    pub total_time_minutes: f64,
    pub total_vehicles_used: usize,
    /// The cost the solver minimized: effective arc costs plus drop penalties.
    pub objective: i64,
    pub total_served_volume: f64,
    pub is_feasible: bool,
}

impl Solution {
    /// Assemble a solution from extracted routes, recomputing all aggregates.
    ///
    /// Feasible iff every route respects its hard limits and nothing was
    /// dropped.
    pub fn from_routes(routes: Vec<Route>, dropped_customers: Vec<Customer>, objective: i64) -> Self {
        let total_distance_km = routes.iter().map(|r| r.total_distance_km).sum();
        let total_time_minutes = routes.iter().map(|r| r.total_time_minutes).sum();
        let total_served_volume = routes.iter().map(|r| r.total_volume).sum();
        let is_feasible = routes.iter().all(|r| r.is_feasible) && dropped_customers.is_empty();

        Solution {
            total_vehicles_used: routes.len(),
            routes,
            dropped_customers,
            total_distance_km,
            total_time_minutes,
            objective,
            total_served_volume,
            is_feasible,
        }
    }

    /// The no-solution marker a worker returns when its search fails.
    pub fn empty_infeasible() -> Self {
        Solution {
            routes: vec![],
            dropped_customers: vec![],
            total_distance_km: 0.0,
            total_time_minutes: 0.0,
            total_vehicles_used: 0,
            objective: i64::MAX,
            total_served_volume: 0.0,
            is_feasible: false,
        }
    }

    /// Served volume in integer hundredths, for exact comparisons.
    pub fn served_volume_hundredths(&self) -> i64 {
        (self.total_served_volume * 100.0).round() as i64
    }
}
