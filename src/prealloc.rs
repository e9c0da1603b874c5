use tracing::{error, info};

use crate::config::WarehouseConfig;
use crate::domain::types::{Customer, VehicleConfig};
use crate::error::SolveError;

/// Bipartition of the day's orders: what the solver routes and what the
/// warehouse handles directly.
#[derive(Debug, Clone)]
pub struct WarehouseAllocation {
    pub solver_set: Vec<Customer>,
    pub warehouse_set: Vec<Customer>,
    /// Sum of capacity x count over enabled types, whole volume units.
    pub total_vehicle_capacity: i64,
    pub total_solver_volume: f64,
    pub warehouse_volume: f64,
    pub capacity_utilization: f64,
}

/// Split customers into solver-eligible and warehouse-deferred sets.
///
/// Orders no single vehicle could carry always go to the warehouse; orders
/// above the large-request fraction of the biggest vehicle go there too when
/// `move_largest_to_warehouse` is set. Everything else is left for the
/// solver, which keeps final authority over dropping via disjunctions.
pub fn partition(
    customers: &[Customer],
    vehicle_configs: &[VehicleConfig],
    config: &WarehouseConfig,
) -> Result<WarehouseAllocation, SolveError> {
    let enabled: Vec<&VehicleConfig> = vehicle_configs.iter().filter(|v| v.enabled).collect();
    if enabled.is_empty() {
        return Err(SolveError::InvalidInput("no enabled vehicles".into()));
    }

    let total_capacity: i64 = enabled.iter().map(|v| v.capacity * v.count as i64).sum();
    let max_single_capacity = enabled.iter().map(|v| v.capacity).max().unwrap_or(0);

    if !config.enable_warehouse {
        info!("Warehouse pre-allocation disabled, all customers go to the solver");
        return Ok(finish(customers.to_vec(), vec![], total_capacity, customers));
    }

    let threshold = max_single_capacity as f64 * config.large_request_threshold;
    info!(
        max_single_capacity,
        threshold,
        move_largest = config.move_largest_to_warehouse,
        "Pre-allocating customers"
    );

    let mut solver_set = Vec::with_capacity(customers.len());
    let mut warehouse_set = Vec::new();

    for customer in customers {
        if customer.volume > max_single_capacity as f64 {
            info!(
                customer = %customer.name,
                volume = customer.volume,
                "Deferred to warehouse: exceeds every vehicle's capacity"
            );
            warehouse_set.push(customer.clone());
        } else if config.move_largest_to_warehouse && customer.volume > threshold {
            info!(
                customer = %customer.name,
                volume = customer.volume,
                threshold,
                "Deferred to warehouse: large request"
            );
            warehouse_set.push(customer.clone());
        } else {
            solver_set.push(customer.clone());
        }
    }

    Ok(finish(solver_set, warehouse_set, total_capacity, customers))
}

fn finish(
    solver_set: Vec<Customer>,
    warehouse_set: Vec<Customer>,
    total_capacity: i64,
    input: &[Customer],
) -> WarehouseAllocation {
    let total_solver_volume: f64 = solver_set.iter().map(|c| c.volume).sum();
    let warehouse_volume: f64 = warehouse_set.iter().map(|c| c.volume).sum();
    let capacity_utilization = if total_capacity > 0 {
        total_solver_volume / total_capacity as f64
    } else {
        0.0
    };

    let input_volume: f64 = input.iter().map(|c| c.volume).sum();
    let output_volume = total_solver_volume + warehouse_volume;
    if (input_volume - output_volume).abs() > 0.1 {
        error!(
            input_volume,
            output_volume, "Volume not conserved across pre-allocation"
        );
    }

    info!(
        solver_customers = solver_set.len(),
        warehouse_customers = warehouse_set.len(),
        total_solver_volume,
        warehouse_volume,
        utilization_pct = capacity_utilization * 100.0,
        "Pre-allocation complete"
    );

    WarehouseAllocation {
        solver_set,
        warehouse_set,
        total_vehicle_capacity: total_capacity,
        total_solver_volume,
        warehouse_volume,
        capacity_utilization,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::VehicleType;

    fn customer(id: &str, volume: f64) -> Customer {
        Customer {
            id: id.into(),
            name: id.into(),
            coords: (42.7, 23.3),
            volume,
            distance_from_depot_m: None,
        }
    }

    fn fleet() -> Vec<VehicleConfig> {
        vec![
            VehicleConfig {
                vehicle_type: VehicleType::InternalBus,
                capacity: 360,
                count: 2,
                max_distance_km: None,
                max_time_hours: 8,
                service_time_minutes: 5,
                enabled: true,
                start_location: None,
                max_customers_per_route: None,
            },
            VehicleConfig {
                vehicle_type: VehicleType::CenterBus,
                capacity: 250,
                count: 1,
                max_distance_km: None,
                max_time_hours: 9,
                service_time_minutes: 8,
                enabled: false,
                start_location: None,
                max_customers_per_route: None,
            },
        ]
    }

    fn config() -> WarehouseConfig {
        WarehouseConfig {
            enable_warehouse: true,
            move_largest_to_warehouse: true,
            large_request_threshold: 0.3,
        }
    }

    #[test]
    fn oversize_order_goes_to_warehouse() {
        let customers = vec![customer("a", 1000.0), customer("b", 20.0)];
        let allocation = partition(&customers, &fleet(), &config()).unwrap();
        assert_eq!(allocation.warehouse_set.len(), 1);
        assert_eq!(allocation.warehouse_set[0].id, "a");
        assert_eq!(allocation.solver_set.len(), 1);
        assert_eq!(allocation.solver_set[0].id, "b");
    }

    #[test]
    fn large_request_threshold_applies() {
        // threshold = 360 * 0.3 = 108
        let customers = vec![customer("big", 150.0), customer("small", 100.0)];
        let allocation = partition(&customers, &fleet(), &config()).unwrap();
        assert_eq!(allocation.warehouse_set.len(), 1);
        assert_eq!(allocation.warehouse_set[0].id, "big");
    }

    #[test]
    fn move_largest_disabled_keeps_large_requests() {
        let mut cfg = config();
        cfg.move_largest_to_warehouse = false;
        let customers = vec![customer("big", 150.0), customer("huge", 1000.0)];
        let allocation = partition(&customers, &fleet(), &cfg).unwrap();
        // Only the physically infeasible order is deferred.
        assert_eq!(allocation.warehouse_set.len(), 1);
        assert_eq!(allocation.warehouse_set[0].id, "huge");
        assert_eq!(allocation.solver_set[0].id, "big");
    }

    #[test]
    fn partition_conserves_customers_and_volume() {
        let customers: Vec<Customer> = (0..50)
            .map(|i| customer(&format!("c{i}"), (i as f64) * 9.0))
            .collect();
        let allocation = partition(&customers, &fleet(), &config()).unwrap();
        assert_eq!(
            allocation.solver_set.len() + allocation.warehouse_set.len(),
            customers.len()
        );
        let input: f64 = customers.iter().map(|c| c.volume).sum();
        assert!((allocation.total_solver_volume + allocation.warehouse_volume - input).abs() < 0.1);
    }

    #[test]
    fn disabled_warehouse_passes_everything_through() {
        let mut cfg = config();
        cfg.enable_warehouse = false;
        let customers = vec![customer("a", 1000.0), customer("b", 20.0)];
        let allocation = partition(&customers, &fleet(), &cfg).unwrap();
        assert!(allocation.warehouse_set.is_empty());
        assert_eq!(allocation.solver_set.len(), 2);
        assert_eq!(allocation.total_vehicle_capacity, 720);
    }

    #[test]
    fn no_enabled_vehicles_is_an_error() {
        let mut vehicles = fleet();
        for v in &mut vehicles {
            v.enabled = false;
        }
        let result = partition(&[customer("a", 10.0)], &vehicles, &config());
        assert!(matches!(result, Err(SolveError::InvalidInput(_))));
    }
}
