use std::collections::HashMap;

use tracing::{info, warn};

use crate::domain::solution::{Route, Solution};
use crate::solver::model::RoutingModel;
use crate::solver::search::validate_route_limits;

/// Re-home every route to the main depot and greedily re-sequence it by
/// nearest neighbour over the real matrix.
///
/// Downstream consumers need routes that start and end at the same physical
/// depot even when the solver used an override depot. The customer set of
/// each route is preserved; only order, depot and derived totals change. A
/// re-sequenced route that violates its vehicle's limits is marked
/// infeasible and kept.
pub fn reconfigure_from_main_depot(model: &RoutingModel, solution: Solution) -> Solution {
    let main_depot = model.registry.main_depot_index();
    let main_depot_location = model.registry.location(main_depot);

    let index_by_id: HashMap<&str, usize> = model
        .customers
        .iter()
        .enumerate()
        .map(|(index, c)| (c.id.as_str(), index))
        .collect();

    let mut routes = Vec::with_capacity(solution.routes.len());

    for route in solution.routes {
        if route.customers.is_empty() {
            continue;
        }

        let vehicle = route.vehicle_id;
        let Some(mut remaining) = route
            .customers
            .iter()
            .map(|c| index_by_id.get(c.id.as_str()).copied())
            .collect::<Option<Vec<usize>>>()
        else {
            warn!(
                vehicle,
                "Route contains customers unknown to the model, keeping it unchanged"
            );
            routes.push(route);
            continue;
        };

        // Greedy nearest-neighbour from the main depot.
        let mut ordered = Vec::with_capacity(remaining.len());
        let mut current = main_depot;
        while !remaining.is_empty() {
            let (slot, &closest) = remaining
                .iter()
                .enumerate()
                .min_by_key(|(_, &c)| model.distance_between(current, model.customer_node(c)))
                .expect("remaining is non-empty");
            ordered.push(closest);
            remaining.swap_remove(slot);
            current = model.customer_node(closest);
        }

        // Recompute all totals from the main depot, service time included.
        let stats = route_stats_from(model, vehicle, main_depot, &ordered);
        let is_feasible = validate_route_limits(model, vehicle, &stats, "depot reconfiguration");
        if !is_feasible {
            warn!(
                vehicle,
                vehicle_type = route.vehicle_type.label(),
                "Reconfigured route violates its limits, keeping it marked infeasible"
            );
        }

        info!(
            vehicle,
            original_km = route.total_distance_km,
            reconfigured_km = stats.distance_m as f64 / 1000.0,
            original_minutes = route.total_time_minutes,
            reconfigured_minutes = stats.time_s as f64 / 60.0,
            "Route re-homed to the main depot"
        );

        routes.push(Route {
            vehicle_type: route.vehicle_type,
            vehicle_id: vehicle,
            customers: ordered
                .iter()
                .map(|&c| model.customers[c].clone())
                .collect(),
            depot_location: main_depot_location,
            total_distance_km: stats.distance_m as f64 / 1000.0,
            total_time_minutes: stats.time_s as f64 / 60.0,
            total_volume: ordered.iter().map(|&c| model.customers[c].volume).sum(),
            is_feasible,
        });
    }

    info!(routes = routes.len(), "Depot reconfiguration complete");
    Solution::from_routes(routes, solution.dropped_customers, solution.objective)
}

/// Route stats from an arbitrary depot node instead of the vehicle's own.
fn route_stats_from(
    model: &RoutingModel,
    vehicle: usize,
    depot: usize,
    customers: &[usize],
) -> crate::solver::model::RouteStats {
    let mut stats = crate::solver::model::RouteStats::default();
    let mut current = depot;
    for &customer in customers {
        let node = model.customer_node(customer);
        stats.load += model.demands[customer];
        stats.stops += 1;
        stats.distance_m += model.distance_between(current, node);
        stats.time_s += model.time_transit(vehicle, current, node);
        stats.cost += model.arc_cost(vehicle, current, node);
        current = node;
    }
    if !customers.is_empty() {
        stats.distance_m += model.distance_between(current, depot);
        stats.time_s += model.time_transit(vehicle, current, depot);
        stats.cost += model.arc_cost(vehicle, current, depot);
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::domain::types::{Customer, VehicleType};
    use crate::solver::model::test_support::model_from_config;

    fn customer(id: &str, coords: (f64, f64), volume: f64) -> Customer {
        Customer {
            id: id.into(),
            name: id.into(),
            coords,
            volume,
            distance_from_depot_m: None,
        }
    }

    fn model() -> RoutingModel {
        let mut config = CoreConfig::default();
        config.locations.depot_location = (42.6957, 23.2316);
        config.locations.center_location = (42.6973, 23.3238);
        model_from_config(
            &config,
            vec![
                customer("a", (42.71, 23.25), 10.0),
                customer("b", (42.72, 23.26), 20.0),
                customer("c", (42.70, 23.35), 30.0),
            ],
        )
    }

    fn route_over(model: &RoutingModel, vehicle: usize, customers: &[usize]) -> Route {
        let instance = &model.vehicles[vehicle];
        let stats = model.route_stats(vehicle, customers);
        Route {
            vehicle_type: instance.vehicle_type,
            vehicle_id: vehicle,
            customers: customers.iter().map(|&c| model.customers[c].clone()).collect(),
            depot_location: model.registry.location(instance.depot),
            total_distance_km: stats.distance_m as f64 / 1000.0,
            total_time_minutes: stats.time_s as f64 / 60.0,
            total_volume: customers.iter().map(|&c| model.customers[c].volume).sum(),
            is_feasible: true,
        }
    }

    #[test]
    fn routes_are_rehomed_to_the_main_depot() {
        let model = model();
        let center_bus = model
            .vehicles
            .iter()
            .position(|v| v.vehicle_type == VehicleType::CenterBus)
            .unwrap();
        // The center bus starts from the center depot (index 0).
        assert_ne!(model.vehicles[center_bus].depot, model.registry.main_depot_index());

        let solution =
            Solution::from_routes(vec![route_over(&model, center_bus, &[2, 0])], vec![], 0);
        let processed = reconfigure_from_main_depot(&model, solution);

        let main_location = model.registry.location(model.registry.main_depot_index());
        assert_eq!(processed.routes[0].depot_location, main_location);
    }

    #[test]
    fn customer_set_is_preserved() {
        let model = model();
        let solution = Solution::from_routes(
            vec![route_over(&model, 0, &[2, 0, 1])],
            vec![customer("x", (42.6, 23.2), 5.0)],
            0,
        );
        let processed = reconfigure_from_main_depot(&model, solution);

        let mut ids: Vec<&str> = processed.routes[0]
            .customers
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(processed.dropped_customers.len(), 1);
    }

    #[test]
    fn resequencing_is_greedy_nearest_neighbour() {
        let model = model();
        // Feed the route in a deliberately bad order.
        let solution = Solution::from_routes(vec![route_over(&model, 0, &[2, 1, 0])], vec![], 0);
        let processed = reconfigure_from_main_depot(&model, solution);

        let depot = model.registry.main_depot_index();
        let first = &processed.routes[0].customers[0];
        let first_index = model.customers.iter().position(|c| c.id == first.id).unwrap();
        // The first stop must be the nearest customer to the main depot.
        for c in 0..model.num_customers() {
            assert!(
                model.distance_between(depot, model.customer_node(first_index))
                    <= model.distance_between(depot, model.customer_node(c))
            );
        }
    }

    #[test]
    fn totals_are_recomputed_with_service_time() {
        let model = model();
        let solution = Solution::from_routes(vec![route_over(&model, 0, &[0, 1])], vec![], 0);
        let processed = reconfigure_from_main_depot(&model, solution);

        let route = &processed.routes[0];
        // Two customers, service time charged once each.
        let service_minutes = 2.0 * model.vehicles[0].service_time_s as f64 / 60.0;
        assert!(route.total_time_minutes > service_minutes);
        assert!(route.total_distance_km > 0.0);
    }

    #[test]
    fn violated_limits_mark_route_infeasible_but_keep_it() {
        let mut config = CoreConfig::default();
        config.locations.depot_location = (42.6957, 23.2316);
        // A max distance no real tour can respect.
        for vehicle in &mut config.vehicles {
            vehicle.max_distance_km = Some(1);
        }
        let model = model_from_config(
            &config,
            vec![
                customer("a", (42.71, 23.25), 10.0),
                customer("b", (42.80, 23.40), 20.0),
            ],
        );

        let solution = Solution::from_routes(vec![route_over(&model, 0, &[0, 1])], vec![], 0);
        let processed = reconfigure_from_main_depot(&model, solution);
        assert_eq!(processed.routes.len(), 1);
        assert!(!processed.routes[0].is_feasible);
        assert!(!processed.is_feasible);
    }
}
