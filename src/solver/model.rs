use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{CvrpConfig, LocationConfig};
use crate::distance::matrix::DistanceMatrix;
use crate::distance::registry::LocationRegistry;
use crate::domain::types::{haversine_km, Customer, VehicleConfig, VehicleType};
use crate::error::SolveError;

/// Distance cap used when a vehicle has no configured limit.
pub const UNLIMITED_DISTANCE_M: i64 = 999_999_999;

/// One concrete vehicle expanded from a type config.
#[derive(Debug, Clone)]
pub struct VehicleInstance {
    pub vehicle_type: VehicleType,
    /// Index into the per-type cost tables.
    pub cost_class: usize,
    /// Capacity in hundredths of a volume unit.
    pub capacity_hundredths: i64,
    pub max_distance_m: i64,
    pub max_stops: usize,
    pub max_time_s: i64,
    pub service_time_s: i64,
    /// Registry index of the start/end depot.
    pub depot: usize,
}

/// Accumulated hard-dimension values along one route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteStats {
    pub load: i64,
    pub distance_m: i64,
    pub time_s: i64,
    pub stops: usize,
    pub cost: i64,
}

/// The routing model: expanded fleet, per-node demands, hard limits and
/// per-type effective arc costs, all bound once at build time.
///
/// Node space: [0..num_depots) are registry depots, [num_depots..) are the
/// solver-set customers in order.
pub struct RoutingModel {
    pub registry: LocationRegistry,
    pub matrix: Arc<DistanceMatrix>,
    pub customers: Vec<Customer>,
    pub vehicles: Vec<VehicleInstance>,
    /// Demand in hundredths per customer (not per node).
    pub demands: Vec<i64>,
    pub drop_penalty: i64,
    num_depots: usize,
    /// [cost_class][from_node][to_node] effective arc costs.
    cost_tables: Vec<Vec<Vec<i64>>>,
    /// Per-customer center-zone membership.
    in_center_zone: Vec<bool>,
}

impl RoutingModel {
    pub fn build(
        solver_set: Vec<Customer>,
        vehicle_configs: &[VehicleConfig],
        registry: LocationRegistry,
        matrix: Arc<DistanceMatrix>,
        locations: &LocationConfig,
        cvrp: &CvrpConfig,
    ) -> Result<RoutingModel, SolveError> {
        if solver_set.is_empty() {
            return Err(SolveError::InvalidInput("empty solver customer set".into()));
        }
        if matrix.len() != registry.len() {
            return Err(SolveError::CacheCorruption(format!(
                "matrix side {} does not match registry size {}",
                matrix.len(),
                registry.len()
            )));
        }

        let enabled: Vec<&VehicleConfig> =
            vehicle_configs.iter().filter(|v| v.enabled).collect();
        if enabled.is_empty() {
            return Err(SolveError::InvalidInput("no enabled vehicles".into()));
        }

        let num_depots = registry.num_depots();
        let num_customers = solver_set.len();

        // One cost class per distinct vehicle type present in the fleet.
        let mut classes: Vec<VehicleType> = Vec::new();
        for config in &enabled {
            if !classes.contains(&config.vehicle_type) {
                classes.push(config.vehicle_type);
            }
        }

        let mut vehicles = Vec::new();
        for config in &enabled {
            let depot = registry.depot_index_for(config);
            let cost_class = classes
                .iter()
                .position(|&t| t == config.vehicle_type)
                .unwrap_or(0);
            for _ in 0..config.count {
                vehicles.push(VehicleInstance {
                    vehicle_type: config.vehicle_type,
                    cost_class,
                    capacity_hundredths: config.capacity * 100,
                    max_distance_m: config
                        .max_distance_km
                        .map(|km| km * 1000)
                        .unwrap_or(UNLIMITED_DISTANCE_M),
                    max_stops: config.max_customers_per_route.unwrap_or(num_customers + 1),
                    max_time_s: config.max_time_hours * 3600,
                    service_time_s: config.service_time_minutes * 60,
                    depot,
                });
            }
            debug!(
                vehicle_type = config.vehicle_type.label(),
                count = config.count,
                depot,
                "Expanded vehicle type"
            );
        }

        let demands: Vec<i64> = solver_set.iter().map(|c| c.demand()).collect();

        let in_center_zone: Vec<bool> = solver_set
            .iter()
            .map(|c| {
                locations.enable_center_zone_restrictions
                    && haversine_km(c.coords, locations.center_location)
                        <= locations.center_zone_radius_km
            })
            .collect();

        let mut model = RoutingModel {
            registry,
            matrix,
            customers: solver_set,
            vehicles,
            demands,
            drop_penalty: cvrp.distance_penalty_disjunction,
            num_depots,
            cost_tables: vec![],
            in_center_zone,
        };

        let cost_tables: Vec<Vec<Vec<i64>>> = classes
            .iter()
            .map(|&vehicle_type| model.build_cost_table(vehicle_type, locations, cvrp))
            .collect();
        model.cost_tables = cost_tables;

        info!(
            customers = model.customers.len(),
            vehicles = model.vehicles.len(),
            depots = num_depots,
            cost_classes = classes.len(),
            in_center = model.in_center_zone.iter().filter(|&&b| b).count(),
            "Routing model built"
        );

        Ok(model)
    }

    /// Total node count: depots plus customers.
    pub fn num_nodes(&self) -> usize {
        self.num_depots + self.customers.len()
    }

    pub fn num_depots(&self) -> usize {
        self.num_depots
    }

    pub fn num_customers(&self) -> usize {
        self.customers.len()
    }

    /// Model node for the i-th solver customer.
    pub fn customer_node(&self, customer: usize) -> usize {
        self.num_depots + customer
    }

    pub fn is_customer_node(&self, node: usize) -> bool {
        node >= self.num_depots
    }

    pub fn customer_in_center_zone(&self, customer: usize) -> bool {
        self.in_center_zone[customer]
    }

    fn location_of(&self, node: usize) -> usize {
        if node < self.num_depots {
            node
        } else {
            self.registry.customer_location_index(node - self.num_depots)
        }
    }

    /// Raw travel distance between two model nodes, meters.
    pub fn distance_between(&self, from: usize, to: usize) -> i64 {
        self.matrix
            .distance(self.location_of(from), self.location_of(to))
    }

    /// Raw travel duration between two model nodes, seconds.
    pub fn duration_between(&self, from: usize, to: usize) -> i64 {
        self.matrix
            .duration(self.location_of(from), self.location_of(to))
    }

    /// Time-dimension transit for a vehicle: travel plus the service time of
    /// the departed node (zero when departing a depot).
    pub fn time_transit(&self, vehicle: usize, from: usize, to: usize) -> i64 {
        let service = if self.is_customer_node(from) {
            self.vehicles[vehicle].service_time_s
        } else {
            0
        };
        self.duration_between(from, to) + service
    }

    /// Effective arc cost for a vehicle, with its type's modifiers applied.
    pub fn arc_cost(&self, vehicle: usize, from: usize, to: usize) -> i64 {
        self.cost_tables[self.vehicles[vehicle].cost_class][from][to]
    }

    fn build_cost_table(
        &self,
        vehicle_type: VehicleType,
        locations: &LocationConfig,
        cvrp: &CvrpConfig,
    ) -> Vec<Vec<i64>> {
        let n = self.num_nodes();
        let mut table = vec![vec![0i64; n]; n];
        for (from, row) in table.iter_mut().enumerate() {
            for (to, cell) in row.iter_mut().enumerate() {
                *cell = effective_arc_cost(
                    from,
                    to,
                    vehicle_type,
                    self,
                    locations,
                    cvrp,
                );
            }
        }
        table
    }

    /// Walk depot -> customers -> depot accumulating every hard dimension
    /// and the vehicle's effective cost.
    pub fn route_stats(&self, vehicle: usize, customers: &[usize]) -> RouteStats {
        let depot = self.vehicles[vehicle].depot;
        let mut stats = RouteStats::default();
        let mut current = depot;

        for &customer in customers {
            let node = self.customer_node(customer);
            stats.load += self.demands[customer];
            stats.stops += 1;
            stats.distance_m += self.distance_between(current, node);
            stats.time_s += self.time_transit(vehicle, current, node);
            stats.cost += self.arc_cost(vehicle, current, node);
            current = node;
        }

        if !customers.is_empty() {
            stats.distance_m += self.distance_between(current, depot);
            stats.time_s += self.time_transit(vehicle, current, depot);
            stats.cost += self.arc_cost(vehicle, current, depot);
        }

        stats
    }

    /// Whether accumulated dimensions fit within a vehicle's hard limits.
    pub fn within_limits(&self, vehicle: usize, stats: &RouteStats) -> bool {
        let v = &self.vehicles[vehicle];
        stats.load <= v.capacity_hundredths
            && stats.distance_m <= v.max_distance_m
            && stats.stops <= v.max_stops
            && stats.time_s <= v.max_time_s
    }

    /// Route for this vehicle and customer order, or None when any hard
    /// dimension is violated.
    pub fn feasible_stats(&self, vehicle: usize, customers: &[usize]) -> Option<RouteStats> {
        let stats = self.route_stats(vehicle, customers);
        self.within_limits(vehicle, &stats).then_some(stats)
    }
}

/// Pure per-arc cost: base distance with per-type center-zone multipliers
/// and the far-low-volume priority discount.
///
/// The center-zone multiplier takes precedence over the priority discount
/// when both would apply; center buses never receive the discount.
pub fn effective_arc_cost(
    from: usize,
    to: usize,
    vehicle_type: VehicleType,
    model: &RoutingModel,
    locations: &LocationConfig,
    cvrp: &CvrpConfig,
) -> i64 {
    let base = model.distance_between(from, to);
    if !model.is_customer_node(to) {
        return base;
    }
    let customer_index = to - model.num_depots();

    if locations.enable_center_zone_restrictions && model.customer_in_center_zone(customer_index) {
        let multiplier = match vehicle_type {
            VehicleType::CenterBus => 0.5,
            VehicleType::InternalBus => locations.internal_bus_center_penalty_multiplier,
            VehicleType::SpecialBus => locations.special_bus_center_penalty_multiplier,
            VehicleType::ExternalBus => locations.external_bus_center_penalty_multiplier,
        };
        return (base as f64 * multiplier).round() as i64;
    }

    if vehicle_type == VehicleType::CenterBus {
        return base;
    }

    let customer = &model.customers[customer_index];
    let distance_from_depot_m = customer.distance_from_depot_m.unwrap_or_else(|| {
        model
            .matrix
            .distance(
                model.registry.main_depot_index(),
                model.registry.customer_location_index(customer_index),
            ) as f64
    });

    let distance_factor = distance_from_depot_m / cvrp.distance_normalization_factor;
    let volume_factor = ((cvrp.volume_normalization_factor - customer.volume)
        / cvrp.volume_normalization_factor)
        .max(0.0);
    let combined =
        distance_factor * cvrp.distance_weight + volume_factor * cvrp.volume_weight;
    let discount = (combined / cvrp.discount_factor_divisor).min(cvrp.max_discount_percentage);

    (base as f64 * (1.0 - discount)).round() as i64
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::config::CoreConfig;

    const DEPOT: (f64, f64) = (42.6957, 23.2316);
    const CENTER: (f64, f64) = (42.6973, 23.3238);

    fn customer(id: &str, coords: (f64, f64), volume: f64) -> Customer {
        Customer {
            id: id.into(),
            name: id.into(),
            coords,
            volume,
            distance_from_depot_m: None,
        }
    }

    fn base_config() -> CoreConfig {
        let mut config = CoreConfig::default();
        config.locations.depot_location = DEPOT;
        config.locations.center_location = CENTER;
        config
    }

    #[test]
    fn fleet_expansion_counts_instances() {
        let config = base_config();
        let model = model_from_config(&config, vec![customer("a", (42.71, 23.33), 10.0)]);
        let enabled: usize = config
            .vehicles
            .iter()
            .filter(|v| v.enabled)
            .map(|v| v.count)
            .sum();
        assert_eq!(model.vehicles.len(), enabled);
        // Center bus starts from the center depot, which holds index 0.
        let center_bus = model
            .vehicles
            .iter()
            .find(|v| v.vehicle_type == VehicleType::CenterBus)
            .unwrap();
        assert_eq!(center_bus.depot, 0);
        assert_eq!(model.registry.main_depot_index(), 1);
    }

    #[test]
    fn demands_are_scaled_to_hundredths() {
        let config = base_config();
        let model = model_from_config(&config, vec![customer("a", (42.71, 23.33), 12.5)]);
        assert_eq!(model.demands, vec![1250]);
        let internal = model
            .vehicles
            .iter()
            .find(|v| v.vehicle_type == VehicleType::InternalBus)
            .unwrap();
        assert_eq!(internal.capacity_hundredths, 36_000);
    }

    #[test]
    fn center_zone_multipliers_by_type() {
        let config = base_config();
        // ~0.5 km from the center, well inside the 2 km radius.
        let in_center = customer("c", (42.7018, 23.3238), 10.0);
        let model = model_from_config(&config, vec![in_center]);
        assert!(model.customer_in_center_zone(0));

        let node = model.customer_node(0);
        let from = model.registry.main_depot_index();
        let base = model.distance_between(from, node);

        let cost_of = |vehicle_type: VehicleType| {
            let v = model
                .vehicles
                .iter()
                .position(|v| v.vehicle_type == vehicle_type)
                .unwrap();
            model.arc_cost(v, from, node)
        };

        assert_eq!(cost_of(VehicleType::CenterBus), (base as f64 * 0.5).round() as i64);
        assert_eq!(
            cost_of(VehicleType::InternalBus),
            (base as f64 * 2.0).round() as i64
        );
        assert_eq!(
            cost_of(VehicleType::ExternalBus),
            (base as f64 * 10.0).round() as i64
        );
    }

    #[test]
    fn far_low_volume_discount_formula() {
        let mut config = base_config();
        config.locations.enable_center_zone_restrictions = false;
        // ~11 km east of the depot, far outside the center.
        let far = Customer {
            distance_from_depot_m: Some(12_000.0),
            ..customer("far", (42.70, 23.37), 5.0)
        };
        let model = model_from_config(&config, vec![far]);

        let node = model.customer_node(0);
        let from = model.registry.main_depot_index();
        let base = model.distance_between(from, node);

        // df = 12000/10000 = 1.2, vf = (50-5)/50 = 0.9
        // combined = 1.2*0.5 + 0.9*0.5 = 1.05, discount = min(0.5, 0.525) = 0.5
        let internal = model
            .vehicles
            .iter()
            .position(|v| v.vehicle_type == VehicleType::InternalBus)
            .unwrap();
        assert_eq!(
            model.arc_cost(internal, from, node),
            (base as f64 * 0.5).round() as i64
        );

        // Center buses never receive the priority discount.
        let center = model
            .vehicles
            .iter()
            .position(|v| v.vehicle_type == VehicleType::CenterBus)
            .unwrap();
        assert_eq!(model.arc_cost(center, from, node), base);
    }

    #[test]
    fn center_penalty_takes_precedence_over_discount() {
        let config = base_config();
        // In the center zone but also "far low volume" on paper.
        let tricky = Customer {
            distance_from_depot_m: Some(20_000.0),
            ..customer("t", (42.7018, 23.3238), 1.0)
        };
        let model = model_from_config(&config, vec![tricky]);
        let node = model.customer_node(0);
        let from = model.registry.main_depot_index();
        let base = model.distance_between(from, node);

        let external = model
            .vehicles
            .iter()
            .position(|v| v.vehicle_type == VehicleType::ExternalBus)
            .unwrap();
        // Penalized x10, not discounted.
        assert_eq!(
            model.arc_cost(external, from, node),
            (base as f64 * 10.0).round() as i64
        );
    }

    #[test]
    fn arcs_into_depots_keep_base_distance() {
        let config = base_config();
        let model = model_from_config(&config, vec![customer("a", (42.71, 23.33), 10.0)]);
        let node = model.customer_node(0);
        let depot = model.registry.main_depot_index();
        for v in 0..model.vehicles.len() {
            assert_eq!(model.arc_cost(v, node, depot), model.distance_between(node, depot));
        }
    }

    #[test]
    fn route_stats_accumulate_all_dimensions() {
        let config = base_config();
        let model = model_from_config(
            &config,
            vec![
                customer("a", (42.71, 23.25), 10.0),
                customer("b", (42.72, 23.26), 20.0),
            ],
        );
        let internal = model
            .vehicles
            .iter()
            .position(|v| v.vehicle_type == VehicleType::InternalBus)
            .unwrap();
        let stats = model.route_stats(internal, &[0, 1]);

        assert_eq!(stats.load, 3000);
        assert_eq!(stats.stops, 2);

        let depot_node = model.vehicles[internal].depot;
        let a = model.customer_node(0);
        let b = model.customer_node(1);
        let expected_distance = model.distance_between(depot_node, a)
            + model.distance_between(a, b)
            + model.distance_between(b, depot_node);
        assert_eq!(stats.distance_m, expected_distance);

        // Service time charged once per customer, on departure.
        let expected_time = model.duration_between(depot_node, a)
            + model.duration_between(a, b)
            + model.duration_between(b, depot_node)
            + 2 * model.vehicles[internal].service_time_s;
        assert_eq!(stats.time_s, expected_time);
    }

    #[test]
    fn empty_route_has_zero_stats() {
        let config = base_config();
        let model = model_from_config(&config, vec![customer("a", (42.71, 23.33), 10.0)]);
        let stats = model.route_stats(0, &[]);
        assert_eq!(stats, RouteStats::default());
        assert!(model.within_limits(0, &stats));
    }

    #[test]
    fn limits_are_enforced() {
        let config = base_config();
        let model = model_from_config(&config, vec![customer("a", (42.71, 23.33), 10.0)]);
        let v = &model.vehicles[0];
        let over_capacity = RouteStats {
            load: v.capacity_hundredths + 1,
            ..RouteStats::default()
        };
        assert!(!model.within_limits(0, &over_capacity));

        let over_time = RouteStats {
            time_s: v.max_time_s + 1,
            ..RouteStats::default()
        };
        assert!(!model.within_limits(0, &over_time));
    }
}
