use crate::solver::model::{RouteStats, RoutingModel};

/// One vehicle's in-progress route with cached dimension totals.
#[derive(Debug, Clone)]
pub struct RouteInfo {
    pub customers: Vec<usize>,
    pub stats: RouteStats,
}

/// Working solution during construction and local search: one (possibly
/// empty) route per vehicle instance plus the currently dropped customers.
#[derive(Debug, Clone)]
pub struct SearchState {
    pub routes: Vec<RouteInfo>,
    pub unassigned: Vec<usize>,
}

impl SearchState {
    /// All customers start unassigned.
    pub fn empty(model: &RoutingModel) -> SearchState {
        SearchState {
            routes: (0..model.vehicles.len())
                .map(|_| RouteInfo {
                    customers: vec![],
                    stats: RouteStats::default(),
                })
                .collect(),
            unassigned: (0..model.num_customers()).collect(),
        }
    }

    /// The objective the solver minimizes: effective arc costs plus the
    /// drop penalty for every unassigned customer.
    pub fn objective(&self, model: &RoutingModel) -> i64 {
        self.travel_cost() + model.drop_penalty * self.unassigned.len() as i64
    }

    pub fn travel_cost(&self) -> i64 {
        self.routes.iter().map(|r| r.stats.cost).sum()
    }

    pub fn served_demand(&self) -> i64 {
        self.routes.iter().map(|r| r.stats.load).sum()
    }

    /// Recompute a route's cached stats from scratch.
    pub fn refresh_route(&mut self, model: &RoutingModel, vehicle: usize) {
        self.routes[vehicle].stats = model.route_stats(vehicle, &self.routes[vehicle].customers);
    }

    pub fn insert(&mut self, model: &RoutingModel, vehicle: usize, position: usize, customer: usize) {
        self.routes[vehicle].customers.insert(position, customer);
        self.unassigned.retain(|&c| c != customer);
        self.refresh_route(model, vehicle);
    }

    pub fn remove(&mut self, model: &RoutingModel, vehicle: usize, position: usize) -> usize {
        let customer = self.routes[vehicle].customers.remove(position);
        self.refresh_route(model, vehicle);
        customer
    }
}

/// Stats the route would have after inserting `customer` at `position`,
/// computed in O(1) from the cached stats.
pub fn insertion_stats(
    model: &RoutingModel,
    vehicle: usize,
    route: &RouteInfo,
    position: usize,
    customer: usize,
) -> RouteStats {
    let depot = model.vehicles[vehicle].depot;
    let node = model.customer_node(customer);
    let prev = if position == 0 {
        depot
    } else {
        model.customer_node(route.customers[position - 1])
    };
    let next = if position == route.customers.len() {
        depot
    } else {
        model.customer_node(route.customers[position])
    };

    RouteStats {
        load: route.stats.load + model.demands[customer],
        stops: route.stats.stops + 1,
        distance_m: route.stats.distance_m + model.distance_between(prev, node)
            + model.distance_between(node, next)
            - model.distance_between(prev, next),
        time_s: route.stats.time_s + model.time_transit(vehicle, prev, node)
            + model.time_transit(vehicle, node, next)
            - model.time_transit(vehicle, prev, next),
        cost: route.stats.cost + model.arc_cost(vehicle, prev, node)
            + model.arc_cost(vehicle, node, next)
            - model.arc_cost(vehicle, prev, next),
    }
}

/// Stats the route would have after removing the customer at `position`.
pub fn removal_stats(
    model: &RoutingModel,
    vehicle: usize,
    route: &RouteInfo,
    position: usize,
) -> RouteStats {
    let depot = model.vehicles[vehicle].depot;
    let customer = route.customers[position];
    let node = model.customer_node(customer);
    let prev = if position == 0 {
        depot
    } else {
        model.customer_node(route.customers[position - 1])
    };
    let next = if position + 1 == route.customers.len() {
        depot
    } else {
        model.customer_node(route.customers[position + 1])
    };

    RouteStats {
        load: route.stats.load - model.demands[customer],
        stops: route.stats.stops - 1,
        distance_m: route.stats.distance_m - model.distance_between(prev, node)
            - model.distance_between(node, next)
            + model.distance_between(prev, next),
        time_s: route.stats.time_s - model.time_transit(vehicle, prev, node)
            - model.time_transit(vehicle, node, next)
            + model.time_transit(vehicle, prev, next),
        cost: route.stats.cost - model.arc_cost(vehicle, prev, node)
            - model.arc_cost(vehicle, node, next)
            + model.arc_cost(vehicle, prev, next),
    }
}

/// Stats the route would have after substituting `new_customer` for the
/// customer currently at `position`.
pub fn replacement_stats(
    model: &RoutingModel,
    vehicle: usize,
    route: &RouteInfo,
    position: usize,
    new_customer: usize,
) -> RouteStats {
    let depot = model.vehicles[vehicle].depot;
    let old = route.customers[position];
    let old_node = model.customer_node(old);
    let new_node = model.customer_node(new_customer);
    let prev = if position == 0 {
        depot
    } else {
        model.customer_node(route.customers[position - 1])
    };
    let next = if position + 1 == route.customers.len() {
        depot
    } else {
        model.customer_node(route.customers[position + 1])
    };

    RouteStats {
        load: route.stats.load - model.demands[old] + model.demands[new_customer],
        stops: route.stats.stops,
        distance_m: route.stats.distance_m - model.distance_between(prev, old_node)
            - model.distance_between(old_node, next)
            + model.distance_between(prev, new_node)
            + model.distance_between(new_node, next),
        time_s: route.stats.time_s - model.time_transit(vehicle, prev, old_node)
            - model.time_transit(vehicle, old_node, next)
            + model.time_transit(vehicle, prev, new_node)
            + model.time_transit(vehicle, new_node, next),
        cost: route.stats.cost - model.arc_cost(vehicle, prev, old_node)
            - model.arc_cost(vehicle, old_node, next)
            + model.arc_cost(vehicle, prev, new_node)
            + model.arc_cost(vehicle, new_node, next),
    }
}

/// Best feasible insertion position for a customer on one vehicle, by
/// effective cost increase.
pub fn best_insertion(
    model: &RoutingModel,
    vehicle: usize,
    route: &RouteInfo,
    customer: usize,
) -> Option<(usize, RouteStats)> {
    let mut best: Option<(usize, RouteStats)> = None;
    for position in 0..=route.customers.len() {
        let stats = insertion_stats(model, vehicle, route, position, customer);
        if !model.within_limits(vehicle, &stats) {
            continue;
        }
        let better = match &best {
            None => true,
            Some((_, current)) => stats.cost < current.cost,
        };
        if better {
            best = Some((position, stats));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::domain::types::Customer;
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

    fn three_customer_model() -> crate::solver::model::RoutingModel {
        let mut config = CoreConfig::default();
        config.locations.depot_location = (42.6957, 23.2316);
        config.locations.center_location = (42.6973, 23.3238);
        model_from_config(
            &config,
            vec![
                customer("a", (42.71, 23.25), 10.0),
                customer("b", (42.72, 23.26), 20.0),
                customer("c", (42.70, 23.27), 30.0),
            ],
        )
    }

    #[test]
    fn empty_state_drops_everyone() {
        let model = three_customer_model();
        let state = SearchState::empty(&model);
        assert_eq!(state.unassigned.len(), 3);
        assert_eq!(state.objective(&model), 3 * model.drop_penalty);
    }

    #[test]
    fn insertion_stats_match_full_recompute() {
        let model = three_customer_model();
        let mut state = SearchState::empty(&model);
        state.insert(&model, 0, 0, 0);
        state.insert(&model, 0, 1, 1);

        for position in 0..=2 {
            let fast = insertion_stats(&model, 0, &state.routes[0], position, 2);
            let mut customers = state.routes[0].customers.clone();
            customers.insert(position, 2);
            let slow = model.route_stats(0, &customers);
            assert_eq!(fast, slow, "position {position}");
        }
    }

    #[test]
    fn insert_then_remove_restores_stats() {
        let model = three_customer_model();
        let mut state = SearchState::empty(&model);
        state.insert(&model, 0, 0, 1);
        let before = state.routes[0].stats;
        state.insert(&model, 0, 1, 2);
        let removed = state.remove(&model, 0, 1);
        assert_eq!(removed, 2);
        assert_eq!(state.routes[0].stats, before);
    }

    #[test]
    fn removal_stats_match_full_recompute() {
        let model = three_customer_model();
        let mut state = SearchState::empty(&model);
        state.insert(&model, 0, 0, 0);
        state.insert(&model, 0, 1, 1);
        state.insert(&model, 0, 2, 2);

        for position in 0..3 {
            let fast = removal_stats(&model, 0, &state.routes[0], position);
            let mut customers = state.routes[0].customers.clone();
            customers.remove(position);
            let slow = model.route_stats(0, &customers);
            assert_eq!(fast, slow, "position {position}");
        }
    }

    #[test]
    fn replacement_stats_match_full_recompute() {
        let model = three_customer_model();
        let mut state = SearchState::empty(&model);
        state.insert(&model, 0, 0, 0);
        state.insert(&model, 0, 1, 1);

        for position in 0..2 {
            let fast = replacement_stats(&model, 0, &state.routes[0], position, 2);
            let mut customers = state.routes[0].customers.clone();
            customers[position] = 2;
            let slow = model.route_stats(0, &customers);
            assert_eq!(fast, slow, "position {position}");
        }
    }

    #[test]
    fn best_insertion_respects_capacity() {
        let model = three_customer_model();
        let state = SearchState::empty(&model);
        // Vehicle 0 is an internal bus, capacity 360.00; all fit.
        assert!(best_insertion(&model, 0, &state.routes[0], 0).is_some());
    }
}
