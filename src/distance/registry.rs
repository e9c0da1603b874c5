use tracing::{debug, warn};

use crate::domain::types::{Customer, VehicleConfig};

/// Coordinate equality tolerance, degrees on each axis.
pub const COORD_EPSILON: f64 = 1e-4;

fn same_point(a: (f64, f64), b: (f64, f64)) -> bool {
    (a.0 - b.0).abs() <= COORD_EPSILON && (a.1 - b.1).abs() <= COORD_EPSILON
}

/// Canonical ordering of unique depot and customer coordinates into the
/// indices used by the distance matrix and the routing model.
///
/// Depots occupy [0..num_depots): the center depot first when present and
/// distinct from the main depot, then the main depot, then any remaining
/// override depots ascending by (lat, lon). Customer locations follow in
/// ingest order, deduplicated against everything already registered.
#[derive(Debug, Clone)]
pub struct LocationRegistry {
    locations: Vec<(f64, f64)>,
    num_depots: usize,
    main_depot_index: usize,
    /// Location index for each input customer (duplicates share an index).
    customer_nodes: Vec<usize>,
}

impl LocationRegistry {
    pub fn build(
        depot_location: (f64, f64),
        center_location: Option<(f64, f64)>,
        vehicle_configs: &[VehicleConfig],
        customers: &[Customer],
    ) -> LocationRegistry {
        // Gather the unique depot set: the main depot plus override starts.
        let mut depots: Vec<(f64, f64)> = vec![depot_location];
        for config in vehicle_configs.iter().filter(|v| v.enabled) {
            if let Some(start) = config.start_location {
                if !depots.iter().any(|&d| same_point(d, start)) {
                    depots.push(start);
                }
            }
        }

        let center = center_location
            .filter(|&c| !same_point(c, depot_location))
            .filter(|&c| depots.iter().any(|&d| same_point(d, c)));

        let mut rest: Vec<(f64, f64)> = depots
            .iter()
            .copied()
            .filter(|&d| !same_point(d, depot_location))
            .filter(|&d| center.map_or(true, |c| !same_point(d, c)))
            .collect();
        rest.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mut locations: Vec<(f64, f64)> = Vec::with_capacity(depots.len() + customers.len());
        if let Some(c) = center {
            locations.push(c);
        }
        locations.push(depot_location);
        locations.extend(rest);

        let num_depots = locations.len();
        let main_depot_index = if center.is_some() { 1 } else { 0 };

        let mut customer_nodes = Vec::with_capacity(customers.len());
        for customer in customers {
            let existing = locations
                .iter()
                .position(|&loc| same_point(loc, customer.coords));
            match existing {
                Some(index) => {
                    debug!(
                        customer = %customer.id,
                        index,
                        "Customer coordinates already registered, reusing index"
                    );
                    customer_nodes.push(index);
                }
                None => {
                    locations.push(customer.coords);
                    customer_nodes.push(locations.len() - 1);
                }
            }
        }

        debug!(
            depots = num_depots,
            locations = locations.len(),
            customers = customers.len(),
            "Location registry built"
        );

        LocationRegistry {
            locations,
            num_depots,
            main_depot_index,
            customer_nodes,
        }
    }

    pub fn locations(&self) -> &[(f64, f64)] {
        &self.locations
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn num_depots(&self) -> usize {
        self.num_depots
    }

    pub fn num_customers(&self) -> usize {
        self.customer_nodes.len()
    }

    pub fn main_depot_index(&self) -> usize {
        self.main_depot_index
    }

    pub fn location(&self, index: usize) -> (f64, f64) {
        self.locations[index]
    }

    /// Matrix location index for the i-th input customer.
    pub fn customer_location_index(&self, customer: usize) -> usize {
        self.customer_nodes[customer]
    }

    /// Depot index a vehicle type starts and ends at.
    ///
    /// An override start location that never made it into the registry falls
    /// back to the main depot.
    pub fn depot_index_for(&self, config: &VehicleConfig) -> usize {
        match config.start_location {
            None => self.main_depot_index,
            Some(start) => {
                let found = self.locations[..self.num_depots]
                    .iter()
                    .position(|&d| same_point(d, start));
                match found {
                    Some(index) => index,
                    None => {
                        warn!(
                            vehicle_type = config.vehicle_type.label(),
                            "Override start location not in registry, using main depot"
                        );
                        self.main_depot_index
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::VehicleType;

    const DEPOT: (f64, f64) = (42.6957, 23.2316);
    const CENTER: (f64, f64) = (42.6973, 23.3238);

    fn customer(id: &str, coords: (f64, f64)) -> Customer {
        Customer {
            id: id.into(),
            name: id.into(),
            coords,
            volume: 1.0,
            distance_from_depot_m: None,
        }
    }

    fn vehicle(vehicle_type: VehicleType, start: Option<(f64, f64)>) -> VehicleConfig {
        VehicleConfig {
            vehicle_type,
            capacity: 360,
            count: 1,
            max_distance_km: None,
            max_time_hours: 8,
            service_time_minutes: 5,
            enabled: true,
            start_location: start,
            max_customers_per_route: None,
        }
    }

    #[test]
    fn main_depot_first_without_center() {
        let registry = LocationRegistry::build(
            DEPOT,
            None,
            &[vehicle(VehicleType::InternalBus, None)],
            &[customer("a", (42.71, 23.33))],
        );
        assert_eq!(registry.num_depots(), 1);
        assert_eq!(registry.main_depot_index(), 0);
        assert_eq!(registry.location(0), DEPOT);
        assert_eq!(registry.customer_location_index(0), 1);
    }

    #[test]
    fn center_depot_takes_index_zero() {
        let registry = LocationRegistry::build(
            DEPOT,
            Some(CENTER),
            &[
                vehicle(VehicleType::InternalBus, None),
                vehicle(VehicleType::CenterBus, Some(CENTER)),
            ],
            &[],
        );
        assert_eq!(registry.num_depots(), 2);
        assert_eq!(registry.location(0), CENTER);
        assert_eq!(registry.main_depot_index(), 1);
        assert_eq!(registry.location(1), DEPOT);
    }

    #[test]
    fn depot_order_is_canonical_under_insertion_order() {
        let d1 = (42.70, 23.40);
        let d2 = (42.60, 23.10);
        let a = LocationRegistry::build(
            DEPOT,
            None,
            &[
                vehicle(VehicleType::ExternalBus, Some(d1)),
                vehicle(VehicleType::SpecialBus, Some(d2)),
            ],
            &[],
        );
        let b = LocationRegistry::build(
            DEPOT,
            None,
            &[
                vehicle(VehicleType::SpecialBus, Some(d2)),
                vehicle(VehicleType::ExternalBus, Some(d1)),
            ],
            &[],
        );
        assert_eq!(a.locations(), b.locations());
        // Remaining depots ascend by (lat, lon) after the main depot.
        assert_eq!(a.location(1), d2);
        assert_eq!(a.location(2), d1);
    }

    #[test]
    fn near_duplicate_customer_reuses_index() {
        let registry = LocationRegistry::build(
            DEPOT,
            None,
            &[vehicle(VehicleType::InternalBus, None)],
            &[
                customer("a", (42.71000, 23.33000)),
                customer("b", (42.71004, 23.33004)),
                customer("c", (42.72, 23.34)),
            ],
        );
        assert_eq!(registry.num_customers(), 3);
        assert_eq!(registry.len(), 3); // depot + two unique customer points
        assert_eq!(
            registry.customer_location_index(0),
            registry.customer_location_index(1)
        );
        assert_ne!(
            registry.customer_location_index(0),
            registry.customer_location_index(2)
        );
    }

    #[test]
    fn unknown_override_falls_back_to_main_depot() {
        let registry = LocationRegistry::build(
            DEPOT,
            None,
            &[vehicle(VehicleType::InternalBus, None)],
            &[],
        );
        let stray = vehicle(VehicleType::ExternalBus, Some((41.0, 22.0)));
        assert_eq!(registry.depot_index_for(&stray), registry.main_depot_index());
    }
}
