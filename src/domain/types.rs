use serde::{Deserialize, Serialize};

/// A single delivery order as it enters the planning core.
///
/// Immutable after ingestion: the solver only ever reads these records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    /// (latitude, longitude)
    pub coords: (f64, f64),
    pub volume: f64,
    /// Road distance from the main depot in meters, when precomputed at
    /// ingestion. The model builder falls back to the matrix row otherwise.
    pub distance_from_depot_m: Option<f64>,
}

impl Customer {
    /// Solver demand in integer hundredths of a volume unit.
    pub fn demand(&self) -> i64 {
        (self.volume * 100.0).round() as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    InternalBus,
    CenterBus,
    ExternalBus,
    SpecialBus,
}

impl VehicleType {
    pub fn label(&self) -> &'static str {
        match self {
            VehicleType::InternalBus => "internal_bus",
            VehicleType::CenterBus => "center_bus",
            VehicleType::ExternalBus => "external_bus",
            VehicleType::SpecialBus => "special_bus",
        }
    }
}

/// Configuration for one type of vehicle in the fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleConfig {
    pub vehicle_type: VehicleType,
    /// Capacity in whole volume units; scaled to hundredths at model build.
    pub capacity: i64,
    /// Number of identical vehicles of this type.
    pub count: usize,
    /// None means no distance limit.
    pub max_distance_km: Option<i64>,
    pub max_time_hours: i64,
    pub service_time_minutes: i64,
    pub enabled: bool,
    /// Start/end depot for this type. None means the main depot.
    pub start_location: Option<(f64, f64)>,
    pub max_customers_per_route: Option<usize>,
}

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two (lat, lon) points in kilometers.
///
/// Used only for the center-zone membership test; real travel costs always
/// come from the routing engine matrix.
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demand_rounds_to_hundredths() {
        let c = Customer {
            id: "1".into(),
            name: "A".into(),
            coords: (42.7, 23.3),
            volume: 12.345,
            distance_from_depot_m: None,
        };
        assert_eq!(c.demand(), 1235);
    }

    #[test]
    fn haversine_zero_for_same_point() {
        let p = (42.6957, 23.2316);
        assert!(haversine_km(p, p) < 1e-9);
    }

    #[test]
    fn haversine_sofia_scale() {
        // Roughly 7.5 km across Sofia, west depot to center.
        let depot = (42.695785, 23.231658);
        let center = (42.697356, 23.323809);
        let d = haversine_km(depot, center);
        assert!(d > 7.0 && d < 8.0, "unexpected distance {d}");
    }
}
