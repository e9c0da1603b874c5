use std::error::Error;
use std::path::Path;
use std::thread;

use serde::Deserialize;
use tracing::{info, warn};

use crate::domain::types::{VehicleConfig, VehicleType};

/// GPS anchors for the registry and the center-zone arc-cost modifiers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Main depot most vehicles start from.
    pub depot_location: (f64, f64),
    /// The "center" depot/anchor used by center buses and the center zone.
    pub center_location: (f64, f64),
    pub enable_center_zone_restrictions: bool,
    pub center_zone_radius_km: f64,
    pub internal_bus_center_penalty_multiplier: f64,
    pub external_bus_center_penalty_multiplier: f64,
    pub special_bus_center_penalty_multiplier: f64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        LocationConfig {
            depot_location: (42.695785029219415, 23.23165887245312),
            center_location: (42.69735652560932, 23.323809998750914),
            enable_center_zone_restrictions: true,
            center_zone_radius_km: 2.0,
            internal_bus_center_penalty_multiplier: 2.0,
            external_bus_center_penalty_multiplier: 10.0,
            special_bus_center_penalty_multiplier: 7.0,
        }
    }
}

/// Solver search, drop-penalty, far-low-volume discount, and racing options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CvrpConfig {
    pub time_limit_seconds: u64,
    pub first_solution_strategy: String,
    pub local_search_metaheuristic: String,
    pub log_search: bool,
    pub enable_final_depot_reconfiguration: bool,

    /// Finite per-customer penalty that lets the solver drop customers when
    /// no feasible completion exists.
    pub distance_penalty_disjunction: i64,

    // Far-low-volume priority discount (non-center-bus vehicles only).
    pub distance_normalization_factor: f64,
    pub volume_normalization_factor: f64,
    pub distance_weight: f64,
    pub volume_weight: f64,
    pub max_discount_percentage: f64,
    pub discount_factor_divisor: f64,

    // Parallel racing.
    pub enable_parallel_solving: bool,
    /// -1 means all cores minus one.
    pub num_workers: i64,
    pub parallel_first_solution_strategies: Vec<String>,
    pub parallel_local_search_metaheuristics: Vec<String>,
}

impl Default for CvrpConfig {
    fn default() -> Self {
        CvrpConfig {
            time_limit_seconds: 60,
            first_solution_strategy: "PATH_CHEAPEST_ARC".into(),
            local_search_metaheuristic: "GUIDED_LOCAL_SEARCH".into(),
            log_search: false,
            enable_final_depot_reconfiguration: true,
            distance_penalty_disjunction: 50_000_000,
            distance_normalization_factor: 10_000.0,
            volume_normalization_factor: 50.0,
            distance_weight: 0.5,
            volume_weight: 0.5,
            max_discount_percentage: 0.5,
            discount_factor_divisor: 2.0,
            enable_parallel_solving: true,
            num_workers: -1,
            parallel_first_solution_strategies: vec![
                "AUTOMATIC".into(),
                "PARALLEL_CHEAPEST_INSERTION".into(),
                "SAVINGS".into(),
                "PATH_CHEAPEST_ARC".into(),
                "GLOBAL_CHEAPEST_ARC".into(),
                "BEST_INSERTION".into(),
                "SWEEP".into(),
            ],
            parallel_local_search_metaheuristics: vec![
                "AUTOMATIC".into(),
                "GUIDED_LOCAL_SEARCH".into(),
                "TABU_SEARCH".into(),
                "SIMULATED_ANNEALING".into(),
            ],
        }
    }
}

impl CvrpConfig {
    /// Worker count with the -1 convention resolved to cores minus one.
    pub fn resolved_num_workers(&self) -> usize {
        if self.num_workers >= 1 {
            return self.num_workers as usize;
        }
        let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
        cores.saturating_sub(1).max(1)
    }
}

/// Routing-engine (OSRM table endpoint) acquisition options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatrixConfig {
    pub base_url: String,
    pub profile: String,
    /// Locations per table request; hard upper bound 100 for compatibility.
    pub chunk_size: usize,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub retry_delay_seconds: u64,
    pub fallback_to_public: bool,
    pub public_osrm_url: String,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        MatrixConfig {
            base_url: "http://localhost:5000".into(),
            profile: "driving".into(),
            chunk_size: 80,
            timeout_seconds: 45,
            retry_attempts: 3,
            retry_delay_seconds: 1,
            fallback_to_public: true,
            public_osrm_url: "https://router.project-osrm.org".into(),
        }
    }
}

/// Central matrix cache store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enable_cache: bool,
    pub database_url: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enable_cache: true,
            database_url: "sqlite:fleetroute_cache.sqlite".into(),
        }
    }
}

/// Pre-allocation between the solver fleet and the warehouse.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub enable_warehouse: bool,
    pub move_largest_to_warehouse: bool,
    /// Fraction of the largest single vehicle capacity above which a request
    /// is considered "large" and deferred to the warehouse.
    pub large_request_threshold: f64,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        WarehouseConfig {
            enable_warehouse: true,
            move_largest_to_warehouse: true,
            large_request_threshold: 0.3,
        }
    }
}

/// Column mapping for the tabular order source.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub csv_path: String,
    pub client_id_column: String,
    pub client_name_column: String,
    pub gps_column: String,
    pub volume_column: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        InputConfig {
            csv_path: "data/orders.csv".into(),
            client_id_column: "client_id".into(),
            client_name_column: "client_name".into(),
            gps_column: "gps".into(),
            volume_column: "volume".into(),
        }
    }
}

/// The explicit configuration value plumbed into every component.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub locations: LocationConfig,
    pub vehicles: Vec<VehicleConfig>,
    pub warehouse: WarehouseConfig,
    pub cvrp: CvrpConfig,
    pub matrix: MatrixConfig,
    pub cache: CacheConfig,
    pub input: InputConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        let locations = LocationConfig::default();
        let vehicles = default_vehicles(&locations);
        CoreConfig {
            locations,
            vehicles,
            warehouse: WarehouseConfig::default(),
            cvrp: CvrpConfig::default(),
            matrix: MatrixConfig::default(),
            cache: CacheConfig::default(),
            input: InputConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Load from a JSON file, falling back to defaults when the file is
    /// absent. Missing sections or fields keep their default values.
    pub fn load(path: &Path) -> Result<CoreConfig, Box<dyn Error>> {
        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Ok(CoreConfig::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: CoreConfig = serde_json::from_str(&raw)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn enabled_vehicles(&self) -> Vec<VehicleConfig> {
        self.vehicles.iter().filter(|v| v.enabled).cloned().collect()
    }

    /// Sum of capacity x count over enabled types, in whole volume units.
    pub fn total_fleet_capacity(&self) -> i64 {
        self.vehicles
            .iter()
            .filter(|v| v.enabled)
            .map(|v| v.capacity * v.count as i64)
            .sum()
    }

    pub fn max_single_capacity(&self) -> i64 {
        self.vehicles
            .iter()
            .filter(|v| v.enabled)
            .map(|v| v.capacity)
            .max()
            .unwrap_or_else(|| {
                warn!("No enabled vehicles when computing max single capacity");
                0
            })
    }
}

fn default_vehicles(locations: &LocationConfig) -> Vec<VehicleConfig> {
    vec![
        VehicleConfig {
            vehicle_type: VehicleType::InternalBus,
            capacity: 360,
            count: 4,
            max_distance_km: Some(80),
            max_time_hours: 8,
            service_time_minutes: 5,
            enabled: true,
            start_location: None,
            max_customers_per_route: Some(45),
        },
        VehicleConfig {
            vehicle_type: VehicleType::CenterBus,
            capacity: 250,
            count: 1,
            max_distance_km: Some(50),
            max_time_hours: 9,
            service_time_minutes: 8,
            enabled: true,
            start_location: Some(locations.center_location),
            max_customers_per_route: Some(45),
        },
        VehicleConfig {
            vehicle_type: VehicleType::ExternalBus,
            capacity: 360,
            count: 3,
            max_distance_km: Some(180),
            max_time_hours: 8,
            service_time_minutes: 5,
            enabled: true,
            start_location: None,
            max_customers_per_route: Some(40),
        },
        VehicleConfig {
            vehicle_type: VehicleType::SpecialBus,
            capacity: 250,
            count: 1,
            max_distance_km: Some(60),
            max_time_hours: 8,
            service_time_minutes: 10,
            enabled: false,
            start_location: None,
            max_customers_per_route: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_enabled_fleet() {
        let config = CoreConfig::default();
        assert!(!config.enabled_vehicles().is_empty());
        // 4x360 + 250 + 3x360 (special bus disabled by default)
        assert_eq!(config.total_fleet_capacity(), 4 * 360 + 250 + 3 * 360);
        assert_eq!(config.max_single_capacity(), 360);
    }

    #[test]
    fn partial_json_overlays_defaults() {
        let parsed: CoreConfig =
            serde_json::from_str(r#"{"warehouse": {"large_request_threshold": 0.5}}"#).unwrap();
        assert!((parsed.warehouse.large_request_threshold - 0.5).abs() < 1e-9);
        assert!(parsed.warehouse.enable_warehouse);
        assert_eq!(parsed.matrix.chunk_size, 80);
    }

    #[test]
    fn num_workers_resolution() {
        let mut cvrp = CvrpConfig::default();
        cvrp.num_workers = 3;
        assert_eq!(cvrp.resolved_num_workers(), 3);
        cvrp.num_workers = -1;
        assert!(cvrp.resolved_num_workers() >= 1);
    }
}
