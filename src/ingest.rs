use std::io::Read;

use csv::ReaderBuilder;
use tracing::{info, warn};

use crate::config::InputConfig;
use crate::domain::types::{haversine_km, Customer};
use crate::error::SolveError;

/// Parse a GPS field holding two floats separated by a comma or whitespace.
pub fn parse_gps(raw: &str) -> Option<(f64, f64)> {
    let parts: Vec<&str> = raw
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .collect();
    if parts.len() != 2 {
        return None;
    }
    let lat: f64 = parts[0].parse().ok()?;
    let lon: f64 = parts[1].parse().ok()?;
    if !lat.is_finite() || !lon.is_finite() {
        return None;
    }
    Some((lat, lon))
}

/// Read customer orders from a CSV file.
pub fn load_customers_csv(
    config: &InputConfig,
    depot_location: (f64, f64),
) -> Result<Vec<Customer>, SolveError> {
    let file = std::fs::File::open(&config.csv_path)
        .map_err(|e| SolveError::InvalidInput(format!("cannot open {}: {e}", config.csv_path)))?;
    let customers = read_customers(config, depot_location, file)?;
    info!(
        customers = customers.len(),
        path = %config.csv_path,
        "Loaded customer orders"
    );
    Ok(customers)
}

/// Parse customer rows from any CSV reader. Invalid rows are dropped with a
/// warning; the caller decides whether the remaining set is usable.
pub fn read_customers<R: Read>(
    config: &InputConfig,
    depot_location: (f64, f64),
    source: R,
) -> Result<Vec<Customer>, SolveError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers = reader
        .headers()
        .map_err(|e| SolveError::InvalidInput(format!("unreadable CSV header: {e}")))?
        .clone();
    let column = |name: &str| headers.iter().position(|h| h == name);

    let id_col = column(&config.client_id_column)
        .ok_or_else(|| SolveError::InvalidInput(format!("missing column {}", config.client_id_column)))?;
    let name_col = column(&config.client_name_column);
    let gps_col = column(&config.gps_column)
        .ok_or_else(|| SolveError::InvalidInput(format!("missing column {}", config.gps_column)))?;
    let volume_col = column(&config.volume_column)
        .ok_or_else(|| SolveError::InvalidInput(format!("missing column {}", config.volume_column)))?;

    let mut customers = Vec::new();
    for (row_index, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(row = row_index + 2, "Dropping unreadable row: {e}");
                continue;
            }
        };

        let id = record.get(id_col).unwrap_or("").trim();
        if id.is_empty() {
            warn!(row = row_index + 2, "Dropping row without a client id");
            continue;
        }

        let Some(coords) = record.get(gps_col).and_then(parse_gps) else {
            warn!(row = row_index + 2, client = id, "Dropping row with unparsable GPS field");
            continue;
        };

        let volume: f64 = match record.get(volume_col).and_then(|v| v.parse().ok()) {
            Some(volume) => volume,
            None => {
                warn!(row = row_index + 2, client = id, "Dropping row with unparsable volume");
                continue;
            }
        };
        if !volume.is_finite() || volume < 0.0 {
            warn!(
                row = row_index + 2,
                client = id,
                volume,
                "Dropping row with negative or non-finite volume"
            );
            continue;
        }

        let name = name_col
            .and_then(|c| record.get(c))
            .filter(|n| !n.is_empty())
            .unwrap_or(id);

        customers.push(Customer {
            id: id.to_string(),
            name: name.to_string(),
            coords,
            volume,
            distance_from_depot_m: Some(haversine_km(depot_location, coords) * 1000.0),
        });
    }

    Ok(customers)
}
