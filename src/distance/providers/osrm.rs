use std::env;
use std::time::Duration;

use dotenv::dotenv;
use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::config::MatrixConfig;
use crate::distance::matrix::DistanceMatrix;
use crate::error::SolveError;

/// The routing engine cannot return more locations than this per table
/// request regardless of configuration.
pub const MAX_CHUNK_SIZE: usize = 100;

/// Sentinel for pairs the engine reports as unreachable.
const UNREACHABLE_M: i64 = 999_999_999;

#[derive(Debug, Deserialize)]
struct OsrmTableResponse {
    code: String,
    distances: Option<Vec<Vec<Option<f64>>>>,
    durations: Option<Vec<Vec<Option<f64>>>>,
}

/// A rectangular tile of the NxN table: `rows` are source indices into the
/// full location list, `cols` are destination indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Tile {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

/// Tile the NxN grid so each request carries at most `chunk_size` sources
/// and `chunk_size` destinations.
pub(crate) fn tile_grid(n: usize, chunk_size: usize) -> Vec<Tile> {
    let chunk = chunk_size.clamp(1, MAX_CHUNK_SIZE);
    let mut tiles = Vec::new();
    let mut row_start = 0;
    while row_start < n {
        let row_end = (row_start + chunk).min(n);
        let mut col_start = 0;
        while col_start < n {
            let col_end = (col_start + chunk).min(n);
            tiles.push(Tile {
                row_start,
                row_end,
                col_start,
                col_end,
            });
            col_start = col_end;
        }
        row_start = row_end;
    }
    tiles
}

/// Build the table URL for one tile. The coordinate path carries the union
/// of the tile's source and destination locations (OSRM wants lon,lat);
/// `sources`/`destinations` index into that union.
pub(crate) fn tile_url(
    base_url: &str,
    profile: &str,
    locations: &[(f64, f64)],
    tile: &Tile,
) -> String {
    let rows = tile.row_start..tile.row_end;
    let cols = tile.col_start..tile.col_end;
    let num_rows = rows.len();

    let coord_str = rows
        .clone()
        .chain(cols.clone())
        .map(|i| {
            let (lat, lon) = locations[i];
            format!("{},{}", lon, lat)
        })
        .collect::<Vec<String>>()
        .join(";");

    let sources = (0..num_rows)
        .map(|i| i.to_string())
        .collect::<Vec<String>>()
        .join(";");
    let destinations = (num_rows..num_rows + cols.len())
        .map(|i| i.to_string())
        .collect::<Vec<String>>()
        .join(";");

    format!(
        "{}/table/v1/{}/{}?sources={}&destinations={}&annotations=distance,duration",
        base_url.trim_end_matches('/'),
        profile,
        coord_str,
        sources,
        destinations
    )
}

/// Fetch the full NxN distance and duration matrix by stitching chunked
/// table requests together.
///
/// Each tile is retried `retry_attempts` times with linear backoff against
/// the primary engine; connection errors then get one retried pass against
/// the public fallback. Any tile still failing fails the whole fetch.
pub async fn fetch_table(
    config: &MatrixConfig,
    locations: &[(f64, f64)],
) -> Result<DistanceMatrix, SolveError> {
    dotenv().ok();
    if locations.is_empty() {
        return Err(SolveError::InvalidInput("no locations for matrix".into()));
    }

    let base_url = env::var("OSRM_BASE_URL").unwrap_or_else(|_| config.base_url.clone());
    let n = locations.len();
    let tiles = tile_grid(n, config.chunk_size);

    info!(
        locations = n,
        tiles = tiles.len(),
        chunk_size = config.chunk_size.clamp(1, MAX_CHUNK_SIZE),
        base_url = %base_url,
        "Fetching distance matrix from routing engine"
    );

    let client = Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .build()
        .map_err(|e| SolveError::RoutingEngineUnavailable(format!("http client: {e}")))?;

    let fetches = tiles.iter().map(|tile| {
        let client = client.clone();
        let base_url = base_url.clone();
        async move {
            let result = fetch_tile_with_retry(&client, config, &base_url, locations, tile).await;
            (tile.clone(), result)
        }
    });
    let results = join_all(fetches).await;

    let mut distances = vec![vec![0i64; n]; n];
    let mut durations = vec![vec![0i64; n]; n];

    for (tile, result) in results {
        let (tile_distances, tile_durations) = result?;
        for (ti, i) in (tile.row_start..tile.row_end).enumerate() {
            for (tj, j) in (tile.col_start..tile.col_end).enumerate() {
                distances[i][j] = tile_distances[ti][tj];
                durations[i][j] = tile_durations[ti][tj];
            }
        }
    }

    // The engine reports ~0 on the diagonal; pin it exactly.
    for i in 0..n {
        distances[i][i] = 0;
        durations[i][i] = 0;
    }

    info!(side = n, "Distance matrix assembled");

    Ok(DistanceMatrix {
        locations: locations.to_vec(),
        distances,
        durations,
    })
}

type TileData = (Vec<Vec<i64>>, Vec<Vec<i64>>);

async fn fetch_tile_with_retry(
    client: &Client,
    config: &MatrixConfig,
    base_url: &str,
    locations: &[(f64, f64)],
    tile: &Tile,
) -> Result<TileData, SolveError> {
    let mut connection_failed = false;

    match try_attempts(client, config, base_url, locations, tile, &mut connection_failed).await {
        Ok(data) => return Ok(data),
        Err(e) => {
            if connection_failed && config.fallback_to_public && base_url != config.public_osrm_url
            {
                warn!(
                    "Primary routing engine unreachable, retrying tile on public fallback {}",
                    config.public_osrm_url
                );
                let mut fallback_connection_failed = false;
                return try_attempts(
                    client,
                    config,
                    &config.public_osrm_url,
                    locations,
                    tile,
                    &mut fallback_connection_failed,
                )
                .await;
            }
            Err(e)
        }
    }
}

async fn try_attempts(
    client: &Client,
    config: &MatrixConfig,
    base_url: &str,
    locations: &[(f64, f64)],
    tile: &Tile,
    connection_failed: &mut bool,
) -> Result<TileData, SolveError> {
    let url = tile_url(base_url, &config.profile, locations, tile);
    let attempts = config.retry_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match fetch_tile_once(client, &url, tile).await {
            Ok(data) => return Ok(data),
            Err(TileError::Connection(msg)) => {
                *connection_failed = true;
                last_error = msg;
            }
            Err(TileError::Response(msg)) => {
                last_error = msg;
            }
        }
        if attempt < attempts {
            let delay = config.retry_delay_seconds * attempt as u64;
            warn!(
                attempt,
                delay_s = delay,
                "Table request failed ({last_error}), retrying"
            );
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }
    }

    error!(
        rows = tile.row_end - tile.row_start,
        cols = tile.col_end - tile.col_start,
        "Table request failed after {attempts} attempts: {last_error}"
    );
    Err(SolveError::RoutingEngineUnavailable(last_error))
}

enum TileError {
    /// Could not reach the engine at all; eligible for the public fallback.
    Connection(String),
    /// The engine answered but the response was unusable.
    Response(String),
}

async fn fetch_tile_once(client: &Client, url: &str, tile: &Tile) -> Result<TileData, TileError> {
    debug!(url_len = url.len(), "Sending table request");

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| TileError::Connection(format!("request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(TileError::Response(format!("HTTP {status}")));
    }

    let body: OsrmTableResponse = response
        .json()
        .await
        .map_err(|e| TileError::Response(format!("bad table JSON: {e}")))?;

    if body.code != "Ok" {
        return Err(TileError::Response(format!("engine code {}", body.code)));
    }

    let num_rows = tile.row_end - tile.row_start;
    let num_cols = tile.col_end - tile.col_start;

    let distances = round_grid(body.distances, num_rows, num_cols, "distances")?;
    let durations = round_grid(body.durations, num_rows, num_cols, "durations")?;
    Ok((distances, durations))
}

fn round_grid(
    grid: Option<Vec<Vec<Option<f64>>>>,
    num_rows: usize,
    num_cols: usize,
    what: &str,
) -> Result<Vec<Vec<i64>>, TileError> {
    let grid = grid.ok_or_else(|| TileError::Response(format!("missing {what} array")))?;
    if grid.len() != num_rows || grid.iter().any(|row| row.len() != num_cols) {
        return Err(TileError::Response(format!(
            "{what} shape mismatch: got {}x{}, want {num_rows}x{num_cols}",
            grid.len(),
            grid.first().map_or(0, |r| r.len())
        )));
    }

    Ok(grid
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|value| match value {
                    Some(v) if v.is_finite() => v.round() as i64,
                    _ => {
                        warn!("Unreachable pair in {what}, substituting sentinel");
                        UNREACHABLE_M
                    }
                })
                .collect()
        })
        .collect())
}
