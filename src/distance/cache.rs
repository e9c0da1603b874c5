use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{info, warn};

use crate::distance::matrix::DistanceMatrix;

/// Stable cache key for an ordered coordinate list: SHA-256 over the JSON
/// array of coordinates rounded to 6 decimals.
pub fn cache_key(locations: &[(f64, f64)]) -> String {
    let rounded: Vec<[f64; 2]> = locations
        .iter()
        .map(|&(lat, lon)| [round6(lat), round6(lon)])
        .collect();
    let json = serde_json::to_string(&rounded).expect("coordinate list serializes");

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    let digest = hasher.finalize();

    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// Central on-disk matrix cache backed by SQLite.
///
/// A single indexed store: one row per coordinate-set key, upserted in one
/// statement so readers never observe a partial write.
pub struct MatrixCache {
    pool: SqlitePool,
}

impl MatrixCache {
    pub async fn connect(database_url: &str) -> Result<MatrixCache, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // One connection keeps the store single-writer and makes in-memory
        // databases (each connection gets its own) behave in tests.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        info!("Connected to matrix cache at {database_url}");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS matrix_cache (
                key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(MatrixCache { pool })
    }

    /// Fetch a cached matrix. An unreadable payload is treated as a miss so
    /// the caller rebuilds and overwrites it.
    pub async fn get(&self, key: &str) -> Result<Option<DistanceMatrix>, sqlx::Error> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT payload, created_at FROM matrix_cache WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        let Some((payload, created_at)) = row else {
            return Ok(None);
        };

        match serde_json::from_str::<DistanceMatrix>(&payload) {
            Ok(matrix) => {
                info!(
                    key,
                    created_at,
                    side = matrix.len(),
                    "Matrix cache hit"
                );
                Ok(Some(matrix))
            }
            Err(e) => {
                warn!(key, "Cached matrix payload unreadable ({e}), treating as miss");
                Ok(None)
            }
        }
    }

    pub async fn put(&self, key: &str, matrix: &DistanceMatrix) -> Result<(), sqlx::Error> {
        let payload = serde_json::to_string(matrix).expect("matrix serializes");
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO matrix_cache (key, payload, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(key)
        .bind(&payload)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        info!(key, side = matrix.len(), "Matrix stored in cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(locations: Vec<(f64, f64)>) -> DistanceMatrix {
        let n = locations.len();
        DistanceMatrix {
            locations,
            distances: vec![vec![0; n]; n],
            durations: vec![vec![0; n]; n],
        }
    }

    #[test]
    fn key_is_stable_under_sub_rounding_noise() {
        let a = cache_key(&[(42.1234561, 23.1), (42.2, 23.3)]);
        let b = cache_key(&[(42.1234562, 23.1), (42.2, 23.3)]);
        assert_eq!(a, b);
    }

    #[test]
    fn key_depends_on_order() {
        let a = cache_key(&[(42.1, 23.1), (42.2, 23.2)]);
        let b = cache_key(&[(42.2, 23.2), (42.1, 23.1)]);
        assert_ne!(a, b);
    }

    #[test]
    fn key_is_hex_sha256() {
        let key = cache_key(&[(42.1, 23.1)]);
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn round_trip_through_sqlite() {
        let cache = MatrixCache::connect("sqlite::memory:").await.unwrap();
        let locations = vec![(42.1, 23.1), (42.2, 23.2)];
        let key = cache_key(&locations);

        assert!(cache.get(&key).await.unwrap().is_none());

        let mut matrix = square(locations);
        matrix.distances[0][1] = 1500;
        matrix.durations[0][1] = 120;
        cache.put(&key, &matrix).await.unwrap();

        let loaded = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(loaded.distances, matrix.distances);
        assert_eq!(loaded.durations, matrix.durations);
        assert_eq!(loaded.locations, matrix.locations);
    }

    #[tokio::test]
    async fn put_overwrites_existing_row() {
        let cache = MatrixCache::connect("sqlite::memory:").await.unwrap();
        let locations = vec![(42.1, 23.1)];
        let key = cache_key(&locations);

        let mut matrix = square(locations);
        cache.put(&key, &matrix).await.unwrap();
        matrix.distances[0][0] = 0;
        matrix.durations[0][0] = 0;
        cache.put(&key, &matrix).await.unwrap();

        assert!(cache.get(&key).await.unwrap().is_some());
    }
}
