use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::MatrixConfig;
use crate::distance::cache::{cache_key, round6, MatrixCache};
use crate::distance::providers::osrm;
use crate::error::SolveError;

/// NxN travel costs over an ordered location list: meters and seconds,
/// rounded to integers so solver arithmetic stays exact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistanceMatrix {
    /// The ordered (lat, lon) list that produced the matrix; part of the
    /// cache identity.
    pub locations: Vec<(f64, f64)>,
    pub distances: Vec<Vec<i64>>,
    pub durations: Vec<Vec<i64>>,
}

impl DistanceMatrix {
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn distance(&self, from: usize, to: usize) -> i64 {
        self.distances[from][to]
    }

    pub fn duration(&self, from: usize, to: usize) -> i64 {
        self.durations[from][to]
    }

    /// Whether this matrix was built for exactly this ordered location list
    /// (compared at the cache's 6-decimal resolution).
    pub fn matches_locations(&self, locations: &[(f64, f64)]) -> bool {
        self.locations.len() == locations.len()
            && self
                .locations
                .iter()
                .zip(locations)
                .all(|(&(a_lat, a_lon), &(b_lat, b_lon))| {
                    round6(a_lat) == round6(b_lat) && round6(a_lon) == round6(b_lon)
                })
    }

    /// Square with matching side and zero diagonal.
    pub fn is_well_formed(&self) -> bool {
        let n = self.locations.len();
        self.distances.len() == n
            && self.durations.len() == n
            && self.distances.iter().all(|row| row.len() == n)
            && self.durations.iter().all(|row| row.len() == n)
            && (0..n).all(|i| self.distances[i][i] == 0 && self.durations[i][i] == 0)
    }
}

/// Retrieves matrices cache-first, building missing ones through the
/// routing engine.
///
/// Concurrent calls for the same coordinate set coalesce on a per-key lock
/// so at most one network build per key is ever in flight.
pub struct MatrixService {
    config: MatrixConfig,
    cache: Option<MatrixCache>,
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MatrixService {
    pub fn new(config: MatrixConfig, cache: Option<MatrixCache>) -> MatrixService {
        MatrixService {
            config,
            cache,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_matrix(&self, locations: &[(f64, f64)]) -> Result<DistanceMatrix, SolveError> {
        if locations.is_empty() {
            return Err(SolveError::InvalidInput("no locations for matrix".into()));
        }

        let key = cache_key(locations);
        let key_lock = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = key_lock.lock().await;

        if let Some(matrix) = self.lookup(&key, locations).await {
            return Ok(matrix);
        }

        info!(key = %key, locations = locations.len(), "Cache miss, building matrix");
        let matrix = osrm::fetch_table(&self.config, locations).await?;

        if !matrix.is_well_formed() {
            return Err(SolveError::RoutingEngineUnavailable(
                "engine returned a malformed matrix".into(),
            ));
        }

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(&key, &matrix).await {
                warn!("Failed to persist matrix to cache: {e}");
            }
        }

        Ok(matrix)
    }

    async fn lookup(&self, key: &str, locations: &[(f64, f64)]) -> Option<DistanceMatrix> {
        let cache = self.cache.as_ref()?;
        let stored = match cache.get(key).await {
            Ok(stored) => stored?,
            Err(e) => {
                warn!("Matrix cache read failed: {e}");
                return None;
            }
        };

        if !stored.matches_locations(locations) || !stored.is_well_formed() {
            // Size or order disagreement means the entry cannot serve this
            // request; rebuild and overwrite it.
            warn!(
                key,
                stored_side = stored.len(),
                requested = locations.len(),
                "Cached matrix does not match request, rebuilding"
            );
            return None;
        }

        Some(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(locations: Vec<(f64, f64)>) -> DistanceMatrix {
        let n = locations.len();
        DistanceMatrix {
            locations,
            distances: vec![vec![0; n]; n],
            durations: vec![vec![0; n]; n],
        }
    }

    #[test]
    fn well_formed_checks_shape_and_diagonal() {
        let mut m = matrix(vec![(42.1, 23.1), (42.2, 23.2)]);
        assert!(m.is_well_formed());

        m.distances[0][0] = 5;
        assert!(!m.is_well_formed());

        m.distances[0][0] = 0;
        m.durations.pop();
        assert!(!m.is_well_formed());
    }

    #[test]
    fn matches_locations_respects_order() {
        let m = matrix(vec![(42.1, 23.1), (42.2, 23.2)]);
        assert!(m.matches_locations(&[(42.1, 23.1), (42.2, 23.2)]));
        assert!(!m.matches_locations(&[(42.2, 23.2), (42.1, 23.1)]));
        assert!(!m.matches_locations(&[(42.1, 23.1)]));
    }

    #[test]
    fn matches_locations_at_cache_resolution() {
        let m = matrix(vec![(42.1000001, 23.1)]);
        assert!(m.matches_locations(&[(42.1000002, 23.1)]));
        assert!(!m.matches_locations(&[(42.11, 23.1)]));
    }

    #[tokio::test]
    async fn cached_matrix_is_returned_byte_identical() {
        let cache = MatrixCache::connect("sqlite::memory:").await.unwrap();
        let locations = vec![(42.1, 23.1), (42.2, 23.2)];
        let mut stored = matrix(locations.clone());
        stored.distances[0][1] = 1234;
        stored.distances[1][0] = 4321;
        stored.durations[0][1] = 99;
        stored.durations[1][0] = 101;
        cache.put(&cache_key(&locations), &stored).await.unwrap();

        let service = MatrixService::new(MatrixConfig::default(), Some(cache));
        let loaded = service.get_matrix(&locations).await.unwrap();
        assert_eq!(loaded.distances, stored.distances);
        assert_eq!(loaded.durations, stored.durations);
    }

    #[tokio::test]
    async fn mismatched_cache_entry_is_ignored() {
        let cache = MatrixCache::connect("sqlite::memory:").await.unwrap();
        let locations = vec![(42.1, 23.1), (42.2, 23.2)];
        // Poison the key with a matrix of the wrong side.
        let stored = matrix(vec![(42.1, 23.1)]);
        cache.put(&cache_key(&locations), &stored).await.unwrap();

        let service = MatrixService::new(MatrixConfig::default(), Some(cache));
        let found = service.lookup(&cache_key(&locations), &locations).await;
        assert!(found.is_none());
    }
}
