//! Reverse geocoding service over a swappable index handle.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use crate::config::EngineConfig;
use crate::error::{OpenError, QueryError};
use crate::index::{open_index, IndexReader};
use crate::models::PlaceRecord;

/// Answers nearest-city and nearest-country lookups.
///
/// Queries grab the current reader and run without holding the lock, so a
/// [`reload`](Self::reload) never waits for them and they never see a
/// half-swapped index.
pub struct ReverseGeocoder {
    reader: RwLock<Arc<IndexReader>>,
    config: EngineConfig,
}

impl ReverseGeocoder {
    /// Open the index at `path`
    pub fn open(path: &Path, config: EngineConfig) -> Result<Self, OpenError> {
        let reader = open_index(path, &config)?;
        Ok(Self::from_reader(reader, config))
    }

    pub fn from_reader(reader: IndexReader, config: EngineConfig) -> Self {
        Self {
            reader: RwLock::new(Arc::new(reader)),
            config,
        }
    }

    /// Current index handle.
    pub fn reader(&self) -> Arc<IndexReader> {
        // The guarded value is a plain Arc, a poisoned lock still holds a
        // usable handle.
        self.reader
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Point the service at the index in `path`, typically a freshly rebuilt
    /// one. On failure the current index stays in service.
    pub fn reload(&self, path: &Path) -> Result<(), OpenError> {
        let reader = Arc::new(open_index(path, &self.config)?);
        let doc_count = reader.len();
        *self
            .reader
            .write()
            .unwrap_or_else(PoisonError::into_inner) = reader;
        info!("Reloaded index from {} ({} documents)", path.display(), doc_count);
        Ok(())
    }

    pub fn nearest_cities(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<PlaceRecord>, QueryError> {
        self.reader().nearest_places(lat, lon, radius_km, limit)
    }

    pub fn nearest_countries(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<String>, QueryError> {
        self.reader().nearest_countries(lat, lon, radius_km, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::build_index;

    fn us_places() -> Vec<PlaceRecord> {
        vec![
            PlaceRecord::new("US", "New York", "NY", 40.7128, -74.0060),
            PlaceRecord::new("US", "Newark", "NJ", 40.7357, -74.1724),
        ]
    }

    fn fr_places() -> Vec<PlaceRecord> {
        vec![PlaceRecord::new("FR", "Paris", "A8", 48.8566, 2.3522)]
    }

    #[test]
    fn test_nearest_cities_and_countries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index");
        build_index(us_places(), &path, &EngineConfig::default()).unwrap();

        let geocoder = ReverseGeocoder::open(&path, EngineConfig::default()).unwrap();
        let cities = geocoder.nearest_cities(40.7128, -74.0060, 50.0, 5).unwrap();
        assert_eq!(cities.len(), 2);
        assert_eq!(cities[0].city, "New York");
        assert_eq!(
            geocoder.nearest_countries(40.7128, -74.0060, 50.0, 5).unwrap(),
            vec!["US".to_string()]
        );
    }

    #[test]
    fn test_reload_swaps_index() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        build_index(us_places(), &first, &EngineConfig::default()).unwrap();
        build_index(fr_places(), &second, &EngineConfig::default()).unwrap();

        let geocoder = ReverseGeocoder::open(&first, EngineConfig::default()).unwrap();
        let held = geocoder.reader();

        geocoder.reload(&second).unwrap();
        assert_eq!(geocoder.reader().len(), 1);
        assert_eq!(
            geocoder.nearest_countries(48.8566, 2.3522, 10.0, 5).unwrap(),
            vec!["FR".to_string()]
        );

        // A handle taken before the swap keeps answering from the old index.
        assert_eq!(held.nearest_places(40.7128, -74.0060, 50.0, 5).unwrap().len(), 2);
    }

    #[test]
    fn test_failed_reload_keeps_current_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index");
        build_index(us_places(), &path, &EngineConfig::default()).unwrap();

        let geocoder = ReverseGeocoder::open(&path, EngineConfig::default()).unwrap();
        assert!(geocoder.reload(&dir.path().join("missing")).is_err());
        assert_eq!(geocoder.reader().len(), 2);
    }

    #[test]
    fn test_invalid_query_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index");
        build_index(us_places(), &path, &EngineConfig::default()).unwrap();

        let geocoder = ReverseGeocoder::open(&path, EngineConfig::default()).unwrap();
        assert!(matches!(
            geocoder.nearest_cities(100.0, 0.0, 10.0, 1),
            Err(QueryError::InvalidArgument(_))
        ));
    }
}
