//! Engine configuration shared by the builder and the query engine.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::geodesy::EARTH_MEAN_RADIUS_KM;

/// Deepest geohash level indexed by default. An 11-character cell is
/// roughly 15 cm on a side.
pub const DEFAULT_PRECISION: usize = 11;

/// Longest geohash the `geohash` crate will encode.
pub const MAX_PRECISION: usize = 12;

/// How many candidates the query engine pulls from the postings before
/// re-ranking by exact distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateWindow {
    /// Only the `limit` lowest ids among the cell-level candidates are
    /// fetched and ranked. Results are not monotonic in the radius: widening
    /// it can admit a far place with a lower id that displaces a nearer one.
    #[default]
    Limit,
    /// Every cell-level candidate is fetched, anything outside the exact
    /// radius is dropped, and the nearest `limit` are kept.
    Unbounded,
}

/// Process-wide engine settings. Built once at startup and handed to
/// [`crate::index::build_index`] and [`crate::index::open_index`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of geohash levels indexed per point.
    pub precision: usize,
    /// Sphere radius used for every distance and angle conversion.
    pub earth_radius_km: f64,
    /// Fraction of the query radius tolerated as cell-level error when
    /// choosing how deep to decompose the query circle.
    pub dist_err_pct: f64,
    pub candidate_window: CandidateWindow,
    /// Records encoded and written per storage batch.
    pub build_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
            earth_radius_km: EARTH_MEAN_RADIUS_KM,
            dist_err_pct: 0.025,
            candidate_window: CandidateWindow::Limit,
            build_batch_size: 5000,
        }
    }
}

impl EngineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EngineConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_PRECISION).contains(&self.precision) {
            return Err(ConfigError::Invalid(format!(
                "precision must be between 1 and {}, got {}",
                MAX_PRECISION, self.precision
            )));
        }
        if !self.earth_radius_km.is_finite() || self.earth_radius_km <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "earth_radius_km must be positive, got {}",
                self.earth_radius_km
            )));
        }
        if !(self.dist_err_pct > 0.0 && self.dist_err_pct <= 0.5) {
            return Err(ConfigError::Invalid(format!(
                "dist_err_pct must be in (0, 0.5], got {}",
                self.dist_err_pct
            )));
        }
        if self.build_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "build_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.precision, 11);
        assert_eq!(config.candidate_window, CandidateWindow::Limit);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: EngineConfig =
            toml::from_str("precision = 9\ncandidate_window = \"unbounded\"\n").unwrap();
        assert_eq!(config.precision, 9);
        assert_eq!(config.candidate_window, CandidateWindow::Unbounded);
        assert_eq!(config.earth_radius_km, EARTH_MEAN_RADIUS_KM);
        assert_eq!(config.build_batch_size, 5000);
    }

    #[test]
    fn test_rejects_out_of_range_precision() {
        let config = EngineConfig {
            precision: 13,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = EngineConfig {
            precision: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meridian.toml");
        fs::write(&path, "dist_err_pct = 0.1\nbuild_batch_size = 10\n").unwrap();

        let config = EngineConfig::load_from_file(&path).unwrap();
        assert_eq!(config.dist_err_pct, 0.1);
        assert_eq!(config.build_batch_size, 10);

        fs::write(&path, "build_batch_size = 0\n").unwrap();
        assert!(EngineConfig::load_from_file(&path).is_err());
    }
}
