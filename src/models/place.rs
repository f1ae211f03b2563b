//! Place record loaded from the world-cities dataset.

use geo::Point;
use serde::{Deserialize, Serialize};

use crate::geodesy::{is_valid_lat_lon, point_from_lat_lon};

/// Population value meaning "not known".
pub const UNKNOWN_POPULATION: i64 = -1;

/// One indexed location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceRecord {
    pub country: String,

    /// City name as it appears in the dataset (usually ASCII-folded)
    pub city: String,

    /// Accented form of the city name, for display
    pub display_name: String,

    pub region: String,

    /// Head count, or [`UNKNOWN_POPULATION`]
    pub population: i64,

    pub latitude: f64,
    pub longitude: f64,
}

impl PlaceRecord {
    /// Create a record with unknown population.
    pub fn new(
        country: impl Into<String>,
        city: impl Into<String>,
        region: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        let city = city.into();
        Self {
            country: country.into(),
            display_name: city.clone(),
            city,
            region: region.into(),
            population: UNKNOWN_POPULATION,
            latitude,
            longitude,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_population(mut self, population: i64) -> Self {
        self.population = population;
        self
    }

    /// Location as a geometry point (X = longitude, Y = latitude).
    pub fn point(&self) -> Point<f64> {
        point_from_lat_lon(self.latitude, self.longitude)
    }

    /// `None` when the population is the unknown sentinel.
    pub fn known_population(&self) -> Option<i64> {
        (self.population != UNKNOWN_POPULATION).then_some(self.population)
    }

    /// Check the coordinate and population invariants.
    pub fn validate(&self) -> Result<(), String> {
        if !is_valid_lat_lon(self.latitude, self.longitude) {
            return Err(format!(
                "coordinates ({}, {}) are out of range",
                self.latitude, self.longitude
            ));
        }
        if self.population < UNKNOWN_POPULATION {
            return Err(format!("population {} is negative", self.population));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_defaults() {
        let place = PlaceRecord::new("us", "new york", "NY", 40.7128, -74.0060);
        assert_eq!(place.display_name, "new york");
        assert_eq!(place.population, UNKNOWN_POPULATION);
        assert_eq!(place.known_population(), None);
        assert_eq!(place.with_population(8_000_000).known_population(), Some(8_000_000));
    }

    #[test]
    fn test_point_is_lon_lat() {
        let place = PlaceRecord::new("fr", "paris", "A8", 48.8566, 2.3522);
        let point = place.point();
        assert_eq!(point.x(), 2.3522);
        assert_eq!(point.y(), 48.8566);
    }

    #[test]
    fn test_validate() {
        assert!(PlaceRecord::new("x", "a", "r", 0.0, 0.0).validate().is_ok());
        assert!(PlaceRecord::new("x", "a", "r", 91.0, 0.0).validate().is_err());
        assert!(PlaceRecord::new("x", "a", "r", 0.0, f64::INFINITY)
            .validate()
            .is_err());
        assert!(PlaceRecord::new("x", "a", "r", 0.0, 0.0)
            .with_population(-2)
            .validate()
            .is_err());
    }
}
