//! Spherical geometry helpers.
//!
//! Points are `geo::Point`s with X = longitude and Y = latitude. Callers
//! always go through [`point_from_lat_lon`], which is the only place the
//! (lat, lon) argument order is flipped.

use geo::{Distance, Haversine, Point, Rect};

/// IUGG mean Earth radius in kilometres.
pub const EARTH_MEAN_RADIUS_KM: f64 = 6371.0088;

/// Sphere radius behind `geo::Haversine`, in metres.
const HAVERSINE_RADIUS_M: f64 = 6_371_008.8;

/// Slack applied to angle comparisons so a point sitting exactly on the
/// circle (or on a cell edge) is never lost to rounding.
const ANGLE_EPSILON_DEG: f64 = 1e-9;

/// Build a point from latitude and longitude.
pub fn point_from_lat_lon(lat: f64, lon: f64) -> Point<f64> {
    Point::new(lon, lat)
}

/// Angular radius, in degrees, of a circle of `radius_km` on a sphere of
/// `earth_radius_km`.
pub fn degrees_for_radius_km(radius_km: f64, earth_radius_km: f64) -> f64 {
    (radius_km / earth_radius_km).to_degrees()
}

/// Central angle between two points, in degrees.
pub fn central_angle_degrees(p1: Point<f64>, p2: Point<f64>) -> f64 {
    (Haversine.distance(p1, p2) / HAVERSINE_RADIUS_M).to_degrees()
}

/// Great-circle distance in kilometres on a sphere of `earth_radius_km`.
pub fn distance_km(p1: Point<f64>, p2: Point<f64>, earth_radius_km: f64) -> f64 {
    Haversine.distance(p1, p2) / HAVERSINE_RADIUS_M * earth_radius_km
}

/// True when both coordinates are finite and within the valid ranges.
pub fn is_valid_lat_lon(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon)
}

/// Absolute longitude difference folded into [0, 180].
fn lon_delta(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    if d > 180.0 {
        360.0 - d
    } else {
        d
    }
}

/// A spherical cap: every point within `radius_degrees` of `center`.
#[derive(Debug, Clone, Copy)]
pub struct Circle {
    center: Point<f64>,
    radius_degrees: f64,
}

impl Circle {
    pub fn new(center: Point<f64>, radius_degrees: f64) -> Self {
        Self {
            center,
            radius_degrees,
        }
    }

    pub fn center(&self) -> Point<f64> {
        self.center
    }

    pub fn radius_degrees(&self) -> f64 {
        self.radius_degrees
    }

    /// Exact central angle from the center to the closest point of a
    /// latitude/longitude cell.
    ///
    /// If the center's longitude falls inside the cell, the closest point is
    /// on the center's own meridian. Otherwise it lies on whichever meridian
    /// edge is nearer in longitude: distance along a parallel only grows with
    /// the longitude gap, so the parallel edges never win.
    pub fn min_distance_degrees(&self, cell: &Rect<f64>) -> f64 {
        let (lon, lat) = (self.center.x(), self.center.y());
        let (min, max) = (cell.min(), cell.max());

        if lon >= min.x && lon <= max.x {
            let clamped = lat.clamp(min.y, max.y);
            return (lat - clamped).abs();
        }

        let west = lon_delta(lon, min.x);
        let east = lon_delta(lon, max.x);
        let (edge_lon, delta) = if west <= east {
            (min.x, west)
        } else {
            (max.x, east)
        };

        // Latitude on the edge meridian closest to the center.
        let cos_delta = delta.to_radians().cos();
        let nearest_lat = if cos_delta > 0.0 {
            (lat.to_radians().tan() / cos_delta).atan().to_degrees()
        } else if lat >= 0.0 {
            90.0
        } else {
            -90.0
        };

        let edge_point = Point::new(edge_lon, nearest_lat.clamp(min.y, max.y));
        central_angle_degrees(self.center, edge_point)
    }

    fn antipode(&self) -> Point<f64> {
        let lon = self.center.x();
        let antipodal_lon = if lon > 0.0 { lon - 180.0 } else { lon + 180.0 };
        Point::new(antipodal_lon, -self.center.y())
    }

    /// True when some part of `cell` lies within the circle.
    pub fn intersects(&self, cell: &Rect<f64>) -> bool {
        self.min_distance_degrees(cell) <= self.radius_degrees + ANGLE_EPSILON_DEG
    }

    /// True when every point of `cell` lies within the circle.
    ///
    /// The farthest point of the cell is the one nearest the antipode, which
    /// need not be a corner.
    pub fn contains(&self, cell: &Rect<f64>) -> bool {
        if self.radius_degrees >= 180.0 {
            return true;
        }
        let antipode = Circle::new(self.antipode(), 0.0);
        if 180.0 - antipode.min_distance_degrees(cell) > self.radius_degrees {
            return false;
        }
        let (min, max) = (cell.min(), cell.max());
        [
            Point::new(min.x, min.y),
            Point::new(min.x, max.y),
            Point::new(max.x, min.y),
            Point::new(max.x, max.y),
        ]
        .into_iter()
        .all(|corner| central_angle_degrees(self.center, corner) <= self.radius_degrees)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    fn assert_close(a: f64, b: f64, tolerance: f64) {
        assert!((a - b).abs() <= tolerance, "{} vs {}", a, b);
    }

    #[test]
    fn test_point_axis_order() {
        let p = point_from_lat_lon(40.7128, -74.0060);
        assert_eq!(p.x(), -74.0060);
        assert_eq!(p.y(), 40.7128);
    }

    #[test]
    fn test_degrees_for_radius() {
        // One radian of arc.
        assert_close(
            degrees_for_radius_km(EARTH_MEAN_RADIUS_KM, EARTH_MEAN_RADIUS_KM),
            180.0 / std::f64::consts::PI,
            1e-12,
        );
        assert_eq!(degrees_for_radius_km(0.0, EARTH_MEAN_RADIUS_KM), 0.0);
        // ~111.2 km per degree.
        assert_close(degrees_for_radius_km(111.195, EARTH_MEAN_RADIUS_KM), 1.0, 1e-4);
    }

    #[test]
    fn test_distance_known_pairs() {
        let new_york = point_from_lat_lon(40.7128, -74.0060);
        let newark = point_from_lat_lon(40.7357, -74.1724);
        let paris = point_from_lat_lon(48.8566, 2.3522);

        assert_eq!(distance_km(new_york, new_york, EARTH_MEAN_RADIUS_KM), 0.0);
        assert_close(distance_km(new_york, newark, EARTH_MEAN_RADIUS_KM), 14.2, 0.5);
        assert_close(distance_km(new_york, paris, EARTH_MEAN_RADIUS_KM), 5837.0, 10.0);
    }

    #[test]
    fn test_distance_scales_with_radius() {
        let a = point_from_lat_lon(0.0, 0.0);
        let b = point_from_lat_lon(0.0, 1.0);
        let unit = distance_km(a, b, 1.0);
        assert_close(unit, 1f64.to_radians(), 1e-12);
        assert_close(distance_km(a, b, 2.0), 2.0 * unit, 1e-12);
    }

    #[test]
    fn test_valid_lat_lon() {
        assert!(is_valid_lat_lon(90.0, 180.0));
        assert!(is_valid_lat_lon(-90.0, -180.0));
        assert!(!is_valid_lat_lon(90.1, 0.0));
        assert!(!is_valid_lat_lon(0.0, -180.5));
        assert!(!is_valid_lat_lon(f64::NAN, 0.0));
    }

    #[test]
    fn test_min_distance_inside_cell_is_zero() {
        let circle = Circle::new(point_from_lat_lon(10.0, 10.0), 1.0);
        let cell = Rect::new(coord! { x: 5.0, y: 5.0 }, coord! { x: 15.0, y: 15.0 });
        assert_eq!(circle.min_distance_degrees(&cell), 0.0);
        assert!(circle.intersects(&cell));
    }

    #[test]
    fn test_min_distance_same_meridian() {
        let circle = Circle::new(point_from_lat_lon(0.0, 10.0), 1.0);
        let cell = Rect::new(coord! { x: 5.0, y: 3.0 }, coord! { x: 15.0, y: 8.0 });
        assert_close(circle.min_distance_degrees(&cell), 3.0, 1e-9);
        assert!(!circle.intersects(&cell));
    }

    #[test]
    fn test_min_distance_across_antimeridian() {
        let circle = Circle::new(point_from_lat_lon(0.0, 179.5), 1.0);
        let cell = Rect::new(coord! { x: -180.0, y: -1.0 }, coord! { x: -179.0, y: 1.0 });
        assert_close(circle.min_distance_degrees(&cell), 0.5, 1e-6);
        assert!(circle.intersects(&cell));
    }

    #[test]
    fn test_min_distance_matches_brute_force() {
        let center = point_from_lat_lon(52.0, 13.0);
        let circle = Circle::new(center, 5.0);
        let cell = Rect::new(coord! { x: 20.0, y: 40.0 }, coord! { x: 25.0, y: 60.0 });

        let mut brute = f64::MAX;
        for i in 0..=100 {
            for j in 0..=100 {
                let lon = 20.0 + 5.0 * i as f64 / 100.0;
                let lat = 40.0 + 20.0 * j as f64 / 100.0;
                brute = brute.min(central_angle_degrees(center, Point::new(lon, lat)));
            }
        }
        let exact = circle.min_distance_degrees(&cell);
        assert!(exact <= brute + 1e-9);
        assert_close(exact, brute, 0.05);
    }

    #[test]
    fn test_contains() {
        let circle = Circle::new(point_from_lat_lon(0.0, 0.0), 2.0);
        let inner = Rect::new(coord! { x: -0.5, y: -0.5 }, coord! { x: 0.5, y: 0.5 });
        let outer = Rect::new(coord! { x: -3.0, y: -3.0 }, coord! { x: 3.0, y: 3.0 });
        assert!(circle.contains(&inner));
        assert!(!circle.contains(&outer));
        assert!(Circle::new(point_from_lat_lon(0.0, 0.0), 180.0).contains(&outer));
    }

    #[test]
    fn test_contains_rejects_cell_around_antipode() {
        let circle = Circle::new(point_from_lat_lon(0.0, 0.0), 179.9);
        // Every corner is within 179.9 degrees but (0, 180) is 180 away.
        let cell = Rect::new(coord! { x: 179.0, y: -1.0 }, coord! { x: 180.0, y: 1.0 });
        assert!(circle.intersects(&cell));
        assert!(!circle.contains(&cell));

        let shifted = Circle::new(point_from_lat_lon(30.0, -60.0), 179.0);
        let near_antipode = Rect::new(coord! { x: 119.0, y: -31.0 }, coord! { x: 121.0, y: -29.0 });
        assert!(!shifted.contains(&near_antipode));
        let far_from_antipode = Rect::new(coord! { x: -61.0, y: 29.0 }, coord! { x: -59.0, y: 31.0 });
        assert!(shifted.contains(&far_from_antipode));
    }
}
