//! Geohash prefix tree.
//!
//! A point is indexed under every prefix of its geohash, one term per level.
//! A query circle is decomposed top-down into disjoint cells: a cell is
//! dropped when it misses the circle, kept whole when the circle contains it
//! or when the detail level is reached, and split into its 32 children
//! otherwise. The union of the kept cells covers every point in the circle,
//! plus some points just outside it near cell boundaries.

use geo::{Point, Rect};
use geo_types::Coord;
use geohash::GeohashError;

use crate::geodesy::Circle;

/// Geohash alphabet, in cell order.
pub const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Geohash terms for `point` at levels `1..=precision`, shortest first.
pub fn point_terms(point: Point<f64>, precision: usize) -> Result<Vec<String>, GeohashError> {
    let hash = geohash::encode(
        Coord {
            x: point.x(),
            y: point.y(),
        },
        precision,
    )?;
    Ok((1..=hash.len()).map(|level| hash[..level].to_string()).collect())
}

/// Latitude and longitude extent, in degrees, of a cell at `level`.
pub fn cell_size_degrees(level: usize) -> (f64, f64) {
    let bits = 5 * level as i32;
    let lon_bits = (bits + 1) / 2;
    let lat_bits = bits / 2;
    (180.0 / 2f64.powi(lat_bits), 360.0 / 2f64.powi(lon_bits))
}

/// Shallowest level whose cells fit inside the tolerated error for a circle
/// of `radius_degrees`, capped at `max_level`.
pub fn detail_level(radius_degrees: f64, dist_err_pct: f64, max_level: usize) -> usize {
    let tolerated = radius_degrees * dist_err_pct;
    (1..=max_level)
        .find(|&level| {
            let (lat_span, lon_span) = cell_size_degrees(level);
            lat_span <= tolerated && lon_span <= tolerated
        })
        .unwrap_or(max_level)
}

/// Disjoint geohash cells, no deeper than `detail`, whose union covers the
/// circle.
pub fn covering_cells(circle: &Circle, detail: usize) -> Result<Vec<String>, GeohashError> {
    let mut cells = Vec::new();
    let mut pending: Vec<String> = BASE32.iter().map(|&c| (c as char).to_string()).collect();

    while let Some(cell) = pending.pop() {
        let rect: Rect<f64> = geohash::decode_bbox(&cell)?;
        if !circle.intersects(&rect) {
            continue;
        }
        if cell.len() >= detail || circle.contains(&rect) {
            cells.push(cell);
            continue;
        }
        for &c in BASE32 {
            let mut child = String::with_capacity(cell.len() + 1);
            child.push_str(&cell);
            child.push(c as char);
            pending.push(child);
        }
    }

    Ok(cells)
}
