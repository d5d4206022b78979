//! Spherical geometry on the lat/lon grid.
//!
//! Cell areas, great-circle distances and the neighbor arithmetic that makes
//! the longitude seam adjacent on zonally cyclic grids. Every grid walk in the
//! crate goes through [`GridGeometry::neighbor`] so cyclic handling stays
//! consistent between decomposition, labeling and axis extraction.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Mean Earth radius in km.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A point on the sphere in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Great-circle distance (haversine) in km.
pub fn great_circle_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Absolute coordinate spacing per element, central differences inside and
/// one-sided at the ends. A single-element axis gets unit spacing.
pub fn axis_spacing(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    match n {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => (0..n)
            .map(|i| {
                let (lo, hi) = match i {
                    0 => (0, 1),
                    i if i == n - 1 => (n - 2, n - 1),
                    i => (i - 1, i + 1),
                };
                (values[hi] - values[lo]).abs() / (hi - lo) as f64
            })
            .collect(),
    }
}

/// Lat/lon grid with per-cell areas and seam-aware neighbor lookup.
#[derive(Debug, Clone)]
pub struct GridGeometry {
    lat: Vec<f64>,
    lon: Vec<f64>,
    cyclic: bool,
    areas: Array2<f64>,
}

impl GridGeometry {
    /// `cyclic` must only be set for longitudes that passed
    /// [`crate::field::GridAxes::check_cyclic`].
    pub fn new(lat: &[f64], lon: &[f64], cyclic: bool) -> Self {
        let dlat = axis_spacing(lat);
        let dlon = if cyclic && lon.len() > 1 {
            vec![360.0 / lon.len() as f64; lon.len()]
        } else {
            axis_spacing(lon)
        };

        let r2 = EARTH_RADIUS_KM * EARTH_RADIUS_KM;
        let areas = Array2::from_shape_fn((lat.len(), lon.len()), |(i, j)| {
            r2 * dlat[i].to_radians() * dlon[j].to_radians() * lat[i].to_radians().cos().abs()
        });

        Self {
            lat: lat.to_vec(),
            lon: lon.to_vec(),
            cyclic,
            areas,
        }
    }

    pub fn nlat(&self) -> usize {
        self.lat.len()
    }

    pub fn nlon(&self) -> usize {
        self.lon.len()
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.lat.len(), self.lon.len())
    }

    pub fn is_cyclic(&self) -> bool {
        self.cyclic
    }

    pub fn lat(&self, row: usize) -> f64 {
        self.lat[row]
    }

    /// Cell area in km^2.
    pub fn cell_area(&self, row: usize, col: usize) -> f64 {
        self.areas[[row, col]]
    }

    pub fn areas(&self) -> &Array2<f64> {
        &self.areas
    }

    /// Neighbor of `(row, col)` at offset `(dr, dc)`.
    ///
    /// Rows never wrap. Columns wrap across the seam on cyclic grids and are
    /// truncated otherwise.
    pub fn neighbor(&self, row: usize, col: usize, dr: isize, dc: isize) -> Option<(usize, usize)> {
        let r = row as isize + dr;
        if r < 0 || r >= self.nlat() as isize {
            return None;
        }
        let c = self.wrap_col(col as isize + dc)?;
        Some((r as usize, c))
    }

    /// Map a possibly out-of-range column onto the grid.
    pub fn wrap_col(&self, col: isize) -> Option<usize> {
        let n = self.nlon() as isize;
        if self.cyclic {
            Some(col.rem_euclid(n) as usize)
        } else if (0..n).contains(&col) {
            Some(col as usize)
        } else {
            None
        }
    }

    /// Longitude of an unwrapped column.
    ///
    /// On cyclic grids columns outside `[0, nlon)` continue past the seam, so
    /// column `nlon` maps to `lon[0] + 360`.
    pub fn unwrapped_lon(&self, col: isize) -> f64 {
        let n = self.nlon() as isize;
        let turns = col.div_euclid(n);
        let idx = col.rem_euclid(n) as usize;
        self.lon[idx] + 360.0 * turns as f64
    }

    /// Center of a grid cell with its longitude as stored on the axis.
    pub fn point(&self, row: usize, col: usize) -> GeoPoint {
        GeoPoint::new(self.lat[row], self.lon[col])
    }

    /// Fold a longitude into the axis' cycle when the grid is cyclic.
    pub fn normalize_lon(&self, lon: f64) -> f64 {
        if self.cyclic {
            lon.rem_euclid(360.0)
        } else {
            lon
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use test_helpers::synthetic::linear_axis;

    #[test]
    fn test_great_circle_one_degree_on_equator() {
        let d = great_circle_km(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 1.0));
        assert_relative_eq!(d, EARTH_RADIUS_KM * 1f64.to_radians(), epsilon = 1e-9);
    }

    #[test]
    fn test_great_circle_across_seam() {
        let a = great_circle_km(GeoPoint::new(10.0, 359.5), GeoPoint::new(10.0, 0.5));
        let b = great_circle_km(GeoPoint::new(10.0, -0.5), GeoPoint::new(10.0, 0.5));
        assert_relative_eq!(a, b, epsilon = 1e-9);
    }

    #[test]
    fn test_axis_spacing() {
        assert_eq!(axis_spacing(&[0.0, 1.0, 3.0]), vec![1.0, 1.5, 2.0]);
        assert_eq!(axis_spacing(&[5.0]), vec![1.0]);
        assert_eq!(axis_spacing(&[10.0, 8.0]), vec![2.0, 2.0]);
    }

    #[test]
    fn test_cell_area_shrinks_with_latitude() {
        let grid = GridGeometry::new(&[0.0, 60.0], &linear_axis(0.0, 1.0, 4), false);
        let ratio = grid.cell_area(1, 0) / grid.cell_area(0, 0);
        assert_relative_eq!(ratio, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_global_area_matches_sphere() {
        let lat = linear_axis(-89.5, 1.0, 180);
        let lon = linear_axis(0.0, 1.0, 360);
        let grid = GridGeometry::new(&lat, &lon, true);
        let total: f64 = grid.areas().sum();
        let sphere = 4.0 * std::f64::consts::PI * EARTH_RADIUS_KM.powi(2);
        assert_relative_eq!(total, sphere, max_relative = 1e-3);
    }

    #[test]
    fn test_neighbor_wraps_only_when_cyclic() {
        let lon = linear_axis(0.0, 90.0, 4);
        let cyclic = GridGeometry::new(&[0.0, 1.0], &lon, true);
        let regional = GridGeometry::new(&[0.0, 1.0], &lon, false);

        assert_eq!(cyclic.neighbor(0, 3, 0, 1), Some((0, 0)));
        assert_eq!(cyclic.neighbor(1, 0, 0, -1), Some((1, 3)));
        assert_eq!(cyclic.neighbor(1, 0, 1, 0), None);
        assert_eq!(regional.neighbor(0, 3, 0, 1), None);
        assert_eq!(regional.neighbor(0, 2, 1, 1), Some((1, 3)));
    }

    #[test]
    fn test_unwrapped_lon() {
        let grid = GridGeometry::new(&[0.0], &linear_axis(0.0, 90.0, 4), true);
        assert_eq!(grid.unwrapped_lon(4), 360.0);
        assert_eq!(grid.unwrapped_lon(-1), -90.0);
        assert_eq!(grid.normalize_lon(-90.0), 270.0);
    }
}
