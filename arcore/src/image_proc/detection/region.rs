//! Area, centroid and seam unwrapping of candidate regions.

use ndarray::ArrayView2;

use crate::geo::{GeoPoint, GridGeometry};

/// A set of grid cells measured on the sphere.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// (row, col) grid cells, col within `[0, nlon)`.
    pub cells: Vec<(usize, usize)>,
    /// Column of each cell shifted so the region is contiguous in longitude.
    pub unwrapped_cols: Vec<isize>,
    /// Sum of cell areas in km^2.
    pub area_km2: f64,
    /// Area-weighted centroid, longitude folded back onto the grid's range.
    pub centroid: GeoPoint,
    pub mean_anomaly: f64,
}

impl Region {
    pub fn measure(cells: Vec<(usize, usize)>, grid: &GridGeometry, anomaly: &ArrayView2<f64>) -> Self {
        let unwrapped_cols = unwrap_columns(&cells, grid);

        let mut area = 0.0;
        let mut lat_sum = 0.0;
        let mut lon_sum = 0.0;
        let mut anomaly_sum = 0.0;
        for (&(r, c), &uc) in cells.iter().zip(&unwrapped_cols) {
            let a = grid.cell_area(r, c);
            area += a;
            lat_sum += a * grid.lat(r);
            lon_sum += a * grid.unwrapped_lon(uc);
            anomaly_sum += anomaly[[r, c]];
        }

        let n = cells.len().max(1) as f64;
        let (lat, lon) = if area > 0.0 {
            (lat_sum / area, lon_sum / area)
        } else {
            // only polar rows: fall back to the plain mean
            let lat = cells.iter().map(|&(r, _)| grid.lat(r)).sum::<f64>() / n;
            let lon = unwrapped_cols.iter().map(|&c| grid.unwrapped_lon(c)).sum::<f64>() / n;
            (lat, lon)
        };

        Self {
            area_km2: area,
            centroid: GeoPoint::new(lat, grid.normalize_lon(lon)),
            mean_anomaly: anomaly_sum / n,
            cells,
            unwrapped_cols,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell centers with longitudes as stored on the grid.
    pub fn points(&self, grid: &GridGeometry) -> Vec<GeoPoint> {
        self.cells.iter().map(|&(r, c)| grid.point(r, c)).collect()
    }
}

/// Shift columns so a region crossing the seam becomes contiguous.
///
/// The cut is placed in the widest run of unoccupied columns; columns east of
/// the cut keep their index and columns west of it move up by `nlon`.
/// Non-cyclic grids and regions spanning every column are returned as is.
pub fn unwrap_columns(cells: &[(usize, usize)], grid: &GridGeometry) -> Vec<isize> {
    let identity = || cells.iter().map(|&(_, c)| c as isize).collect();
    let n = grid.nlon();
    if !grid.is_cyclic() || n < 2 {
        return identity();
    }

    let mut occupied = vec![false; n];
    for &(_, c) in cells {
        occupied[c] = true;
    }
    if occupied.iter().all(|&o| o) || !occupied.iter().any(|&o| o) {
        return identity();
    }

    // widest circular gap; ties keep the first in column order
    let mut best = (0, 0);
    for start in 0..n {
        if occupied[start] || !occupied[(start + n - 1) % n] {
            continue;
        }
        let len = (0..n).take_while(|k| !occupied[(start + k) % n]).count();
        if len > best.1 {
            best = (start, len);
        }
    }
    let first = (best.0 + best.1) % n;

    cells
        .iter()
        .map(|&(_, c)| {
            if c >= first {
                c as isize
            } else {
                (c + n) as isize
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;
    use test_helpers::synthetic::linear_axis;

    #[test]
    fn test_area_and_centroid_of_rectangle() {
        let grid = GridGeometry::new(&linear_axis(30.0, 1.0, 10), &linear_axis(100.0, 1.0, 10), false);
        let anomaly = Array2::from_elem((10, 10), 300.0);
        let cells: Vec<_> = (2..5).flat_map(|r| (3..7).map(move |c| (r, c))).collect();
        let region = Region::measure(cells, &grid, &anomaly.view());

        let expected: f64 = (2..5).map(|r| 4.0 * grid.cell_area(r, 0)).sum();
        assert_relative_eq!(region.area_km2, expected, max_relative = 1e-12);
        assert_relative_eq!(region.centroid.lon, 104.5, epsilon = 1e-9);
        assert!(region.centroid.lat < 33.0 && region.centroid.lat > 32.9);
        assert_eq!(region.mean_anomaly, 300.0);
    }

    #[test]
    fn test_seam_crossing_centroid() {
        let grid = GridGeometry::new(&[0.0], &linear_axis(0.0, 10.0, 36), true);
        let anomaly = Array2::from_elem((1, 36), 1.0);
        // columns 34, 35, 0, 1: 340..10 degrees
        let cells = vec![(0, 0), (0, 1), (0, 34), (0, 35)];
        let region = Region::measure(cells, &grid, &anomaly.view());
        assert_eq!(region.unwrapped_cols, vec![36, 37, 34, 35]);
        assert_relative_eq!(region.centroid.lon, 355.0, epsilon = 1e-9);
    }

    #[test]
    fn test_unwrap_is_identity_when_not_crossing() {
        let grid = GridGeometry::new(&[0.0], &linear_axis(0.0, 10.0, 36), true);
        let cells = vec![(0, 5), (0, 6), (0, 7)];
        assert_eq!(unwrap_columns(&cells, &grid), vec![5, 6, 7]);
    }
}
