//! Gridded (time, lat, lon) fields and their coordinate axes.

use std::sync::Arc;

use chrono::NaiveDateTime;
use ndarray::{Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::ArError;

/// Relative tolerance when checking that longitudes form a uniform cycle.
const CYCLIC_TOLERANCE: f64 = 1e-3;

/// Coordinate axes shared by every field of one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridAxes {
    /// Strictly increasing timestamps.
    pub time: Vec<NaiveDateTime>,
    /// Latitudes in degrees, strictly monotonic in either direction.
    pub lat: Vec<f64>,
    /// Longitudes in degrees east, strictly increasing.
    pub lon: Vec<f64>,
}

impl GridAxes {
    /// Build axes, rejecting empty or non-monotonic coordinates.
    pub fn new(time: Vec<NaiveDateTime>, lat: Vec<f64>, lon: Vec<f64>) -> Result<Self, ArError> {
        if time.is_empty() {
            return Err(ArError::MissingAxis("time"));
        }
        if lat.is_empty() {
            return Err(ArError::MissingAxis("latitude"));
        }
        if lon.is_empty() {
            return Err(ArError::MissingAxis("longitude"));
        }
        if time.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ArError::NonMonotonicAxis("time"));
        }
        let increasing = lat.windows(2).all(|w| w[1] > w[0]);
        let decreasing = lat.windows(2).all(|w| w[1] < w[0]);
        if !(increasing || decreasing) || lat.iter().any(|v| !v.is_finite()) {
            return Err(ArError::NonMonotonicAxis("latitude"));
        }
        if lon.windows(2).any(|w| w[1] <= w[0]) || lon.iter().any(|v| !v.is_finite()) {
            return Err(ArError::NonMonotonicAxis("longitude"));
        }
        Ok(Self { time, lat, lon })
    }

    /// (time, lat, lon) extents.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.time.len(), self.lat.len(), self.lon.len())
    }

    /// Hours elapsed from time index `a` to time index `b`.
    pub fn hours_between(&self, a: usize, b: usize) -> f64 {
        hours_between(self.time[a], self.time[b])
    }

    /// Verify the longitudes cover [0, 360) at uniform spacing.
    pub fn check_cyclic(&self) -> Result<(), ArError> {
        let n = self.lon.len();
        if n < 2 {
            return Err(ArError::NotCyclic(format!("{n} longitude point(s)")));
        }
        let step = 360.0 / n as f64;
        let tol = step * CYCLIC_TOLERANCE;
        for w in self.lon.windows(2) {
            let d = w[1] - w[0];
            if (d - step).abs() > tol {
                return Err(ArError::NotCyclic(format!(
                    "spacing {d} differs from {step} expected for {n} points"
                )));
            }
        }
        Ok(())
    }
}

/// Hours between two timestamps (negative if `b` precedes `a`).
pub fn hours_between(a: NaiveDateTime, b: NaiveDateTime) -> f64 {
    (b - a).num_seconds() as f64 / 3600.0
}

/// Dense (time, lat, lon) field with shared axes.
#[derive(Debug, Clone)]
pub struct Field3D {
    name: String,
    data: Array3<f64>,
    axes: Arc<GridAxes>,
}

impl Field3D {
    /// Wrap `data`, checking it against the axes and for non-finite values.
    pub fn new(
        name: impl Into<String>,
        data: Array3<f64>,
        axes: Arc<GridAxes>,
    ) -> Result<Self, ArError> {
        let name = name.into();
        let (nt, ny, nx) = axes.shape();
        if data.dim() != (nt, ny, nx) {
            return Err(ArError::InputShape {
                field: name,
                expected: vec![nt, ny, nx],
                actual: data.shape().to_vec(),
            });
        }
        let count = data.iter().filter(|v| !v.is_finite()).count();
        if count > 0 {
            return Err(ArError::NonFinite { field: name, count });
        }
        Ok(Self { name, data, axes })
    }

    /// Derived field on the same axes; shapes already agree by construction.
    pub(crate) fn derived(name: impl Into<String>, data: Array3<f64>, axes: Arc<GridAxes>) -> Self {
        debug_assert_eq!(data.dim(), axes.shape());
        Self {
            name: name.into(),
            data,
            axes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn axes(&self) -> &Arc<GridAxes> {
        &self.axes
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// The (lat, lon) slab at time index `t`.
    pub fn slice(&self, t: usize) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(0), t)
    }

    /// Error unless `other` lives on the same grid as `self`.
    pub fn check_coregistered(&self, other: &Field3D) -> Result<(), ArError> {
        if other.shape() != self.shape() || *other.axes != *self.axes {
            return Err(ArError::InputShape {
                field: other.name.clone(),
                expected: self.data.shape().to_vec(),
                actual: other.data.shape().to_vec(),
            });
        }
        Ok(())
    }

    pub fn into_data(self) -> Array3<f64> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_helpers::synthetic::{linear_axis, time_axis};

    fn axes(nt: usize, ny: usize, nx: usize) -> Arc<GridAxes> {
        Arc::new(
            GridAxes::new(
                time_axis(nt, 6),
                linear_axis(20.0, 1.0, ny),
                linear_axis(100.0, 1.0, nx),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let err = Field3D::new("ivt", Array3::zeros((2, 3, 5)), axes(2, 3, 4)).unwrap_err();
        match err {
            ArError::InputShape {
                field,
                expected,
                actual,
            } => {
                assert_eq!(field, "ivt");
                assert_eq!(expected, vec![2, 3, 4]);
                assert_eq!(actual, vec![2, 3, 5]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_non_finite_is_rejected() {
        let mut data = Array3::zeros((1, 2, 2));
        data[[0, 1, 1]] = f64::NAN;
        let err = Field3D::new("ivt", data, axes(1, 2, 2)).unwrap_err();
        assert!(matches!(err, ArError::NonFinite { count: 1, .. }));
    }

    #[test]
    fn test_empty_axes_are_missing() {
        let err = GridAxes::new(vec![], vec![1.0], vec![1.0]).unwrap_err();
        assert!(matches!(err, ArError::MissingAxis("time")));
        let err = GridAxes::new(time_axis(1, 6), vec![], vec![1.0]).unwrap_err();
        assert!(matches!(err, ArError::MissingAxis("latitude")));
    }

    #[test]
    fn test_descending_latitude_is_accepted() {
        let axes = GridAxes::new(time_axis(1, 6), vec![60.0, 50.0, 40.0], vec![0.0, 1.0]);
        assert!(axes.is_ok());
        let err = GridAxes::new(time_axis(1, 6), vec![60.0, 70.0, 40.0], vec![0.0, 1.0]);
        assert!(matches!(err, Err(ArError::NonMonotonicAxis("latitude"))));
    }

    #[test]
    fn test_cyclic_check() {
        let cyclic = GridAxes::new(time_axis(1, 6), vec![0.0], linear_axis(0.0, 1.0, 360)).unwrap();
        cyclic.check_cyclic().unwrap();

        let regional = GridAxes::new(time_axis(1, 6), vec![0.0], linear_axis(0.0, 1.0, 180)).unwrap();
        assert!(matches!(regional.check_cyclic(), Err(ArError::NotCyclic(_))));
    }

    #[test]
    fn test_hours_between() {
        let axes = axes(4, 1, 1);
        assert_eq!(axes.hours_between(0, 3), 18.0);
        assert_eq!(axes.hours_between(2, 1), -6.0);
    }
}
