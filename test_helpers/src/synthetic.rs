//! Synthetic axes and fields.

use std::ops::Range;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use ndarray::{Array3, ArrayViewMut2, Axis};

/// First timestamp of every synthetic time axis.
pub fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid epoch")
}

/// `n` timestamps starting at [`epoch`], `step_hours` apart.
pub fn time_axis(n: usize, step_hours: i64) -> Vec<NaiveDateTime> {
    (0..n)
        .map(|i| epoch() + Duration::hours(step_hours * i as i64))
        .collect()
}

/// `n` evenly spaced values starting at `start`.
pub fn linear_axis(start: f64, step: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| start + step * i as f64).collect()
}

/// Set a rectangle of rows and columns to `value`.
pub fn paint_rect(slice: &mut ArrayViewMut2<f64>, rows: Range<usize>, cols: Range<usize>, value: f64) {
    for r in rows {
        for c in cols.clone() {
            slice[[r, c]] = value;
        }
    }
}

/// Rectangular blob moving east by `shift` columns per time step.
///
/// Cells outside the blob hold `background`, cells inside hold
/// `background + amplitude`.
pub fn translating_blob(
    shape: (usize, usize, usize),
    rows: Range<usize>,
    cols: Range<usize>,
    shift: usize,
    background: f64,
    amplitude: f64,
) -> Array3<f64> {
    let mut field = Array3::from_elem(shape, background);
    for (t, mut slice) in field.axis_iter_mut(Axis(0)).enumerate() {
        let start = cols.start + shift * t;
        let end = cols.end + shift * t;
        paint_rect(&mut slice, rows.clone(), start..end, background + amplitude);
    }
    field
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_axis_spacing() {
        let times = time_axis(3, 6);
        assert_eq!((times[2] - times[0]).num_hours(), 12);
    }

    #[test]
    fn test_translating_blob() {
        let field = translating_blob((2, 4, 10), 1..3, 2..4, 3, 100.0, 300.0);
        assert_eq!(field[[0, 1, 2]], 400.0);
        assert_eq!(field[[0, 1, 5]], 100.0);
        assert_eq!(field[[1, 2, 5]], 400.0);
        assert_eq!(field[[1, 0, 5]], 100.0);
    }
}
