//! Hausdorff distance between point sets on the sphere.

use arcore::{great_circle_km, GeoPoint};

/// Largest distance from a point of `a` to its nearest point of `b`, in km.
///
/// Uses the early-break scan: once a point of `a` has a neighbor in `b`
/// closer than the running maximum it cannot raise it. Empty sets give
/// infinity.
pub fn directed_hausdorff_km(a: &[GeoPoint], b: &[GeoPoint]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return f64::INFINITY;
    }
    let mut cmax = 0.0f64;
    for &p in a {
        let mut cmin = f64::INFINITY;
        for &q in b {
            let d = great_circle_km(p, q);
            if d < cmax {
                cmin = d;
                break;
            }
            cmin = cmin.min(d);
        }
        cmax = cmax.max(cmin);
    }
    cmax
}

/// Symmetric Hausdorff distance in km.
pub fn hausdorff_km(a: &[GeoPoint], b: &[GeoPoint]) -> f64 {
    directed_hausdorff_km(a, b).max(directed_hausdorff_km(b, a))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn row(lat: f64, lons: std::ops::Range<i32>) -> Vec<GeoPoint> {
        lons.map(|l| GeoPoint::new(lat, l as f64)).collect()
    }

    #[test]
    fn test_identical_sets() {
        let a = row(40.0, 0..10);
        assert_eq!(hausdorff_km(&a, &a), 0.0);
    }

    #[test]
    fn test_asymmetric_directed_distances() {
        let a = row(40.0, 0..1);
        let b = row(40.0, 0..5);
        assert_eq!(directed_hausdorff_km(&a, &b), 0.0);
        let far = great_circle_km(GeoPoint::new(40.0, 0.0), GeoPoint::new(40.0, 4.0));
        assert_relative_eq!(directed_hausdorff_km(&b, &a), far);
        assert_relative_eq!(hausdorff_km(&a, &b), far);
        assert_relative_eq!(hausdorff_km(&b, &a), far);
    }

    #[test]
    fn test_shifted_row() {
        let a = row(40.0, 0..10);
        let b = row(40.0, 2..12);
        let step = great_circle_km(GeoPoint::new(40.0, 0.0), GeoPoint::new(40.0, 2.0));
        assert_relative_eq!(hausdorff_km(&a, &b), step, max_relative = 1e-12);
    }

    #[test]
    fn test_across_seam() {
        let a = vec![GeoPoint::new(0.0, 359.0)];
        let b = vec![GeoPoint::new(0.0, 1.0)];
        let two_degrees = great_circle_km(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 2.0));
        assert_relative_eq!(hausdorff_km(&a, &b), two_degrees, max_relative = 1e-9);
    }

    #[test]
    fn test_empty_set_is_infinitely_far() {
        assert!(hausdorff_km(&[], &row(0.0, 0..2)).is_infinite());
    }
}
