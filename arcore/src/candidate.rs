//! Accepted atmospheric-river candidates and their axis summaries.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;
use crate::image_proc::detection::region::Region;

/// Identity of a candidate within a batch: time index plus raster label.
///
/// Ordering is by time first, then label, which is the canonical order of
/// the candidate stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CandidateKey {
    pub time_index: usize,
    /// Label of the region in the slice raster, starting at 1.
    pub label: u32,
}

impl std::fmt::Display for CandidateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}#{}", self.time_index, self.label)
    }
}

/// Principal axis of a region with its geometry and flux alignment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisSummary {
    /// Full skeleton path, oriented with the flux where there is any.
    /// Longitudes are continuous across the seam.
    pub axis: Vec<GeoPoint>,
    /// Douglas-Peucker simplified axis.
    pub simplified: Vec<GeoPoint>,
    /// Great-circle length of the simplified axis in km.
    pub length_km: f64,
    /// Area over length in km.
    pub width_km: f64,
    /// Length over width; 0 for a zero-width region.
    pub lw_ratio: f64,
    /// Angle in degrees between local axis tangent and flux, per axis vertex.
    pub orientation_deviation: Vec<f64>,
    /// Flux component along the local tangent, per axis vertex.
    pub cross_flux_series: Vec<f64>,
    /// Mean of `orientation_deviation`.
    pub mean_orientation_deg: f64,
    /// Mean of `cross_flux_series`.
    pub cross_flux: f64,
}

/// One detected AR candidate in one time slice.
#[derive(Debug, Clone, PartialEq)]
pub struct ArCandidate {
    pub key: CandidateKey,
    pub time: NaiveDateTime,
    pub region: Region,
    /// Cell centers, used for Hausdorff distances between slices.
    pub points: Vec<GeoPoint>,
    pub axis: AxisSummary,
    /// Length falls in `[min_length_hard, min_length)`.
    pub relaxed: bool,
}

impl ArCandidate {
    pub fn label(&self) -> u32 {
        self.key.label
    }

    pub fn centroid(&self) -> GeoPoint {
        self.region.centroid
    }

    pub fn area_km2(&self) -> f64 {
        self.region.area_km2
    }

    pub fn length_km(&self) -> f64 {
        self.axis.length_km
    }

    pub fn width_km(&self) -> f64 {
        self.axis.width_km
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_order_is_time_then_label() {
        let a = CandidateKey {
            time_index: 0,
            label: 5,
        };
        let b = CandidateKey {
            time_index: 1,
            label: 1,
        };
        let c = CandidateKey {
            time_index: 1,
            label: 2,
        };
        let mut keys = vec![c, b, a];
        keys.sort();
        assert_eq!(keys, vec![a, b, c]);
        assert_eq!(b.to_string(), "t1#1");
    }
}
