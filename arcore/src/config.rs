//! Run-wide detection parameters.
//!
//! One immutable value per run, built once (usually deserialized from JSON)
//! and passed by reference into every stage. Defaults follow the reference
//! parameter set used for 6-hourly global reanalysis IVT.

use serde::{Deserialize, Serialize};

use crate::error::ArError;

/// Grid adjacency used by labeling and watershed flooding. Skeleton graphs
/// always use 8-adjacency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// Horizontal and vertical neighbors only.
    Four,
    /// Horizontal, vertical and diagonal neighbors.
    #[default]
    Eight,
}

const FOUR_OFFSETS: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
const EIGHT_OFFSETS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

impl Connectivity {
    /// (row, col) neighbor offsets for this adjacency.
    pub fn offsets(&self) -> &'static [(isize, isize)] {
        match self {
            Connectivity::Four => &FOUR_OFFSETS,
            Connectivity::Eight => &EIGHT_OFFSETS,
        }
    }
}

/// Data-driven threshold estimators over the batch's positive anomalies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AutoThreshold {
    /// Otsu between-class variance maximization.
    Otsu { bins: usize },
    /// First value right of the histogram mode where the count falls below
    /// `sill` times the modal count.
    HistogramMode { bins: usize, sill: f64 },
}

impl Default for AutoThreshold {
    fn default() -> Self {
        AutoThreshold::Otsu { bins: 256 }
    }
}

/// `thres_low`: a fixed anomaly value or an estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdSpec {
    Fixed(f64),
    Auto(AutoThreshold),
}

impl Default for ThresholdSpec {
    fn default() -> Self {
        ThresholdSpec::Fixed(250.0)
    }
}

/// How the background field is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecompositionMode {
    /// Top-hat by reconstruction (erosion + reconstruction by dilation).
    #[default]
    Thr,
    /// Subtract an externally supplied climatological mean.
    Climatology,
}

/// Neighborhood used while propagating the reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconstructionFootprint {
    /// Unit (3x3x3) neighborhood. Narrow trenches stop the flood.
    #[default]
    Unit,
    /// The same structuring element as the erosion. Floods across trenches
    /// narrower than the kernel and is much slower for large kernels.
    Kernel,
}

/// Structuring-element parameters for the THR decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Half extent along time, in time steps.
    pub t_half: usize,
    /// Half extent along latitude and longitude, in grid cells.
    pub s_half: usize,
    /// Replace the ellipsoid with a full cube for large kernels.
    pub allow_cube: bool,
    /// Cube substitution kicks in when `t_half >= cube_t_half`.
    pub cube_t_half: usize,
    /// Cube substitution kicks in when `s_half >= cube_s_half`.
    pub cube_s_half: usize,
    pub reconstruction: ReconstructionFootprint,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            t_half: 16,
            s_half: 6,
            allow_cube: true,
            cube_t_half: 10,
            cube_s_half: 6,
            reconstruction: ReconstructionFootprint::Unit,
        }
    }
}

/// Background/anomaly decomposition settings.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompositionConfig {
    pub mode: DecompositionMode,
    pub kernel: KernelConfig,
}

impl DecompositionConfig {
    pub fn validate(&self) -> Result<(), ArError> {
        let k = &self.kernel;
        if k.allow_cube && (k.cube_t_half == 0 || k.cube_s_half == 0) {
            return Err(ArError::InvalidConfig(
                "cube substitution thresholds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Segmentation, axis and acceptance parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Anomaly threshold (kg/m/s) or estimator.
    pub thres_low: ThresholdSpec,
    /// km^2, candidates smaller than this are dropped.
    pub min_area: f64,
    /// km^2, candidates larger than this are dropped.
    pub max_area: f64,
    /// Minimum length/width ratio.
    #[serde(rename = "min_LW")]
    pub min_lw: f64,
    /// Degrees, minimum absolute centroid latitude.
    pub min_lat: f64,
    /// Degrees, maximum absolute centroid latitude.
    pub max_lat: f64,
    /// km, shorter candidates are flagged relaxed.
    pub min_length: f64,
    /// km, shorter candidates are discarded.
    pub min_length_hard: f64,
    /// Degrees, Douglas-Peucker tolerance for the axis.
    pub rdp_thres: f64,
    /// Grid cells, radius of the hole-closing disk.
    pub fill_radius: Option<usize>,
    /// Split multi-peak components into single domes.
    pub single_dome: bool,
    /// Maximum prominence/height ratio of a peak that stays merged.
    pub max_ph_ratio: f64,
    /// Minimal flux fraction along a direction to allow a skeleton edge.
    pub edge_eps: f64,
    /// Treat the longitude seam as adjacent.
    pub zonal_cyclic: bool,
    pub connectivity: Connectivity,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            thres_low: ThresholdSpec::default(),
            min_area: 50.0 * 1e4,
            max_area: 1800.0 * 1e4,
            min_lw: 0.0,
            min_lat: 0.0,
            max_lat: 80.0,
            min_length: 1000.0,
            min_length_hard: 800.0,
            rdp_thres: 2.0,
            fill_radius: None,
            single_dome: true,
            max_ph_ratio: 0.7,
            edge_eps: 0.0,
            zonal_cyclic: true,
            connectivity: Connectivity::Eight,
        }
    }
}

impl DetectionConfig {
    /// Check parameter consistency before a run.
    pub fn validate(&self) -> Result<(), ArError> {
        let fail = |msg: String| Err(ArError::InvalidConfig(msg));

        match self.thres_low {
            ThresholdSpec::Fixed(v) if !v.is_finite() => {
                return fail(format!("thres_low must be finite, got {v}"))
            }
            ThresholdSpec::Auto(AutoThreshold::Otsu { bins }) if bins < 2 => {
                return fail(format!("otsu needs at least 2 bins, got {bins}"))
            }
            ThresholdSpec::Auto(AutoThreshold::HistogramMode { bins, sill }) => {
                if bins < 2 {
                    return fail(format!("histogram mode needs at least 2 bins, got {bins}"));
                }
                if !(sill > 0.0 && sill < 1.0) {
                    return fail(format!("sill must lie in (0, 1), got {sill}"));
                }
            }
            _ => {}
        }
        if self.min_area < 0.0 || self.min_area > self.max_area {
            return fail(format!(
                "area bounds [{}, {}] are not a valid range",
                self.min_area, self.max_area
            ));
        }
        if self.min_lat < 0.0 || self.max_lat > 90.0 || self.min_lat > self.max_lat {
            return fail(format!(
                "latitude bounds [{}, {}] must lie within [0, 90]",
                self.min_lat, self.max_lat
            ));
        }
        if self.min_length_hard < 0.0 || self.min_length_hard > self.min_length {
            return fail(format!(
                "min_length_hard ({}) must be within [0, min_length ({})]",
                self.min_length_hard, self.min_length
            ));
        }
        if self.min_lw < 0.0 {
            return fail(format!("min_LW must be non-negative, got {}", self.min_lw));
        }
        if self.rdp_thres < 0.0 {
            return fail(format!("rdp_thres must be non-negative, got {}", self.rdp_thres));
        }
        if !(0.0..=1.0).contains(&self.max_ph_ratio) {
            return fail(format!(
                "max_ph_ratio must lie in [0, 1], got {}",
                self.max_ph_ratio
            ));
        }
        if !(0.0..=1.0).contains(&self.edge_eps) {
            return fail(format!("edge_eps must lie in [0, 1], got {}", self.edge_eps));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        DetectionConfig::default().validate().unwrap();
        DecompositionConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "thres_low": { "fixed": 200.0 }, "min_LW": 2.0, "zonal_cyclic": false }"#;
        let cfg: DetectionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.thres_low, ThresholdSpec::Fixed(200.0));
        assert_eq!(cfg.min_lw, 2.0);
        assert!(!cfg.zonal_cyclic);
        assert_eq!(cfg.min_length, 1000.0);
        assert_eq!(cfg.connectivity, Connectivity::Eight);
    }

    #[test]
    fn test_auto_threshold_json() {
        let json = r#"{ "thres_low": { "auto": { "method": "histogram_mode", "bins": 64, "sill": 0.1 } } }"#;
        let cfg: DetectionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            cfg.thres_low,
            ThresholdSpec::Auto(AutoThreshold::HistogramMode { bins: 64, sill: 0.1 })
        );
        cfg.validate().unwrap();
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let cfg = DetectionConfig {
            min_area: 10.0,
            max_area: 5.0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ArError::InvalidConfig(_))));

        let cfg = DetectionConfig {
            min_length_hard: 1500.0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = DetectionConfig {
            max_ph_ratio: 1.5,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_connectivity_offsets() {
        assert_eq!(Connectivity::Four.offsets().len(), 4);
        assert_eq!(Connectivity::Eight.offsets().len(), 8);
        assert!(!Connectivity::Eight.offsets().contains(&(0, 0)));
    }
}
