//! Per-slice object segmentation.
//!
//! [`ObjectSegmenter::segment_slice`] turns one anomaly slice into accepted
//! [`ArCandidate`]s and a label raster:
//!
//! 1. Binarize at the batch threshold (inclusive).
//! 2. Optionally close holes with a disk of `fill_radius` cells.
//! 3. Label connected components, merging across the seam on cyclic grids.
//! 4. Optionally split multi-peak components into single domes.
//! 5. Filter by area, centroid latitude, axis length/width ratio and length.
//!
//! Bounds are inclusive on both sides. Candidates shorter than `min_length`
//! but at least `min_length_hard` are kept and flagged relaxed.

use chrono::NaiveDateTime;
use ndarray::{Array2, ArrayView2};

use crate::candidate::{ArCandidate, CandidateKey};
use crate::config::DetectionConfig;
use crate::error::ArError;
use crate::field::{Field3D, GridAxes};
use crate::geo::GridGeometry;
use crate::image_proc::axis::{AxisExtractor, FluxSlice};
use crate::image_proc::detection::dome::split_domes;
use crate::image_proc::detection::region::Region;
use crate::image_proc::detection::thresholding::{apply_threshold, connected_components, region_cells};
use crate::image_proc::morphology::binary_closing;

/// Why a region did not become a candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    Area(f64),
    Latitude(f64),
    Degenerate,
    LengthWidthRatio(f64),
    Length(f64),
}

/// Result of segmenting one time slice.
#[derive(Debug, Clone)]
pub struct SliceDetections {
    pub time_index: usize,
    pub time: NaiveDateTime,
    /// Accepted candidates numbered 1.. in the order of `candidates`, 0 elsewhere.
    pub labels: Array2<u32>,
    pub candidates: Vec<ArCandidate>,
}

/// Segments anomaly slices at a fixed threshold.
#[derive(Debug)]
pub struct ObjectSegmenter<'a> {
    config: &'a DetectionConfig,
    grid: GridGeometry,
    threshold: f64,
    axis: AxisExtractor,
}

impl<'a> ObjectSegmenter<'a> {
    /// Fails with [`ArError::NotCyclic`] when `zonal_cyclic` is set but the
    /// longitudes do not form a uniform cycle.
    pub fn new(config: &'a DetectionConfig, axes: &GridAxes, threshold: f64) -> Result<Self, ArError> {
        if config.zonal_cyclic {
            axes.check_cyclic()?;
        }
        Ok(Self {
            config,
            grid: GridGeometry::new(&axes.lat, &axes.lon, config.zonal_cyclic),
            threshold,
            axis: AxisExtractor::new(config),
        })
    }

    pub fn grid(&self) -> &GridGeometry {
        &self.grid
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Lazily segment every slice of `anomaly`.
    ///
    /// `flux` holds the (u, v) components on the same grid, when available.
    pub fn detect<'s>(
        &'s self,
        anomaly: &'s Field3D,
        flux: Option<(&'s Field3D, &'s Field3D)>,
    ) -> Result<SliceDetector<'s, 'a>, ArError> {
        let (_, ny, nx) = anomaly.shape();
        if (ny, nx) != self.grid.dim() {
            return Err(ArError::InputShape {
                field: anomaly.name().to_string(),
                expected: vec![anomaly.shape().0, self.grid.nlat(), self.grid.nlon()],
                actual: anomaly.data().shape().to_vec(),
            });
        }
        if let Some((u, v)) = flux {
            anomaly.check_coregistered(u)?;
            anomaly.check_coregistered(v)?;
        }
        Ok(SliceDetector {
            segmenter: self,
            anomaly,
            flux,
            next: 0,
        })
    }

    /// Segment one (lat, lon) anomaly slice.
    pub fn segment_slice(
        &self,
        time_index: usize,
        time: NaiveDateTime,
        anomaly: &ArrayView2<f64>,
        flux: Option<&FluxSlice>,
    ) -> Result<SliceDetections, ArError> {
        if anomaly.dim() != self.grid.dim() {
            return Err(ArError::InputShape {
                field: "anomaly slice".to_string(),
                expected: vec![self.grid.nlat(), self.grid.nlon()],
                actual: anomaly.shape().to_vec(),
            });
        }

        let mut mask = apply_threshold(anomaly, self.threshold);
        if let Some(radius) = self.config.fill_radius.filter(|&r| r > 0) {
            mask = binary_closing(&mask.view(), radius, &self.grid);
        }
        let components = connected_components(&mask.view(), self.config.connectivity, self.grid.is_cyclic());

        let mut groups = Vec::new();
        for cells in region_cells(&components.view()) {
            if self.config.single_dome {
                groups.extend(split_domes(
                    &cells,
                    anomaly,
                    &self.grid,
                    self.config.connectivity,
                    self.config.max_ph_ratio,
                ));
            } else {
                groups.push(cells);
            }
        }

        let mut labels = Array2::zeros(self.grid.dim());
        let mut candidates = Vec::new();
        for cells in groups {
            let region = Region::measure(cells, &self.grid, anomaly);
            let label = candidates.len() as u32 + 1;
            let key = CandidateKey { time_index, label };
            match self.evaluate(key, time, region, flux)? {
                Ok(candidate) => {
                    for &cell in &candidate.region.cells {
                        labels[cell] = label;
                    }
                    candidates.push(candidate);
                }
                Err(reason) => log::debug!("t={time_index}: rejected region ({reason:?})"),
            }
        }

        log::debug!(
            "t={time_index}: {} component(s), {} candidate(s) accepted",
            components.iter().copied().max().unwrap_or(0),
            candidates.len()
        );
        Ok(SliceDetections {
            time_index,
            time,
            labels,
            candidates,
        })
    }

    /// Apply the acceptance filters, cheapest first.
    fn evaluate(
        &self,
        key: CandidateKey,
        time: NaiveDateTime,
        region: Region,
        flux: Option<&FluxSlice>,
    ) -> Result<Result<ArCandidate, Rejection>, ArError> {
        let cfg = self.config;
        if region.area_km2 < cfg.min_area || region.area_km2 > cfg.max_area {
            return Ok(Err(Rejection::Area(region.area_km2)));
        }
        let abs_lat = region.centroid.lat.abs();
        if abs_lat < cfg.min_lat || abs_lat > cfg.max_lat {
            return Ok(Err(Rejection::Latitude(region.centroid.lat)));
        }

        let axis = match self.axis.extract(&region, &self.grid, flux) {
            Ok(axis) => axis,
            Err(ArError::DegenerateGeometry { cells, path_len }) => {
                log::debug!("degenerate region: {cells} cell(s), {path_len} path vertices");
                return Ok(Err(Rejection::Degenerate));
            }
            Err(e) => return Err(e),
        };
        if axis.lw_ratio < cfg.min_lw {
            return Ok(Err(Rejection::LengthWidthRatio(axis.lw_ratio)));
        }
        if axis.length_km < cfg.min_length_hard {
            return Ok(Err(Rejection::Length(axis.length_km)));
        }

        let relaxed = axis.length_km < cfg.min_length;
        Ok(Ok(ArCandidate {
            key,
            time,
            points: region.points(&self.grid),
            region,
            axis,
            relaxed,
        }))
    }
}

/// Lazy per-slice producer over a whole anomaly batch.
pub struct SliceDetector<'s, 'a> {
    segmenter: &'s ObjectSegmenter<'a>,
    anomaly: &'s Field3D,
    flux: Option<(&'s Field3D, &'s Field3D)>,
    next: usize,
}

impl Iterator for SliceDetector<'_, '_> {
    type Item = Result<SliceDetections, ArError>;

    fn next(&mut self) -> Option<Self::Item> {
        let t = self.next;
        if t >= self.anomaly.shape().0 {
            return None;
        }
        self.next += 1;

        let flux = self.flux.map(|(u, v)| FluxSlice {
            u: u.slice(t),
            v: v.slice(t),
        });
        let time = self.anomaly.axes().time[t];
        Some(
            self.segmenter
                .segment_slice(t, time, &self.anomaly.slice(t), flux.as_ref()),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.anomaly.shape().0.saturating_sub(self.next);
        (left, Some(left))
    }
}
