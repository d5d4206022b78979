//! Latitude band selection and zonal rotation applied to a batch before
//! detection.
//!
//! Rotating moves the column at `shift_lon` to the front so a basin of
//! interest sits away from the seam. Columns moved past the end keep
//! increasing by 360 degrees, so the axis stays strictly increasing and a
//! global grid stays cyclic.

use std::sync::Arc;

use arcore::{ArError, Field3D, GridAxes};
use ndarray::{s, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

use crate::input::IvtBatch;

const LON_TOLERANCE: f64 = 1e-6;

/// Spatial domain of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfig {
    /// Degrees, southern bound of the latitude band (inclusive).
    pub lat1: f64,
    /// Degrees, northern bound of the latitude band (inclusive).
    pub lat2: f64,
    /// Degrees east; this grid longitude becomes the first column.
    pub shift_lon: Option<f64>,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            lat1: -90.0,
            lat2: 90.0,
            shift_lon: None,
        }
    }
}

impl DomainConfig {
    pub fn validate(&self) -> Result<(), ArError> {
        if !(self.lat1.is_finite() && self.lat2.is_finite()) || self.lat1 >= self.lat2 {
            return Err(ArError::InvalidConfig(format!(
                "latitude domain [{}, {}] is not a valid range",
                self.lat1, self.lat2
            )));
        }
        if self.lat1 < -90.0 || self.lat2 > 90.0 {
            return Err(ArError::InvalidConfig(format!(
                "latitude domain [{}, {}] must lie within [-90, 90]",
                self.lat1, self.lat2
            )));
        }
        if let Some(shift) = self.shift_lon.filter(|v| !v.is_finite()) {
            return Err(ArError::InvalidConfig(format!(
                "shift_lon must be finite, got {shift}"
            )));
        }
        Ok(())
    }

    /// Contiguous row range inside the band; latitude may run either way.
    fn rows(&self, lat: &[f64]) -> Result<std::ops::Range<usize>, ArError> {
        let inside: Vec<usize> = lat
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v >= self.lat1 && v <= self.lat2)
            .map(|(i, _)| i)
            .collect();
        match (inside.first(), inside.last()) {
            (Some(&first), Some(&last)) => Ok(first..last + 1),
            _ => Err(ArError::MissingAxis("latitude")),
        }
    }

    /// Index of the column matching `shift_lon` modulo 360, 0 when unset.
    fn first_column(&self, lon: &[f64]) -> Result<usize, ArError> {
        let Some(shift) = self.shift_lon else {
            return Ok(0);
        };
        lon.iter()
            .position(|&v| {
                let d = (v - shift).rem_euclid(360.0);
                d < LON_TOLERANCE || 360.0 - d < LON_TOLERANCE
            })
            .ok_or_else(|| {
                ArError::InvalidConfig(format!("shift_lon {shift} is not a longitude of the grid"))
            })
    }
}

impl IvtBatch {
    /// Cut the batch to the latitude band and rotate it to start at
    /// `shift_lon`. Returns the batch unchanged when neither applies.
    pub fn restrict(self, domain: &DomainConfig) -> Result<IvtBatch, ArError> {
        domain.validate()?;
        let axes = Arc::clone(self.axes());
        let rows = domain.rows(&axes.lat)?;
        let shift = domain.first_column(&axes.lon)?;
        if rows == (0..axes.lat.len()) && shift == 0 {
            return Ok(self);
        }

        let nx = axes.lon.len();
        let cols: Vec<usize> = (shift..nx).chain(0..shift).collect();
        let lon: Vec<f64> = cols
            .iter()
            .map(|&c| if c < shift { axes.lon[c] + 360.0 } else { axes.lon[c] })
            .collect();
        let lat = axes.lat[rows.clone()].to_vec();
        log::info!(
            "domain: {} of {} latitude rows, first longitude {}",
            lat.len(),
            axes.lat.len(),
            lon[0]
        );

        let axes = Arc::new(GridAxes::new(axes.time.clone(), lat, lon)?);
        let cut3 = |f: &Field3D| -> Result<Field3D, ArError> {
            let data: Array3<f64> = f
                .data()
                .slice(s![.., rows.clone(), ..])
                .select(Axis(2), &cols);
            Field3D::new(f.name(), data, Arc::clone(&axes))
        };

        let ivt = cut3(&self.ivt)?;
        let flux = match &self.flux {
            Some((u, v)) => Some((cut3(u)?, cut3(v)?)),
            None => None,
        };
        let climatology = self.climatology.as_ref().map(|c| -> Array2<f64> {
            c.slice(s![rows.clone(), ..]).select(Axis(1), &cols)
        });

        Ok(IvtBatch {
            ivt,
            flux,
            climatology,
        })
    }
}
