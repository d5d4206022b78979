//! JSON input files holding one gridded IVT batch.
//!
//! Arrays are stored flat in row-major (time, lat, lon) order, climatology in
//! (lat, lon) order. Timestamps are ISO-8601 without a zone. `ivt` may be left
//! out when both flux components are present; it is then their magnitude.

use std::path::Path;
use std::sync::Arc;

use arcore::{ArError, Field3D, GridAxes};
use chrono::NaiveDateTime;
use ndarray::{Array2, Array3, Zip};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// On-disk layout of an input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IvtFile {
    pub time: Vec<NaiveDateTime>,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ivt: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uflux: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vflux: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub climatology: Option<Vec<f64>>,
}

/// Validated in-memory batch ready for the pipeline.
#[derive(Debug, Clone)]
pub struct IvtBatch {
    pub ivt: Field3D,
    /// Eastward and northward flux components.
    pub flux: Option<(Field3D, Field3D)>,
    /// (lat, lon) climatological mean of IVT.
    pub climatology: Option<Array2<f64>>,
}

impl IvtBatch {
    pub fn axes(&self) -> &Arc<GridAxes> {
        self.ivt.axes()
    }
}

fn field(
    name: &str,
    values: Vec<f64>,
    axes: &Arc<GridAxes>,
) -> Result<Field3D, ArError> {
    let (nt, ny, nx) = axes.shape();
    let len = values.len();
    let data = Array3::from_shape_vec((nt, ny, nx), values).map_err(|_| ArError::InputShape {
        field: name.to_string(),
        expected: vec![nt, ny, nx],
        actual: vec![len],
    })?;
    Field3D::new(name, data, Arc::clone(axes))
}

impl IvtFile {
    /// Check axes and value counts and build the batch.
    pub fn into_batch(self) -> Result<IvtBatch, ArError> {
        let axes = Arc::new(GridAxes::new(self.time, self.lat, self.lon)?);

        let flux = match (self.uflux, self.vflux) {
            (Some(u), Some(v)) => Some((field("uflux", u, &axes)?, field("vflux", v, &axes)?)),
            (None, None) => None,
            (Some(_), None) => return Err(ArError::MissingField("vflux".to_string())),
            (None, Some(_)) => return Err(ArError::MissingField("uflux".to_string())),
        };

        let ivt = match (self.ivt, &flux) {
            (Some(values), _) => field("ivt", values, &axes)?,
            (None, Some((u, v))) => {
                let magnitude = Zip::from(u.data())
                    .and(v.data())
                    .map_collect(|&u, &v| u.hypot(v));
                Field3D::new("ivt", magnitude, Arc::clone(&axes))?
            }
            (None, None) => return Err(ArError::MissingField("ivt".to_string())),
        };

        let climatology = match self.climatology {
            Some(values) => {
                let (_, ny, nx) = axes.shape();
                let len = values.len();
                let clim = Array2::from_shape_vec((ny, nx), values).map_err(|_| {
                    ArError::InputShape {
                        field: "climatology".to_string(),
                        expected: vec![ny, nx],
                        actual: vec![len],
                    }
                })?;
                Some(clim)
            }
            None => None,
        };

        Ok(IvtBatch {
            ivt,
            flux,
            climatology,
        })
    }

    /// Flatten a batch back into its file layout.
    pub fn from_batch(batch: &IvtBatch) -> Self {
        let axes = batch.axes();
        let flat = |f: &Field3D| f.data().iter().copied().collect::<Vec<f64>>();
        Self {
            time: axes.time.clone(),
            lat: axes.lat.clone(),
            lon: axes.lon.clone(),
            ivt: Some(flat(&batch.ivt)),
            uflux: batch.flux.as_ref().map(|(u, _)| flat(u)),
            vflux: batch.flux.as_ref().map(|(_, v)| flat(v)),
            climatology: batch
                .climatology
                .as_ref()
                .map(|c| c.iter().copied().collect()),
        }
    }
}

/// Read and validate an input file.
pub fn read_ivt_file(path: &Path) -> Result<IvtBatch, PipelineError> {
    let json = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    let file: IvtFile = serde_json::from_str(&json).map_err(|e| PipelineError::json(path, e))?;
    Ok(file.into_batch()?)
}

pub fn write_ivt_file(path: &Path, file: &IvtFile) -> Result<(), PipelineError> {
    let json = serde_json::to_string(file).map_err(|e| PipelineError::json(path, e))?;
    std::fs::write(path, json).map_err(|e| PipelineError::io(path, e))
}
