//! Gridded image processing for AR detection.
//!
//! - **morphology**: erosion, reconstruction and the THR background split
//! - **detection**: thresholding, labeling and candidate segmentation
//! - **axis**: skeleton-based principal axis extraction

pub mod axis;
pub mod detection;
pub mod morphology;

pub use axis::{AxisExtractor, FluxSlice};
pub use morphology::{BackgroundDecomposer, Decomposition, StructuringElement};
