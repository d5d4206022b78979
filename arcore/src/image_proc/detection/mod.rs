//! Object detection on anomaly slices.
//!
//! - **thresholding**: batch threshold selection and seam-aware labeling
//! - **dome**: prominence-based splitting of multi-peak components
//! - **region**: area, centroid and longitude unwrapping
//! - **segment**: the per-slice segmentation pipeline and its lazy driver

pub mod dome;
pub mod region;
pub mod segment;
pub mod thresholding;

pub use dome::{find_peaks, split_domes, Peak};
pub use region::Region;
pub use segment::{ObjectSegmenter, Rejection, SliceDetections, SliceDetector};
pub use thresholding::{
    apply_threshold, connected_components, HistogramMode, Otsu, ThresholdEstimator,
    ThresholdSelector,
};
