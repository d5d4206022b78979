//! Atmospheric river detection on gridded IVT fields.
//!
//! The engine splits a raw (time, lat, lon) IVT field into a smooth
//! background and a positive anomaly, segments each time slice of the
//! anomaly into candidate regions, and describes every accepted region by
//! its area, centroid and flux-aligned principal axis. Linking candidates
//! across time lives in the `track` crate.

pub mod candidate;
pub mod config;
pub mod error;
pub mod field;
pub mod geo;
pub mod image_proc;

pub use candidate::{ArCandidate, AxisSummary, CandidateKey};
pub use config::{DecompositionConfig, DetectionConfig};
pub use error::ArError;
pub use field::{Field3D, GridAxes};
pub use geo::{great_circle_km, GeoPoint, GridGeometry};
