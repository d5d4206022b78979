//! File-level driver for AR detection and tracking.
//!
//! Reads gridded IVT batches from JSON, runs the detection engine from
//! `arcore` and the tracker from `track`, and writes record tables, track
//! tables and label rasters. [`BatchRunner`] processes many files in
//! parallel with per-file failure isolation.

pub mod batch;
pub mod config;
pub mod domain;
pub mod error;
pub mod input;
pub mod output;
pub mod pipeline;

pub use batch::{run_file, BatchRunner, FileOutcome, FileSummary, FileTask};
pub use config::RunConfig;
pub use domain::DomainConfig;
pub use error::PipelineError;
pub use input::{read_ivt_file, write_ivt_file, IvtBatch, IvtFile};
pub use output::{write_outputs, AxisRecord, LabelRaster, OutputPaths};
pub use pipeline::{process_batch, BatchOutput};
