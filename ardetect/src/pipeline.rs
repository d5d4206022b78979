//! The per-file detection and tracking pipeline.
//!
//! decompose -> select threshold -> segment slices -> link -> filter.
//! Everything runs on one thread; file-level parallelism lives in
//! [`crate::batch`].

use std::sync::Arc;

use arcore::image_proc::detection::{ObjectSegmenter, ThresholdSelector};
use arcore::image_proc::{BackgroundDecomposer, Decomposition};
use arcore::ArCandidate;
use ndarray::{Array3, Axis};
use track::{TimeSlice, Track, TrackFilter, TrackLinker};

use crate::config::RunConfig;
use crate::error::PipelineError;
use crate::input::IvtBatch;

/// Everything one batch produces.
#[derive(Debug, Clone)]
pub struct BatchOutput {
    /// Anomaly threshold used for every slice.
    pub threshold: f64,
    pub decomposition: Decomposition,
    /// Per-slice candidate labels, 0 for background.
    pub labels: Array3<u32>,
    /// Accepted candidates in (time, label) order.
    pub candidates: Vec<Arc<ArCandidate>>,
    /// Tracks that passed the filter, ordered by start time.
    pub tracks: Vec<Track>,
}

/// Run the whole pipeline on one batch.
pub fn process_batch(batch: &IvtBatch, config: &RunConfig) -> Result<BatchOutput, PipelineError> {
    config.validate()?;
    let axes = batch.axes();
    let cyclic = config.detection.zonal_cyclic;
    if cyclic {
        axes.check_cyclic()?;
    }

    let decomposition = BackgroundDecomposer::new(&config.decomposition, cyclic)
        .decompose(&batch.ivt, batch.climatology.as_ref())?;

    let threshold = ThresholdSelector::from_spec(&config.detection.thres_low)
        .select(&decomposition.anomaly.data().view())?;
    log::info!("anomaly threshold {threshold:.3}");

    let segmenter = ObjectSegmenter::new(&config.detection, axes, threshold)?;
    let flux = batch.flux.as_ref().map(|(u, v)| (u, v));

    let mut labels = Array3::<u32>::zeros(batch.ivt.shape());
    let mut candidates = Vec::new();
    let mut slices = Vec::with_capacity(axes.time.len());
    for detections in segmenter.detect(&decomposition.anomaly, flux)? {
        let detections = detections?;
        labels
            .index_axis_mut(Axis(0), detections.time_index)
            .assign(&detections.labels);

        let shared: Vec<Arc<ArCandidate>> =
            detections.candidates.into_iter().map(Arc::new).collect();
        log::debug!(
            "slice {} ({}): {} candidate(s)",
            detections.time_index,
            detections.time,
            shared.len()
        );
        candidates.extend(shared.iter().cloned());
        slices.push(TimeSlice {
            time: detections.time,
            candidates: shared,
        });
    }

    let tracks = TrackLinker::new(&config.tracking).link(slices)?;
    let tracks = TrackFilter::new(&config.tracking).apply(tracks);
    log::info!(
        "{} candidate(s), {} track(s) in {} slice(s)",
        candidates.len(),
        tracks.len(),
        axes.time.len()
    );

    Ok(BatchOutput {
        threshold,
        decomposition,
        labels,
        candidates,
        tracks,
    })
}
