//! Tracking of atmospheric river candidates through time.
//!
//! Candidates from consecutive (or near-consecutive) time slices are
//! neighbors when their Hausdorff distance on the sphere is within
//! `max_dist_allow`. The [`TrackLinker`] turns the neighbor graph into tracks
//! and the [`TrackFilter`] keeps the ones that last long enough.

use std::sync::Arc;

use arcore::ArCandidate;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod filter;
pub mod hausdorff;
pub mod linker;

pub use filter::TrackFilter;
pub use hausdorff::{directed_hausdorff_km, hausdorff_km};
pub use linker::{LinkEdge, TrackLinker};

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("invalid tracking configuration: {0}")]
    InvalidConfig(String),
    /// Slices must arrive with strictly increasing timestamps.
    #[error("candidate stream out of order: {previous} is not before {next}")]
    UnorderedStream {
        previous: NaiveDateTime,
        next: NaiveDateTime,
    },
}

/// How the neighbor graph is decomposed into tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackScheme {
    /// Non-branching chains only.
    #[default]
    Simple,
    /// Chains plus extra tracks covering every split and merge edge.
    Full,
}

/// Linking and filtering parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Hours; slices further apart are never linked.
    pub time_gap_allow: f64,
    /// km; maximum Hausdorff distance of linked candidates (inclusive).
    pub max_dist_allow: f64,
    pub track_scheme: TrackScheme,
    /// Hours between first and last member of a kept track.
    pub min_duration: f64,
    /// Minimum number of non-relaxed members of a kept track.
    pub min_nonrelax: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            time_gap_allow: 6.0,
            max_dist_allow: 1200.0,
            track_scheme: TrackScheme::Simple,
            min_duration: 24.0,
            min_nonrelax: 2,
        }
    }
}

impl TrackingConfig {
    pub fn validate(&self) -> Result<(), TrackError> {
        let non_negative = [
            ("time_gap_allow", self.time_gap_allow),
            ("max_dist_allow", self.max_dist_allow),
            ("min_duration", self.min_duration),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(TrackError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// All accepted candidates of one time slice.
#[derive(Debug, Clone)]
pub struct TimeSlice {
    pub time: NaiveDateTime,
    pub candidates: Vec<Arc<ArCandidate>>,
}

/// A time-ordered sequence of linked candidates.
///
/// Under the full scheme a candidate at a split or merge point belongs to
/// more than one track; members are shared, not copied.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: u32,
    pub members: Vec<Arc<ArCandidate>>,
}

impl Track {
    pub fn new(id: u32, members: Vec<Arc<ArCandidate>>) -> Self {
        Self { id, members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn start_time(&self) -> Option<NaiveDateTime> {
        self.members.first().map(|m| m.time)
    }

    pub fn end_time(&self) -> Option<NaiveDateTime> {
        self.members.last().map(|m| m.time)
    }

    /// Hours from first to last member; 0 for a single member.
    pub fn duration_hours(&self) -> f64 {
        match (self.start_time(), self.end_time()) {
            (Some(start), Some(end)) => arcore::field::hours_between(start, end),
            _ => 0.0,
        }
    }

    /// Members whose length met `min_length`.
    pub fn nonrelax_count(&self) -> usize {
        self.members.iter().filter(|m| !m.relaxed).count()
    }
}
