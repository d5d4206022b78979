//! Duration and quality filter for linked tracks.

use crate::{Track, TrackingConfig};

/// Keeps tracks that last at least `min_duration` hours and carry at least
/// `min_nonrelax` non-relaxed members. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackFilter {
    pub min_duration: f64,
    pub min_nonrelax: usize,
}

impl TrackFilter {
    pub fn new(config: &TrackingConfig) -> Self {
        Self {
            min_duration: config.min_duration,
            min_nonrelax: config.min_nonrelax,
        }
    }

    pub fn keeps(&self, track: &Track) -> bool {
        track.duration_hours() >= self.min_duration && track.nonrelax_count() >= self.min_nonrelax
    }

    /// Surviving tracks in stable start-time order, ids unchanged.
    pub fn apply(&self, tracks: Vec<Track>) -> Vec<Track> {
        let total = tracks.len();
        let mut kept: Vec<Track> = tracks.into_iter().filter(|t| self.keeps(t)).collect();
        kept.sort_by_key(|t| t.start_time());
        log::info!("{} of {} track(s) pass the filter", kept.len(), total);
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::candidate;
    use arcore::GeoPoint;
    use std::sync::Arc;
    use test_helpers::synthetic::time_axis;

    /// Track over time indices `steps`, with the given steps relaxed.
    fn track(id: u32, steps: std::ops::Range<usize>, relaxed: &[usize]) -> Track {
        let times = time_axis(20, 6);
        let members = steps
            .map(|t| {
                Arc::new(candidate(
                    t,
                    1,
                    times[t],
                    vec![GeoPoint::new(40.0, t as f64)],
                    relaxed.contains(&t),
                ))
            })
            .collect();
        Track::new(id, members)
    }

    fn filter() -> TrackFilter {
        TrackFilter::new(&TrackingConfig {
            min_duration: 24.0,
            min_nonrelax: 2,
            ..Default::default()
        })
    }

    #[test]
    fn test_duration_boundary() {
        // 5 members at 6 h spacing: exactly 24 h
        assert!(filter().keeps(&track(1, 0..5, &[])));
        assert!(!filter().keeps(&track(2, 0..4, &[])));

        // one hour short of the minimum
        let start = time_axis(1, 6)[0];
        let offsets = [0, 6, 12, 18, 23];
        let members = offsets
            .iter()
            .enumerate()
            .map(|(i, &h)| {
                Arc::new(candidate(
                    i,
                    1,
                    start + chrono::Duration::hours(h),
                    vec![GeoPoint::new(40.0, i as f64)],
                    false,
                ))
            })
            .collect();
        let short = Track::new(3, members);
        assert_eq!(short.duration_hours(), 23.0);
        assert!(!filter().keeps(&short));
    }

    #[test]
    fn test_nonrelax_boundary() {
        assert!(filter().keeps(&track(1, 0..5, &[0, 1, 2])));
        assert!(!filter().keeps(&track(2, 0..5, &[0, 1, 2, 3])));
    }

    #[test]
    fn test_output_is_stable_by_start_time() {
        let tracks = vec![
            track(1, 4..10, &[]),
            track(2, 0..6, &[]),
            track(3, 4..9, &[]),
            track(4, 1..3, &[]),
        ];
        let kept = filter().apply(tracks);
        let ids: Vec<u32> = kept.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }
}
