//! Neighbor graph construction and its decomposition into tracks.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use arcore::{ArCandidate, CandidateKey};
use rayon::prelude::*;

use crate::hausdorff::hausdorff_km;
use crate::{TimeSlice, Track, TrackError, TrackScheme, TrackingConfig};

/// Neighbor relation from an earlier to a later candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkEdge {
    /// Index of the earlier candidate in the flattened stream.
    pub src: usize,
    /// Index of the later candidate in the flattened stream.
    pub dst: usize,
    pub dt_hours: f64,
    pub distance_km: f64,
}

/// Builds tracks from the complete, time-ordered candidate stream.
#[derive(Debug, Clone, Copy)]
pub struct TrackLinker<'a> {
    config: &'a TrackingConfig,
}

impl<'a> TrackLinker<'a> {
    pub fn new(config: &'a TrackingConfig) -> Self {
        Self { config }
    }

    /// Link all slices into tracks with ids 1.. ordered by their members.
    ///
    /// The stream must be complete: linking looks ahead up to
    /// `time_gap_allow` hours from every slice.
    pub fn link(&self, slices: Vec<TimeSlice>) -> Result<Vec<Track>, TrackError> {
        for pair in slices.windows(2) {
            if pair[1].time <= pair[0].time {
                return Err(TrackError::UnorderedStream {
                    previous: pair[0].time,
                    next: pair[1].time,
                });
            }
        }

        let mut spans = Vec::with_capacity(slices.len());
        let mut nodes: Vec<Arc<ArCandidate>> = Vec::new();
        for slice in slices {
            let start = nodes.len();
            nodes.extend(slice.candidates);
            spans.push((slice.time, start..nodes.len()));
        }

        let edges = self.neighbor_edges(&nodes, &spans);
        log::info!(
            "link graph: {} candidates in {} slices, {} neighbor edges",
            nodes.len(),
            spans.len(),
            edges.len()
        );

        let paths = match self.config.track_scheme {
            TrackScheme::Simple => chains(nodes.len(), &edges).0,
            TrackScheme::Full => covering_paths(nodes.len(), &edges),
        };

        let mut member_lists: Vec<Vec<Arc<ArCandidate>>> = paths
            .into_iter()
            .map(|path| path.into_iter().map(|i| Arc::clone(&nodes[i])).collect())
            .collect();
        member_lists.sort_by(|a, b| keys(a).cmp(&keys(b)));

        let tracks: Vec<Track> = member_lists
            .into_iter()
            .enumerate()
            .map(|(i, members)| Track::new(i as u32 + 1, members))
            .collect();
        log::info!("linked {} track(s)", tracks.len());
        Ok(tracks)
    }

    /// Every pair of candidates from slices within the time gap whose
    /// Hausdorff distance is at most `max_dist_allow`, sorted by
    /// (distance, time gap, earlier key, later key).
    pub fn neighbor_edges(
        &self,
        nodes: &[Arc<ArCandidate>],
        spans: &[(chrono::NaiveDateTime, std::ops::Range<usize>)],
    ) -> Vec<LinkEdge> {
        let mut pairs = Vec::new();
        for (i, (t0, earlier)) in spans.iter().enumerate() {
            for (t1, later) in &spans[i + 1..] {
                let dt_hours = arcore::field::hours_between(*t0, *t1);
                if dt_hours > self.config.time_gap_allow {
                    break;
                }
                for src in earlier.clone() {
                    for dst in later.clone() {
                        pairs.push((src, dst, dt_hours));
                    }
                }
            }
        }

        let max_dist = self.config.max_dist_allow;
        let mut edges: Vec<LinkEdge> = pairs
            .into_par_iter()
            .filter_map(|(src, dst, dt_hours)| {
                let distance_km = hausdorff_km(&nodes[src].points, &nodes[dst].points);
                (distance_km <= max_dist).then_some(LinkEdge {
                    src,
                    dst,
                    dt_hours,
                    distance_km,
                })
            })
            .collect();

        edges.sort_by(|a, b| edge_order(a, b, nodes));
        edges
    }
}

fn edge_order(a: &LinkEdge, b: &LinkEdge, nodes: &[Arc<ArCandidate>]) -> Ordering {
    a.distance_km
        .total_cmp(&b.distance_km)
        .then_with(|| a.dt_hours.total_cmp(&b.dt_hours))
        .then_with(|| nodes[a.src].key.cmp(&nodes[b.src].key))
        .then_with(|| nodes[a.dst].key.cmp(&nodes[b.dst].key))
}

fn keys(members: &[Arc<ArCandidate>]) -> Vec<CandidateKey> {
    members.iter().map(|m| m.key).collect()
}

/// Greedy non-branching decomposition.
///
/// Edges are taken best first; an edge is used when its source has no
/// successor yet and its target no predecessor. Returns the chains (every
/// node exactly once) and a flag per edge telling whether it was used.
fn chains(n: usize, edges: &[LinkEdge]) -> (Vec<Vec<usize>>, Vec<bool>) {
    let mut succ = vec![None; n];
    let mut pred = vec![None; n];
    let mut used = vec![false; edges.len()];
    for (k, e) in edges.iter().enumerate() {
        if succ[e.src].is_none() && pred[e.dst].is_none() {
            succ[e.src] = Some(e.dst);
            pred[e.dst] = Some(e.src);
            used[k] = true;
        }
    }

    let paths = (0..n)
        .filter(|&i| pred[i].is_none())
        .map(|head| {
            let mut path = vec![head];
            let mut cur = head;
            while let Some(next) = succ[cur] {
                path.push(next);
                cur = next;
            }
            path
        })
        .collect();
    (paths, used)
}

/// Chains extended so that every neighbor edge lies on exactly one track.
///
/// Each edge left over from the chains, taken best first, prepends its
/// source to the track starting at its target, else appends its target to
/// the track ending at its source, else becomes a two-member track.
fn covering_paths(n: usize, edges: &[LinkEdge]) -> Vec<Vec<usize>> {
    let (mut paths, used) = chains(n, edges);
    let mut head_of: HashMap<usize, usize> = HashMap::new();
    let mut tail_of: HashMap<usize, usize> = HashMap::new();
    for (p, path) in paths.iter().enumerate() {
        if let (Some(&h), Some(&t)) = (path.first(), path.last()) {
            head_of.insert(h, p);
            tail_of.insert(t, p);
        }
    }

    let mut branches = 0;
    for (e, _) in edges.iter().zip(&used).filter(|(_, &u)| !u) {
        branches += 1;
        if let Some(p) = head_of.remove(&e.dst) {
            paths[p].insert(0, e.src);
            head_of.insert(e.src, p);
        } else if let Some(p) = tail_of.remove(&e.src) {
            paths[p].push(e.dst);
            tail_of.insert(e.dst, p);
        } else {
            let p = paths.len();
            paths.push(vec![e.src, e.dst]);
            head_of.insert(e.src, p);
            tail_of.insert(e.dst, p);
        }
    }
    log::debug!("full scheme covered {branches} branching edge(s)");
    paths
}
