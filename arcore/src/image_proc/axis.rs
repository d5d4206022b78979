//! Principal axis extraction.
//!
//! The axis of a candidate region is the longest geodesic path through its
//! morphological skeleton:
//!
//! 1. Thin the region mask to a one-cell skeleton (Zhang-Suen).
//! 2. Connect skeleton cells that are grid neighbors, weighting each edge by
//!    its great-circle length. With `edge_eps > 0` an edge `a -> b` is only
//!    kept when the flux at `a` points along it by at least that fraction of
//!    its magnitude.
//! 3. Among the skeleton end points, pick the pair farthest apart along the
//!    graph (Dijkstra) and take the path between them.
//! 4. Simplify the path with Douglas-Peucker at `rdp_thres` degrees and
//!    measure length along the simplified polyline.
//!
//! The path is oriented so that it runs with the flux overall, and the
//! deviation between the local tangent and the flux is reported per vertex.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ndarray::{Array2, ArrayView2};

use crate::candidate::AxisSummary;
use crate::config::{Connectivity, DetectionConfig};
use crate::error::ArError;
use crate::geo::{great_circle_km, GeoPoint, GridGeometry};
use crate::image_proc::detection::region::Region;

/// Horizontal flux components (eastward u, northward v) of one time slice.
#[derive(Debug, Clone, Copy)]
pub struct FluxSlice<'a> {
    pub u: ArrayView2<'a, f64>,
    pub v: ArrayView2<'a, f64>,
}

impl FluxSlice<'_> {
    fn at(&self, row: usize, col: usize) -> (f64, f64) {
        (self.u[[row, col]], self.v[[row, col]])
    }
}

/// Skeleton vertex.
#[derive(Debug, Clone, Copy)]
struct Node {
    row: usize,
    col: usize,
    point: GeoPoint,
}

type Adjacency = Vec<Vec<(usize, f64)>>;

/// Region mask cut out of the grid with a one-cell border.
struct Patch {
    mask: Array2<bool>,
    /// Region cell index at each patch position.
    origin: Array2<Option<usize>>,
    row0: isize,
    col0: isize,
}

impl Patch {
    fn new(region: &Region) -> Self {
        let rows = region.cells.iter().map(|&(r, _)| r as isize);
        let cols = region.unwrapped_cols.iter().copied();
        let (rmin, rmax) = rows.fold((isize::MAX, isize::MIN), |(lo, hi), r| (lo.min(r), hi.max(r)));
        let (cmin, cmax) = cols.fold((isize::MAX, isize::MIN), |(lo, hi), c| (lo.min(c), hi.max(c)));
        let shape = ((rmax - rmin + 3) as usize, (cmax - cmin + 3) as usize);

        let row0 = rmin - 1;
        let col0 = cmin - 1;
        let mut mask = Array2::from_elem(shape, false);
        let mut origin = Array2::from_elem(shape, None);
        for (i, (&(r, _), &uc)) in region.cells.iter().zip(&region.unwrapped_cols).enumerate() {
            let pos = ((r as isize - row0) as usize, (uc - col0) as usize);
            mask[pos] = true;
            origin[pos] = Some(i);
        }
        Self {
            mask,
            origin,
            row0,
            col0,
        }
    }
}

/// Zhang-Suen thinning in place. The mask must have a background border.
pub fn zhang_suen_thin(mask: &mut Array2<bool>) {
    let (h, w) = mask.dim();
    if h < 3 || w < 3 {
        return;
    }
    loop {
        let mut changed = false;
        for step in 0..2 {
            let mut remove = Vec::new();
            for r in 1..h - 1 {
                for c in 1..w - 1 {
                    if !mask[[r, c]] {
                        continue;
                    }
                    // P2..P9 clockwise from north
                    let p = [
                        mask[[r - 1, c]],
                        mask[[r - 1, c + 1]],
                        mask[[r, c + 1]],
                        mask[[r + 1, c + 1]],
                        mask[[r + 1, c]],
                        mask[[r + 1, c - 1]],
                        mask[[r, c - 1]],
                        mask[[r - 1, c - 1]],
                    ];
                    let b = p.iter().filter(|&&x| x).count();
                    if !(2..=6).contains(&b) {
                        continue;
                    }
                    let a = (0..8).filter(|&k| !p[k] && p[(k + 1) % 8]).count();
                    if a != 1 {
                        continue;
                    }
                    let (p2, p4, p6, p8) = (p[0], p[2], p[4], p[6]);
                    let clear = if step == 0 {
                        !(p2 && p4 && p6) && !(p4 && p6 && p8)
                    } else {
                        !(p2 && p4 && p8) && !(p2 && p6 && p8)
                    };
                    if clear {
                        remove.push((r, c));
                    }
                }
            }
            changed |= !remove.is_empty();
            for pos in remove {
                mask[pos] = false;
            }
        }
        if !changed {
            break;
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Visit {
    dist: f64,
    node: usize,
}

impl PartialEq for Visit {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Visit {}

impl PartialOrd for Visit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Visit {
    fn cmp(&self, other: &Self) -> Ordering {
        // min-heap on distance
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.node.cmp(&self.node))
    }
}

fn dijkstra(adj: &Adjacency, source: usize) -> (Vec<f64>, Vec<Option<usize>>) {
    let n = adj.len();
    let mut dist = vec![f64::INFINITY; n];
    let mut prev = vec![None; n];
    let mut heap = BinaryHeap::new();
    dist[source] = 0.0;
    heap.push(Visit {
        dist: 0.0,
        node: source,
    });

    while let Some(Visit { dist: d, node }) = heap.pop() {
        if d > dist[node] {
            continue;
        }
        for &(next, w) in &adj[node] {
            let nd = d + w;
            if nd < dist[next] {
                dist[next] = nd;
                prev[next] = Some(node);
                heap.push(Visit {
                    dist: nd,
                    node: next,
                });
            }
        }
    }
    (dist, prev)
}

/// Farthest reachable pair of `ends` and the node path between them.
fn longest_end_to_end(adj: &Adjacency, ends: &[usize]) -> Option<Vec<usize>> {
    let mut best: Option<(f64, usize, Vec<Option<usize>>)> = None;
    for &a in ends {
        let (dist, prev) = dijkstra(adj, a);
        for &b in ends {
            if b == a || !dist[b].is_finite() || dist[b] <= 0.0 {
                continue;
            }
            if best.as_ref().map_or(true, |(d, _, _)| dist[b] > *d) {
                best = Some((dist[b], b, prev.clone()));
            }
        }
    }

    let (_, target, prev) = best?;
    let mut path = vec![target];
    let mut cur = target;
    while let Some(p) = prev[cur] {
        path.push(p);
        cur = p;
    }
    path.reverse();
    Some(path)
}

/// Douglas-Peucker simplification on (x, y) pairs.
///
/// Returns the indices of the retained points; the first and last points are
/// always kept.
pub fn rdp_simplify(points: &[(f64, f64)], tolerance: f64) -> Vec<usize> {
    let n = points.len();
    if n < 3 {
        return (0..n).collect();
    }
    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    let mut stack = vec![(0, n - 1)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }
        let (mut dmax, mut index) = (0.0, start);
        for i in start + 1..end {
            let d = perpendicular_distance(points[i], points[start], points[end]);
            if d > dmax {
                dmax = d;
                index = i;
            }
        }
        if dmax > tolerance {
            keep[index] = true;
            stack.push((start, index));
            stack.push((index, end));
        }
    }

    keep.iter()
        .enumerate()
        .filter_map(|(i, &k)| k.then_some(i))
        .collect()
}

fn perpendicular_distance(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let norm = dx.hypot(dy);
    if norm == 0.0 {
        return (p.0 - a.0).hypot(p.1 - a.1);
    }
    ((p.0 - a.0) * dy - (p.1 - a.1) * dx).abs() / norm
}

/// Unit (east, north) direction from `a` to `b` in local tangent-plane degrees.
fn direction(a: GeoPoint, b: GeoPoint) -> (f64, f64) {
    let mid_lat = (0.5 * (a.lat + b.lat)).to_radians();
    let dx = (b.lon - a.lon) * mid_lat.cos();
    let dy = b.lat - a.lat;
    let norm = dx.hypot(dy);
    if norm == 0.0 {
        (0.0, 0.0)
    } else {
        (dx / norm, dy / norm)
    }
}

/// Builds [`AxisSummary`] values for candidate regions.
#[derive(Debug, Clone, Copy)]
pub struct AxisExtractor {
    rdp_thres: f64,
    edge_eps: f64,
}

impl AxisExtractor {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            rdp_thres: config.rdp_thres,
            edge_eps: config.edge_eps,
        }
    }

    /// Extract the axis of `region`.
    ///
    /// `flux` may be absent, in which case the skeleton graph is purely shape
    /// based and all flux-derived quantities are zero. Regions of fewer than
    /// two cells, or whose path has fewer than two vertices, are rejected
    /// with [`ArError::DegenerateGeometry`].
    pub fn extract(
        &self,
        region: &Region,
        grid: &GridGeometry,
        flux: Option<&FluxSlice>,
    ) -> Result<AxisSummary, ArError> {
        if region.len() < 2 {
            return Err(ArError::DegenerateGeometry {
                cells: region.len(),
                path_len: 0,
            });
        }

        let patch = Patch::new(region);
        let mut skeleton = patch.mask.clone();
        zhang_suen_thin(&mut skeleton);
        if !skeleton.iter().any(|&s| s) {
            // tiny blocks can thin away entirely
            skeleton = patch.mask.clone();
        }

        let mut node_at = Array2::from_elem(skeleton.dim(), None);
        let mut nodes = Vec::new();
        for ((pr, pc), &on) in skeleton.indexed_iter() {
            let Some(cell) = patch.origin[[pr, pc]].filter(|_| on) else {
                continue;
            };
            let (row, col) = region.cells[cell];
            let ucol = patch.col0 + pc as isize;
            debug_assert_eq!(patch.row0 + pr as isize, row as isize);
            node_at[[pr, pc]] = Some(nodes.len());
            nodes.push(Node {
                row,
                col,
                point: GeoPoint::new(grid.lat(row), grid.unwrapped_lon(ucol)),
            });
        }

        let (undirected, directed) = self.skeleton_graph(&nodes, &node_at, flux);
        let path = match self.principal_path(&undirected, directed.as_ref()) {
            Some(path) if path.len() >= 2 => path,
            other => {
                return Err(ArError::DegenerateGeometry {
                    cells: region.len(),
                    path_len: other.map_or(0, |p| p.len()),
                })
            }
        };

        Ok(self.summarize(region, path.iter().map(|&i| nodes[i]).collect(), flux))
    }

    fn skeleton_graph(
        &self,
        nodes: &[Node],
        node_at: &Array2<Option<usize>>,
        flux: Option<&FluxSlice>,
    ) -> (Adjacency, Option<Adjacency>) {
        let (h, w) = node_at.dim();
        let mut undirected: Adjacency = vec![Vec::new(); nodes.len()];
        for ((pr, pc), &a) in node_at.indexed_iter() {
            let Some(a) = a else { continue };
            // thinning keeps only 8-connectivity, whatever the labeling uses
            for &(dr, dc) in Connectivity::Eight.offsets() {
                let (r, c) = (pr as isize + dr, pc as isize + dc);
                if r < 0 || c < 0 || r >= h as isize || c >= w as isize {
                    continue;
                }
                if let Some(b) = node_at[[r as usize, c as usize]] {
                    undirected[a].push((b, great_circle_km(nodes[a].point, nodes[b].point)));
                }
            }
        }

        let directed = match flux {
            Some(flux) if self.edge_eps > 0.0 => Some(
                undirected
                    .iter()
                    .enumerate()
                    .map(|(a, edges)| {
                        let (u, v) = flux.at(nodes[a].row, nodes[a].col);
                        let magnitude = u.hypot(v);
                        edges
                            .iter()
                            .copied()
                            .filter(|&(b, _)| {
                                let (dx, dy) = direction(nodes[a].point, nodes[b].point);
                                magnitude > 0.0 && (u * dx + v * dy) / magnitude >= self.edge_eps
                            })
                            .collect()
                    })
                    .collect(),
            ),
            _ => None,
        };
        (undirected, directed)
    }

    fn principal_path(&self, undirected: &Adjacency, directed: Option<&Adjacency>) -> Option<Vec<usize>> {
        let mut ends: Vec<usize> = (0..undirected.len())
            .filter(|&i| undirected[i].len() <= 1)
            .collect();
        if ends.len() < 2 {
            ends = (0..undirected.len()).collect();
        }

        if let Some(directed) = directed {
            if let Some(path) = longest_end_to_end(directed, &ends) {
                return Some(path);
            }
            log::debug!("no flux-aligned skeleton path, using shape only");
        }
        longest_end_to_end(undirected, &ends)
    }

    fn summarize(&self, region: &Region, mut path: Vec<Node>, flux: Option<&FluxSlice>) -> AxisSummary {
        let xy: Vec<(f64, f64)> = path.iter().map(|n| (n.point.lon, n.point.lat)).collect();
        let mut kept = rdp_simplify(&xy, self.rdp_thres);
        let mut along = alignment(&path, &kept, flux);

        if along.iter().sum::<f64>() < 0.0 {
            let last = path.len() - 1;
            path.reverse();
            kept = kept.iter().rev().map(|&k| last - k).collect();
            along = alignment(&path, &kept, flux);
        }

        let simplified: Vec<GeoPoint> = kept.iter().map(|&k| path[k].point).collect();
        let length_km: f64 = simplified
            .windows(2)
            .map(|w| great_circle_km(w[0], w[1]))
            .sum();
        let width_km = if length_km > 0.0 {
            region.area_km2 / length_km
        } else {
            0.0
        };
        let lw_ratio = if width_km > 0.0 {
            length_km / width_km
        } else {
            0.0
        };

        let (orientation_deviation, cross_flux_series): (Vec<f64>, Vec<f64>) = path
            .iter()
            .zip(&along)
            .map(|(node, &dot)| {
                let magnitude = flux.map_or(0.0, |f| {
                    let (u, v) = f.at(node.row, node.col);
                    u.hypot(v)
                });
                if magnitude > 0.0 {
                    ((dot / magnitude).clamp(-1.0, 1.0).acos().to_degrees(), dot)
                } else {
                    (0.0, 0.0)
                }
            })
            .unzip();

        let mean = |xs: &[f64]| {
            if xs.is_empty() {
                0.0
            } else {
                xs.iter().sum::<f64>() / xs.len() as f64
            }
        };

        AxisSummary {
            axis: path.iter().map(|n| n.point).collect(),
            simplified,
            length_km,
            width_km,
            lw_ratio,
            mean_orientation_deg: mean(&orientation_deviation),
            cross_flux: mean(&cross_flux_series),
            orientation_deviation,
            cross_flux_series,
        }
    }
}

/// Flux projected onto the simplified-segment tangent, per path vertex.
fn alignment(path: &[Node], kept: &[usize], flux: Option<&FluxSlice>) -> Vec<f64> {
    let Some(flux) = flux else {
        return vec![0.0; path.len()];
    };
    let mut segment = 0;
    (0..path.len())
        .map(|i| {
            while segment + 2 < kept.len() && i >= kept[segment + 1] {
                segment += 1;
            }
            let (tx, ty) = direction(path[kept[segment]].point, path[kept[segment + 1]].point);
            let (u, v) = flux.at(path[i].row, path[i].col);
            u * tx + v * ty
        })
        .collect()
}
