//! Single-dome decomposition of multi-peak components.
//!
//! A component whose anomaly surface holds several well separated maxima is
//! split by a seeded watershed. Separation is judged by topographic
//! prominence: sweeping the cells from high to low, two basins meet at a
//! saddle and the lower peak of the pair gets `prominence = peak - saddle`.
//! A peak counts as an independent dome when `prominence / height` exceeds
//! `max_ph_ratio`; the highest peak of a component is always one.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use ndarray::ArrayView2;

use crate::config::Connectivity;
use crate::geo::GridGeometry;

/// Peak found by the prominence sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub cell: (usize, usize),
    pub height: f64,
    pub prominence: f64,
}

impl Peak {
    pub fn ratio(&self) -> f64 {
        if self.height > 0.0 {
            self.prominence / self.height
        } else {
            0.0
        }
    }
}

/// Flooding front entry; higher values pop first, then lower cell index.
#[derive(Debug, Clone, Copy)]
struct WatershedItem {
    value: f64,
    index: usize,
}

impl PartialEq for WatershedItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for WatershedItem {}

impl PartialOrd for WatershedItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WatershedItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value
            .total_cmp(&other.value)
            .then_with(|| other.index.cmp(&self.index))
    }
}

/// One connected component viewed as a small graph over its cells.
struct Component<'a> {
    cells: &'a [(usize, usize)],
    values: Vec<f64>,
    adjacency: Vec<Vec<usize>>,
}

impl<'a> Component<'a> {
    fn new(
        cells: &'a [(usize, usize)],
        surface: &ArrayView2<f64>,
        grid: &GridGeometry,
        connectivity: Connectivity,
    ) -> Self {
        let index: HashMap<(usize, usize), usize> =
            cells.iter().enumerate().map(|(i, &c)| (c, i)).collect();
        let adjacency = cells
            .iter()
            .map(|&(r, c)| {
                let mut adj: Vec<usize> = connectivity
                    .offsets()
                    .iter()
                    .filter_map(|&(dr, dc)| grid.neighbor(r, c, dr, dc))
                    .filter_map(|q| index.get(&q).copied())
                    .collect();
                // a narrow cyclic grid can reach the same cell twice
                adj.sort_unstable();
                adj.dedup();
                adj
            })
            .collect();
        let values = cells.iter().map(|&c| surface[c]).collect();
        Self {
            cells,
            values,
            adjacency,
        }
    }

    /// Cell indices from highest to lowest value, ties in raster order.
    fn descending(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.cells.len()).collect();
        order.sort_by(|&a, &b| {
            self.values[b]
                .total_cmp(&self.values[a])
                .then_with(|| self.cells[a].cmp(&self.cells[b]))
        });
        order
    }
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Every peak of the component with its prominence, highest first.
fn peaks(component: &Component) -> Vec<Peak> {
    let n = component.cells.len();
    let order = component.descending();
    // position in the sweep doubles as the peak rank
    let mut rank = vec![0; n];
    for (pos, &i) in order.iter().enumerate() {
        rank[i] = pos;
    }

    let mut parent: Vec<usize> = (0..n).collect();
    let mut summit: Vec<usize> = (0..n).collect();
    let mut active = vec![false; n];
    let mut prominence: HashMap<usize, f64> = HashMap::new();

    for &i in &order {
        active[i] = true;
        let mut roots: Vec<usize> = component.adjacency[i]
            .iter()
            .filter(|&&q| active[q])
            .map(|&q| find(&mut parent, q))
            .collect();
        roots.sort_unstable_by_key(|&r| rank[summit[r]]);
        roots.dedup();

        let Some((&survivor, merged)) = roots.split_first() else {
            // new local maximum
            prominence.insert(i, f64::NAN);
            continue;
        };
        for &root in merged {
            let lower = summit[root];
            prominence.insert(lower, component.values[lower] - component.values[i]);
            parent[root] = survivor;
        }
        parent[i] = survivor;
    }

    let mut peaks: Vec<Peak> = prominence
        .into_iter()
        .map(|(i, p)| Peak {
            cell: component.cells[i],
            height: component.values[i],
            // the global maximum never meets a higher basin
            prominence: if p.is_nan() { component.values[i] } else { p },
        })
        .collect();
    peaks.sort_by(|a, b| {
        b.height
            .total_cmp(&a.height)
            .then_with(|| a.cell.cmp(&b.cell))
    });
    peaks
}

/// Peaks of a component sorted from highest, with their prominence.
pub fn find_peaks(
    cells: &[(usize, usize)],
    surface: &ArrayView2<f64>,
    grid: &GridGeometry,
    connectivity: Connectivity,
) -> Vec<Peak> {
    if cells.is_empty() {
        return Vec::new();
    }
    peaks(&Component::new(cells, surface, grid, connectivity))
}

/// Split one component into single-dome sub-regions.
///
/// Returns the component unchanged (as a single group) unless it carries at
/// least two independent domes. Otherwise every cell is assigned to the dome
/// whose flood reaches it first in descending-value order. Groups are ordered
/// by their dome's height.
pub fn split_domes(
    cells: &[(usize, usize)],
    surface: &ArrayView2<f64>,
    grid: &GridGeometry,
    connectivity: Connectivity,
    max_ph_ratio: f64,
) -> Vec<Vec<(usize, usize)>> {
    if cells.len() < 3 {
        return vec![cells.to_vec()];
    }
    let component = Component::new(cells, surface, grid, connectivity);
    let seeds: Vec<Peak> = peaks(&component)
        .into_iter()
        .enumerate()
        .filter(|(rank, p)| *rank == 0 || (p.height > 0.0 && p.ratio() > max_ph_ratio))
        .map(|(_, p)| p)
        .collect();
    if seeds.len() < 2 {
        return vec![cells.to_vec()];
    }
    log::debug!(
        "splitting {}-cell component into {} domes",
        cells.len(),
        seeds.len()
    );

    let index: HashMap<(usize, usize), usize> =
        cells.iter().enumerate().map(|(i, &c)| (c, i)).collect();
    let mut owner: Vec<Option<usize>> = vec![None; cells.len()];
    let mut heap = BinaryHeap::new();
    for (dome, seed) in seeds.iter().enumerate() {
        if let Some(&i) = index.get(&seed.cell) {
            owner[i] = Some(dome);
            heap.push(WatershedItem {
                value: component.values[i],
                index: i,
            });
        }
    }

    while let Some(item) = heap.pop() {
        let Some(dome) = owner[item.index] else {
            continue;
        };
        for &q in &component.adjacency[item.index] {
            if owner[q].is_none() {
                owner[q] = Some(dome);
                heap.push(WatershedItem {
                    value: component.values[q],
                    index: q,
                });
            }
        }
    }

    let mut groups = vec![Vec::new(); seeds.len()];
    for (i, dome) in owner.into_iter().enumerate() {
        if let Some(dome) = dome {
            groups[dome].push(cells[i]);
        }
    }
    groups.retain(|g| !g.is_empty());
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;
    use test_helpers::synthetic::linear_axis;

    fn strip(values: &[f64]) -> (Array2<f64>, GridGeometry, Vec<(usize, usize)>) {
        let surface = Array2::from_shape_vec((1, values.len()), values.to_vec()).unwrap();
        let grid = GridGeometry::new(&[40.0], &linear_axis(0.0, 1.0, values.len()), false);
        let cells = (0..values.len()).map(|j| (0, j)).collect();
        (surface, grid, cells)
    }

    #[test]
    fn test_prominence_of_secondary_peak() {
        let (surface, grid, cells) = strip(&[1.0, 5.0, 9.0, 5.0, 2.0, 5.0, 8.0, 5.0, 1.0]);
        let peaks = find_peaks(&cells, &surface.view(), &grid, Connectivity::Eight);
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[0].cell, (0, 2));
        assert_relative_eq!(peaks[0].prominence, 9.0);
        assert_eq!(peaks[1].cell, (0, 6));
        assert_relative_eq!(peaks[1].prominence, 6.0);
        assert_relative_eq!(peaks[1].ratio(), 0.75);
    }

    #[test]
    fn test_deep_saddle_splits() {
        let (surface, grid, cells) = strip(&[1.0, 5.0, 9.0, 5.0, 2.0, 5.0, 8.0, 5.0, 1.0]);
        let groups = split_domes(&cells, &surface.view(), &grid, Connectivity::Eight, 0.7);
        assert_eq!(groups.len(), 2);
        assert!(groups[0].contains(&(0, 2)));
        assert!(groups[1].contains(&(0, 6)));
        let total: usize = groups.iter().map(Vec::len).sum();
        assert_eq!(total, cells.len());
        assert!(groups[0].iter().all(|&(_, j)| j <= 4));
        assert!(groups[1].iter().all(|&(_, j)| j >= 4));
    }

    #[test]
    fn test_shallow_saddle_stays_merged() {
        let (surface, grid, cells) = strip(&[1.0, 5.0, 9.0, 5.0, 4.0, 5.0, 8.0, 5.0, 1.0]);
        let groups = split_domes(&cells, &surface.view(), &grid, Connectivity::Eight, 0.7);
        assert_eq!(groups, vec![cells]);
    }

    #[test]
    fn test_ratio_equal_to_limit_stays_merged() {
        // secondary peak 10 over saddle 3: ratio exactly 0.7
        let (surface, grid, cells) = strip(&[12.0, 6.0, 3.0, 6.0, 10.0]);
        let groups = split_domes(&cells, &surface.view(), &grid, Connectivity::Eight, 0.7);
        assert_eq!(groups.len(), 1);
        let groups = split_domes(&cells, &surface.view(), &grid, Connectivity::Eight, 0.69);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_plateau_is_one_peak() {
        let (surface, grid, cells) = strip(&[3.0, 3.0, 3.0, 3.0]);
        let peaks = find_peaks(&cells, &surface.view(), &grid, Connectivity::Four);
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].cell, (0, 0));
    }

    #[test]
    fn test_split_is_deterministic() {
        let surface = Array2::from_shape_fn((5, 9), |(i, j)| {
            let a = 10.0 - ((i as f64 - 2.0).powi(2) + (j as f64 - 1.0).powi(2));
            let b = 9.0 - ((i as f64 - 2.0).powi(2) + (j as f64 - 7.0).powi(2));
            a.max(b)
        });
        let grid = GridGeometry::new(&linear_axis(30.0, 1.0, 5), &linear_axis(0.0, 1.0, 9), false);
        let cells: Vec<_> = surface.indexed_iter().map(|(c, _)| c).collect();
        let first = split_domes(&cells, &surface.view(), &grid, Connectivity::Eight, 0.5);
        let second = split_domes(&cells, &surface.view(), &grid, Connectivity::Eight, 0.5);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }
}
