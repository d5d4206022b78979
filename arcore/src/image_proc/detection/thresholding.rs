//! Threshold selection and connected-component labeling of anomaly slices.
//!
//! # Threshold selection
//!
//! A run uses exactly one anomaly threshold for every time slice so that
//! detections stay comparable across time. It is either configured directly
//! or estimated once from the positive anomaly values of the whole batch
//! with a [`ThresholdEstimator`]:
//!
//! - [`Otsu`]: maximizes between-class variance of the value histogram.
//! - [`HistogramMode`]: walks right from the histogram mode until the count
//!   drops below a fraction (`sill`) of the modal count.
//!
//! # Connected components
//!
//! Two-pass labeling with union-find. The longitude seam of zonally cyclic
//! grids is handled with explicit union edges between the first and last
//! columns after the raster pass, so a region crossing the seam is labeled
//! once without padding the array.

use ndarray::{Array2, ArrayView2, ArrayView3};

use crate::config::{AutoThreshold, Connectivity, ThresholdSpec};
use crate::error::ArError;

/// Estimates a threshold from a sample of strictly positive values.
pub trait ThresholdEstimator: Send + Sync + std::fmt::Debug {
    /// `values` is non-empty and every entry is finite and > 0.
    fn estimate(&self, values: &[f64]) -> f64;
}

/// Equal-width histogram over `[0, max]`.
struct Histogram {
    counts: Vec<usize>,
    width: f64,
    max: f64,
}

impl Histogram {
    fn new(values: &[f64], bins: usize) -> Self {
        let bins = bins.max(1);
        let max = values.iter().copied().fold(0.0, f64::max);
        let width = if max > 0.0 { max / bins as f64 } else { 1.0 };
        let mut counts = vec![0; bins];
        for &v in values {
            let bin = ((v / width) as usize).min(bins - 1);
            counts[bin] += 1;
        }
        Self { counts, width, max }
    }

    fn lower_edge(&self, bin: usize) -> f64 {
        bin as f64 * self.width
    }

    fn upper_edge(&self, bin: usize) -> f64 {
        (bin + 1) as f64 * self.width
    }
}

/// Otsu's method on a `bins`-bin histogram.
///
/// Returns the upper edge of the bin that maximizes the between-class
/// variance, so values in that bin fall below the threshold.
#[derive(Debug, Clone, Copy)]
pub struct Otsu {
    pub bins: usize,
}

impl ThresholdEstimator for Otsu {
    fn estimate(&self, values: &[f64]) -> f64 {
        let hist = Histogram::new(values, self.bins);
        let total = values.len() as f64;

        let sum: f64 = hist
            .counts
            .iter()
            .enumerate()
            .map(|(i, &c)| i as f64 * c as f64)
            .sum();

        let mut sum_b = 0.0;
        let mut weight_b = 0.0;
        let mut max_variance = 0.0;
        let mut best = None;

        for (i, &count) in hist.counts.iter().enumerate() {
            weight_b += count as f64;
            if weight_b.abs() < f64::EPSILON {
                continue;
            }
            let weight_f = total - weight_b;
            if weight_f.abs() < f64::EPSILON {
                break;
            }

            sum_b += i as f64 * count as f64;
            let mean_b = sum_b / weight_b;
            let mean_f = (sum - sum_b) / weight_f;
            let variance = weight_b * weight_f * (mean_b - mean_f).powi(2);

            if variance > max_variance {
                max_variance = variance;
                best = Some(i);
            }
        }

        // single-valued sample: nothing to separate
        best.map_or(hist.max, |i| hist.upper_edge(i))
    }
}

/// Tail-of-mode estimator.
#[derive(Debug, Clone, Copy)]
pub struct HistogramMode {
    pub bins: usize,
    pub sill: f64,
}

impl ThresholdEstimator for HistogramMode {
    fn estimate(&self, values: &[f64]) -> f64 {
        let hist = Histogram::new(values, self.bins);
        let (mode, &modal) = hist
            .counts
            .iter()
            .enumerate()
            .fold((0, &0), |best, cur| if cur.1 > best.1 { cur } else { best });
        let floor = self.sill * modal as f64;

        hist.counts
            .iter()
            .enumerate()
            .skip(mode + 1)
            .find(|(_, &c)| (c as f64) < floor)
            .map_or(hist.max, |(i, _)| hist.lower_edge(i))
    }
}

/// Produces the single batch-wide anomaly threshold.
#[derive(Debug)]
pub enum ThresholdSelector {
    Fixed(f64),
    Estimated(Box<dyn ThresholdEstimator>),
}

impl ThresholdSelector {
    pub fn from_spec(spec: &ThresholdSpec) -> Self {
        match *spec {
            ThresholdSpec::Fixed(v) => ThresholdSelector::Fixed(v),
            ThresholdSpec::Auto(AutoThreshold::Otsu { bins }) => {
                ThresholdSelector::Estimated(Box::new(Otsu { bins }))
            }
            ThresholdSpec::Auto(AutoThreshold::HistogramMode { bins, sill }) => {
                ThresholdSelector::Estimated(Box::new(HistogramMode { bins, sill }))
            }
        }
    }

    /// Threshold for the whole anomaly batch.
    ///
    /// A fixed threshold is returned unchanged. Estimators see every positive
    /// anomaly value in the batch and fail with
    /// [`ArError::EmptyAnomalyDistribution`] if there are none.
    pub fn select(&self, anomaly: &ArrayView3<f64>) -> Result<f64, ArError> {
        match self {
            ThresholdSelector::Fixed(v) => Ok(*v),
            ThresholdSelector::Estimated(estimator) => {
                let positive: Vec<f64> = anomaly
                    .iter()
                    .copied()
                    .filter(|v| v.is_finite() && *v > 0.0)
                    .collect();
                if positive.is_empty() {
                    return Err(ArError::EmptyAnomalyDistribution);
                }
                let threshold = estimator.estimate(&positive);
                log::info!(
                    "estimated threshold {:.3} from {} positive anomalies with {:?}",
                    threshold,
                    positive.len(),
                    estimator
                );
                Ok(threshold)
            }
        }
    }
}

/// Binary mask of cells at or above `threshold`.
pub fn apply_threshold(image: &ArrayView2<f64>, threshold: f64) -> Array2<bool> {
    image.mapv(|v| v >= threshold)
}

/// Find the root label in a disjoint-set (union-find) data structure
fn find_root(labels: &mut [usize], label: usize) -> usize {
    let mut current = label;

    while current != labels[current] {
        // path halving
        labels[current] = labels[labels[current]];
        current = labels[current];
    }

    current
}

/// Union two labels; the smaller root becomes the parent.
fn union_labels(labels: &mut [usize], label1: usize, label2: usize) -> usize {
    let root1 = find_root(labels, label1);
    let root2 = find_root(labels, label2);

    if root1 == root2 {
        return root1;
    }
    if root1 < root2 {
        labels[root2] = root1;
        root1
    } else {
        labels[root1] = root2;
        root2
    }
}

/// Already-visited neighbors in raster order.
fn backward_offsets(connectivity: Connectivity) -> &'static [(isize, isize)] {
    match connectivity {
        Connectivity::Four => &[(-1, 0), (0, -1)],
        Connectivity::Eight => &[(-1, -1), (-1, 0), (-1, 1), (0, -1)],
    }
}

/// Label connected foreground regions of a lat/lon mask.
///
/// Background is 0 and regions are numbered 1.. in order of their first cell
/// in raster order. With `cyclic` set, cells in the first and last columns
/// are adjacent (including diagonally under 8-connectivity).
pub fn connected_components(
    mask: &ArrayView2<bool>,
    connectivity: Connectivity,
    cyclic: bool,
) -> Array2<u32> {
    let (height, width) = mask.dim();
    let mut provisional: Array2<usize> = Array2::zeros((height, width));
    // slot 0 is background
    let mut parent_table = vec![0];
    let offsets = backward_offsets(connectivity);

    for i in 0..height {
        for j in 0..width {
            if !mask[[i, j]] {
                continue;
            }

            let mut neighbor_labels = Vec::with_capacity(offsets.len());
            for &(di, dj) in offsets {
                let ni = i as isize + di;
                let nj = j as isize + dj;
                if ni < 0 || nj < 0 || nj >= width as isize {
                    continue;
                }
                let label = provisional[[ni as usize, nj as usize]];
                if label > 0 {
                    neighbor_labels.push(label);
                }
            }

            match neighbor_labels.iter().copied().min() {
                None => {
                    let label = parent_table.len();
                    parent_table.push(label);
                    provisional[[i, j]] = label;
                }
                Some(min_label) => {
                    provisional[[i, j]] = min_label;
                    for &other in &neighbor_labels {
                        if other != min_label {
                            union_labels(&mut parent_table, min_label, other);
                        }
                    }
                }
            }
        }
    }

    if cyclic && width > 1 {
        let last = width - 1;
        let seam_rows: &[isize] = match connectivity {
            Connectivity::Four => &[0],
            Connectivity::Eight => &[-1, 0, 1],
        };
        for i in 0..height {
            let a = provisional[[i, 0]];
            if a == 0 {
                continue;
            }
            for &di in seam_rows {
                let ni = i as isize + di;
                if ni < 0 || ni >= height as isize {
                    continue;
                }
                let b = provisional[[ni as usize, last]];
                if b > 0 {
                    union_labels(&mut parent_table, a, b);
                }
            }
        }
    }

    for i in 1..parent_table.len() {
        find_root(&mut parent_table, i);
    }

    let mut relabel_map = vec![0u32; parent_table.len()];
    let mut next_label = 1;
    for i in 1..parent_table.len() {
        let root = find_root(&mut parent_table, i);
        if relabel_map[root] == 0 {
            relabel_map[root] = next_label;
            next_label += 1;
        }
        relabel_map[i] = relabel_map[root];
    }

    provisional.mapv(|label| relabel_map[label])
}

/// Cells of each labeled region, indexed by `label - 1`, in raster order.
pub fn region_cells(labels: &ArrayView2<u32>) -> Vec<Vec<(usize, usize)>> {
    let count = labels.iter().copied().max().unwrap_or(0) as usize;
    let mut regions = vec![Vec::new(); count];
    for ((i, j), &label) in labels.indexed_iter() {
        if label > 0 {
            regions[label as usize - 1].push((i, j));
        }
    }
    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    /// Mask from a visual pattern of 0s and 1s.
    fn create_mask(pattern: &[&[u8]]) -> Array2<bool> {
        let height = pattern.len();
        let width = pattern[0].len();
        Array2::from_shape_fn((height, width), |(i, j)| pattern[i][j] != 0)
    }

    fn assert_labels_match(labeled: &Array2<u32>, expected: &[&[u32]]) {
        for (i, row) in expected.iter().enumerate() {
            for (j, &value) in row.iter().enumerate() {
                assert_eq!(
                    labeled[[i, j]],
                    value,
                    "Mismatch at position [{i}, {j}]: expected {value}, got {}",
                    labeled[[i, j]]
                );
            }
        }
    }

    #[test]
    fn test_empty_mask() {
        let mask = Array2::from_elem((4, 6), false);
        let labeled = connected_components(&mask.view(), Connectivity::Eight, true);
        assert!(labeled.iter().all(|&l| l == 0));
        assert!(region_cells(&labeled.view()).is_empty());
    }

    #[test]
    fn test_u_shape_merges() {
        // fmt-ignore
        let mask = create_mask(&[
            &[0, 0, 0, 0, 0],
            &[0, 1, 0, 1, 0],
            &[0, 1, 0, 1, 0],
            &[0, 1, 1, 1, 0],
            &[0, 0, 0, 0, 0],
        ]);
        let labeled = connected_components(&mask.view(), Connectivity::Four, false);
        // fmt-ignore
        assert_labels_match(&labeled, &[
            &[0, 0, 0, 0, 0],
            &[0, 1, 0, 1, 0],
            &[0, 1, 0, 1, 0],
            &[0, 1, 1, 1, 0],
            &[0, 0, 0, 0, 0],
        ]);
    }

    #[test]
    fn test_spiral_single_component() {
        // fmt-ignore
        let mask = create_mask(&[
            &[0, 0, 0, 0, 0, 0, 0],
            &[0, 1, 1, 1, 1, 1, 0],
            &[0, 1, 0, 0, 0, 1, 0],
            &[0, 1, 0, 1, 1, 1, 0],
            &[0, 1, 0, 1, 0, 0, 0],
            &[0, 1, 1, 1, 0, 0, 0],
            &[0, 0, 0, 0, 0, 0, 0],
        ]);
        let labeled = connected_components(&mask.view(), Connectivity::Four, false);
        assert_eq!(labeled.iter().copied().max(), Some(1));
    }

    #[test]
    fn test_diagonals_depend_on_connectivity() {
        // fmt-ignore
        let mask = create_mask(&[
            &[1, 0, 0, 0],
            &[0, 1, 0, 0],
            &[0, 0, 0, 1],
            &[0, 0, 1, 0],
        ]);
        let four = connected_components(&mask.view(), Connectivity::Four, false);
        // fmt-ignore
        assert_labels_match(&four, &[
            &[1, 0, 0, 0],
            &[0, 2, 0, 0],
            &[0, 0, 0, 3],
            &[0, 0, 4, 0],
        ]);

        let eight = connected_components(&mask.view(), Connectivity::Eight, false);
        // fmt-ignore
        assert_labels_match(&eight, &[
            &[1, 0, 0, 0],
            &[0, 1, 0, 0],
            &[0, 0, 0, 2],
            &[0, 0, 2, 0],
        ]);
    }

    #[test]
    fn test_anti_diagonal_equivalence() {
        // the up-right neighbor joins two provisional labels under 8-connectivity
        // fmt-ignore
        let mask = create_mask(&[
            &[0, 0, 1],
            &[1, 1, 0],
        ]);
        let labeled = connected_components(&mask.view(), Connectivity::Eight, false);
        // fmt-ignore
        assert_labels_match(&labeled, &[
            &[0, 0, 1],
            &[1, 1, 0],
        ]);
    }

    #[test]
    fn test_seam_merges_only_when_cyclic() {
        // fmt-ignore
        let mask = create_mask(&[
            &[0, 0, 0, 0, 0, 0],
            &[1, 1, 0, 0, 0, 1],
            &[1, 0, 0, 0, 1, 1],
            &[0, 0, 0, 0, 0, 0],
        ]);
        let regional = connected_components(&mask.view(), Connectivity::Four, false);
        assert_eq!(regional.iter().copied().max(), Some(2));

        let cyclic = connected_components(&mask.view(), Connectivity::Four, true);
        // fmt-ignore
        assert_labels_match(&cyclic, &[
            &[0, 0, 0, 0, 0, 0],
            &[1, 1, 0, 0, 0, 1],
            &[1, 0, 0, 0, 1, 1],
            &[0, 0, 0, 0, 0, 0],
        ]);
    }

    #[test]
    fn test_seam_diagonal_needs_eight_connectivity() {
        // fmt-ignore
        let mask = create_mask(&[
            &[1, 0, 0, 0],
            &[0, 0, 0, 1],
        ]);
        let four = connected_components(&mask.view(), Connectivity::Four, true);
        assert_eq!(four.iter().copied().max(), Some(2));
        let eight = connected_components(&mask.view(), Connectivity::Eight, true);
        assert_eq!(eight.iter().copied().max(), Some(1));
        assert_eq!(region_cells(&eight.view())[0], vec![(0, 0), (1, 3)]);
    }

    #[test]
    fn test_single_column_cyclic_is_not_doubled() {
        let mask = Array2::from_elem((3, 1), true);
        let labeled = connected_components(&mask.view(), Connectivity::Eight, true);
        assert!(labeled.iter().all(|&l| l == 1));
    }

    #[test]
    fn test_disjoint_set_operations() {
        let mut labels: Vec<usize> = (0..9).collect();
        union_labels(&mut labels, 1, 2);
        union_labels(&mut labels, 3, 4);
        union_labels(&mut labels, 5, 6);
        union_labels(&mut labels, 7, 8);
        union_labels(&mut labels, 1, 3);
        union_labels(&mut labels, 5, 7);
        assert_ne!(find_root(&mut labels, 1), find_root(&mut labels, 5));
        union_labels(&mut labels, 8, 4);
        let root = find_root(&mut labels, 1);
        assert_eq!(root, 1);
        for i in 1..=8 {
            assert_eq!(find_root(&mut labels, i), root);
        }
    }

    #[test]
    fn test_apply_threshold_is_inclusive() {
        let image = Array2::from_shape_vec((1, 3), vec![249.9, 250.0, 300.0]).unwrap();
        let mask = apply_threshold(&image.view(), 250.0);
        assert_eq!(mask.iter().copied().collect::<Vec<_>>(), vec![false, true, true]);
    }

    #[test]
    fn test_fixed_threshold_is_returned_unchanged() {
        let selector = ThresholdSelector::from_spec(&ThresholdSpec::Fixed(250.0));
        let anomaly = Array3::<f64>::zeros((2, 2, 2));
        assert_eq!(selector.select(&anomaly.view()).unwrap(), 250.0);
    }

    #[test]
    fn test_estimator_without_positive_values() {
        let selector = ThresholdSelector::from_spec(&ThresholdSpec::Auto(AutoThreshold::Otsu {
            bins: 64,
        }));
        let anomaly = Array3::<f64>::zeros((2, 3, 3));
        assert!(matches!(
            selector.select(&anomaly.view()),
            Err(ArError::EmptyAnomalyDistribution)
        ));
    }

    #[test]
    fn test_otsu_separates_bimodal_sample() {
        let mut values: Vec<f64> = (0..500).map(|i| 10.0 + (i % 11) as f64).collect();
        values.extend((0..500).map(|i| 290.0 + (i % 11) as f64));
        let t = Otsu { bins: 256 }.estimate(&values);
        assert!(t > 20.0 && t < 290.0, "threshold {t}");
    }

    #[test]
    fn test_histogram_mode_tail() {
        let mut values = vec![5.0; 100];
        values.extend(vec![15.0; 50]);
        values.extend(vec![25.0; 5]);
        values.push(95.0);
        // ten bins of width 9.5: counts 100, 50, 5, 0, ...
        let t = HistogramMode { bins: 10, sill: 0.1 }.estimate(&values);
        assert_relative_eq!(t, 19.0, epsilon = 1e-12);
    }

    #[test]
    fn test_batch_wide_selection_uses_every_slice() {
        // positives only in the last slice still produce a threshold
        let mut anomaly = Array3::<f64>::zeros((3, 2, 2));
        anomaly[[2, 0, 0]] = 10.0;
        anomaly[[2, 1, 1]] = 400.0;
        let selector = ThresholdSelector::from_spec(&ThresholdSpec::Auto(
            AutoThreshold::HistogramMode { bins: 4, sill: 0.5 },
        ));
        let t = selector.select(&anomaly.view()).unwrap();
        assert_relative_eq!(t, 100.0, epsilon = 1e-12);
    }
}
