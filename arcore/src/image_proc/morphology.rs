//! Grayscale and binary morphology on the (time, lat, lon) lattice.
//!
//! Provides the top-hat-by-reconstruction (THR) background/anomaly
//! decomposition used ahead of segmentation:
//!
//! 1. **Erosion** with an ellipsoidal (or cube) structuring element gives a
//!    marker field that has lost every feature narrower than the kernel.
//! 2. **Reconstruction by dilation** grows the marker back under the raw
//!    field until nothing changes. The result is the smooth background.
//! 3. **Anomaly** is raw minus background, non-negative by construction.
//!
//! Neighborhoods are truncated at time and latitude boundaries. Longitude
//! either wraps (zonally cyclic grids) or is truncated as well.
//!
//! The reconstruction is a priority-queue propagation rather than repeated
//! full-lattice dilations: cells are processed in descending order, each cell
//! settles the first time it is popped, so the fixed point is reached after a
//! bounded number of queue operations.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis, Zip};

use crate::config::{DecompositionConfig, DecompositionMode, KernelConfig, ReconstructionFootprint};
use crate::error::ArError;
use crate::field::Field3D;
use crate::geo::GridGeometry;

/// Boolean 3-D neighborhood with half extents `(t_half, s_half, s_half)`.
#[derive(Debug, Clone)]
pub struct StructuringElement {
    t_half: usize,
    s_half: usize,
    is_cube: bool,
    offsets: Vec<(isize, isize, isize)>,
}

impl StructuringElement {
    /// Integer offsets inside the ellipsoid
    /// `(dt/t_half)^2 + (dy/s_half)^2 + (dx/s_half)^2 <= 1`.
    ///
    /// A zero half extent collapses that dimension to the center plane.
    pub fn ellipsoid(t_half: usize, s_half: usize) -> Self {
        let term = |d: isize, half: usize| -> f64 {
            if half == 0 {
                0.0
            } else {
                (d as f64 / half as f64).powi(2)
            }
        };
        let (th, sh) = (t_half as isize, s_half as isize);
        let mut offsets = Vec::new();
        for dt in -th..=th {
            for dy in -sh..=sh {
                for dx in -sh..=sh {
                    if term(dt, t_half) + term(dy, s_half) + term(dx, s_half) <= 1.0 + 1e-12 {
                        offsets.push((dt, dy, dx));
                    }
                }
            }
        }
        Self {
            t_half,
            s_half,
            is_cube: false,
            offsets,
        }
    }

    /// Every offset in the bounding box.
    pub fn cube(t_half: usize, s_half: usize) -> Self {
        let (th, sh) = (t_half as isize, s_half as isize);
        let mut offsets = Vec::with_capacity((2 * t_half + 1) * (2 * s_half + 1).pow(2));
        for dt in -th..=th {
            for dy in -sh..=sh {
                for dx in -sh..=sh {
                    offsets.push((dt, dy, dx));
                }
            }
        }
        Self {
            t_half,
            s_half,
            is_cube: true,
            offsets,
        }
    }

    /// Ellipsoid, or cube when the kernel is large and the policy allows it.
    pub fn from_config(kernel: &KernelConfig) -> Self {
        let large = kernel.t_half >= kernel.cube_t_half || kernel.s_half >= kernel.cube_s_half;
        if kernel.allow_cube && large {
            Self::cube(kernel.t_half, kernel.s_half)
        } else {
            Self::ellipsoid(kernel.t_half, kernel.s_half)
        }
    }

    /// The 26-neighborhood plus center.
    pub fn unit() -> Self {
        Self::cube(1, 1)
    }

    pub fn half_extents(&self) -> (usize, usize) {
        (self.t_half, self.s_half)
    }

    pub fn is_cube(&self) -> bool {
        self.is_cube
    }

    /// All (dt, dy, dx) offsets including the center.
    pub fn offsets(&self) -> &[(isize, isize, isize)] {
        &self.offsets
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Dense boolean mask of shape `(2t+1, 2s+1, 2s+1)`.
    pub fn mask(&self) -> Array3<bool> {
        let (t, s) = (self.t_half, self.s_half);
        let mut mask = Array3::from_elem((2 * t + 1, 2 * s + 1, 2 * s + 1), false);
        for &(dt, dy, dx) in &self.offsets {
            mask[[
                (dt + t as isize) as usize,
                (dy + s as isize) as usize,
                (dx + s as isize) as usize,
            ]] = true;
        }
        mask
    }
}

/// Lattice index arithmetic shared by erosion and reconstruction.
#[derive(Debug, Clone, Copy)]
struct Lattice {
    nt: usize,
    ny: usize,
    nx: usize,
    lon_cyclic: bool,
}

impl Lattice {
    fn new(dim: (usize, usize, usize), lon_cyclic: bool) -> Self {
        Self {
            nt: dim.0,
            ny: dim.1,
            nx: dim.2,
            lon_cyclic,
        }
    }

    fn len(&self) -> usize {
        self.nt * self.ny * self.nx
    }

    fn flat(&self, t: usize, y: usize, x: usize) -> usize {
        (t * self.ny + y) * self.nx + x
    }

    fn unflat(&self, idx: usize) -> (usize, usize, usize) {
        let x = idx % self.nx;
        let y = (idx / self.nx) % self.ny;
        let t = idx / (self.nx * self.ny);
        (t, y, x)
    }

    /// Offset neighbor, truncated in time/lat and wrapped or truncated in lon.
    fn offset(&self, (t, y, x): (usize, usize, usize), (dt, dy, dx): (isize, isize, isize)) -> Option<usize> {
        let tt = t as isize + dt;
        let yy = y as isize + dy;
        if tt < 0 || tt >= self.nt as isize || yy < 0 || yy >= self.ny as isize {
            return None;
        }
        let mut xx = x as isize + dx;
        if self.lon_cyclic {
            xx = xx.rem_euclid(self.nx as isize);
        } else if xx < 0 || xx >= self.nx as isize {
            return None;
        }
        Some(self.flat(tt as usize, yy as usize, xx as usize))
    }
}

/// Grayscale erosion: pointwise minimum over the structuring element.
pub fn erode(field: &ArrayView3<f64>, se: &StructuringElement, lon_cyclic: bool) -> Array3<f64> {
    if se.is_cube() {
        let (t, s) = se.half_extents();
        return erode_separable(field, [t, s, s], lon_cyclic);
    }

    let lattice = Lattice::new(field.dim(), lon_cyclic);
    let src = field.as_standard_layout();
    let values = src.as_slice().unwrap_or(&[]);
    let mut out = Array3::zeros(field.dim());

    Zip::indexed(&mut out).par_for_each(|(t, y, x), out| {
        let mut m = f64::INFINITY;
        for &off in se.offsets() {
            if let Some(idx) = lattice.offset((t, y, x), off) {
                m = m.min(values[idx]);
            }
        }
        *out = m;
    });
    out
}

/// Cube erosion as three 1-D minimum filters, one per axis.
fn erode_separable(field: &ArrayView3<f64>, halves: [usize; 3], lon_cyclic: bool) -> Array3<f64> {
    let mut current = field.to_owned();
    for (axis, &half) in halves.iter().enumerate() {
        if half == 0 {
            continue;
        }
        let cyclic = axis == 2 && lon_cyclic;
        let mut next = Array3::zeros(current.dim());
        Zip::from(current.lanes(Axis(axis)))
            .and(next.lanes_mut(Axis(axis)))
            .par_for_each(|src, mut dst| {
                let n = src.len() as isize;
                let h = half as isize;
                for i in 0..n {
                    let mut m = f64::INFINITY;
                    for d in -h..=h {
                        let j = i + d;
                        let j = if cyclic {
                            j.rem_euclid(n)
                        } else if j < 0 || j >= n {
                            continue;
                        } else {
                            j
                        };
                        m = m.min(src[j as usize]);
                    }
                    dst[i as usize] = m;
                }
            });
        current = next;
    }
    current
}

/// Max-heap entry for the reconstruction queue.
#[derive(Debug, Clone, Copy)]
struct QueuedCell {
    value: f64,
    index: usize,
}

impl PartialEq for QueuedCell {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedCell {}

impl PartialOrd for QueuedCell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedCell {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value
            .total_cmp(&other.value)
            .then_with(|| other.index.cmp(&self.index))
    }
}

/// Outcome statistics of a reconstruction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconstructionStats {
    /// Cells settled (popped with a current value).
    pub settled: usize,
    /// Total queue pushes, including the initial seeding.
    pub pushes: usize,
}

/// Morphological reconstruction by dilation of `marker` under `mask`.
///
/// Computes the fixed point of `rec = min(dilate(rec), mask)` starting from
/// `min(marker, mask)`. The footprint must be symmetric.
///
/// Returns [`ArError::ReconstructionDiverged`] if the queue ever exceeds the
/// lattice bound of `cells * (footprint + 1)` pushes, which can only happen
/// if the propagation is broken.
pub fn reconstruct_by_dilation(
    marker: &ArrayView3<f64>,
    mask: &ArrayView3<f64>,
    footprint: &StructuringElement,
    lon_cyclic: bool,
) -> Result<(Array3<f64>, ReconstructionStats), ArError> {
    if marker.dim() != mask.dim() {
        return Err(ArError::InputShape {
            field: "marker".to_string(),
            expected: mask.shape().to_vec(),
            actual: marker.shape().to_vec(),
        });
    }

    let lattice = Lattice::new(mask.dim(), lon_cyclic);
    let mask_std = mask.as_standard_layout();
    let mask_values = mask_std.as_slice().unwrap_or(&[]);

    let mut rec: Vec<f64> = marker
        .as_standard_layout()
        .iter()
        .zip(mask_values)
        .map(|(&m, &up)| m.min(up))
        .collect();

    let neighbors: Vec<(isize, isize, isize)> = footprint
        .offsets()
        .iter()
        .copied()
        .filter(|&o| o != (0, 0, 0))
        .collect();
    let budget = lattice.len() * (neighbors.len() + 1);

    let mut heap: BinaryHeap<QueuedCell> = rec
        .iter()
        .enumerate()
        .map(|(index, &value)| QueuedCell { value, index })
        .collect();
    let mut pushes = heap.len();
    let mut settled = 0;

    while let Some(QueuedCell { value, index }) = heap.pop() {
        if value < rec[index] {
            continue;
        }
        settled += 1;
        let here = lattice.unflat(index);
        for &off in &neighbors {
            let Some(q) = lattice.offset(here, off) else {
                continue;
            };
            let candidate = value.min(mask_values[q]);
            if candidate > rec[q] {
                rec[q] = candidate;
                pushes += 1;
                if pushes > budget {
                    return Err(ArError::ReconstructionDiverged { budget });
                }
                heap.push(QueuedCell {
                    value: candidate,
                    index: q,
                });
            }
        }
    }

    let rec = Array3::from_shape_vec(mask.dim(), rec).map_err(|_| ArError::InputShape {
        field: "reconstruction".to_string(),
        expected: mask.shape().to_vec(),
        actual: vec![lattice.len()],
    })?;
    Ok((rec, ReconstructionStats { settled, pushes }))
}

/// Background and anomaly of one raw field.
#[derive(Debug, Clone)]
pub struct Decomposition {
    pub background: Field3D,
    pub anomaly: Field3D,
}

/// Splits a raw IVT field into background and anomaly.
#[derive(Debug, Clone)]
pub struct BackgroundDecomposer<'a> {
    config: &'a DecompositionConfig,
    lon_cyclic: bool,
}

impl<'a> BackgroundDecomposer<'a> {
    pub fn new(config: &'a DecompositionConfig, lon_cyclic: bool) -> Self {
        Self { config, lon_cyclic }
    }

    /// Structuring element implied by the kernel configuration.
    pub fn structuring_element(&self) -> StructuringElement {
        StructuringElement::from_config(&self.config.kernel)
    }

    /// Decompose according to the configured mode.
    ///
    /// `climatology` is a (lat, lon) mean and is required in climatology mode.
    pub fn decompose(
        &self,
        raw: &Field3D,
        climatology: Option<&Array2<f64>>,
    ) -> Result<Decomposition, ArError> {
        match self.config.mode {
            DecompositionMode::Thr => self.top_hat(raw),
            DecompositionMode::Climatology => {
                let clim = climatology
                    .ok_or_else(|| ArError::MissingField("climatology".to_string()))?;
                subtract_climatology(raw, &clim.view())
            }
        }
    }

    /// Top-hat by reconstruction.
    pub fn top_hat(&self, raw: &Field3D) -> Result<Decomposition, ArError> {
        let se = self.structuring_element();
        let footprint = match self.config.kernel.reconstruction {
            ReconstructionFootprint::Kernel => se.clone(),
            ReconstructionFootprint::Unit => StructuringElement::unit(),
        };
        log::info!(
            "THR on {:?}: {} kernel t={} s={} ({} offsets)",
            raw.shape(),
            if se.is_cube() { "cube" } else { "ellipsoid" },
            self.config.kernel.t_half,
            self.config.kernel.s_half,
            se.len()
        );

        let marker = erode(&raw.data().view(), &se, self.lon_cyclic);
        let (background, stats) =
            reconstruct_by_dilation(&marker.view(), &raw.data().view(), &footprint, self.lon_cyclic)?;
        log::debug!(
            "reconstruction settled {} cells with {} queue pushes",
            stats.settled,
            stats.pushes
        );

        let anomaly = raw.data() - &background;
        let axes = Arc::clone(raw.axes());
        Ok(Decomposition {
            background: Field3D::derived("ivt_rec", background, Arc::clone(&axes)),
            anomaly: Field3D::derived("ivt_ano", anomaly, axes),
        })
    }
}

/// Anomaly relative to a (lat, lon) climatological mean broadcast over time.
///
/// Values are not clamped: departures below the climatology stay negative.
pub fn subtract_climatology(
    raw: &Field3D,
    climatology: &ArrayView2<f64>,
) -> Result<Decomposition, ArError> {
    let (nt, ny, nx) = raw.shape();
    if climatology.dim() != (ny, nx) {
        return Err(ArError::InputShape {
            field: "climatology".to_string(),
            expected: vec![ny, nx],
            actual: climatology.shape().to_vec(),
        });
    }
    let count = climatology.iter().filter(|v| !v.is_finite()).count();
    if count > 0 {
        return Err(ArError::NonFinite {
            field: "climatology".to_string(),
            count,
        });
    }

    let background = climatology
        .broadcast((nt, ny, nx))
        .map(|b| b.to_owned())
        .ok_or_else(|| ArError::InputShape {
            field: "climatology".to_string(),
            expected: vec![nt, ny, nx],
            actual: climatology.shape().to_vec(),
        })?;
    let anomaly = raw.data() - &background;
    let axes = Arc::clone(raw.axes());
    Ok(Decomposition {
        background: Field3D::derived("ivt_rec", background, Arc::clone(&axes)),
        anomaly: Field3D::derived("ivt_ano", anomaly, axes),
    })
}

/// Binary closing (dilation then erosion) with a disk of `radius` cells.
///
/// Out-of-grid neighbors are ignored by both passes, so the result always
/// contains the input mask.
pub fn binary_closing(mask: &ArrayView2<bool>, radius: usize, grid: &GridGeometry) -> Array2<bool> {
    if radius == 0 {
        return mask.to_owned();
    }
    let r = radius as isize;
    let disk: Vec<(isize, isize)> = (-r..=r)
        .flat_map(|dy| (-r..=r).map(move |dx| (dy, dx)))
        .filter(|&(dy, dx)| dy * dy + dx * dx <= r * r)
        .collect();

    let dilated = Array2::from_shape_fn(mask.dim(), |(i, j)| {
        disk.iter()
            .filter_map(|&(dy, dx)| grid.neighbor(i, j, dy, dx))
            .any(|q| mask[q])
    });
    Array2::from_shape_fn(mask.dim(), |(i, j)| {
        disk.iter()
            .filter_map(|&(dy, dx)| grid.neighbor(i, j, dy, dx))
            .all(|q| dilated[q])
    })
}
