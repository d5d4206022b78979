use thiserror::Error;

/// Errors produced by the detection engine.
///
/// Every variant is fatal for the file being processed and nothing else; the
/// batch runner collects them per file.
#[derive(Error, Debug)]
pub enum ArError {
    /// Co-registered fields (flux, IVT, anomaly, climatology) disagree in shape.
    #[error("input shape mismatch for {field}: expected {expected:?}, got {actual:?}")]
    InputShape {
        /// Name of the offending field.
        field: String,
        /// Shape implied by the grid axes.
        expected: Vec<usize>,
        /// Shape actually supplied.
        actual: Vec<usize>,
    },

    /// A field required by the configured mode was not supplied.
    #[error("missing field: {0}")]
    MissingField(String),

    /// No positive anomaly anywhere in the batch to estimate a threshold from.
    #[error("no positive anomaly values to derive a threshold from")]
    EmptyAnomalyDistribution,

    /// Time, latitude or longitude metadata is absent or empty.
    #[error("missing or empty {0} axis")]
    MissingAxis(&'static str),

    /// Axis values are not strictly monotonic.
    #[error("{0} axis is not strictly monotonic")]
    NonMonotonicAxis(&'static str),

    /// The longitude axis cannot be treated as zonally cyclic.
    #[error("longitude axis does not span a uniform [0, 360) cycle: {0}")]
    NotCyclic(String),

    /// Field contains NaN or infinite values.
    #[error("{field} contains {count} non-finite values")]
    NonFinite {
        /// Name of the offending field.
        field: String,
        /// Number of non-finite cells.
        count: usize,
    },

    /// Candidate region is too small to carry a meaningful axis.
    #[error("degenerate geometry: {cells} cell(s), {path_len} axis vertices")]
    DegenerateGeometry {
        /// Cells in the candidate mask.
        cells: usize,
        /// Vertices in the extracted principal path.
        path_len: usize,
    },

    /// Reconstruction by dilation exceeded its propagation budget.
    #[error("reconstruction did not reach a fixed point within {budget} propagations")]
    ReconstructionDiverged {
        /// Upper bound on queue pushes for the lattice.
        budget: usize,
    },

    /// Configuration validation failure.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
