#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod correspondence;
pub use correspondence::*;

mod icp_vanilla;
pub use icp_vanilla::*;

mod ops;
pub use ops::{compute_centroids, fit_transformation};

/// Minimum number of point pairs needed to fix a rigid transform.
pub const MIN_CORRESPONDENCES: usize = 3;

/// Errors raised by the alignment routines.
#[derive(Debug, thiserror::Error)]
pub enum IcpError {
    /// Not enough picked pairs, or the two pick sequences differ in length.
    #[error("at least 3 matching picks are required, got {source_len} source and {target_len} target")]
    InsufficientCorrespondences {
        /// Number of source picks.
        source_len: usize,
        /// Number of target picks.
        target_len: usize,
    },

    /// A picked index does not address a point of its cloud.
    #[error("{cloud} index {index} is out of bounds for a cloud of {len} points")]
    IndexOutOfBounds {
        /// Which cloud the index refers to.
        cloud: &'static str,
        /// The offending index.
        index: usize,
        /// The number of points in that cloud.
        len: usize,
    },

    /// Registration needs points on both sides.
    #[error("point cloud is empty")]
    EmptyPointCloud,

    /// Paired point slices must have the same length.
    #[error("mismatched lengths: {0} source points and {1} target points")]
    MismatchedLengths(usize, usize),
}
