use rigreg_3d::{io::pcd::PcdError, rgbd::RgbdError, transforms::TransformError};
use rigreg_icp::IcpError;
use rigreg_io::IoError;

/// An error type for the calibration pipeline.
#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    /// A color/depth frame or its intrinsics cannot be turned into a point cloud.
    #[error("Invalid frame data: {0}")]
    InvalidFrameData(String),

    /// The picking session did not yield a usable set of pairs.
    #[error(
        "Insufficient correspondences: {source_len} source and {target_len} target picks, \
         at least 3 matching picks are required"
    )]
    InsufficientCorrespondences {
        /// Number of picks on the source (sub) cloud.
        source_len: usize,
        /// Number of picks on the target (master) cloud.
        target_len: usize,
    },

    /// Alignment failed.
    #[error("Registration failed: {0}")]
    Registration(#[source] IcpError),

    /// Image, depth or array file error.
    #[error(transparent)]
    Io(#[from] IoError),

    /// Point cloud file error.
    #[error(transparent)]
    Pcd(#[from] PcdError),

    /// A stored or estimated transform is not rigid.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// The configuration could not be loaded.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The command line inputs are unusable.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The requested row is not in the synchronized table.
    #[error("Frame {index} is out of range for a synchronized table of {len} rows")]
    FrameOutOfRange {
        /// Requested row.
        index: usize,
        /// Number of rows.
        len: usize,
    },

    /// No frame could be matched across all devices.
    #[error("No synchronized frames across devices")]
    EmptySyncTable,
}

impl From<IcpError> for CalibrationError {
    fn from(err: IcpError) -> Self {
        match err {
            IcpError::InsufficientCorrespondences {
                source_len,
                target_len,
            } => CalibrationError::InsufficientCorrespondences {
                source_len,
                target_len,
            },
            other => CalibrationError::Registration(other),
        }
    }
}

impl From<RgbdError> for CalibrationError {
    fn from(err: RgbdError) -> Self {
        CalibrationError::InvalidFrameData(err.to_string())
    }
}

impl From<std::io::Error> for CalibrationError {
    fn from(err: std::io::Error) -> Self {
        CalibrationError::Io(IoError::FileError(err))
    }
}
