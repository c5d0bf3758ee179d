#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Sequence registration: apply stored transforms to every synchronized frame.
pub mod batch;

/// Registration configuration.
pub mod config;

/// Capture devices and their on-disk layout.
pub mod device;

/// Error types for the calibration pipeline.
pub mod error;

/// Resolution of command line inputs into devices or point clouds.
pub mod inputs;

/// Correspondence picking.
pub mod picker;

/// Persistence of per-pair transforms.
pub mod persistence;

/// Pairwise and rig registration.
pub mod registration;

/// Timestamp synchronization across devices.
pub mod sync;

pub use error::CalibrationError;
