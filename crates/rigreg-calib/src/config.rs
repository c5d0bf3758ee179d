use std::path::Path;

use rigreg_3d::rgbd::DepthOptions;
use rigreg_icp::IcpConvergenceCriteria;
use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;

/// ICP refinement parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcpConfig {
    /// Maximum correspondence distance in meters.
    pub threshold: f64,
    /// Iteration cap.
    pub max_iterations: usize,
    /// Stop when the mean error changes less than this between iterations.
    pub tolerance: f64,
}

impl Default for IcpConfig {
    fn default() -> Self {
        let criteria = IcpConvergenceCriteria::default();
        Self {
            threshold: criteria.max_correspondence_distance,
            max_iterations: criteria.max_iterations,
            tolerance: criteria.tolerance,
        }
    }
}

impl IcpConfig {
    /// The convergence criteria handed to ICP.
    pub fn criteria(&self) -> IcpConvergenceCriteria {
        IcpConvergenceCriteria {
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
            max_correspondence_distance: self.threshold,
        }
    }
}

/// Frame synchronization parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Largest timestamp difference, in microseconds, accepted as the same capture.
    pub tolerance_us: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { tolerance_us: 1_000 }
    }
}

/// Everything the registration pipeline can be tuned with.
///
/// Missing fields in a JSON file fall back to their defaults, so `{}` is a
/// valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// ICP refinement.
    pub icp: IcpConfig,
    /// Frame synchronization.
    pub sync: SyncConfig,
    /// Depth conversion.
    pub depth: DepthOptions,
    /// How many picking sessions a pair gets before it is given up.
    pub max_pick_attempts: usize,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            icp: IcpConfig::default(),
            sync: SyncConfig::default(),
            depth: DepthOptions::default(),
            max_pick_attempts: 3,
        }
    }
}

impl RegistrationConfig {
    /// Parse a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, CalibrationError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| CalibrationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CalibrationError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            CalibrationError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if !(self.icp.threshold.is_finite() && self.icp.threshold > 0.0) {
            return Err(CalibrationError::Config(format!(
                "icp.threshold must be positive, got {}",
                self.icp.threshold
            )));
        }
        if !(self.icp.tolerance.is_finite() && self.icp.tolerance >= 0.0) {
            return Err(CalibrationError::Config(format!(
                "icp.tolerance must be non-negative, got {}",
                self.icp.tolerance
            )));
        }
        if !(self.depth.depth_scale.is_finite() && self.depth.depth_scale > 0.0) {
            return Err(CalibrationError::Config(format!(
                "depth.depth_scale must be positive, got {}",
                self.depth.depth_scale
            )));
        }
        if self.depth.depth_trunc.is_nan() || self.depth.depth_trunc <= 0.0 {
            return Err(CalibrationError::Config(format!(
                "depth.depth_trunc must be positive, got {}",
                self.depth.depth_trunc
            )));
        }
        if self.max_pick_attempts == 0 {
            return Err(CalibrationError::Config(
                "max_pick_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
