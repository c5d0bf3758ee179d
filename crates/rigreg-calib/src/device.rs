use std::path::{Path, PathBuf};

use rigreg_3d::{
    camera::PinholeCameraIntrinsic,
    pointcloud::PointCloud,
    rgbd::{rgbd_to_pointcloud, DepthOptions, RGBDImage},
};
use rigreg_io::{depth::read_depth, png::read_image_png_rgb8, IoError};

use crate::error::CalibrationError;

/// Directory holding the color frames, `<ts>_rgb.png`.
pub const COLOR_DIR: &str = "color";
/// Directory holding the depth frames, `<ts>_depth.dat`.
pub const DEPTH_DIR: &str = "depths";
/// Pinhole intrinsics of the color-aligned depth camera.
pub const INTRINSICS_FILE: &str = "intrinsics.json";
/// Per-device output of the batch registration.
pub const REGISTERED_DIR: &str = "pointclouds_registered";
/// Master-device output holding the merged clouds.
pub const MERGED_DIR: &str = "pointclouds_merged";

const COLOR_SUFFIX: &str = "_rgb.png";
const DEPTH_SUFFIX: &str = "_depth.dat";

/// The part a device plays in the rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceRole {
    /// The reference device; every transform maps into its frame.
    Master,
    /// The `k`-th subordinate device, counted from 1.
    Sub(usize),
}

/// A capture device rooted at its recording directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    role: DeviceRole,
    root: PathBuf,
}

impl Device {
    /// Create a device with an explicit role.
    pub fn new(role: DeviceRole, root: impl Into<PathBuf>) -> Self {
        Self {
            role,
            root: root.into(),
        }
    }

    /// The master device.
    pub fn master(root: impl Into<PathBuf>) -> Self {
        Self::new(DeviceRole::Master, root)
    }

    /// The `k`-th sub device.
    pub fn sub(k: usize, root: impl Into<PathBuf>) -> Self {
        Self::new(DeviceRole::Sub(k), root)
    }

    /// The role of the device.
    pub fn role(&self) -> DeviceRole {
        self.role
    }

    /// The recording directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The device name, i.e. the name of its recording directory.
    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string())
    }

    /// Path of the color frame captured at `timestamp`.
    pub fn color_path(&self, timestamp: u64) -> PathBuf {
        self.root
            .join(COLOR_DIR)
            .join(format!("{timestamp}{COLOR_SUFFIX}"))
    }

    /// Path of the depth frame captured at `timestamp`.
    pub fn depth_path(&self, timestamp: u64) -> PathBuf {
        self.root
            .join(DEPTH_DIR)
            .join(format!("{timestamp}{DEPTH_SUFFIX}"))
    }

    /// Path of the intrinsics file.
    pub fn intrinsics_path(&self) -> PathBuf {
        self.root.join(INTRINSICS_FILE)
    }

    /// Directory receiving this device's registered clouds.
    pub fn registered_dir(&self) -> PathBuf {
        self.root.join(REGISTERED_DIR)
    }

    /// Directory receiving the merged clouds.
    pub fn merged_dir(&self) -> PathBuf {
        self.root.join(MERGED_DIR)
    }

    /// List the timestamps with both a color and a depth frame, ascending.
    pub fn timestamps(&self) -> Result<Vec<u64>, CalibrationError> {
        let color_dir = self.root.join(COLOR_DIR);
        if !color_dir.is_dir() {
            return Err(IoError::FileDoesNotExist(color_dir).into());
        }

        let mut timestamps = Vec::new();
        for entry in std::fs::read_dir(&color_dir)? {
            let file_name = entry?.file_name();
            let Some(stem) = file_name
                .to_str()
                .and_then(|name| name.strip_suffix(COLOR_SUFFIX))
            else {
                continue;
            };
            let Ok(timestamp) = stem.parse::<u64>() else {
                log::debug!("skipping {:?}: not a timestamp", file_name);
                continue;
            };
            if !self.depth_path(timestamp).is_file() {
                log::debug!("{}: no depth frame for timestamp {}", self.name(), timestamp);
                continue;
            }
            timestamps.push(timestamp);
        }
        timestamps.sort_unstable();

        log::debug!("{}: {} frames", self.name(), timestamps.len());

        Ok(timestamps)
    }

    /// Read the pinhole intrinsics of the device.
    pub fn load_intrinsics(&self) -> Result<PinholeCameraIntrinsic, CalibrationError> {
        let path = self.intrinsics_path();
        if !path.is_file() {
            return Err(CalibrationError::InvalidFrameData(format!(
                "missing intrinsics {}",
                path.display()
            )));
        }
        let json = std::fs::read_to_string(&path)?;
        let intrinsics: PinholeCameraIntrinsic = serde_json::from_str(&json).map_err(|e| {
            CalibrationError::InvalidFrameData(format!("{}: {e}", path.display()))
        })?;
        if !intrinsics.is_valid() {
            return Err(CalibrationError::InvalidFrameData(format!(
                "{}: invalid intrinsics {intrinsics:?}",
                path.display()
            )));
        }
        Ok(intrinsics)
    }

    /// Write the pinhole intrinsics of the device.
    pub fn save_intrinsics(&self, intrinsics: &PinholeCameraIntrinsic) -> Result<(), CalibrationError> {
        let json = serde_json::to_string_pretty(intrinsics)
            .map_err(|e| CalibrationError::InvalidInput(e.to_string()))?;
        std::fs::create_dir_all(&self.root)?;
        std::fs::write(self.intrinsics_path(), json)?;
        Ok(())
    }

    /// Load the aligned color and depth frame captured at `timestamp`.
    ///
    /// The depth buffer is read with the image size of `intrinsics`.
    pub fn load_frame(
        &self,
        timestamp: u64,
        intrinsics: &PinholeCameraIntrinsic,
    ) -> Result<RGBDImage, CalibrationError> {
        let (rgb, color_size) = match read_image_png_rgb8(self.color_path(timestamp)) {
            Ok(color) => color,
            Err(e @ (IoError::PngDecodeError(_) | IoError::UnsupportedPngFormat(_))) => {
                return Err(CalibrationError::InvalidFrameData(format!(
                    "{} color frame {timestamp}: {e}",
                    self.name()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let depth = match read_depth(self.depth_path(timestamp), intrinsics.image_size.into()) {
            Ok(depth) => depth,
            Err(IoError::InvalidDepthSize { got, expected }) => {
                return Err(CalibrationError::InvalidFrameData(format!(
                    "{} depth frame {timestamp} has {got} bytes, expected {expected}",
                    self.name()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(RGBDImage::new(
            rgb,
            color_size.into(),
            depth,
            intrinsics.image_size,
        )?)
    }

    /// Load the frame at `timestamp` and back-project it into a point cloud.
    pub fn load_pointcloud(
        &self,
        timestamp: u64,
        intrinsics: &PinholeCameraIntrinsic,
        options: &DepthOptions,
    ) -> Result<PointCloud, CalibrationError> {
        let frame = self.load_frame(timestamp, intrinsics)?;
        let cloud = rgbd_to_pointcloud(&frame, intrinsics, options)?;
        log::debug!(
            "{} frame {}: {} points",
            self.name(),
            timestamp,
            cloud.len()
        );
        Ok(cloud)
    }
}
