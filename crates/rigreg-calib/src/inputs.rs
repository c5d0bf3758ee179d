use std::path::{Path, PathBuf};

use rigreg_3d::{io::pcd::read_pcd, pointcloud::PointCloud};

use crate::{
    config::RegistrationConfig, device::Device, error::CalibrationError,
    persistence::TransformStore, sync::synchronize_devices,
};

/// What the operator pointed the registration at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationInputs {
    /// Device recording directories, master first.
    Devices(Vec<Device>),
    /// Point cloud files, master first.
    PointClouds(Vec<PathBuf>),
}

/// Classify the command line paths, master first.
///
/// At least two paths are required and they must all be directories or all
/// be files.
pub fn resolve_inputs(paths: &[PathBuf]) -> Result<RegistrationInputs, CalibrationError> {
    if paths.len() < 2 {
        return Err(CalibrationError::InvalidInput(format!(
            "at least two paths are required (master then subs), got {}",
            paths.len()
        )));
    }

    for path in paths {
        if !path.is_dir() && !path.is_file() {
            return Err(CalibrationError::InvalidInput(format!(
                "{} is neither a device directory nor a point cloud file",
                path.display()
            )));
        }
    }

    if paths.iter().all(|p| p.is_dir()) {
        let devices = paths
            .iter()
            .enumerate()
            .map(|(i, p)| match i {
                0 => Device::master(p),
                k => Device::sub(k, p),
            })
            .collect();
        Ok(RegistrationInputs::Devices(devices))
    } else if paths.iter().all(|p| p.is_file()) {
        Ok(RegistrationInputs::PointClouds(paths.to_vec()))
    } else {
        Err(CalibrationError::InvalidInput(
            "paths must be all device directories or all point cloud files".to_string(),
        ))
    }
}

impl RegistrationInputs {
    /// Number of sub devices.
    pub fn num_subs(&self) -> usize {
        match self {
            RegistrationInputs::Devices(devices) => devices.len() - 1,
            RegistrationInputs::PointClouds(paths) => paths.len() - 1,
        }
    }

    /// The store receiving the transforms.
    ///
    /// For directories it is the master directory, for files the directory
    /// holding the master file.
    pub fn transform_store(&self) -> TransformStore {
        let master_dir = match self {
            RegistrationInputs::Devices(devices) => devices[0].root().to_path_buf(),
            RegistrationInputs::PointClouds(paths) => paths[0]
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };
        TransformStore::new(master_dir)
    }

    /// Load one cloud per input, master first.
    ///
    /// Device recordings are synchronized and row `frame` of the table is
    /// back-projected; point cloud files are read as they are.
    pub fn load_clouds(
        &self,
        frame: usize,
        config: &RegistrationConfig,
    ) -> Result<Vec<PointCloud>, CalibrationError> {
        match self {
            RegistrationInputs::Devices(devices) => {
                let table = synchronize_devices(devices, config.sync.tolerance_us)?;
                let row = table.row(frame)?;
                log::info!("using synchronized frame {} of {}: {:?}", frame, table.len(), row);

                devices
                    .iter()
                    .zip(row.iter())
                    .map(|(device, &timestamp)| {
                        let intrinsics = device.load_intrinsics()?;
                        device.load_pointcloud(timestamp, &intrinsics, &config.depth)
                    })
                    .collect()
            }
            RegistrationInputs::PointClouds(paths) => paths
                .iter()
                .map(|path| {
                    let cloud = read_pcd(path)?;
                    log::info!("read {} points from {}", cloud.len(), path.display());
                    Ok::<_, CalibrationError>(cloud)
                })
                .collect(),
        }
    }
}
