use std::path::PathBuf;

use rigreg_3d::{
    camera::PinholeCameraIntrinsic, io::pcd::write_pcd_binary, pointcloud::PointCloud,
    transforms::RigidTransform,
};

use crate::{
    config::RegistrationConfig, device::Device, error::CalibrationError,
    persistence::TransformStore, sync::synchronize_devices,
};

/// Summary of a sequence registration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Frames written to disk.
    pub frames_written: usize,
    /// Frames skipped because their data was unusable.
    pub frames_skipped: usize,
    /// The merged clouds, one per written frame.
    pub merged_paths: Vec<PathBuf>,
}

/// Register every synchronized frame of a session into the master frame.
///
/// The stored transforms and the intrinsics are loaded once. For each row of
/// the synchronized table every sub cloud is moved into the master frame and
/// written to `<sub_dir>/pointclouds_registered/<ts>.pcd`, and the union of
/// all clouds to `<master_dir>/pointclouds_merged/<frame_index>.pcd`.
///
/// # Arguments
///
/// * `devices` - The devices of the session, master first.
/// * `store` - The transforms produced by the calibration.
/// * `config` - Registration parameters.
pub fn register_session(
    devices: &[Device],
    store: &TransformStore,
    config: &RegistrationConfig,
) -> Result<BatchReport, CalibrationError> {
    if devices.len() < 2 {
        return Err(CalibrationError::InvalidInput(format!(
            "a session needs a master and at least one sub device, got {} devices",
            devices.len()
        )));
    }

    let transforms = store.load_all(devices.len() - 1)?;
    let intrinsics = devices
        .iter()
        .map(Device::load_intrinsics)
        .collect::<Result<Vec<_>, _>>()?;
    let table = synchronize_devices(devices, config.sync.tolerance_us)?;

    for device in &devices[1..] {
        std::fs::create_dir_all(device.registered_dir())?;
    }
    std::fs::create_dir_all(devices[0].merged_dir())?;

    let mut report = BatchReport::default();
    for (frame_index, row) in table.rows().iter().enumerate() {
        match register_frame(devices, &intrinsics, &transforms, row, frame_index, config) {
            Ok(path) => {
                report.frames_written += 1;
                report.merged_paths.push(path);
            }
            Err(CalibrationError::InvalidFrameData(msg)) => {
                log::warn!("skipping frame {frame_index}: {msg}");
                report.frames_skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    log::info!(
        "registered {} frames, skipped {}",
        report.frames_written,
        report.frames_skipped
    );

    Ok(report)
}

fn register_frame(
    devices: &[Device],
    intrinsics: &[PinholeCameraIntrinsic],
    transforms: &[RigidTransform],
    row: &[u64],
    frame_index: usize,
    config: &RegistrationConfig,
) -> Result<PathBuf, CalibrationError> {
    let mut merged = devices[0].load_pointcloud(row[0], &intrinsics[0], &config.depth)?;

    // load everything first so a bad frame leaves no partial output
    let mut registered: Vec<(PathBuf, PointCloud)> = Vec::with_capacity(transforms.len());
    for (k, master_from_sub) in transforms.iter().enumerate() {
        let device = &devices[k + 1];
        let timestamp = row[k + 1];
        let cloud = device
            .load_pointcloud(timestamp, &intrinsics[k + 1], &config.depth)?
            .transformed(master_from_sub);
        registered.push((device.registered_dir().join(format!("{timestamp}.pcd")), cloud));
    }

    for (path, cloud) in &registered {
        write_pcd_binary(path, cloud)?;
        merged.extend(cloud);
    }

    let merged_path = devices[0].merged_dir().join(format!("{frame_index}.pcd"));
    write_pcd_binary(&merged_path, &merged)?;

    log::debug!(
        "frame {}: {} merged points written to {}",
        frame_index,
        merged.len(),
        merged_path.display()
    );

    Ok(merged_path)
}
