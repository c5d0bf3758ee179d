use rigreg_3d::{pointcloud::PointCloud, transforms::RigidTransform};
use rigreg_icp::{estimate_from_correspondences, icp_vanilla, CorrespondenceSet, IcpResult};

use crate::{
    config::RegistrationConfig,
    error::CalibrationError,
    picker::{pick_correspondences, PointPicker},
};

/// The outcome of registering one sub device onto the master.
#[derive(Debug, Clone)]
pub struct PairRegistration {
    /// Index `k` of the sub device.
    pub sub_index: usize,
    /// The picked `(sub_index, master_index)` point pairs.
    pub correspondences: CorrespondenceSet,
    /// The alignment estimated from the picks alone.
    pub coarse: RigidTransform,
    /// The ICP refinement seeded with `coarse`.
    pub icp: IcpResult,
}

impl PairRegistration {
    /// The refined `master_from_sub` transform.
    pub fn transform(&self) -> RigidTransform {
        self.icp.transform
    }
}

/// Register one sub cloud onto the master cloud.
///
/// The operator picks matching points on the sub cloud and then on the master
/// cloud. Picking restarts when the sessions do not yield a usable set, up to
/// `config.max_pick_attempts` times. The picks seed a coarse alignment which
/// ICP refines.
///
/// # Arguments
///
/// * `master` - The target cloud, in master camera coordinates.
/// * `sub` - The source cloud, in sub camera coordinates.
/// * `sub_index` - Index `k` of the sub device, used for labels.
/// * `picker` - Source of the point picks.
/// * `config` - Registration parameters.
pub fn register_pair<P: PointPicker + ?Sized>(
    master: &PointCloud,
    sub: &PointCloud,
    sub_index: usize,
    picker: &mut P,
    config: &RegistrationConfig,
) -> Result<PairRegistration, CalibrationError> {
    if master.is_empty() || sub.is_empty() {
        return Err(CalibrationError::InvalidFrameData(format!(
            "cannot register sub {sub_index}: master has {} points, sub has {}",
            master.len(),
            sub.len()
        )));
    }

    let sub_label = format!("sub_{sub_index}");
    let attempts = config.max_pick_attempts.max(1);

    let mut attempt = 1;
    let correspondences = loop {
        match pick_correspondences(&mut *picker, sub, &sub_label, master, "master") {
            Ok(set) => break set,
            Err(CalibrationError::InsufficientCorrespondences {
                source_len,
                target_len,
            }) if attempt < attempts => {
                log::warn!(
                    "{sub_label}: {source_len} sub and {target_len} master picks, \
                     at least 3 matching picks are needed (attempt {attempt}/{attempts})"
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    };

    let coarse = estimate_from_correspondences(sub, master, &correspondences)?;
    log::info!(
        "{sub_label}: coarse alignment from {} pairs, rotation {:.4} rad, translation {:.4} m",
        correspondences.len(),
        coarse.rotation_angle(),
        coarse.translation_norm()
    );

    let icp = icp_vanilla(sub, master, &coarse, &config.icp.criteria())?;
    log::info!(
        "{sub_label}: icp {} after {} iterations, fitness {:.3}, rmse {:.5}",
        if icp.converged { "converged" } else { "stopped" },
        icp.num_iterations,
        icp.fitness,
        icp.rmse
    );

    Ok(PairRegistration {
        sub_index,
        correspondences,
        coarse,
        icp,
    })
}

/// Register every sub cloud onto the master cloud.
///
/// Pairs are independent: a failing pair is reported in its slot and does not
/// stop the others. `subs[i]` is sub device `i + 1`.
pub fn register_rig<P: PointPicker + ?Sized>(
    master: &PointCloud,
    subs: &[PointCloud],
    picker: &mut P,
    config: &RegistrationConfig,
) -> Vec<Result<PairRegistration, CalibrationError>> {
    subs.iter()
        .enumerate()
        .map(|(i, sub)| {
            let res = register_pair(master, sub, i + 1, &mut *picker, config);
            if let Err(e) = &res {
                log::error!("sub_{}: registration failed: {e}", i + 1);
            }
            res
        })
        .collect()
}
