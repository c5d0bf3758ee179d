use rigreg_3d::{pointcloud::PointCloud, transforms::RigidTransform};

use crate::{ops::fit_transformation, IcpError, MIN_CORRESPONDENCES};

/// Ordered pairs of `(source_index, target_index)` picked on two clouds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrespondenceSet {
    pairs: Vec<(usize, usize)>,
}

impl CorrespondenceSet {
    /// Create a set from explicit pairs.
    ///
    /// At least [`MIN_CORRESPONDENCES`] pairs are required.
    pub fn new(pairs: Vec<(usize, usize)>) -> Result<Self, IcpError> {
        if pairs.len() < MIN_CORRESPONDENCES {
            return Err(IcpError::InsufficientCorrespondences {
                source_len: pairs.len(),
                target_len: pairs.len(),
            });
        }
        Ok(Self { pairs })
    }

    /// Zip two pick sequences into a set.
    ///
    /// Both sequences must hold the same number of picks, and at least
    /// [`MIN_CORRESPONDENCES`] of them.
    pub fn from_picks(source: &[usize], target: &[usize]) -> Result<Self, IcpError> {
        if source.len() != target.len() || source.len() < MIN_CORRESPONDENCES {
            return Err(IcpError::InsufficientCorrespondences {
                source_len: source.len(),
                target_len: target.len(),
            });
        }
        Ok(Self {
            pairs: source.iter().copied().zip(target.iter().copied()).collect(),
        })
    }

    /// The pairs in pick order.
    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Always false for a constructed set; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Check every index against the clouds it refers to.
    pub fn validate(&self, source: &PointCloud, target: &PointCloud) -> Result<(), IcpError> {
        for &(s, t) in &self.pairs {
            if s >= source.len() {
                return Err(IcpError::IndexOutOfBounds {
                    cloud: "source",
                    index: s,
                    len: source.len(),
                });
            }
            if t >= target.len() {
                return Err(IcpError::IndexOutOfBounds {
                    cloud: "target",
                    index: t,
                    len: target.len(),
                });
            }
        }
        Ok(())
    }

    /// Gather the paired points from both clouds.
    pub fn gather(
        &self,
        source: &PointCloud,
        target: &PointCloud,
    ) -> Result<(Vec<[f64; 3]>, Vec<[f64; 3]>), IcpError> {
        self.validate(source, target)?;
        let points = self.pairs.iter().map(|&(s, t)| {
            (source.points()[s], target.points()[t])
        });
        Ok(points.unzip())
    }
}

/// Estimate the rigid transform taking `source` onto `target` from picked pairs.
///
/// This is the coarse alignment that seeds ICP.
///
/// # Arguments
///
/// * `source` - The cloud to move, e.g. a sub camera cloud.
/// * `target` - The reference cloud, e.g. the master camera cloud.
/// * `correspondences` - Picked `(source_index, target_index)` pairs.
///
/// # Returns
///
/// The `target_from_source` transform.
pub fn estimate_from_correspondences(
    source: &PointCloud,
    target: &PointCloud,
    correspondences: &CorrespondenceSet,
) -> Result<RigidTransform, IcpError> {
    let (points_src, points_dst) = correspondences.gather(source, target)?;
    let transform = fit_transformation(&points_src, &points_dst)?;

    log::debug!(
        "coarse transform from {} pairs: angle {:.4} rad, translation {:.4} m",
        correspondences.len(),
        transform.rotation_angle(),
        transform.translation_norm()
    );

    Ok(transform)
}
