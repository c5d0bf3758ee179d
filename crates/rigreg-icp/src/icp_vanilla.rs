use kiddo::immutable::float::kdtree::ImmutableKdTree;
use rigreg_3d::{pointcloud::PointCloud, transforms::RigidTransform};

use crate::{
    ops::{find_correspondences, fit_transformation},
    IcpError, MIN_CORRESPONDENCES,
};

/// Result of the ICP algorithm.
///
/// The transformation is from the source to the target frame.
#[derive(Debug, Clone)]
pub struct IcpResult {
    /// Estimated `target_from_source` transform.
    pub transform: RigidTransform,
    /// The number of iterations performed.
    pub num_iterations: usize,
    /// Mean inlier distance of the final transform.
    pub mean_error: f64,
    /// Inlier RMSE of the final transform.
    pub rmse: f64,
    /// Fraction of source points with an inlier match.
    pub fitness: f64,
    /// Number of source points with an inlier match.
    pub num_inliers: usize,
    /// Whether the error change dropped below the tolerance.
    pub converged: bool,
}

/// Structure to define the ICP parameters.
#[derive(Debug, Clone)]
pub struct IcpConvergenceCriteria {
    /// Maximum number of iterations to perform.
    pub max_iterations: usize,
    /// Convergence tolerance as the difference in mean error between two consecutive iterations.
    pub tolerance: f64,
    /// Matches farther apart than this distance, in meters, are ignored.
    pub max_correspondence_distance: f64,
}

impl Default for IcpConvergenceCriteria {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            tolerance: 1e-6,
            max_correspondence_distance: 0.03,
        }
    }
}

struct Evaluation {
    points_src: Vec<[f64; 3]>,
    points_dst: Vec<[f64; 3]>,
    mean_error: f64,
    rmse: f64,
}

fn evaluate(
    source: &PointCloud,
    target: &PointCloud,
    kdtree: &ImmutableKdTree<f64, u32, 3, 32>,
    transform: &RigidTransform,
    max_distance_sq: f64,
) -> Evaluation {
    let current_source = source
        .points()
        .iter()
        .map(|p| transform.apply(p))
        .collect::<Vec<_>>();
    let (points_src, points_dst, distances) = find_correspondences(
        &current_source,
        target.points(),
        kdtree,
        max_distance_sq,
    );

    let (mean_error, rmse) = if distances.is_empty() {
        (f64::INFINITY, f64::INFINITY)
    } else {
        let n = distances.len() as f64;
        (
            distances.iter().map(|d| d.sqrt()).sum::<f64>() / n,
            (distances.iter().sum::<f64>() / n).sqrt(),
        )
    };

    Evaluation {
        points_src,
        points_dst,
        mean_error,
        rmse,
    }
}

/// Iterative Closest Point (ICP) algorithm using point to point distance.
///
/// Each iteration matches the transformed source to its nearest target points,
/// drops matches beyond `max_correspondence_distance`, and left-composes the
/// best fit of the remaining pairs onto the estimate.
///
/// # Arguments
///
/// * `source` - Source point cloud.
/// * `target` - Target point cloud.
/// * `initial` - Initial `target_from_source` estimate, usually the coarse alignment.
/// * `criteria` - Convergence criteria.
///
/// # Returns
///
/// * `result` - Result of the ICP algorithm. A run that hits the iteration cap
///   or loses its inliers is still returned, with `converged` set to false.
pub fn icp_vanilla(
    source: &PointCloud,
    target: &PointCloud,
    initial: &RigidTransform,
    criteria: &IcpConvergenceCriteria,
) -> Result<IcpResult, IcpError> {
    if source.is_empty() || target.is_empty() {
        return Err(IcpError::EmptyPointCloud);
    }

    // build kdtree for target points to speed up the nearest neighbor search
    let kdtree: ImmutableKdTree<f64, u32, 3, 32> = ImmutableKdTree::new_from_slice(target.points());

    let max_distance_sq = criteria.max_correspondence_distance.powi(2);
    let mut transform = *initial;
    let mut prev_error = f64::INFINITY;
    let mut num_iterations = 0;
    let mut converged = false;

    // main icp loop
    for i in 0..criteria.max_iterations {
        log::debug!("Iteration: {}", i);
        let now = std::time::Instant::now();
        num_iterations = i + 1;

        let eval = evaluate(source, target, &kdtree, &transform, max_distance_sq);

        log::debug!(
            "Num correspondences: {} error: {}",
            eval.points_src.len(),
            eval.mean_error
        );

        if eval.points_src.len() < MIN_CORRESPONDENCES {
            log::warn!(
                "ICP stopped at iteration {}: only {} matches within {} m",
                i,
                eval.points_src.len(),
                criteria.max_correspondence_distance
            );
            break;
        }

        // check convergence and exit if below tolerance
        if (prev_error - eval.mean_error).abs() < criteria.tolerance {
            log::debug!("ICP converged in {} iterations with error {}", i, eval.mean_error);
            converged = true;
            break;
        }
        prev_error = eval.mean_error;

        // T <- delta * T
        let delta = fit_transformation(&eval.points_src, &eval.points_dst)?;
        transform = delta.compose(&transform);

        log::debug!("elapsed: {:?}", now.elapsed());
    }

    if !converged && num_iterations == criteria.max_iterations {
        log::warn!(
            "ICP did not converge within {} iterations",
            criteria.max_iterations
        );
    }

    let eval = evaluate(source, target, &kdtree, &transform, max_distance_sq);
    let num_inliers = eval.points_src.len();

    Ok(IcpResult {
        transform,
        num_iterations,
        mean_error: eval.mean_error,
        rmse: eval.rmse,
        fitness: num_inliers as f64 / source.len() as f64,
        num_inliers,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    // 6x6x6 grid with 0.2 spacing centered at the origin
    fn grid_cloud() -> PointCloud {
        let mut points = Vec::new();
        for i in 0..6 {
            for j in 0..6 {
                for k in 0..6 {
                    points.push([
                        -0.5 + 0.2 * i as f64,
                        -0.5 + 0.2 * j as f64,
                        -0.5 + 0.2 * k as f64,
                    ]);
                }
            }
        }
        PointCloud::new(points, None, None)
    }

    #[test]
    fn test_icp_recovers_perturbation() -> Result<(), Box<dyn std::error::Error>> {
        let target = grid_cloud();
        let perturbation =
            RigidTransform::from_axis_angle(&[0.0, 0.0, 1.0], 0.02, [0.01, -0.02, 0.015])?;
        let source = target.transformed(&perturbation);

        let criteria = IcpConvergenceCriteria {
            max_correspondence_distance: 0.1,
            ..Default::default()
        };
        let result = icp_vanilla(&source, &target, &RigidTransform::identity(), &criteria)?;

        assert!(result.converged);
        assert!(result.num_iterations <= criteria.max_iterations);
        assert_eq!(result.num_inliers, source.len());
        assert_relative_eq!(result.fitness, 1.0);
        assert!(result.rmse < 1e-9);

        let (angle, distance) = result.transform.difference(&perturbation.inverse());
        assert!(angle < 1e-9, "angle error {angle}");
        assert!(distance < 1e-9, "translation error {distance}");
        Ok(())
    }

    #[test]
    fn test_icp_idempotent() -> Result<(), Box<dyn std::error::Error>> {
        let target = grid_cloud();
        let perturbation =
            RigidTransform::from_axis_angle(&[1.0, 1.0, 0.0], 0.015, [-0.01, 0.0, 0.01])?;
        let source = target.transformed(&perturbation);

        let criteria = IcpConvergenceCriteria {
            max_correspondence_distance: 0.1,
            ..Default::default()
        };
        let first = icp_vanilla(&source, &target, &RigidTransform::identity(), &criteria)?;
        let second = icp_vanilla(&source, &target, &first.transform, &criteria)?;

        assert!(second.converged);
        let (angle, distance) = second.transform.difference(&first.transform);
        assert!(angle < 1e-6);
        assert!(distance < 1e-6);
        assert_relative_eq!(second.rmse, first.rmse, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_icp_random_cloud() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = StdRng::seed_from_u64(42);
        let points_src = (0..200)
            .map(|_| [rng.random::<f64>(), rng.random::<f64>(), rng.random::<f64>()])
            .collect::<Vec<_>>();
        let source = PointCloud::new(points_src, None, None);

        let dst_from_src = RigidTransform::from_axis_angle(&[1.0, 0.0, 0.0], 0.05, [0.02, 0.0, 0.01])?;
        let target = source.transformed(&dst_from_src);

        let criteria = IcpConvergenceCriteria {
            max_iterations: 100,
            tolerance: 1e-9,
            max_correspondence_distance: 0.5,
        };
        let result = icp_vanilla(&source, &target, &RigidTransform::identity(), &criteria)?;

        result.transform.validate()?;
        let identity_error = {
            let kdtree = ImmutableKdTree::new_from_slice(target.points());
            evaluate(&source, &target, &kdtree, &RigidTransform::identity(), 0.25).rmse
        };
        assert!(result.rmse <= identity_error);
        Ok(())
    }

    #[test]
    fn test_icp_iteration_cap() -> Result<(), Box<dyn std::error::Error>> {
        let target = grid_cloud();
        let source = target.transformed(&RigidTransform::new(
            RigidTransform::identity().rotation,
            [0.03, 0.0, 0.0],
        ));

        let criteria = IcpConvergenceCriteria {
            max_iterations: 1,
            max_correspondence_distance: 0.1,
            ..Default::default()
        };
        let result = icp_vanilla(&source, &target, &RigidTransform::identity(), &criteria)?;

        assert!(!result.converged);
        assert_eq!(result.num_iterations, 1);
        // the single update already lands on the answer
        assert_relative_eq!(result.transform.translation[0], -0.03, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_icp_no_inliers() -> Result<(), Box<dyn std::error::Error>> {
        let target = grid_cloud();
        let source = target.transformed(&RigidTransform::new(
            RigidTransform::identity().rotation,
            [0.1, 0.1, 0.1],
        ));

        let initial = RigidTransform::identity();
        let result = icp_vanilla(&source, &target, &initial, &IcpConvergenceCriteria::default())?;

        assert!(!result.converged);
        assert_eq!(result.num_inliers, 0);
        assert_eq!(result.transform, initial);
        assert_relative_eq!(result.fitness, 0.0);
        Ok(())
    }

    #[test]
    fn test_icp_empty() {
        let empty = PointCloud::default();
        let res = icp_vanilla(
            &empty,
            &grid_cloud(),
            &RigidTransform::identity(),
            &IcpConvergenceCriteria::default(),
        );
        assert!(matches!(res, Err(IcpError::EmptyPointCloud)));
    }
}
