use faer::Mat;
use kiddo::immutable::float::kdtree::ImmutableKdTree;
use rigreg_3d::{
    linalg::{self, det33},
    transforms::RigidTransform,
};

use crate::{IcpError, MIN_CORRESPONDENCES};

/// Compute the centroids of two sets of points.
///
/// # Arguments
///
/// * `points_src` - A set of points.
/// * `points_dst` - Another set of points.
///
/// # Returns
///
/// The centroids of the two sets of points.
pub fn compute_centroids(points_src: &[[f64; 3]], points_dst: &[[f64; 3]]) -> ([f64; 3], [f64; 3]) {
    (linalg::centroid(points_src), linalg::centroid(points_dst))
}

/// Compute the optimal rigid transformation between two paired point sets.
///
/// The least-squares solution of Arun et al., "Least-squares fitting of two
/// 3-D point sets", IEEE PAMI 1987:
///
/// 1. Center both sets on their centroids.
/// 2. Accumulate the cross-covariance `H = Σ (s - s̄)(t - t̄)^T`.
/// 3. Decompose `H = U S V^T` and take `R = V U^T`, flipping the last column of
///    `V` when `det(R) < 0` so the result is a proper rotation.
/// 4. Set `t = t̄ - R s̄`.
///
/// # Arguments
///
/// * `points_src` - Source points.
/// * `points_dst` - Destination points, paired by position with `points_src`.
///
/// # Returns
///
/// The transform mapping `points_src` onto `points_dst`.
pub fn fit_transformation(
    points_src: &[[f64; 3]],
    points_dst: &[[f64; 3]],
) -> Result<RigidTransform, IcpError> {
    if points_src.len() != points_dst.len() {
        return Err(IcpError::MismatchedLengths(
            points_src.len(),
            points_dst.len(),
        ));
    }

    if points_src.len() < MIN_CORRESPONDENCES {
        return Err(IcpError::InsufficientCorrespondences {
            source_len: points_src.len(),
            target_len: points_dst.len(),
        });
    }

    let (src_centroid, dst_centroid) = compute_centroids(points_src, points_dst);

    // cross-covariance matrix H = Σ[(src - src_mean) * (dst - dst_mean)^T]
    let mut hh = [[0.0; 3]; 3];
    for (p_src, p_dst) in points_src.iter().zip(points_dst.iter()) {
        let s = [
            p_src[0] - src_centroid[0],
            p_src[1] - src_centroid[1],
            p_src[2] - src_centroid[2],
        ];
        let d = [
            p_dst[0] - dst_centroid[0],
            p_dst[1] - dst_centroid[1],
            p_dst[2] - dst_centroid[2],
        ];
        for i in 0..3 {
            for j in 0..3 {
                hh[i][j] += s[i] * d[j];
            }
        }
    }

    let h = Mat::<f64>::from_fn(3, 3, |i, j| hh[i][j]);
    let svd = h.svd();
    let u = svd.u();
    let v = svd.v();

    // R = V * diag(1, 1, sign) * U^T
    let rotation_with = |sign: f64| {
        let mut r = [[0.0; 3]; 3];
        for (i, row) in r.iter_mut().enumerate() {
            for (j, val) in row.iter_mut().enumerate() {
                *val = v.read(i, 0) * u.read(j, 0)
                    + v.read(i, 1) * u.read(j, 1)
                    + sign * v.read(i, 2) * u.read(j, 2);
            }
        }
        r
    };

    let mut rotation = rotation_with(1.0);
    if det33(&rotation) < 0.0 {
        // reflection case
        rotation = rotation_with(-1.0);
    }

    let r_src = linalg::matvec33(&rotation, &src_centroid);
    let translation = [
        dst_centroid[0] - r_src[0],
        dst_centroid[1] - r_src[1],
        dst_centroid[2] - r_src[2],
    ];

    Ok(RigidTransform::new(rotation, translation))
}

/// Match every source point to its nearest target point.
///
/// Matches whose squared distance exceeds `max_distance_sq` are discarded.
///
/// # Returns
///
/// The matched source points, the matched target points and the squared
/// distances between them.
pub(crate) fn find_correspondences(
    source: &[[f64; 3]],
    target: &[[f64; 3]],
    kdtree: &ImmutableKdTree<f64, u32, 3, 32>,
    max_distance_sq: f64,
) -> (Vec<[f64; 3]>, Vec<[f64; 3]>, Vec<f64>) {
    let res = source
        .iter()
        .map(|p| (p, kdtree.nearest_one::<kiddo::SquaredEuclidean>(p)))
        .filter(|(_, nn)| nn.distance <= max_distance_sq)
        .map(|(p, nn)| (*p, target[nn.item as usize], nn.distance))
        .collect::<Vec<_>>();

    // unzip the results to separate points and distances
    let (points_in_src, tmp): (Vec<_>, Vec<_>) =
        res.into_iter().map(|(a, b, c)| (a, (b, c))).unzip();
    let (points_in_dst, distances) = tmp.into_iter().unzip();

    (points_in_src, points_in_dst, distances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn create_random_points(rng: &mut StdRng, num_points: usize) -> Vec<[f64; 3]> {
        (0..num_points)
            .map(|_| [rng.random::<f64>(), rng.random::<f64>(), rng.random::<f64>()])
            .collect()
    }

    #[test]
    fn test_fit_transformation_identity() -> Result<(), IcpError> {
        let mut rng = StdRng::seed_from_u64(0);
        let points = create_random_points(&mut rng, 20);

        let transform = fit_transformation(&points, &points)?;

        assert_relative_eq!(transform.rotation_angle(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(transform.translation_norm(), 0.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_fit_transformation_exact() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = StdRng::seed_from_u64(1);
        let points_src = create_random_points(&mut rng, 30);

        let expected = RigidTransform::from_axis_angle(&[0.3, -1.0, 0.5], 1.2, [0.5, -0.2, 2.0])?;
        let points_dst = points_src.iter().map(|p| expected.apply(p)).collect::<Vec<_>>();

        let transform = fit_transformation(&points_src, &points_dst)?;
        transform.validate()?;

        for i in 0..3 {
            assert_relative_eq!(transform.translation[i], expected.translation[i], epsilon = 1e-9);
            for j in 0..3 {
                assert_relative_eq!(
                    transform.rotation[i][j],
                    expected.rotation[i][j],
                    epsilon = 1e-9
                );
            }
        }
        Ok(())
    }

    #[test]
    fn test_fit_transformation_reflection() -> Result<(), Box<dyn std::error::Error>> {
        // a mirrored set has no rotation mapping it exactly, the fit stays proper
        let points_src = vec![
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
        ];
        let points_dst = points_src
            .iter()
            .map(|p| [-p[0], p[1], p[2]])
            .collect::<Vec<_>>();

        let transform = fit_transformation(&points_src, &points_dst)?;
        transform.validate()?;
        assert_relative_eq!(det33(&transform.rotation), 1.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_fit_transformation_degenerate() -> Result<(), Box<dyn std::error::Error>> {
        let points_src = vec![[0.2, 0.3, 0.4]; 5];
        let points_dst = vec![[1.0, 1.0, 1.0]; 5];

        let transform = fit_transformation(&points_src, &points_dst)?;
        transform.validate()?;
        let mapped = transform.apply(&points_src[0]);
        for v in mapped {
            assert_relative_eq!(v, 1.0, epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_fit_transformation_errors() {
        let points = vec![[0.0; 3]; 2];
        assert!(matches!(
            fit_transformation(&points, &points),
            Err(IcpError::InsufficientCorrespondences {
                source_len: 2,
                target_len: 2
            })
        ));
        assert!(matches!(
            fit_transformation(&[[0.0; 3]; 3], &[[0.0; 3]; 4]),
            Err(IcpError::MismatchedLengths(3, 4))
        ));
    }

    #[test]
    fn test_find_correspondences() {
        let points_src = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
        ];
        let points_dst = vec![[1.0, 0.0, 0.0], [1.0, 1.0, 0.0]];

        let kdtree = ImmutableKdTree::new_from_slice(&points_dst);

        let (points_in_src, points_in_dst, distances) =
            find_correspondences(&points_src, &points_dst, &kdtree, f64::INFINITY);

        assert_eq!(points_in_src.len(), points_in_dst.len());
        assert_eq!(points_in_src.len(), 4);
        assert_eq!(distances, vec![1.0, 0.0, 1.0, 0.0]);

        // only the exact matches survive a tight threshold
        let (points_in_src, points_in_dst, distances) =
            find_correspondences(&points_src, &points_dst, &kdtree, 0.25);
        assert_eq!(points_in_src, vec![[1.0, 0.0, 0.0], [1.0, 1.0, 0.0]]);
        assert_eq!(points_in_dst, points_in_src);
        assert_eq!(distances, vec![0.0, 0.0]);
    }
}
