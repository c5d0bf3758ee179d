use crate::linalg::{det33, matmul33, matvec33, transform_point3d, transpose33};

/// Tolerance used to decide whether a rotation block is orthonormal.
pub const ORTHONORMAL_TOLERANCE: f64 = 1e-6;

/// Error types for the transforms module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TransformError {
    /// The rotation axis has zero length.
    #[error("Cannot compute rotation matrix from a zero vector")]
    ZeroAxis,

    /// The last row of a homogeneous matrix is not `[0, 0, 0, 1]`.
    #[error("Invalid homogeneous bottom row: {0:?}")]
    InvalidBottomRow([f64; 4]),

    /// The rotation block is not orthonormal or is a reflection.
    #[error("Rotation block is not a proper rotation (orthonormality error {error}, det {det})")]
    NotARotation {
        /// Largest absolute entry of `R^T R - I`.
        error: f64,
        /// Determinant of the rotation block.
        det: f64,
    },

    /// The matrix contains NaN or infinite values.
    #[error("Transform contains non-finite values")]
    NonFinite,
}

/// Compute the rotation matrix from an axis and angle.
///
/// # Arguments
///
/// * `axis` - The axis of rotation. It is normalized internally.
/// * `angle` - The angle of rotation in radians.
///
/// # Returns
///
/// The rotation matrix.
///
/// Example:
///
/// ```
/// use rigreg_3d::transforms::axis_angle_to_rotation_matrix;
///
/// let axis = [1.0, 0.0, 0.0];
/// let angle = std::f64::consts::PI / 2.0;
/// let rotation = axis_angle_to_rotation_matrix(&axis, angle).unwrap();
/// assert!((rotation[1][2] + 1.0).abs() < 1e-12);
/// ```
pub fn axis_angle_to_rotation_matrix(
    axis: &[f64; 3],
    angle: f64,
) -> Result<[[f64; 3]; 3], TransformError> {
    // normalize the vector
    let axis_norm = {
        let magnitude = (axis[0].powi(2) + axis[1].powi(2) + axis[2].powi(2)).sqrt();
        match magnitude < 1e-10 {
            true => return Err(TransformError::ZeroAxis),
            false => [
                axis[0] / magnitude,
                axis[1] / magnitude,
                axis[2] / magnitude,
            ],
        }
    };

    let x = axis_norm[0];
    let y = axis_norm[1];
    let z = axis_norm[2];

    let c = angle.cos();
    let s = angle.sin();
    let t = 1.0 - c;

    let m00 = c + x * x * t;
    let m11 = c + y * y * t;
    let m22 = c + z * z * t;

    let tmp1 = x * y * t;
    let tmp2 = z * s;

    let m10 = tmp1 + tmp2;
    let m01 = tmp1 - tmp2;

    let tmp3 = x * z * t;
    let tmp4 = y * s;

    let m20 = tmp3 - tmp4;
    let m02 = tmp3 + tmp4;

    let tmp5 = y * z * t;
    let tmp6 = x * s;

    let m12 = tmp5 - tmp6;
    let m21 = tmp5 + tmp6;

    Ok([[m00, m01, m02], [m10, m11, m12], [m20, m21, m22]])
}

/// Angle in radians of the rotation described by a rotation matrix.
pub fn rotation_angle(rotation: &[[f64; 3]; 3]) -> f64 {
    let r = rotation;
    let cos = (r[0][0] + r[1][1] + r[2][2] - 1.0) / 2.0;
    // atan2 keeps precision for small angles where acos does not
    let sin = 0.5
        * ((r[2][1] - r[1][2]).powi(2) + (r[0][2] - r[2][0]).powi(2) + (r[1][0] - r[0][1]).powi(2))
            .sqrt();
    sin.atan2(cos)
}

/// A rigid transform `p' = R * p + t`.
///
/// The transform maps points expressed in a source frame into a destination
/// frame, e.g. `master_from_sub` maps sub-camera points into the master frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform {
    /// The 3x3 rotation block, row major.
    pub rotation: [[f64; 3]; 3],
    /// The translation vector.
    pub translation: [f64; 3],
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    /// Create a transform from a rotation and a translation.
    pub fn new(rotation: [[f64; 3]; 3], translation: [f64; 3]) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation: [0.0; 3],
        }
    }

    /// Build a transform from a rotation axis, an angle and a translation.
    pub fn from_axis_angle(
        axis: &[f64; 3],
        angle: f64,
        translation: [f64; 3],
    ) -> Result<Self, TransformError> {
        Ok(Self::new(axis_angle_to_rotation_matrix(axis, angle)?, translation))
    }

    /// Build a transform from a 4x4 homogeneous matrix.
    ///
    /// The bottom row must be `[0, 0, 0, 1]` and the rotation block a proper
    /// rotation within [`ORTHONORMAL_TOLERANCE`].
    pub fn from_matrix4(m: &[[f64; 4]; 4]) -> Result<Self, TransformError> {
        if m.iter().flatten().any(|v| !v.is_finite()) {
            return Err(TransformError::NonFinite);
        }

        let bottom = m[3];
        let expected = [0.0, 0.0, 0.0, 1.0];
        if bottom
            .iter()
            .zip(expected.iter())
            .any(|(a, b)| (a - b).abs() > ORTHONORMAL_TOLERANCE)
        {
            return Err(TransformError::InvalidBottomRow(bottom));
        }

        let transform = Self::new(
            [
                [m[0][0], m[0][1], m[0][2]],
                [m[1][0], m[1][1], m[1][2]],
                [m[2][0], m[2][1], m[2][2]],
            ],
            [m[0][3], m[1][3], m[2][3]],
        );
        transform.validate()?;

        Ok(transform)
    }

    /// Convert to a 4x4 homogeneous matrix.
    pub fn to_matrix4(&self) -> [[f64; 4]; 4] {
        let r = &self.rotation;
        let t = &self.translation;
        [
            [r[0][0], r[0][1], r[0][2], t[0]],
            [r[1][0], r[1][1], r[1][2], t[1]],
            [r[2][0], r[2][1], r[2][2], t[2]],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    /// Largest absolute deviation of `R^T R` from the identity.
    pub fn orthonormality_error(&self) -> f64 {
        let rtr = matmul33(&transpose33(&self.rotation), &self.rotation);
        let mut max_err: f64 = 0.0;
        for (i, row) in rtr.iter().enumerate() {
            for (j, val) in row.iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                max_err = max_err.max((val - expected).abs());
            }
        }
        max_err
    }

    /// Check that the rotation block is a proper rotation.
    pub fn validate(&self) -> Result<(), TransformError> {
        let error = self.orthonormality_error();
        let det = det33(&self.rotation);
        if error > ORTHONORMAL_TOLERANCE || (det - 1.0).abs() > ORTHONORMAL_TOLERANCE {
            return Err(TransformError::NotARotation { error, det });
        }
        Ok(())
    }

    /// Compose two transforms as `self * other`, i.e. apply `other` first.
    pub fn compose(&self, other: &RigidTransform) -> RigidTransform {
        RigidTransform {
            rotation: matmul33(&self.rotation, &other.rotation),
            translation: transform_point3d(&other.translation, &self.rotation, &self.translation),
        }
    }

    /// The inverse transform `R^T, -R^T t`.
    pub fn inverse(&self) -> RigidTransform {
        let rotation = transpose33(&self.rotation);
        let rt = matvec33(&rotation, &self.translation);
        RigidTransform {
            rotation,
            translation: [-rt[0], -rt[1], -rt[2]],
        }
    }

    /// Apply the transform to a point.
    #[inline]
    pub fn apply(&self, point: &[f64; 3]) -> [f64; 3] {
        transform_point3d(point, &self.rotation, &self.translation)
    }

    /// Angle in radians of the rotation block.
    pub fn rotation_angle(&self) -> f64 {
        rotation_angle(&self.rotation)
    }

    /// Euclidean norm of the translation.
    pub fn translation_norm(&self) -> f64 {
        let t = &self.translation;
        (t[0] * t[0] + t[1] * t[1] + t[2] * t[2]).sqrt()
    }

    /// Rotation angle and translation distance between two transforms.
    pub fn difference(&self, other: &RigidTransform) -> (f64, f64) {
        let delta = other.inverse().compose(self);
        let dt = [
            self.translation[0] - other.translation[0],
            self.translation[1] - other.translation[1],
            self.translation[2] - other.translation[2],
        ];
        (
            delta.rotation_angle(),
            (dt[0] * dt[0] + dt[1] * dt[1] + dt[2] * dt[2]).sqrt(),
        )
    }
}
