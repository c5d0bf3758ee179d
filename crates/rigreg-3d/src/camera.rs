use serde::{Deserialize, Serialize};

/// A struct representing the intrinsic parameters of a pinhole camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinholeCameraIntrinsic {
    /// The focal length in pixels (fx, fy)
    pub focal_length: (f64, f64),
    /// The principal point in pixels (cx, cy)
    pub principal_point: (f64, f64),
    /// The image dimensions (width, height)
    pub image_size: (usize, usize),
}

impl PinholeCameraIntrinsic {
    /// Creates a new PinholeCameraIntrinsic with the given parameters.
    pub fn new(
        focal_length: (f64, f64),
        principal_point: (f64, f64),
        image_size: (usize, usize),
    ) -> Self {
        Self {
            focal_length,
            principal_point,
            image_size,
        }
    }

    /// Check that focal lengths are positive and all values finite.
    pub fn is_valid(&self) -> bool {
        let (fx, fy) = self.focal_length;
        let (cx, cy) = self.principal_point;
        fx.is_finite()
            && fy.is_finite()
            && cx.is_finite()
            && cy.is_finite()
            && fx > 0.0
            && fy > 0.0
            && self.image_size.0 > 0
            && self.image_size.1 > 0
    }

    /// Back-project a pixel with metric depth into camera coordinates.
    #[inline]
    pub fn unproject(&self, u: f64, v: f64, depth: f64) -> [f64; 3] {
        let (fx, fy) = self.focal_length;
        let (cx, cy) = self.principal_point;
        [(u - cx) * depth / fx, (v - cy) * depth / fy, depth]
    }
}
