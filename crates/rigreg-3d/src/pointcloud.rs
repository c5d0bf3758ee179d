use crate::{
    linalg::{matvec33, transform_point3d},
    transforms::RigidTransform,
};

/// A point cloud with points, colors, and normals.
///
/// The cloud carries no coordinate frame tag; which device produced it is
/// tracked by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<[f64; 3]>,
    // The colors of the points.
    colors: Option<Vec<[u8; 3]>>,
    // The normals of the points.
    normals: Option<Vec<[f64; 3]>>,
}

impl PointCloud {
    /// Create a new point cloud from points, colors (optional), and normals (optional).
    pub fn new(
        points: Vec<[f64; 3]>,
        colors: Option<Vec<[u8; 3]>>,
        normals: Option<Vec<[f64; 3]>>,
    ) -> Self {
        Self {
            points,
            colors,
            normals,
        }
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &Vec<[f64; 3]> {
        &self.points
    }

    /// Get as reference the colors of the points in the point cloud.
    pub fn colors(&self) -> Option<&Vec<[u8; 3]>> {
        self.colors.as_ref()
    }

    /// Get as reference the normals of the points in the point cloud.
    pub fn normals(&self) -> Option<&Vec<[f64; 3]>> {
        self.normals.as_ref()
    }

    /// Get the point at `index`, if any.
    #[inline]
    pub fn point(&self, index: usize) -> Option<&[f64; 3]> {
        self.points.get(index)
    }

    /// Return a copy of the point cloud expressed in another frame.
    ///
    /// Normals are rotated, colors are kept as they are.
    pub fn transformed(&self, dst_from_src: &RigidTransform) -> Self {
        let points = self
            .points
            .iter()
            .map(|p| transform_point3d(p, &dst_from_src.rotation, &dst_from_src.translation))
            .collect();

        let normals = self.normals.as_ref().map(|normals| {
            normals
                .iter()
                .map(|n| matvec33(&dst_from_src.rotation, n))
                .collect()
        });

        Self {
            points,
            colors: self.colors.clone(),
            normals,
        }
    }

    /// Append the points of another cloud.
    ///
    /// Colors and normals survive only when both clouds carry them.
    pub fn extend(&mut self, other: &PointCloud) {
        self.colors = match (self.colors.take(), other.colors()) {
            (Some(mut colors), Some(other_colors)) => {
                colors.extend_from_slice(other_colors);
                Some(colors)
            }
            (None, Some(other_colors)) if self.points.is_empty() => Some(other_colors.clone()),
            _ => None,
        };
        self.normals = match (self.normals.take(), other.normals()) {
            (Some(mut normals), Some(other_normals)) => {
                normals.extend_from_slice(other_normals);
                Some(normals)
            }
            (None, Some(other_normals)) if self.points.is_empty() => Some(other_normals.clone()),
            _ => None,
        };
        self.points.extend_from_slice(other.points());
    }
}
