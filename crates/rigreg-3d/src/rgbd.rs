use serde::{Deserialize, Serialize};

use crate::{camera::PinholeCameraIntrinsic, pointcloud::PointCloud};

/// Error types for RGB-D frames.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RgbdError {
    /// Color and depth images have different sizes.
    #[error("Color ({color:?}) and depth ({depth:?}) image sizes differ")]
    SizeMismatch {
        /// Color image size (width, height).
        color: (usize, usize),
        /// Depth image size (width, height).
        depth: (usize, usize),
    },

    /// A buffer length does not match the declared image size.
    #[error("Buffer of length {len} does not match image size {width}x{height}")]
    InvalidBufferLength {
        /// Buffer length.
        len: usize,
        /// Image width.
        width: usize,
        /// Image height.
        height: usize,
    },

    /// The intrinsics are missing or invalid.
    #[error("Invalid camera intrinsics: {0}")]
    InvalidIntrinsics(String),

    /// The depth options are invalid.
    #[error("Invalid depth options: {0}")]
    InvalidDepthOptions(String),
}

/// Options to convert raw depth values into metric depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthOptions {
    /// Raw depth units per meter (1000 for millimeter depth maps).
    pub depth_scale: f64,
    /// Depth values beyond this distance in meters are discarded.
    pub depth_trunc: f64,
}

impl Default for DepthOptions {
    fn default() -> Self {
        Self {
            depth_scale: 1000.0,
            depth_trunc: 3.0,
        }
    }
}

/// A struct representing an aligned RGB-D frame.
///
/// Color and depth share the same pixel grid, stored row major.
#[derive(Debug, Clone)]
pub struct RGBDImage {
    /// The width of the image
    pub width: usize,
    /// The height of the image
    pub height: usize,
    /// The RGB image as a 2D array of RGB values
    pub rgb: Vec<[u8; 3]>,
    /// The raw depth image, in sensor units
    pub depth: Vec<u16>,
}

impl RGBDImage {
    /// Creates a new RGBDImage from color and depth buffers with their sizes.
    ///
    /// Fails if the two images have different sizes or if a buffer does not
    /// match its declared size.
    pub fn new(
        rgb: Vec<[u8; 3]>,
        color_size: (usize, usize),
        depth: Vec<u16>,
        depth_size: (usize, usize),
    ) -> Result<Self, RgbdError> {
        if color_size != depth_size {
            return Err(RgbdError::SizeMismatch {
                color: color_size,
                depth: depth_size,
            });
        }
        let (width, height) = color_size;
        for len in [rgb.len(), depth.len()] {
            if len != width * height {
                return Err(RgbdError::InvalidBufferLength { len, width, height });
            }
        }
        Ok(Self {
            width,
            height,
            rgb,
            depth,
        })
    }

    /// Returns the dimensions of the image (width, height)
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Get the raw depth value at a specific pixel.
    #[inline]
    pub fn get_depth(&self, x: usize, y: usize) -> u16 {
        self.depth[y * self.width + x]
    }

    /// Get the color value at a specific pixel.
    #[inline]
    pub fn get_color(&self, x: usize, y: usize) -> [u8; 3] {
        self.rgb[y * self.width + x]
    }
}

/// Back-project an RGB-D frame into a colored point cloud in camera coordinates.
///
/// Every pixel with a non-zero depth below `depth_trunc` becomes a point
/// `X = (u - cx) * d / fx`, `Y = (v - cy) * d / fy`, `Z = d`. Invalid pixels are
/// skipped, so the output is not organized.
///
/// # Arguments
///
/// * `image` - The aligned color and depth frame.
/// * `intrinsic` - The pinhole intrinsics of the depth camera.
/// * `options` - Depth scale and truncation.
///
/// # Returns
///
/// The point cloud with one color per point.
pub fn rgbd_to_pointcloud(
    image: &RGBDImage,
    intrinsic: &PinholeCameraIntrinsic,
    options: &DepthOptions,
) -> Result<PointCloud, RgbdError> {
    if !intrinsic.is_valid() {
        return Err(RgbdError::InvalidIntrinsics(format!("{intrinsic:?}")));
    }
    if intrinsic.image_size != image.dimensions() {
        return Err(RgbdError::InvalidIntrinsics(format!(
            "intrinsics image size {:?} differs from frame size {:?}",
            intrinsic.image_size,
            image.dimensions()
        )));
    }
    if !(options.depth_scale.is_finite() && options.depth_scale > 0.0) {
        return Err(RgbdError::InvalidDepthOptions(format!(
            "depth_scale must be positive, got {}",
            options.depth_scale
        )));
    }
    if options.depth_trunc.is_nan() || options.depth_trunc <= 0.0 {
        return Err(RgbdError::InvalidDepthOptions(format!(
            "depth_trunc must be positive, got {}",
            options.depth_trunc
        )));
    }

    let mut points = Vec::with_capacity(image.depth.len());
    let mut colors = Vec::with_capacity(image.depth.len());

    for v in 0..image.height {
        for u in 0..image.width {
            let raw = image.get_depth(u, v);
            if raw == 0 {
                continue;
            }
            let d = raw as f64 / options.depth_scale;
            if d > options.depth_trunc {
                continue;
            }
            points.push(intrinsic.unproject(u as f64, v as f64, d));
            colors.push(image.get_color(u, v));
        }
    }

    log::debug!(
        "back-projected {} of {} pixels",
        points.len(),
        image.width * image.height
    );

    Ok(PointCloud::new(points, Some(colors), None))
}
