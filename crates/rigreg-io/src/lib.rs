#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Raw depth map reading and writing.
///
/// Depth frames extracted from the capture are stored as headerless
/// little-endian `u16` buffers (`*_depth.dat`) or as 16-bit PNG files.
pub mod depth;

/// Error types for I/O operations.
pub mod error;

/// NumPy `.npy` reading and writing of `float64` arrays.
pub mod npy;

/// PNG image encoding and decoding.
pub mod png;

pub use error::IoError;

/// Image size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    /// Width of the image in pixels.
    pub width: usize,
    /// Height of the image in pixels.
    pub height: usize,
}

impl From<ImageSize> for (usize, usize) {
    fn from(size: ImageSize) -> Self {
        (size.width, size.height)
    }
}

impl From<(usize, usize)> for ImageSize {
    fn from((width, height): (usize, usize)) -> Self {
        Self { width, height }
    }
}
