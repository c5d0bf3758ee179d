use std::io::{Read, Write};
use std::path::Path;

use crate::{error::IoError, png::read_image_png_mono16, ImageSize};

/// Read a raw depth map of known size.
///
/// The file holds `width * height` little-endian `u16` values, row major,
/// with no header.
///
/// # Arguments
///
/// * `file_path` - The path to the `.dat` file.
/// * `size` - The expected image size.
pub fn read_depth_raw(file_path: impl AsRef<Path>, size: ImageSize) -> Result<Vec<u16>, IoError> {
    let file_path = file_path.as_ref();
    if !file_path.exists() {
        return Err(IoError::FileDoesNotExist(file_path.to_path_buf()));
    }

    let mut bytes = Vec::new();
    std::fs::File::open(file_path)?.read_to_end(&mut bytes)?;

    let expected = size.width * size.height * 2;
    if bytes.len() != expected {
        return Err(IoError::InvalidDepthSize {
            got: bytes.len(),
            expected,
        });
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect())
}

/// Write a raw depth map as little-endian `u16` values.
pub fn write_depth_raw(file_path: impl AsRef<Path>, depth: &[u16]) -> Result<(), IoError> {
    let mut writer = std::io::BufWriter::new(std::fs::File::create(file_path)?);
    for v in depth {
        writer.write_all(&v.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a depth map stored either as raw `.dat` or as 16-bit `.png`.
///
/// The size is only used for raw files; for PNG files it is checked against
/// the decoded image.
pub fn read_depth(file_path: impl AsRef<Path>, size: ImageSize) -> Result<Vec<u16>, IoError> {
    let file_path = file_path.as_ref();
    match file_path.extension().and_then(|e| e.to_str()) {
        Some("dat") | Some("raw") => read_depth_raw(file_path, size),
        Some("png") => {
            let (depth, png_size) = read_image_png_mono16(file_path)?;
            if png_size != size {
                return Err(IoError::InvalidDepthSize {
                    got: png_size.width * png_size.height * 2,
                    expected: size.width * size.height * 2,
                });
            }
            Ok(depth)
        }
        _ => Err(IoError::InvalidFileExtension(file_path.to_path_buf())),
    }
}
