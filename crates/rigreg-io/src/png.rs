use std::{fs, fs::File, path::Path};

use png::{BitDepth, ColorType, Decoder, Encoder, Transformations};

use crate::{error::IoError, ImageSize};

/// Read a PNG image as packed RGB8 pixels.
///
/// Grayscale and RGBA inputs are converted: gray is replicated into the
/// three channels and alpha is dropped.
///
/// # Arguments
///
/// * `file_path` - The path to the PNG file.
///
/// # Returns
///
/// The row-major pixels and the image size.
pub fn read_image_png_rgb8(
    file_path: impl AsRef<Path>,
) -> Result<(Vec<[u8; 3]>, ImageSize), IoError> {
    let (buf, size, color_type, bit_depth) = read_png_impl(file_path, Transformations::EXPAND)?;

    if bit_depth != BitDepth::Eight {
        return Err(IoError::UnsupportedPngFormat(format!(
            "expected 8 bit color, got {bit_depth:?}"
        )));
    }

    let pixels = match color_type {
        ColorType::Rgb => buf.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect(),
        ColorType::Rgba => buf.chunks_exact(4).map(|c| [c[0], c[1], c[2]]).collect(),
        ColorType::Grayscale => buf.iter().map(|&g| [g, g, g]).collect(),
        ColorType::GrayscaleAlpha => buf.chunks_exact(2).map(|c| [c[0], c[0], c[0]]).collect(),
        other => {
            return Err(IoError::UnsupportedPngFormat(format!("{other:?}")));
        }
    };

    Ok((pixels, size))
}

/// Read a single channel 16-bit PNG image (mono16).
///
/// # Arguments
///
/// * `file_path` - The path to the PNG file.
///
/// # Returns
///
/// The row-major pixel values and the image size.
pub fn read_image_png_mono16(file_path: impl AsRef<Path>) -> Result<(Vec<u16>, ImageSize), IoError> {
    let (buf, size, color_type, bit_depth) =
        read_png_impl(file_path, Transformations::IDENTITY)?;

    if color_type != ColorType::Grayscale || bit_depth != BitDepth::Sixteen {
        return Err(IoError::UnsupportedPngFormat(format!(
            "expected 16 bit grayscale, got {color_type:?} {bit_depth:?}"
        )));
    }

    // png stores 16 bit samples in big endian
    let pixels = buf
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();

    Ok((pixels, size))
}

/// Writes packed RGB8 pixels to the given file path.
///
/// # Arguments
///
/// - `file_path` - The path to the PNG image.
/// - `pixels` - The row-major pixels.
/// - `size` - The image size.
pub fn write_image_png_rgb8(
    file_path: impl AsRef<Path>,
    pixels: &[[u8; 3]],
    size: ImageSize,
) -> Result<(), IoError> {
    let buf = pixels.iter().flatten().copied().collect::<Vec<_>>();
    write_png_impl(file_path, &buf, size, BitDepth::Eight, ColorType::Rgb)
}

/// Writes 16-bit grayscale pixels to the given file path.
///
/// # Arguments
///
/// - `file_path` - The path to the PNG image.
/// - `pixels` - The row-major pixels.
/// - `size` - The image size.
pub fn write_image_png_mono16(
    file_path: impl AsRef<Path>,
    pixels: &[u16],
    size: ImageSize,
) -> Result<(), IoError> {
    let buf = pixels
        .iter()
        .flat_map(|v| v.to_be_bytes())
        .collect::<Vec<_>>();
    write_png_impl(file_path, &buf, size, BitDepth::Sixteen, ColorType::Grayscale)
}

// utility function to read the png file
fn read_png_impl(
    file_path: impl AsRef<Path>,
    transformations: Transformations,
) -> Result<(Vec<u8>, ImageSize, ColorType, BitDepth), IoError> {
    // verify the file exists
    let file_path = file_path.as_ref();
    if !file_path.exists() {
        return Err(IoError::FileDoesNotExist(file_path.to_path_buf()));
    }

    // verify the file extension
    match file_path.extension() {
        Some(extension) if extension == "png" => {}
        _ => return Err(IoError::InvalidFileExtension(file_path.to_path_buf())),
    }

    let file = fs::File::open(file_path)?;
    let mut decoder = Decoder::new(file);
    decoder.set_transformations(transformations);
    let mut reader = decoder
        .read_info()
        .map_err(|e| IoError::PngDecodeError(e.to_string()))?;

    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| IoError::PngDecodeError(e.to_string()))?;
    buf.truncate(info.buffer_size());

    Ok((
        buf,
        ImageSize {
            width: info.width as usize,
            height: info.height as usize,
        },
        info.color_type,
        info.bit_depth,
    ))
}

fn write_png_impl(
    file_path: impl AsRef<Path>,
    image_data: &[u8],
    image_size: ImageSize,
    // Make sure you set `depth` correctly
    depth: BitDepth,
    color_type: ColorType,
) -> Result<(), IoError> {
    let file = File::create(file_path)?;

    let mut encoder = Encoder::new(file, image_size.width as u32, image_size.height as u32);
    encoder.set_color(color_type);
    encoder.set_depth(depth);

    let mut writer = encoder
        .write_header()
        .map_err(|e| IoError::PngEncodingError(e.to_string()))?;
    writer
        .write_image_data(image_data)
        .map_err(|e| IoError::PngEncodingError(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_png_rgb8() -> Result<(), IoError> {
        let tmp_dir = tempfile::tempdir()?;
        let file_path = tmp_dir.path().join("color.png");

        let size = ImageSize {
            width: 3,
            height: 2,
        };
        let pixels = (0..6u8).map(|i| [i, 10 * i, 255 - i]).collect::<Vec<_>>();
        write_image_png_rgb8(&file_path, &pixels, size)?;

        let (pixels_back, size_back) = read_image_png_rgb8(&file_path)?;
        assert_eq!(size_back, size);
        assert_eq!(pixels_back, pixels);
        Ok(())
    }

    #[test]
    fn read_write_png_mono16() -> Result<(), IoError> {
        let tmp_dir = tempfile::tempdir()?;
        let file_path = tmp_dir.path().join("depth.png");

        let size = ImageSize {
            width: 2,
            height: 2,
        };
        let pixels = vec![0, 1000, 65535, 258];
        write_image_png_mono16(&file_path, &pixels, size)?;

        let (pixels_back, size_back) = read_image_png_mono16(&file_path)?;
        assert_eq!(size_back, size);
        assert_eq!(pixels_back, pixels);

        // a 16 bit depth map is not a color image
        assert!(matches!(
            read_image_png_rgb8(&file_path),
            Err(IoError::UnsupportedPngFormat(_))
        ));
        Ok(())
    }

    #[test]
    fn read_missing_png() {
        assert!(matches!(
            read_image_png_rgb8("does/not/exist.png"),
            Err(IoError::FileDoesNotExist(_))
        ));
    }
}
